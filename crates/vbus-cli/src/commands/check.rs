//! Scenario validation command.

use std::path::Path;

use anyhow::Result;
use vbus_config::{ScenarioLoader, local_override_path, render_scenario};

use crate::style::colors::SemanticStyle;
use crate::style::{format_ms, print_labeled, print_success};

pub fn run(path: &Path, print: bool) -> Result<()> {
    let scenario = ScenarioLoader::new(path).load()?;

    if print {
        print!("{}", render_scenario(&scenario)?);
        return Ok(());
    }

    let messages: usize = scenario.nodes.iter().map(|n| n.messages.len()).sum();
    print_success(&format!(
        "Scenario {} is valid",
        scenario.name.code()
    ));
    print_labeled("Seed", &scenario.seed.to_string());
    print_labeled("Duration", &format_ms(scenario.duration_ns));
    print_labeled("Clock", &format!("{:?}", scenario.clock));
    print_labeled("Nodes", &scenario.nodes.len().to_string());
    print_labeled("Messages", &messages.to_string());
    print_labeled("Fault rules", &scenario.faults.len().to_string());
    print_labeled("Expectations", &scenario.expectations.len().to_string());

    let local = local_override_path(path);
    if local.exists() {
        print_labeled("Local override", &local.display().to_string());
    }
    Ok(())
}
