//! Scenario run command.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use vbus_config::ScenarioLoader;
use vbus_sim::{BusMonitor, CaptureWriter, SimSummary, Simulation, write_events_to_path};

use crate::style::colors::SemanticStyle;
use crate::style::{format_ms, print_hint, print_info_table, print_success, print_traffic_table};

pub struct RunOptions {
    pub scenario: PathBuf,
    pub seed: Option<u64>,
    pub capture: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub trace: Option<PathBuf>,
    pub json: bool,
}

pub fn run(opts: &RunOptions) -> Result<()> {
    let mut scenario = ScenarioLoader::new(&opts.scenario)
        .with_seed(opts.seed)
        .load()?;
    if opts.trace.is_some() {
        scenario.trace_enabled = true;
    }

    let analyzer = Rc::new(RefCell::new(scenario.build_analyzer()));
    let monitor = Rc::new(RefCell::new(BusMonitor::new()));

    let mut sim = Simulation::new(scenario).context("Failed to set up simulation")?;
    sim.bus_mut().attach(Rc::clone(&monitor));
    sim.bus_mut().attach(Rc::clone(&analyzer));

    let capture = match &opts.capture {
        Some(path) => {
            let writer = CaptureWriter::create(path)
                .with_context(|| format!("Failed to create capture {}", path.display()))?;
            let writer = Rc::new(RefCell::new(writer));
            sim.bus_mut().attach(Rc::clone(&writer));
            Some(writer)
        }
        None => None,
    };

    let summary = sim.run().context("Simulation failed")?;

    if let Some(writer) = &capture {
        writer
            .borrow_mut()
            .flush()
            .context("Failed to flush capture")?;
    }
    if let Some(path) = &opts.trace {
        sim.event_log()
            .save_to_file(path)
            .with_context(|| format!("Failed to save trace to {}", path.display()))?;
    }

    let analyzer = analyzer.borrow();
    if let Some(path) = &opts.events {
        write_events_to_path(path, analyzer.events())
            .with_context(|| format!("Failed to write events to {}", path.display()))?;
    }

    if opts.json {
        let report = serde_json::json!({
            "summary": serde_json::to_value(&summary)?,
            "analysis": serde_json::to_value(analyzer.summary())?,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_success(&format!(
        "Scenario {} finished: {}",
        summary.scenario.code(),
        summary.outcome
    ));
    print_info_table(&summary_entries(&summary));
    print_traffic_table(&monitor.borrow());
    super::print_findings(&analyzer);

    if let Some(path) = &opts.capture {
        println!();
        print_hint(&format!("Replay with: vbus replay {}", path.display()));
    }
    Ok(())
}

fn summary_entries(summary: &SimSummary) -> Vec<(&'static str, String)> {
    let faults = &summary.faults;
    vec![
        ("Seed", summary.seed.to_string()),
        ("Outcome", summary.outcome.to_string()),
        ("Virtual time", format_ms(summary.final_time_ns)),
        ("Events processed", summary.events_processed.to_string()),
        ("Frames published", summary.frames_published.to_string()),
        ("Bytes published", summary.bus.bytes_published.to_string()),
        (
            "Faults",
            format!(
                "{} dropped, {} delayed, {} corrupted, {} amplified (+{} copies)",
                faults.frames_dropped,
                faults.frames_delayed,
                faults.frames_corrupted,
                faults.amplifications,
                faults.frames_injected
            ),
        ),
        ("Delivery failures", summary.bus.delivery_failures.to_string()),
        ("Digest", summary.digest.clone()),
    ]
}
