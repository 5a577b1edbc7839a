//! Capture replay command.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use vbus_config::ScenarioLoader;
use vbus_sim::{
    Bus, BusMonitor, ClockMode, ReplayOutcome, Replayer, SimClock, TimingAnalyzer,
    write_events_to_path,
};

use crate::style::colors::SemanticStyle;
use crate::style::{format_ms, print_info_table, print_success, print_traffic_table, print_warn};

pub struct ReplayOptions {
    pub capture: PathBuf,
    pub scenario: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub limit: Option<usize>,
    pub json: bool,
}

pub fn run(opts: &ReplayOptions) -> Result<()> {
    let scenario = opts
        .scenario
        .as_ref()
        .map(|path| ScenarioLoader::new(path).load())
        .transpose()?;

    let mut replayer = Replayer::from_path(&opts.capture)
        .with_context(|| format!("Failed to load capture {}", opts.capture.display()))?;
    if let Some(limit) = opts.limit {
        replayer = replayer.with_limit(limit);
    }

    let (analyzer, mode) = match &scenario {
        Some(scenario) => (scenario.build_analyzer(), scenario.clock),
        None => (TimingAnalyzer::default(), ClockMode::Step),
    };
    let analyzer = Rc::new(RefCell::new(analyzer));
    let monitor = Rc::new(RefCell::new(BusMonitor::new()));

    let mut bus = Bus::new();
    bus.attach(Rc::clone(&monitor));
    bus.attach(Rc::clone(&analyzer));

    let mut clock = SimClock::new(mode);
    let summary = replayer
        .run(&mut bus, &mut clock)
        .context("Replay failed")?;

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

    match summary.outcome {
        ReplayOutcome::Completed => print_success(&format!(
            "Replayed {} frames from {}",
            summary.frames_published,
            opts.capture.display().to_string().code()
        )),
        ReplayOutcome::LimitReached => print_warn(&format!(
            "Stopped after {} of {} frames (limit)",
            summary.frames_published,
            replayer.len()
        )),
        ReplayOutcome::Stopped => print_warn("Replay stopped"),
    }
    print_info_table(&[
        ("Virtual time", format_ms(summary.final_time_ns)),
        ("Frames published", summary.frames_published.to_string()),
        ("Bytes published", summary.bus.bytes_published.to_string()),
        ("Delivery failures", summary.bus.delivery_failures.to_string()),
        ("Digest", summary.digest.clone()),
    ]);
    print_traffic_table(&monitor.borrow());
    super::print_findings(&analyzer);
    Ok(())
}
