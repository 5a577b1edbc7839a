//! CLI command implementations.

pub mod check;
pub mod replay;
pub mod run;
pub mod version;

use vbus_sim::TimingAnalyzer;

use crate::style::colors::SemanticStyle;
use crate::style::print_success;

/// Findings listed before the rest are summarized as a count.
const MAX_LISTED_EVENTS: usize = 20;

/// Prints the analyzer's findings, grouped by kind.
pub fn print_findings(analyzer: &TimingAnalyzer) {
    let summary = analyzer.summary();
    println!();
    if summary.total_events == 0 {
        print_success("No timing findings");
        return;
    }

    println!("{}", format!("{} timing findings", summary.total_events).header());
    for (kind, count) in &summary.by_kind {
        println!("  {}: {count}", kind.to_string().muted());
    }
    println!();
    for event in analyzer.events().iter().take(MAX_LISTED_EVENTS) {
        println!("  {}", event.by_severity(event.severity()));
    }
    if summary.total_events > MAX_LISTED_EVENTS {
        println!(
            "  {}",
            format!("... {} more", summary.total_events - MAX_LISTED_EVENTS).muted()
        );
    }
}
