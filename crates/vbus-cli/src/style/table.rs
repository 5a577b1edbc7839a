//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use vbus_sim::BusMonitor;

use super::colors::SemanticStyle;
use super::output::format_ms;

fn styled_table(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col)
                    .add_attribute(Attribute::Bold)
                    .fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header_cells);
    table
}

/// Per-id traffic table built from a bus monitor.
pub fn traffic_table(monitor: &BusMonitor) -> Table {
    let mut table = styled_table(&["ID", "Frames", "Bytes", "Avg interval", "Min", "Max"]);
    let interval = |ns: Option<u64>| ns.map_or_else(|| "-".to_string(), format_ms);

    for (id, stats) in monitor.all_statistics() {
        table.add_row(vec![
            Cell::new(id.to_string()),
            Cell::new(stats.count).set_alignment(CellAlignment::Right),
            Cell::new(stats.total_bytes).set_alignment(CellAlignment::Right),
            Cell::new(interval(stats.average_interval_ns())).set_alignment(CellAlignment::Right),
            Cell::new(interval(stats.min_interval_ns)).set_alignment(CellAlignment::Right),
            Cell::new(interval(stats.max_interval_ns)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Prints the traffic table, or a note when nothing was published.
pub fn print_traffic_table(monitor: &BusMonitor) {
    if monitor.frame_count() == 0 {
        println!("{}", "No frames were published.".muted());
        return;
    }
    println!("{}", traffic_table(monitor));
}

/// Creates a key-value info table (two columns: key and value).
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}

/// Prints a key-value info table.
pub fn print_info_table(entries: &[(&str, String)]) {
    println!("{}", info_table(entries));
}
