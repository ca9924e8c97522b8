//! Table formatting utilities using comfy-table.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use owo_colors::OwoColorize;
use polyrun_core::{SummaryLine, Workspace};

use super::status::Indicator;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Prints workspaces with their directory, version and visibility.
pub fn print_workspace_table(workspaces: &[&Workspace]) {
    let mut table = new_table(&["Workspace", "Directory", "Version", "Visibility"]);

    for ws in workspaces {
        let visibility = if ws.is_private { "private" } else { "public" };
        table.add_row(vec![
            Cell::new(&ws.name).fg(Color::White),
            Cell::new(ws.display_dir()).fg(Color::DarkGrey),
            Cell::new(ws.version.as_deref().unwrap_or("-")).fg(Color::Cyan),
            Cell::new(visibility).fg(if ws.is_private {
                Color::DarkGrey
            } else {
                Color::Green
            }),
        ]);
    }

    println!("{}", table);
}

/// Prints a simple list of workspace names (one per line).
pub fn print_workspace_list(names: &[String]) {
    if names.is_empty() {
        println!("  {} {}", "→".cyan(), "(none)".bright_black());
        return;
    }

    for name in names {
        println!("  {} {}", "→".cyan(), name.bold().white());
    }
}

/// Prints rows of dependency links under the given headers.
pub fn print_link_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = new_table(headers);
    for row in rows {
        table.add_row(row.into_iter().map(Cell::new).collect::<Vec<_>>());
    }
    println!("{}", table);
}

/// Prints per-workspace outcomes, colored by severity.
pub fn print_summary_table(lines: &[SummaryLine]) {
    let mut table = new_table(&["Status", "Workspace", "Details"]);

    for line in lines {
        let indicator = Indicator::from(line.severity);
        table.add_row(vec![
            Cell::new(indicator.symbol()).fg(indicator.color()),
            Cell::new(&line.name).fg(Color::White),
            Cell::new(&line.detail).fg(indicator.color()),
        ]);
    }

    println!("{}", table);
}
