use indexcat_core::report::{IndexOidsRow, RowCounts};
use serde_json::json;

use crate::executor::CommandResult;

/// Output mode for rendering command results.
pub enum OutputMode {
    /// Human-readable output.
    Pretty,
    /// Machine-parseable JSON (one JSON object per result on stdout).
    Json,
}

/// Render a command result to stdout in the given mode.
pub fn render(result: &CommandResult, mode: &OutputMode) {
    match result {
        CommandResult::Oids(rows) => match mode {
            OutputMode::Pretty => print_oids(rows),
            OutputMode::Json => println!("{}", json!({"indexes": rows, "count": rows.len()})),
        },
        CommandResult::Description(descr) => match mode {
            OutputMode::Pretty => {
                println!("Index: {}", descr.name);
                print!("{}", descr.text);
            }
            OutputMode::Json => {
                println!("{}", json!({"name": descr.name, "description": descr.text}))
            }
        },
        CommandResult::Rows(counts) => match mode {
            OutputMode::Pretty => print_rows(counts),
            OutputMode::Json => println!("{}", json!({"total": counts.total, "dead": counts.dead})),
        },
    }
}

/// Render an error to stderr in the given mode.
pub fn render_error(err: &dyn std::fmt::Display, mode: &OutputMode) {
    match mode {
        OutputMode::Pretty => print_error(err),
        OutputMode::Json => {
            eprintln!("{}", json!({"error": err.to_string()}));
        }
    }
}

// ---- Pretty-print helpers ----

const OIDS_HEADER: [&str; 6] = [
    "datoid",
    "reloid",
    "relnode",
    "index_reloid",
    "index_relnode",
    "kind",
];

/// Format descriptor rows as a right-aligned table.
pub fn format_oids(rows: &[IndexOidsRow]) -> String {
    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|r| {
            [
                r.datoid.to_string(),
                r.reloid.to_string(),
                r.relnode.to_string(),
                r.index_reloid.to_string(),
                r.index_relnode.to_string(),
                r.kind.clone(),
            ]
        })
        .collect();

    let mut widths = OIDS_HEADER.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |row: &[&str]| -> String {
        let padded: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:>w$}"))
            .collect();
        format!(" {} ", padded.join(" | "))
    };

    let mut out = line(&OIDS_HEADER);
    out.push('\n');
    for row in &cells {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&refs));
        out.push('\n');
    }
    out
}

pub fn print_oids(rows: &[IndexOidsRow]) {
    if rows.is_empty() {
        println!("No index descriptors.");
    } else {
        print!("{}", format_oids(rows));
        println!("({} descriptor(s))", rows.len());
    }
}

pub fn print_rows(counts: &RowCounts) {
    println!("Total records: {}", counts.total);
    println!("Dead records:  {}", counts.dead);
}

/// Print an error message to stderr.
pub fn print_error(err: &dyn std::fmt::Display) {
    eprintln!("Error: {err}");
}
