//! Output formatting utilities

use miette::{IntoDiagnostic, Result};
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};

use crate::cli::helpers::truncate_str;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::frame::{Cell, Frame};

/// Widest text cell shown in a terminal table
const MAX_TEXT_WIDTH: usize = 48;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if io::stdout().is_terminal() {
                OutputFormat::Table
            } else {
                OutputFormat::Tsv
            }
        }
        other => other,
    }
}

/// Render a frame as a bordered table
pub fn render_table(frame: &Frame, precision: Option<usize>) -> String {
    let mut builder = Builder::default();
    builder.push_record(frame.columns.iter().cloned());
    for row in &frame.rows {
        builder.push_record(row.iter().map(|cell| match cell {
            Cell::Text(s) => truncate_str(s, MAX_TEXT_WIDTH),
            other => other.render(precision.or(Some(4))),
        }));
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    let numeric: Vec<usize> = (0..frame.columns.len())
        .filter(|&c| {
            !frame.rows.is_empty() && frame.rows.iter().all(|r| !matches!(r[c], Cell::Text(_)))
        })
        .collect();
    for c in numeric {
        table.modify(Columns::one(c), Alignment::right());
    }
    table.to_string()
}

/// Write a frame to stdout in the requested format
pub fn print_frame(frame: &Frame, global: &GlobalOpts) -> Result<()> {
    let stdout = io::stdout();
    match effective_format(global.format) {
        OutputFormat::Table | OutputFormat::Auto => {
            let mut out = stdout.lock();
            if !frame.title.is_empty() {
                writeln!(out, "{}", console::style(&frame.title).bold()).into_diagnostic()?;
            }
            writeln!(out, "{}", render_table(frame, global.precision)).into_diagnostic()?;
        }
        OutputFormat::Csv => frame.write_delimited(stdout.lock(), b',', global.precision)?,
        OutputFormat::Tsv => frame.write_delimited(stdout.lock(), b'\t', global.precision)?,
        OutputFormat::Json => {
            writeln!(stdout.lock(), "{}", frame.to_json()?).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Export to `path` when given, otherwise print
pub fn emit(frame: &Frame, output: Option<&Path>, global: &GlobalOpts) -> Result<()> {
    match output {
        Some(path) => {
            frame.export(path, global.precision)?;
            if !global.quiet {
                eprintln!(
                    "{} Wrote {} rows to {}",
                    console::style("✓").green(),
                    frame.rows.len(),
                    path.display()
                );
            }
            Ok(())
        }
        None => print_frame(frame, global),
    }
}
