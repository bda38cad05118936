use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CheckResult, EventLevel, ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable output: no progress, one JSON document at the end.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(result: &RunSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable per-row progress on stdout, errors on stderr.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn format_event(event: &ProgressEvent) -> String {
        match event.line {
            Some(line) if !event.message.starts_with("ROW ") => {
                format!("ROW {line} -- {}", event.message)
            }
            _ => event.message.clone(),
        }
    }

    pub fn print_summary(result: &RunSummary) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}polymix summary{reset}");
        println!("{green}uploaded rows: {}{reset}", result.uploaded);
        println!("{yellow}skipped rows: {}{reset}", result.skipped);
        if !result.skipped_lines.is_empty() {
            println!("{yellow}   see {} for details{reset}", result.error_log);
        }
        for (label, counts) in [
            ("citations", &result.citations),
            ("polymers", &result.polymers),
            ("mixtures", &result.mixtures),
        ] {
            println!(
                "{cyan}{label}: {} created, {} updated, {} found, {} reused{reset}",
                counts.created, counts.updated, counts.found, counts.cached
            );
        }
    }

    pub fn print_check(result: &CheckResult) {
        println!("{} rows, {} complete", result.rows, result.complete);
        for row in &result.incomplete {
            println!("ROW {} -- missing {}", row.line, row.missing.join(", "));
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let text = Self::format_event(&event);
        match event.level {
            EventLevel::Info => println!("{text}"),
            EventLevel::Error => eprintln!("{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_prefix_is_added_once() {
        let event = ProgressEvent::info(Some(4), "Created polymer: PS_1");
        assert_eq!(
            ConsoleOutput::format_event(&event),
            "ROW 4 -- Created polymer: PS_1"
        );

        let recorded = ProgressEvent::error(Some(4), "ROW 4 -- Solvent not found: x (1-2-3)");
        assert_eq!(
            ConsoleOutput::format_event(&recorded),
            "ROW 4 -- Solvent not found: x (1-2-3)"
        );
    }
}
