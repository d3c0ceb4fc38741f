//! CSV writer for scenario outcomes.
//!
//! Append-only: each outcome is written as soon as its scenario ends, so a
//! crash mid-suite keeps every finished row.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::ScenarioOutcome;

const CSV_HEADER: &str = "scenario,started_at,passed,duration_ms,artifacts,extracted,error";

/// Writes the header if the file doesn't exist or is empty.
pub fn init_csv(path: &Path) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        let reader = BufReader::new(file);
        if reader.lines().next().is_some() {
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create CSV directory")?;
    }
    let mut file = File::create(path).context("Failed to create CSV file")?;
    writeln!(file, "{}", CSV_HEADER).context("Failed to write CSV header")?;
    Ok(())
}

/// Appends one outcome row.
pub fn append_outcome(path: &Path, outcome: &ScenarioOutcome) -> Result<()> {
    init_csv(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV for append")?;

    let artifacts = outcome
        .artifacts
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(";");
    let extracted = outcome
        .extracted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";");

    let line = [
        escape(&outcome.name),
        outcome.started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        outcome.passed.to_string(),
        outcome.duration_ms.to_string(),
        escape(&artifacts),
        escape(&extracted),
        escape(outcome.error.as_deref().unwrap_or("")),
    ]
    .join(",");

    writeln!(file, "{}", line).context("Failed to write CSV row")?;
    Ok(())
}

/// Quotes a field containing a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
