//! CSV telemetry replay.
//!
//! Reads historical telemetry exported as `machineId,timestamp,runtime,status`
//! rows. The header row and malformed lines are skipped with a warning rather
//! than aborting the replay.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::SourceError;

/// Read raw ingestion payloads from a CSV file.
pub fn read_csv_payloads(path: &Path) -> Result<Vec<serde_json::Value>, SourceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut payloads = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Some(payload) => payloads.push(payload),
            None => {
                // Line 0 is the header; anything else is worth a warning.
                if index > 0 && !line.trim().is_empty() {
                    tracing::warn!(line = index + 1, "Skipping malformed CSV telemetry line");
                }
            }
        }
    }

    tracing::info!(path = %path.display(), rows = payloads.len(), "Loaded CSV telemetry");
    Ok(payloads)
}

/// Parse one CSV line into a raw ingestion payload.
///
/// Returns `None` for the header row, blank lines, and rows whose numeric
/// fields do not parse.
pub fn parse_line(line: &str) -> Option<serde_json::Value> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return None;
    }

    let machine_id = fields[0];
    if machine_id.is_empty() {
        return None;
    }

    let timestamp: i64 = fields[1].parse().ok()?;
    let runtime: f64 = fields[2].parse().ok()?;

    Some(serde_json::json!({
        "machineId": machine_id,
        "timestamp": timestamp,
        "runtime": runtime,
        "status": fields[3],
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let payload = parse_line("M-7,1700000000000,42.5,normal").unwrap();
        assert_eq!(payload["machineId"], "M-7");
        assert_eq!(payload["timestamp"], 1_700_000_000_000i64);
        assert_eq!(payload["runtime"], 42.5);
        assert_eq!(payload["status"], "normal");
    }

    #[test]
    fn rejects_header_and_malformed_lines() {
        assert!(parse_line("machineId,timestamp,runtime,status").is_none());
        assert!(parse_line("M-1,not-a-number,42.5,normal").is_none());
        assert!(parse_line("M-1,1700000000000,42.5").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn reads_file_skipping_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");
        std::fs::write(
            &path,
            concat!(
                "machineId,timestamp,runtime,status\n",
                "M-0,1700000000000,42.5,normal\n",
                "garbage line\n",
                "M-1,1700000001000,120.0,slow\n",
            ),
        )
        .unwrap();

        let payloads = read_csv_payloads(&path).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["machineId"], "M-0");
        assert_eq!(payloads[1]["status"], "slow");
    }
}
