//! JSONL to CSV conversion.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::ExportError;

/// Convert a JSONL file to CSV.
///
/// The header row is built from JSON keys in first-seen order across all
/// rows; rows missing a key emit an empty cell. Values are written verbatim
/// (the aggregate row schema contains no embedded commas or quotes).
pub fn jsonl_to_csv(input: &Path, output: &Path) -> Result<(), ExportError> {
    let reader = BufReader::new(File::open(input)?);

    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<serde_json::Map<String, serde_json::Value>> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(&line)?;
        let Some(object) = value.as_object() else {
            continue;
        };

        for key in object.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
        rows.push(object.clone());
    }

    let mut writer = BufWriter::new(File::create(output)?);
    writeln!(writer, "{}", headers.join(","))?;

    for row in &rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|header| row.get(header).map(cell_value).unwrap_or_default())
            .collect();
        writeln!(writer, "{}", cells.join(","))?;
    }

    writer.flush()?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        rows = rows.len(),
        "Converted JSONL to CSV"
    );
    Ok(())
}

/// Render one JSON value as a CSV cell.
fn cell_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_rows_preserving_first_seen_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rows.jsonl");
        let output = dir.path().join("rows.csv");

        std::fs::write(
            &input,
            concat!(
                "{\"machineId\":\"M-0\",\"avgRuntime\":55.0,\"alert\":false}\n",
                "{\"machineId\":\"M-1\",\"avgRuntime\":95.0,\"alert\":true,\"timestamp\":9}\n",
            ),
        )
        .unwrap();

        jsonl_to_csv(&input, &output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "machineId,avgRuntime,alert,timestamp");
        assert_eq!(lines[1], "M-0,55.0,false,");
        assert_eq!(lines[2], "M-1,95.0,true,9");
    }

    #[test]
    fn empty_and_non_object_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rows.jsonl");
        let output = dir.path().join("rows.csv");

        std::fs::write(&input, "\n[1,2]\n{\"machineId\":\"M-0\"}\n").unwrap();
        jsonl_to_csv(&input, &output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["machineId", "M-0"]);
    }
}
