//! Line-delimited JSON writing and timestamp normalization.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::row::AggregateRow;
use crate::ExportError;

/// Incremental JSONL sink: one JSON object per line, flushed per row.
///
/// Each appended row hits the disk before `append` returns, so a process
/// abort loses at most the row being written.
pub struct JsonlWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    rows: usize,
}

impl JsonlWriter {
    /// Create or truncate the file at `path`.
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Append one row and flush it.
    pub fn append(&mut self, row: &AggregateRow) -> Result<(), ExportError> {
        let line = serde_json::to_string(row)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Number of rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and log the final row count.
    pub fn finish(mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        tracing::info!(path = %self.path.display(), rows = self.rows, "Exported JSONL file");
        Ok(())
    }
}

/// Write a batch of aggregate rows to a JSONL file in one call.
pub fn write_jsonl(rows: &[AggregateRow], path: &Path) -> Result<(), ExportError> {
    let mut writer = JsonlWriter::create(path)?;
    for row in rows {
        writer.append(row)?;
    }
    writer.finish()
}

/// Rewrite a JSONL file converting `timestamp` fields from epoch
/// milliseconds to epoch seconds.
///
/// This is the boundary transform applied before object-storage handoff.
/// Lines that are not JSON objects are skipped; objects without an integer
/// `timestamp` pass through unchanged.
pub fn normalize_timestamps(input: &Path, output: &Path) -> Result<(), ExportError> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);

    for line in reader.lines() {
        let line = line?;
        if !line.trim_start().starts_with('{') {
            continue;
        }

        let mut value: serde_json::Value = serde_json::from_str(&line)?;
        if let Some(ms) = value.get("timestamp").and_then(serde_json::Value::as_i64) {
            value["timestamp"] = serde_json::Value::from(ms / 1000);
        }

        let line = serde_json::to_string(&value)?;
        writeln!(writer, "{line}")?;
    }

    writer.flush()?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        "Normalized JSONL timestamps to seconds"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
