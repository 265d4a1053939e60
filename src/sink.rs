// AMIGrid - AMI smart-meter telemetry core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON-lines row writer.
//!
//! Warehouse rows (validated readings, anomaly events, baseline buckets,
//! dead letters) are written one JSON object per line. Timestamps follow
//! RFC3339/UTC and floats serialize as IEEE-754 doubles.

use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::error::Result;
use log::warn;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes serializable rows as JSON lines.
pub struct JsonLinesWriter<W: Write> {
    writer: W,
    rows: u64,
}

impl JsonLinesWriter<BufWriter<File>> {
    /// Create (truncate) a file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, rows: 0 }
    }

    /// Append one row.
    pub fn write_row<T: Serialize + ?Sized>(&mut self, row: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    /// Append every row from an iterator.
    pub fn write_all<'a, T, I>(&mut self, rows: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> DeadLetterSink for JsonLinesWriter<W> {
    fn send(&mut self, letter: DeadLetter) {
        if let Err(e) = self.write_row(&letter) {
            warn!("failed to write dead letter: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = JsonLinesWriter::flush(self) {
            warn!("failed to flush dead letters: {}", e);
        }
    }
}
