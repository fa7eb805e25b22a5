// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Move journal for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// One applied move, paths relative to `root`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub root: PathBuf,
    pub src_path: String,
    pub dst_path: String,
    pub fingerprint: String,
    pub undone: bool,
}

impl MoveRecord {
    pub fn new(root: &Path, src_path: &str, dst_path: &str, fingerprint: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            root: root.to_path_buf(),
            src_path: src_path.to_string(),
            dst_path: dst_path.to_string(),
            fingerprint,
            undone: false,
        }
    }
}

/// JSON-lines journal of applied moves
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &MoveRecord) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    /// Read all records, oldest first; unparsable lines are skipped
    pub fn read_all(&self) -> Result<Vec<MoveRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Failed to parse history entry: {}", e),
            }
        }
        Ok(records)
    }

    /// Records not yet undone, newest first
    pub fn get_undoable(&self, count: usize) -> Result<Vec<MoveRecord>> {
        let mut records: Vec<MoveRecord> =
            self.read_all()?.into_iter().filter(|r| !r.undone).collect();
        records.reverse();
        records.truncate(count);
        Ok(records)
    }

    pub fn mark_undone(&self, id: &str) -> Result<()> {
        let records = self.read_all()?;

        // Rewrite the entire file with the updated record
        let mut writer = std::io::BufWriter::new(File::create(&self.path)?);
        for mut record in records {
            if record.id == id {
                record.undone = true;
            }
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        }
        writer.flush()?;
        Ok(())
    }
}
