use crate::error::{CullError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = ".history.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CullHistoryRecord {
    pub timestamp: String,
    pub directory: String,
    pub deleted: Vec<String>,
    pub action: String, // "deleted"
}

impl CullHistoryRecord {
    pub fn deleted_now(directory: &Path, deleted: &[PathBuf]) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            directory: directory.to_string_lossy().into_owned(),
            deleted: deleted
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            action: "deleted".to_string(),
        }
    }
}

pub fn history_path(dir: &Path) -> PathBuf {
    dir.join(HISTORY_FILE)
}

pub fn append_record(dir: &Path, record: &CullHistoryRecord) -> Result<()> {
    let history_file = history_path(dir);
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_file)?;
    let line = serde_json::to_string(record).map_err(|e| CullError::History(e.to_string()))?;
    writeln!(out, "{}", line)?;
    Ok(())
}

/// Read every record, skipping lines that do not parse.
pub fn read_records(dir: &Path) -> Result<Vec<CullHistoryRecord>> {
    let history_file = history_path(dir);
    let f = File::open(&history_file).map_err(|e| {
        CullError::History(format!("could not open {}: {}", history_file.display(), e))
    })?;

    let mut records = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        match serde_json::from_str::<CullHistoryRecord>(&line) {
            Ok(rec) => records.push(rec),
            Err(err) => log::warn!("Skipping malformed history entry {}: {}", i, err),
        }
    }
    Ok(records)
}
