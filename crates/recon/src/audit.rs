//! Append-only writeback log sinks.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::model::WritebackLogEntry;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot open audit log {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("cannot write audit log: {0}")]
    Write(#[from] std::io::Error),
    #[error("cannot encode audit entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives one entry per applied write. Appends are serialized by the sink.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &WritebackLogEntry) -> Result<(), AuditError>;
}

/// JSON-lines file opened in append mode; earlier runs are never rewritten.
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open { path: path.clone(), source })?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, entry: &WritebackLogEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps entries in memory (dry runs, tests).
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<WritebackLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<WritebackLogEntry> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, entry: &WritebackLogEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WritebackAction;
    use crate::registry::RecordId;

    fn entry(publication: &str) -> WritebackLogEntry {
        WritebackLogEntry {
            timestamp: chrono::Utc::now(),
            project_record_id: RecordId::from("p1"),
            publication_record_id: RecordId::from(publication),
            action: WritebackAction::AddRelation,
            dry_run: false,
        }
    }

    #[test]
    fn jsonl_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        JsonlAuditLog::open(&path).unwrap().append(&entry("r1")).unwrap();
        JsonlAuditLog::open(&path).unwrap().append(&entry("r2")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: WritebackLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.publication_record_id, RecordId::from("r1"));
        assert!(lines[1].contains("\"action\":\"add_relation\""));
        assert!(lines[1].contains("\"dry_run\":false"));
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonlAuditLog::open(dir.path().join("nope/audit.jsonl")).err().unwrap();
        assert!(err.to_string().contains("cannot open audit log"));
    }
}
