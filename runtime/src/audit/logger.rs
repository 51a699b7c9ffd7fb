//! JSONL audit logger, an append-only trail of run activity.
//!
//! One line per action (run lifecycle, page captures, unlock attempts),
//! stamped with the run id. Rotates at `MAX_LOG_SIZE` into `.1`, `.2`,
//! etc., keeping at most `MAX_ROTATIONS` old files.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum audit log size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 5;

/// A single audit line.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub run_id: String,
    pub action: String,
    pub page: Option<u32>,
    pub person_id: Option<String>,
    pub status: String,
}

/// Append-only JSONL audit logger with automatic rotation.
pub struct AuditLogger {
    file: File,
    path: PathBuf,
    run_id: String,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl AuditLogger {
    /// Open or create the audit log at `path`, stamping every line with
    /// `run_id`.
    pub fn open(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            current_size,
        })
    }

    /// Open the default audit log at `~/.prospector/audit.jsonl`.
    pub fn for_run(run_id: &str) -> Result<Self> {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".prospector")
            .join("audit.jsonl");
        Self::open(&path, run_id)
    }

    /// Append one event.
    pub fn log(&mut self, event: &AuditEvent) -> Result<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        let bytes_written = writeln!(self.file, "{json}")
            .map(|()| json.len() as u64 + 1)
            .unwrap_or(0);
        self.current_size += bytes_written;
        Ok(())
    }

    /// Append one action line, stamped with the current time and run id.
    pub fn log_action(
        &mut self,
        action: &str,
        page: Option<u32>,
        person_id: Option<&str>,
        status: &str,
    ) -> Result<()> {
        self.log(&AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            action: action.to_string(),
            page,
            person_id: person_id.map(String::from),
            status: status.to_string(),
        })
    }

    /// Rotate log files: audit.jsonl → audit.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let first_rotation = rotation_path(&self.path, 1);
        let _ = std::fs::rename(&self.path, &first_rotation);

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen audit log after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated log file: `audit.jsonl.1`, `audit.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audit.jsonl")
    );
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_appends_jsonl_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut logger = AuditLogger::open(&path, "run-1").unwrap();
        logger.log_action("run_started", None, None, "ok").unwrap();
        logger
            .log_action("unlock", Some(2), Some("66f1a"), "ok")
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "run_started");
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[1]["page"], 2);
        assert_eq!(lines[1]["person_id"], "66f1a");
    }

    #[test]
    fn test_reopening_appends_rather_than_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut logger = AuditLogger::open(&path, "run-1").unwrap();
            logger.log_action("run_started", None, None, "ok").unwrap();
        }
        {
            let mut logger = AuditLogger::open(&path, "run-2").unwrap();
            logger.log_action("run_started", None, None, "ok").unwrap();
        }
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn test_rotation_path_naming() {
        let path = PathBuf::from("/tmp/.prospector/audit.jsonl");
        assert_eq!(
            rotation_path(&path, 1),
            PathBuf::from("/tmp/.prospector/audit.jsonl.1")
        );
        assert_eq!(
            rotation_path(&path, 5),
            PathBuf::from("/tmp/.prospector/audit.jsonl.5")
        );
    }
}
