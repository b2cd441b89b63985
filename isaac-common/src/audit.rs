//! Session audit log.
//!
//! One JSON object per line, appended for every routed command: executed,
//! declined, blocked, failed or malformed.

use crate::adapters::{SessionLogger, SessionRecord};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// A line in the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(flatten)]
    pub record: SessionRecord,
    /// Local user running the session.
    pub user: String,
    /// Local host running the session.
    pub host: String,
}

/// Appends [`AuditEntry`] lines to a file.
pub struct JsonlSessionLogger {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
    user: String,
    host: String,
}

impl JsonlSessionLogger {
    /// Open (or create) the log file, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufWriter::new(file)),
            user: whoami(),
            host: hostname(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("session log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

impl SessionLogger for JsonlSessionLogger {
    fn record(&self, record: &SessionRecord) {
        let entry = AuditEntry {
            record: record.clone(),
            user: self.user.clone(),
            host: self.host.clone(),
        };
        if let Err(e) = self.write(&entry) {
            warn!(path = %self.path.display(), error = %e, "Failed to write session log entry");
        }
    }
}

/// Logger that drops records. Used when session logging is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn record(&self, _record: &SessionRecord) {}
}

/// Read a session log back. Malformed lines are skipped with a warning.
pub fn read_entries(path: &Path) -> anyhow::Result<Vec<AuditEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = lineno + 1, error = %e, "Skipping malformed session log line"),
        }
    }
    Ok(entries)
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::tier::Tier;
    use crate::types::CommandResult;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(command: &str, result: CommandResult) -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            command: command.to_string(),
            tier: result.tier,
            forced: result.forced,
            result,
            machine: None,
        }
    }

    #[test]
    fn test_appends_jsonl_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("session.jsonl");
        let logger = JsonlSessionLogger::open(&path).unwrap();

        logger.record(&record("ls", CommandResult::ok("a\n").with_tier(Tier::Instant)));
        logger.record(&record(
            "rm -rf /",
            CommandResult::failed(Failure::blocked("tier 4")).with_tier(Tier::Lockdown),
        ));

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.command, "ls");
        assert_eq!(entries[1].record.tier, Some(Tier::Lockdown));
        assert!(entries[1].record.result.was_blocked());
        assert!(!entries[1].user.is_empty());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        JsonlSessionLogger::open(&path)
            .unwrap()
            .record(&record("pwd", CommandResult::ok("/\n")));
        JsonlSessionLogger::open(&path)
            .unwrap()
            .record(&record("pwd", CommandResult::ok("/\n")));
        assert_eq!(read_entries(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        let logger = JsonlSessionLogger::open(&path).unwrap();
        logger.record(&record("ls", CommandResult::ok("")));
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        assert_eq!(read_entries(&path).unwrap().len(), 1);
    }
}
