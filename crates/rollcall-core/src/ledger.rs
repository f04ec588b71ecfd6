//! The external attendance ledger seam and a local journal implementation.

use crate::session::SessionContext;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// `source` tag carried by every event this crate produces.
pub const EVENT_SOURCE: &str = "face_recognition";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport failure, timeout or server-side fault. Worth retrying.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The ledger refused the event. Retrying without a fix is pointless.
    #[error("ledger rejected event: {reason}")]
    Rejected { status: Option<u16>, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
}

/// Session information forwarded with a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitContext {
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub session: SessionContext,
}

/// A "present" event handed to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub identity_id: String,
    /// Local calendar day the event counts for.
    pub date: NaiveDate,
    pub timestamp: DateTime<Local>,
    pub confidence: f32,
    pub status: AttendanceStatus,
    #[serde(flatten)]
    pub context: CommitContext,
    pub source: String,
}

/// What the ledger answers on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub marked_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Durable sink for attendance events.
///
/// Implementations may block (network I/O); callers run them off any async executor.
pub trait Ledger: Send + Sync {
    fn record(&self, event: &AttendanceEvent) -> Result<LedgerReceipt, LedgerError>;

    /// Cheap reachability check.
    fn health(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Appends one JSON object per line to a local file.
pub struct JournalLedger {
    path: PathBuf,
    append: Mutex<()>,
}

impl JournalLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> std::io::Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }
}

impl Ledger for JournalLedger {
    fn record(&self, event: &AttendanceEvent) -> Result<LedgerReceipt, LedgerError> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| LedgerError::Rejected {
                status: None,
                reason: format!("unserializable event: {e}"),
            })?;
        line.push('\n');

        let _guard = self.append.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self
            .open()
            .map_err(|e| LedgerError::Unavailable(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| LedgerError::Unavailable(format!("{}: {e}", self.path.display())))?;

        tracing::info!(
            identity = %event.identity_id,
            date = %event.date,
            confidence = event.confidence,
            journal = %self.path.display(),
            "attendance journaled"
        );
        Ok(LedgerReceipt {
            marked_at: event.timestamp.with_timezone(&Utc),
            message: None,
        })
    }

    fn health(&self) -> Result<(), LedgerError> {
        self.open()
            .map(drop)
            .map_err(|e| LedgerError::Unavailable(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> AttendanceEvent {
        let now = Local::now();
        AttendanceEvent {
            identity_id: id.into(),
            date: now.date_naive(),
            timestamp: now,
            confidence: 0.82,
            status: AttendanceStatus::Present,
            context: CommitContext {
                session_id: Some("SESS1".into()),
                session: SessionContext {
                    course_id: "21CS701".into(),
                    department: "Computer Science".into(),
                    year: "4th Year".into(),
                },
            },
            source: EVENT_SOURCE.into(),
        }
    }

    #[test]
    fn test_journal_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalLedger::new(dir.path().join("attendance.jsonl"));
        journal.health().unwrap();

        journal.record(&event("S1")).unwrap();
        journal.record(&event("S2")).unwrap();

        let raw = std::fs::read_to_string(journal.path()).unwrap();
        let events: Vec<AttendanceEvent> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].identity_id, "S1");
        assert_eq!(events[1].context.session.department, "Computer Science");
        assert_eq!(events[1].status, AttendanceStatus::Present);
    }

    #[test]
    fn test_journal_unwritable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalLedger::new(dir.path().join("missing-dir").join("a.jsonl"));
        assert!(matches!(journal.health(), Err(LedgerError::Unavailable(_))));
        assert!(matches!(journal.record(&event("S1")), Err(LedgerError::Unavailable(_))));
    }

    #[test]
    fn test_event_wire_shape() {
        let value = serde_json::to_value(event("S1")).unwrap();
        assert_eq!(value["identity_id"], "S1");
        assert_eq!(value["session_id"], "SESS1");
        assert_eq!(value["course_id"], "21CS701");
        assert_eq!(value["status"], "present");
        assert_eq!(value["source"], EVENT_SOURCE);
    }
}
