//! At-most-once-per-day attendance commits.
//!
//! The `(identity, date)` key is reserved before the ledger is called, so two
//! concurrent recognitions of the same person cannot both reach the ledger.
//! The reservation is released if the ledger call fails. The local key set
//! only saves redundant calls within one process lifetime; the ledger stays
//! the source of truth and may reject a duplicate on its own.

use crate::ledger::{
    AttendanceEvent, AttendanceStatus, CommitContext, Ledger, LedgerError, EVENT_SOURCE,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("{identity_id} already committed for {date}")]
    AlreadyCommitted { identity_id: String, date: NaiveDate },
    #[error("commit for {identity_id} on {date} is already in progress")]
    InFlight { identity_id: String, date: NaiveDate },
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("ledger rejected commit: {reason}")]
    LedgerRejected { status: Option<u16>, reason: String },
}

impl CommitError {
    /// True when the same commit may succeed later without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::LedgerUnavailable(_) | CommitError::InFlight { .. })
    }
}

impl From<LedgerError> for CommitError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unavailable(msg) => CommitError::LedgerUnavailable(msg),
            LedgerError::Rejected { status, reason } => CommitError::LedgerRejected { status, reason },
        }
    }
}

/// A committed attendance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub identity_id: String,
    pub date: NaiveDate,
    pub confidence: f32,
    /// Timestamp reported by the ledger.
    pub marked_at: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    InFlight,
    Committed,
}

type DedupKey = (String, NaiveDate);

/// Daily dedup in front of a [`Ledger`].
pub struct AttendanceCommitter {
    ledger: Arc<dyn Ledger>,
    keys: Mutex<HashMap<DedupKey, KeyState>>,
}

impl AttendanceCommitter {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Commit `identity_id` as present on `date`.
    ///
    /// Fails without calling the ledger when the key is already committed
    /// ([`CommitError::AlreadyCommitted`]) or another commit for it has not
    /// finished yet ([`CommitError::InFlight`]).
    pub fn commit(
        &self,
        identity_id: &str,
        date: NaiveDate,
        confidence: f32,
        context: &CommitContext,
    ) -> Result<CommitReceipt, CommitError> {
        let reservation = self.reserve(identity_id, date)?;

        let event = AttendanceEvent {
            identity_id: identity_id.to_string(),
            date,
            timestamp: Local::now(),
            confidence,
            status: AttendanceStatus::Present,
            context: context.clone(),
            source: EVENT_SOURCE.to_string(),
        };

        match self.ledger.record(&event) {
            Ok(receipt) => {
                reservation.complete();
                tracing::info!(
                    identity = identity_id,
                    %date,
                    confidence,
                    session = ?context.session_id,
                    "attendance committed"
                );
                Ok(CommitReceipt {
                    identity_id: event.identity_id,
                    date,
                    confidence,
                    marked_at: receipt.marked_at,
                    message: receipt.message,
                })
            }
            Err(e) => {
                tracing::warn!(
                    identity = identity_id,
                    %date,
                    error = %e,
                    "attendance commit failed; dedup key released"
                );
                Err(e.into())
            }
        }
    }

    /// Whether a commit for the key has succeeded in this process.
    pub fn is_committed(&self, identity_id: &str, date: NaiveDate) -> bool {
        self.lock().get(&(identity_id.to_string(), date)) == Some(&KeyState::Committed)
    }

    pub fn committed_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| **s == KeyState::Committed)
            .count()
    }

    /// Forget committed keys for days before `date`.
    pub fn prune_before(&self, date: NaiveDate) -> usize {
        let mut keys = self.lock();
        let before = keys.len();
        keys.retain(|(_, d), state| *d >= date || *state == KeyState::InFlight);
        before - keys.len()
    }

    fn reserve(&self, identity_id: &str, date: NaiveDate) -> Result<Reservation<'_>, CommitError> {
        let key = (identity_id.to_string(), date);
        let mut keys = self.lock();
        match keys.get(&key) {
            Some(KeyState::Committed) => {
                tracing::debug!(identity = identity_id, %date, "commit skipped: already committed today");
                return Err(CommitError::AlreadyCommitted {
                    identity_id: identity_id.to_string(),
                    date,
                });
            }
            Some(KeyState::InFlight) => {
                tracing::debug!(identity = identity_id, %date, "commit skipped: another commit in progress");
                return Err(CommitError::InFlight {
                    identity_id: identity_id.to_string(),
                    date,
                });
            }
            None => {}
        }
        keys.insert(key.clone(), KeyState::InFlight);
        Ok(Reservation {
            committer: self,
            key: Some(key),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DedupKey, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-flight dedup key. Dropped without `complete()` it is released.
struct Reservation<'a> {
    committer: &'a AttendanceCommitter,
    key: Option<DedupKey>,
}

impl Reservation<'_> {
    fn complete(mut self) {
        if let Some(key) = self.key.take() {
            self.committer.lock().insert(key, KeyState::Committed);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.committer.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerReceipt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    /// Counts calls and answers with a scripted outcome.
    struct MockLedger {
        calls: AtomicUsize,
        outcome: Mutex<Result<(), LedgerError>>,
        delay: Duration,
    }

    impl MockLedger {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: Mutex::new(Ok(())),
                delay: Duration::ZERO,
            }
        }

        fn set_outcome(&self, outcome: Result<(), LedgerError>) {
            *self.outcome.lock().unwrap() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Ledger for MockLedger {
        fn record(&self, event: &AttendanceEvent) -> Result<LedgerReceipt, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.outcome.lock().unwrap().clone()?;
            Ok(LedgerReceipt {
                marked_at: event.timestamp.with_timezone(&Utc),
                message: Some("ok".into()),
            })
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_second_commit_fails_locally() {
        let ledger = Arc::new(MockLedger::ok());
        let committer = AttendanceCommitter::new(ledger.clone());
        let ctx = CommitContext::default();

        let receipt = committer.commit("S1", day(), 0.8, &ctx).unwrap();
        assert_eq!(receipt.identity_id, "S1");
        assert_eq!(receipt.message.as_deref(), Some("ok"));
        assert_eq!(ledger.calls(), 1);

        let err = committer.commit("S1", day(), 0.9, &ctx).unwrap_err();
        assert_eq!(
            err,
            CommitError::AlreadyCommitted { identity_id: "S1".into(), date: day() }
        );
        assert!(!err.is_retryable());
        assert_eq!(ledger.calls(), 1);
    }

    #[test]
    fn test_dedup_is_per_day_not_per_session() {
        let ledger = Arc::new(MockLedger::ok());
        let committer = AttendanceCommitter::new(ledger.clone());
        let first = CommitContext { session_id: Some("A".into()), ..Default::default() };
        let second = CommitContext { session_id: Some("B".into()), ..Default::default() };

        committer.commit("S1", day(), 0.8, &first).unwrap();
        assert!(committer.commit("S1", day(), 0.8, &second).is_err());
        committer.commit("S1", day().succ_opt().unwrap(), 0.8, &second).unwrap();
        assert_eq!(ledger.calls(), 2);
    }

    #[test]
    fn test_unavailable_ledger_releases_key() {
        let ledger = Arc::new(MockLedger::ok());
        ledger.set_outcome(Err(LedgerError::Unavailable("connection refused".into())));
        let committer = AttendanceCommitter::new(ledger.clone());
        let ctx = CommitContext::default();

        let err = committer.commit("S1", day(), 0.8, &ctx).unwrap_err();
        assert!(err.is_retryable());
        assert!(!committer.is_committed("S1", day()));

        ledger.set_outcome(Ok(()));
        committer.commit("S1", day(), 0.8, &ctx).unwrap();
        assert!(committer.is_committed("S1", day()));
        assert_eq!(ledger.calls(), 2);
    }

    #[test]
    fn test_rejection_is_not_retryable() {
        let ledger = Arc::new(MockLedger::ok());
        ledger.set_outcome(Err(LedgerError::Rejected {
            status: Some(403),
            reason: "student_not_enrolled".into(),
        }));
        let committer = AttendanceCommitter::new(ledger);

        let err = committer.commit("S1", day(), 0.8, &CommitContext::default()).unwrap_err();
        assert_eq!(
            err,
            CommitError::LedgerRejected { status: Some(403), reason: "student_not_enrolled".into() }
        );
        assert!(!err.is_retryable());
        assert!(!committer.is_committed("S1", day()));
    }

    #[test]
    fn test_concurrent_commits_reach_ledger_once() {
        let ledger = Arc::new(MockLedger {
            delay: Duration::from_millis(50),
            ..MockLedger::ok()
        });
        let committer = Arc::new(AttendanceCommitter::new(ledger.clone()));
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let committer = Arc::clone(&committer);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    committer.commit("S1", day(), 0.8, &CommitContext::default()).is_ok()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(ledger.calls(), 1);
        assert_eq!(committer.committed_count(), 1);
    }

    #[test]
    fn test_in_flight_key_is_not_reported_as_committed() {
        let ledger = Arc::new(MockLedger {
            delay: Duration::from_millis(200),
            ..MockLedger::ok()
        });
        ledger.set_outcome(Err(LedgerError::Unavailable("timeout".into())));
        let committer = Arc::new(AttendanceCommitter::new(ledger.clone()));

        let first = {
            let committer = Arc::clone(&committer);
            std::thread::spawn(move || committer.commit("S1", day(), 0.8, &CommitContext::default()))
        };
        std::thread::sleep(Duration::from_millis(50));
        let second = committer.commit("S1", day(), 0.8, &CommitContext::default()).unwrap_err();
        assert_eq!(second, CommitError::InFlight { identity_id: "S1".into(), date: day() });
        assert!(second.is_retryable());

        assert!(first.join().unwrap().is_err());
        assert!(!committer.is_committed("S1", day()));
        assert_eq!(ledger.calls(), 1);
    }

    #[test]
    fn test_prune_before_drops_old_days() {
        let ledger = Arc::new(MockLedger::ok());
        let committer = AttendanceCommitter::new(ledger);
        let yesterday = day().pred_opt().unwrap();
        committer.commit("S1", yesterday, 0.8, &CommitContext::default()).unwrap();
        committer.commit("S1", day(), 0.8, &CommitContext::default()).unwrap();

        assert_eq!(committer.prune_before(day()), 1);
        assert!(!committer.is_committed("S1", yesterday));
        assert!(committer.is_committed("S1", day()));
    }
}
