//! Recognition sessions (one class period each) and their confirmed identities.
//!
//! One mutex covers the whole registry. Every operation is O(1) and sessions
//! are few compared to the request rate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0:?} already exists")]
    DuplicateSession(String),
}

/// What a session is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub course_id: String,
    pub department: String,
    pub year: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// Terminal. Confirmed identities stay queryable.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub context: SessionContext,
    pub created_at: DateTime<Utc>,
    pub confirmed_identities: HashSet<String>,
    pub state: SessionState,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// Thread-safe table of sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new active session. Re-creating an existing id is rejected.
    pub fn create(&self, session_id: &str, context: SessionContext) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        if sessions.contains_key(session_id) {
            return Err(SessionError::DuplicateSession(session_id.to_string()));
        }

        tracing::info!(
            session = session_id,
            course = %context.course_id,
            department = %context.department,
            year = %context.year,
            "session created"
        );
        sessions.insert(
            session_id.to_string(),
            Session {
                session_id: session_id.to_string(),
                context,
                created_at: Utc::now(),
                confirmed_identities: HashSet::new(),
                state: SessionState::Active,
            },
        );
        Ok(())
    }

    /// Whether `identity_id` was confirmed in the session. False for unknown sessions.
    pub fn is_confirmed(&self, session_id: &str, identity_id: &str) -> bool {
        self.lock()
            .get(session_id)
            .is_some_and(|s| s.confirmed_identities.contains(identity_id))
    }

    /// Mark `identity_id` confirmed. Returns true only for a new addition to an active session.
    pub fn confirm(&self, session_id: &str, identity_id: &str) -> bool {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if !session.is_active() {
            return false;
        }
        let added = session.confirmed_identities.insert(identity_id.to_string());
        if added {
            tracing::debug!(session = session_id, identity = identity_id, "identity confirmed in session");
        }
        added
    }

    /// Close a session. Idempotent; unknown ids are ignored.
    pub fn close(&self, session_id: &str) {
        if let Some(session) = self.lock().get_mut(session_id) {
            if session.is_active() {
                session.state = SessionState::Closed;
                tracing::info!(
                    session = session_id,
                    confirmed = session.confirmed_identities.len(),
                    "session closed"
                );
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.lock().get(session_id).cloned()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().get(session_id).is_some_and(Session::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.lock().values().filter(|s| s.is_active()).count()
    }

    /// Drop a session object entirely, history included.
    pub fn discard(&self, session_id: &str) -> Option<Session> {
        self.lock().remove(session_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
