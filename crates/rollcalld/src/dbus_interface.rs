use rollcall_core::engine::{AttendanceEngine, AttendanceOutcome, EngineError, Settings};
use rollcall_core::{CommitReceipt, Detection, IdentityInfo, SessionContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "io.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/io/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: io.rollcall.Attendance1
/// Object path: /io/rollcall/Attendance1
///
/// Structured arguments and replies are JSON strings. Empty strings stand in
/// for absent optional arguments.
pub struct AttendanceService {
    engine: Arc<AttendanceEngine>,
    ledger: String,
}

impl AttendanceService {
    /// `ledger` is a human-readable description of the configured ledger, shown in `Status`.
    pub fn new(engine: Arc<AttendanceEngine>, ledger: String) -> Self {
        Self { engine, ledger }
    }

    /// Run `f` on the blocking pool. Engine calls may block on ledger I/O or training.
    async fn blocking<T, F>(&self, f: F) -> fdo::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AttendanceEngine) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| fdo::Error::Failed(format!("engine task failed: {e}")))?
            .map_err(to_fdo)
    }
}

/// Enrollment frames, optionally with aliases.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum EnrollPayload {
    Frames(Vec<Vec<Detection>>),
    Tagged {
        frames: Vec<Vec<Detection>>,
        #[serde(default)]
        aliases: Vec<String>,
    },
}

impl EnrollPayload {
    fn into_parts(self) -> (Vec<Vec<Detection>>, Vec<String>) {
        match self {
            EnrollPayload::Frames(frames) => (frames, Vec::new()),
            EnrollPayload::Tagged { frames, aliases } => (frames, aliases),
        }
    }
}

#[interface(name = "io.rollcall.Attendance1")]
impl AttendanceService {
    /// Enroll an identity from per-frame detections.
    async fn enroll(&self, identity_id: &str, name: &str, frames_json: &str) -> fdo::Result<String> {
        let identity_id = required("identity_id", identity_id)?;
        let payload: EnrollPayload = parse_json("frames_json", frames_json)?;
        let (frames, aliases) = payload.into_parts();
        tracing::info!(identity = %identity_id, frames = frames.len(), "enroll requested");

        let info = IdentityInfo {
            id: identity_id,
            display_name: optional(name).map(str::to_string),
            aliases,
        };
        let outcome = self.blocking(move |engine| engine.enroll(info, &frames)).await?;
        to_json(&outcome)
    }

    /// Match a probe; commits attendance once presence is confirmed in the session.
    async fn recognize(
        &self,
        probe_json: &str,
        session_id: &str,
        expected_identity: &str,
    ) -> fdo::Result<String> {
        let probe: Vec<Detection> = parse_json("probe_json", probe_json)?;
        let session_id = optional(session_id).map(str::to_string);
        let expected = optional(expected_identity).map(str::to_string);
        tracing::debug!(faces = probe.len(), session = ?session_id, "recognize requested");

        let recognition = self
            .blocking(move |engine| {
                engine.recognize(&probe, session_id.as_deref(), expected.as_deref())
            })
            .await?;
        to_json(&recognition)
    }

    /// Open a session. False when the id is already in use.
    async fn start_session(
        &self,
        session_id: &str,
        course_id: &str,
        department: &str,
        year: &str,
    ) -> fdo::Result<bool> {
        let session_id = required("session_id", session_id)?;
        let context = SessionContext {
            course_id: course_id.to_string(),
            department: department.to_string(),
            year: year.to_string(),
        };
        Ok(self.engine.start_session(&session_id, context))
    }

    async fn close_session(&self, session_id: &str) -> fdo::Result<bool> {
        Ok(self.engine.close_session(session_id))
    }

    /// Commit attendance directly, without matching.
    ///
    /// Ledger outcomes are part of the reply (`{"outcome": "failed", "retryable": ..}`);
    /// only bad arguments fail the call.
    async fn commit_attendance(
        &self,
        identity_id: &str,
        confidence: f64,
        session_id: &str,
    ) -> fdo::Result<String> {
        let identity_id = required("identity_id", identity_id)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(fdo::Error::InvalidArgs(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        let session_id = optional(session_id).map(str::to_string);
        tracing::info!(identity = %identity_id, confidence, session = ?session_id, "manual commit requested");

        let result = self
            .blocking(move |engine| {
                Ok(engine.commit_attendance(&identity_id, confidence as f32, session_id.as_deref()))
            })
            .await?;
        to_json(&commit_reply(result)?)
    }

    async fn list_identities(&self) -> fdo::Result<String> {
        to_json(&self.engine.identities())
    }

    async fn remove_identity(&self, identity_id: &str) -> fdo::Result<bool> {
        let identity_id = required("identity_id", identity_id)?;
        tracing::info!(identity = %identity_id, "remove requested");
        self.blocking(move |engine| engine.remove_identity(&identity_id)).await
    }

    async fn settings(&self) -> fdo::Result<String> {
        to_json(&self.engine.settings())
    }

    async fn update_settings(&self, threshold: f64, presence_frames: u32) -> fdo::Result<String> {
        let settings = Settings {
            similarity_threshold: threshold as f32,
            presence_frames: presence_frames as usize,
        };
        let updated = self.engine.update_settings(settings).map_err(to_fdo)?;
        to_json(&updated)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let status = self.engine.status();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "ledger": self.ledger,
            "engine": status,
        })
        .to_string())
    }

    /// Probe the ledger. Replies `{"ok": bool, "error": string|null}`.
    async fn test_ledger(&self) -> fdo::Result<String> {
        let engine = Arc::clone(&self.engine);
        let health = tokio::task::spawn_blocking(move || engine.test_ledger())
            .await
            .map_err(|e| fdo::Error::Failed(format!("ledger probe failed: {e}")))?;
        if let Err(e) = &health {
            tracing::warn!(error = %e, "ledger health check failed");
        }
        Ok(serde_json::json!({
            "ok": health.is_ok(),
            "ledger": self.ledger,
            "error": health.err().map(|e| e.to_string()),
        })
        .to_string())
    }
}

fn commit_reply(
    result: Result<CommitReceipt, EngineError>,
) -> fdo::Result<AttendanceOutcome> {
    match result {
        Ok(receipt) => Ok(AttendanceOutcome::Committed(receipt)),
        Err(EngineError::Commit(e)) => Ok(AttendanceOutcome::from_commit(Err(e))),
        Err(e) => Err(to_fdo(e)),
    }
}

fn to_fdo(e: EngineError) -> fdo::Error {
    if e.is_invalid_input() {
        fdo::Error::InvalidArgs(e.to_string())
    } else {
        fdo::Error::Failed(e.to_string())
    }
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("encoding reply: {e}")))
}

fn parse_json<T: for<'de> Deserialize<'de>>(arg: &str, raw: &str) -> fdo::Result<T> {
    serde_json::from_str(raw).map_err(|e| fdo::Error::InvalidArgs(format!("{arg}: {e}")))
}

fn optional(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn required(arg: &str, value: &str) -> fdo::Result<String> {
    optional(value)
        .map(str::to_string)
        .ok_or_else(|| fdo::Error::InvalidArgs(format!("{arg} must not be empty")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{CommitError, FaceData};

    #[test]
    fn test_enroll_payload_forms() {
        let bare = r#"[[{"face":{"embedding":[1.0,0.0]},"detection_score":0.9}]]"#;
        let (frames, aliases) = parse_json::<EnrollPayload>("f", bare).unwrap().into_parts();
        assert_eq!(frames.len(), 1);
        assert!(aliases.is_empty());
        assert!(matches!(frames[0][0].face, FaceData::Embedding(_)));

        let tagged = r#"{"frames":[[{"face":{"crop":{"width":1,"height":1,"pixels":[7]}},"detection_score":0.8}]],"aliases":["21CS001"]}"#;
        let (frames, aliases) = parse_json::<EnrollPayload>("f", tagged).unwrap().into_parts();
        assert_eq!(aliases, vec!["21CS001"]);
        assert!(frames[0][0].crop().is_some());
    }

    #[test]
    fn test_bad_json_is_invalid_args() {
        let err = parse_json::<Vec<Detection>>("probe_json", "{not json").unwrap_err();
        assert!(matches!(err, fdo::Error::InvalidArgs(_)));
    }

    #[test]
    fn test_optional_and_required_arguments() {
        assert_eq!(optional("  "), None);
        assert_eq!(optional(" SESS1 "), Some("SESS1"));
        assert!(matches!(required("session_id", ""), Err(fdo::Error::InvalidArgs(_))));
        assert_eq!(required("session_id", "SESS1").unwrap(), "SESS1");
    }

    #[test]
    fn test_commit_reply_carries_retryability() {
        let unavailable = EngineError::Commit(CommitError::LedgerUnavailable("timeout".into()));
        let reply = serde_json::to_value(commit_reply(Err(unavailable)).unwrap()).unwrap();
        assert_eq!(reply["outcome"], "failed");
        assert_eq!(reply["retryable"], true);

        let rejected = EngineError::Commit(CommitError::LedgerRejected {
            status: Some(403),
            reason: "student_not_enrolled".into(),
        });
        let reply = serde_json::to_value(commit_reply(Err(rejected)).unwrap()).unwrap();
        assert_eq!(reply["retryable"], false);
        assert_eq!(reply["status"], 403);

        let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let done = EngineError::Commit(CommitError::AlreadyCommitted { identity_id: "S1".into(), date });
        let reply = serde_json::to_value(commit_reply(Err(done)).unwrap()).unwrap();
        assert_eq!(reply["outcome"], "already_committed");

        assert!(matches!(
            commit_reply(Err(EngineError::NoFaceDetected)),
            Err(fdo::Error::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(to_fdo(EngineError::NoFaceDetected), fdo::Error::InvalidArgs(_)));
        let unavailable = EngineError::Commit(CommitError::LedgerUnavailable("timeout".into()));
        assert!(matches!(to_fdo(unavailable), fdo::Error::Failed(_)));
    }
}
