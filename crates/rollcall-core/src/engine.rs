//! The attendance engine: one owned instance of every component, and the
//! operations the daemon exposes.
//!
//! All methods are synchronous and may block (ledger I/O, classifier
//! training). Async callers run them on a blocking pool.

use crate::committer::{AttendanceCommitter, CommitError, CommitReceipt};
use crate::fallback::{FallbackError, FallbackMatcher, FallbackPolicy, FallbackStrategy};
use crate::ledger::{CommitContext, Ledger, LedgerError};
use crate::matcher::{SimilarityMatcher, DEFAULT_SIMILARITY_THRESHOLD};
use crate::presence::{PresenceBuffer, PresenceState, DEFAULT_PRESENCE_FRAMES};
use crate::session::{SessionContext, SessionError, SessionRegistry};
use crate::store::{
    EmbeddingStore, EnrollmentError, EnrollmentSample, IdentityInfo, StoreError,
    DEFAULT_QUALITY_THRESHOLD,
};
use crate::types::{best_detection, Detection, FaceCrop, MatchError, MatchResult, MatchStrategy};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("enrollment failed: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("fallback enrollment failed: {0}")]
    Fallback(#[from] FallbackError),
    #[error("matching failed: {0}")]
    Match(#[from] MatchError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no face detected in any submitted frame")]
    NoFaceDetected,
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl EngineError {
    /// True when the failure was caused by the caller's input rather than the engine.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::Enrollment(
                EnrollmentError::NoValidSamples { .. }
                    | EnrollmentError::DimensionMismatch { .. }
                    | EnrollmentError::DegenerateReference
                    | EnrollmentError::AliasConflict { .. }
            ) | EngineError::Fallback(_)
                | EngineError::Match(_)
                | EngineError::Session(_)
                | EngineError::NoFaceDetected
                | EngineError::InvalidSettings(_)
        )
    }
}

/// Runtime-adjustable recognition settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub similarity_threshold: f32,
    pub presence_frames: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            presence_frames: DEFAULT_PRESENCE_FRAMES,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EngineError::InvalidSettings(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.presence_frames == 0 {
            return Err(EngineError::InvalidSettings(
                "presence_frames must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Construction-time options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub settings: Settings,
    pub quality_threshold: f32,
    pub fallback_policy: FallbackPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            fallback_policy: FallbackPolicy::default(),
        }
    }
}

/// Anti-spoofing hook applied to every detection before matching.
///
/// This is an extension point only. No heuristic ships with the engine:
/// detections carry no facial landmarks, so landmark-based checks such as
/// eye-aspect-ratio blink detection belong with the external detector that
/// has them. The default is [`AlwaysLive`].
pub trait LivenessCheck: Send + Sync {
    fn is_live(&self, detection: &Detection) -> bool;
}

/// Accepts every detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLive;

impl LivenessCheck for AlwaysLive {
    fn is_live(&self, _detection: &Detection) -> bool {
        true
    }
}

/// Outcome of an enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub identity_id: String,
    /// Samples kept across the embedding store and the crop gallery.
    pub accepted_count: usize,
}

/// What happened to the attendance commit triggered by a recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttendanceOutcome {
    Committed(CommitReceipt),
    /// Already committed today, possibly from another session.
    AlreadyCommitted { date: NaiveDate },
    Failed {
        retryable: bool,
        /// Ledger status code of a rejection.
        status: Option<u16>,
        reason: String,
    },
}

impl AttendanceOutcome {
    pub fn from_commit(result: Result<CommitReceipt, CommitError>) -> Self {
        match result {
            Ok(receipt) => AttendanceOutcome::Committed(receipt),
            Err(CommitError::AlreadyCommitted { date, .. }) => AttendanceOutcome::AlreadyCommitted { date },
            Err(e) => AttendanceOutcome::Failed {
                retryable: e.is_retryable(),
                status: match &e {
                    CommitError::LedgerRejected { status, .. } => *status,
                    _ => None,
                },
                reason: e.to_string(),
            },
        }
    }

    /// True once the identity's attendance for the day is durably recorded.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            AttendanceOutcome::Committed(_) | AttendanceOutcome::AlreadyCommitted { .. }
        )
    }
}

/// Reply to a recognition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub result: MatchResult,
    /// Strategy confidence before flooring, for fallback matches.
    pub raw_confidence: Option<f32>,
    /// Faces that passed the liveness hook.
    pub faces_detected: usize,
    pub presence: Option<PresenceState>,
    pub already_confirmed: bool,
    pub attendance: Option<AttendanceOutcome>,
}

impl Recognition {
    fn negative(strategy: MatchStrategy, faces_detected: usize) -> Self {
        Self {
            result: MatchResult::no_match(0.0, strategy),
            raw_confidence: None,
            faces_detected,
            presence: None,
            already_confirmed: false,
            attendance: None,
        }
    }
}

/// One enrolled identity as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: String,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub sample_count: usize,
    pub crop_count: usize,
    pub enrolled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub identities: usize,
    pub fallback_identities: usize,
    pub embedding_dim: Option<usize>,
    pub store_generation: u64,
    pub active_sessions: usize,
    pub committed_keys: usize,
    pub settings: Settings,
    pub fallback_strategies: Vec<FallbackStrategy>,
}

/// Owns the store, gallery, presence windows, sessions and committer.
pub struct AttendanceEngine {
    store: EmbeddingStore,
    fallback: FallbackMatcher,
    presence: PresenceBuffer,
    sessions: SessionRegistry,
    committer: AttendanceCommitter,
    settings: RwLock<Settings>,
    liveness: Box<dyn LivenessCheck>,
}

impl AttendanceEngine {
    pub fn new(
        store: EmbeddingStore,
        ledger: Arc<dyn Ledger>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        options.settings.validate()?;
        Ok(Self {
            store,
            fallback: FallbackMatcher::new(options.fallback_policy, options.quality_threshold),
            presence: PresenceBuffer::new(options.settings.presence_frames),
            sessions: SessionRegistry::new(),
            committer: AttendanceCommitter::new(ledger),
            settings: RwLock::new(options.settings),
            liveness: Box::new(AlwaysLive),
        })
    }

    pub fn with_liveness(mut self, liveness: impl LivenessCheck + 'static) -> Self {
        self.liveness = Box::new(liveness);
        self
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn committer(&self) -> &AttendanceCommitter {
        &self.committer
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Enroll from per-frame detections, using the best-scoring face of each frame.
    ///
    /// Embeddings go to the store and crops to the fallback gallery. Each
    /// replaces what was previously enrolled for the identity.
    pub fn enroll(
        &self,
        info: IdentityInfo,
        frames: &[Vec<Detection>],
    ) -> Result<EnrollOutcome, EngineError> {
        let mut samples = Vec::new();
        let mut crops: Vec<(FaceCrop, f32)> = Vec::new();
        for best in frames.iter().filter_map(|f| best_detection(f)) {
            match (best.embedding(), best.crop()) {
                (Some(e), _) => samples.push(EnrollmentSample {
                    embedding: e.clone(),
                    detection_score: best.detection_score,
                }),
                (None, Some(c)) => crops.push((c.clone(), best.detection_score)),
                (None, None) => {}
            }
        }
        if samples.is_empty() && crops.is_empty() {
            return Err(EngineError::NoFaceDetected);
        }

        // Validate crops before anything is written.
        let prepared = if crops.is_empty() {
            None
        } else {
            Some(self.fallback.prepare(&crops)?)
        };

        let identity_id = info.id.clone();
        let mut accepted_count = 0;
        if !samples.is_empty() {
            accepted_count += self.store.enroll_identity(info, &samples)?.sample_count;
        }
        if let Some(prepared) = prepared {
            accepted_count += self.fallback.insert(&identity_id, prepared);
        }
        self.presence.clear(&identity_id);

        tracing::info!(
            identity = %identity_id,
            frames = frames.len(),
            embeddings = samples.len(),
            crops = crops.len(),
            accepted = accepted_count,
            "enrollment complete"
        );
        Ok(EnrollOutcome {
            identity_id,
            accepted_count,
        })
    }

    /// Match a probe and, once presence is confirmed in an active session, commit attendance.
    pub fn recognize(
        &self,
        probe: &[Detection],
        session_id: Option<&str>,
        expected_identity: Option<&str>,
    ) -> Result<Recognition, EngineError> {
        let faces: Vec<Detection> = probe
            .iter()
            .filter(|d| self.liveness.is_live(d))
            .cloned()
            .collect();
        if faces.len() < probe.len() {
            tracing::warn!(
                rejected = probe.len() - faces.len(),
                "detections rejected by liveness check"
            );
        }

        if let Some(sid) = session_id {
            if !self.sessions.is_active(sid) {
                tracing::debug!(session = sid, "recognition against unknown or closed session");
                return Ok(Recognition::negative(MatchStrategy::Embedding, faces.len()));
            }
        }

        let embeddings: Vec<&Detection> = faces.iter().filter(|d| d.embedding().is_some()).collect();
        let (result, raw_confidence) = if !embeddings.is_empty() {
            (self.match_embeddings(&embeddings)?, None)
        } else if faces.iter().any(|d| d.crop().is_some()) {
            let Some(expected) = expected_identity else {
                tracing::debug!("crop-only probe without an expected identity");
                return Ok(Recognition::negative(MatchStrategy::Classifier, faces.len()));
            };
            let expected = self.store.resolve(expected).unwrap_or_else(|| expected.to_string());
            let outcome = self.fallback.match_probe(&faces, &expected);
            (outcome.result, Some(outcome.raw_confidence))
        } else {
            return Ok(Recognition::negative(MatchStrategy::Embedding, faces.len()));
        };

        let mut recognition = Recognition {
            result,
            raw_confidence,
            faces_detected: faces.len(),
            presence: None,
            already_confirmed: false,
            attendance: None,
        };
        let Some(identity_id) = recognition.result.identity_id.clone() else {
            return Ok(recognition);
        };

        let presence = self
            .presence
            .observe_state(&identity_id, recognition.result.confidence);
        recognition.presence = Some(presence);

        let Some(sid) = session_id else {
            return Ok(recognition);
        };
        recognition.already_confirmed = self.sessions.is_confirmed(sid, &identity_id);
        if recognition.already_confirmed {
            return Ok(recognition);
        }
        if let Some(mean) = presence.mean_confidence {
            recognition.attendance = Some(self.commit_for_session(&identity_id, mean, sid));
        }
        Ok(recognition)
    }

    /// Best match across all embedding faces. A matched face beats any non-match.
    fn match_embeddings(&self, faces: &[&Detection]) -> Result<MatchResult, EngineError> {
        let matcher = SimilarityMatcher::new(self.settings().similarity_threshold);
        let gallery = self.store.snapshot();
        let mut best: Option<MatchResult> = None;
        let mut degenerate = 0;

        for embedding in faces.iter().filter_map(|d| d.embedding()) {
            let candidate = match matcher.match_embedding(embedding, &gallery) {
                Ok(r) => r,
                Err(MatchError::DegenerateVector) => {
                    degenerate += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let better = match &best {
                None => true,
                Some(b) => (candidate.is_match(), candidate.confidence) > (b.is_match(), b.confidence),
            };
            if better {
                best = Some(candidate);
            }
        }

        if degenerate > 0 {
            tracing::warn!(degenerate, faces = faces.len(), "skipped zero-norm probe embeddings");
        }
        best.ok_or(EngineError::Match(MatchError::DegenerateVector))
    }

    fn commit_for_session(&self, identity_id: &str, confidence: f32, session_id: &str) -> AttendanceOutcome {
        let context = self.commit_context(Some(session_id));
        let outcome = AttendanceOutcome::from_commit(self.commit_today(identity_id, confidence, &context));
        if outcome.is_settled() {
            self.sessions.confirm(session_id, identity_id);
        }
        outcome
    }

    fn commit_today(
        &self,
        identity_id: &str,
        confidence: f32,
        context: &CommitContext,
    ) -> Result<CommitReceipt, CommitError> {
        let today = Local::now().date_naive();
        let pruned = self.committer.prune_before(today);
        if pruned > 0 {
            tracing::debug!(pruned, %today, "dropped dedup keys from previous days");
        }
        self.committer.commit(identity_id, today, confidence, context)
    }

    fn commit_context(&self, session_id: Option<&str>) -> CommitContext {
        let session = session_id
            .and_then(|sid| self.sessions.get(sid))
            .map(|s| s.context)
            .unwrap_or_default();
        CommitContext {
            session_id: session_id.map(str::to_string),
            session,
        }
    }

    /// Open a session. Returns false if the id is already taken.
    pub fn start_session(&self, session_id: &str, context: SessionContext) -> bool {
        match self.sessions.create(session_id, context) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "session not started");
                false
            }
        }
    }

    /// Close a session. Returns whether it was active.
    pub fn close_session(&self, session_id: &str) -> bool {
        let was_active = self.sessions.is_active(session_id);
        self.sessions.close(session_id);
        was_active
    }

    /// Commit attendance directly, bypassing matching and presence.
    pub fn commit_attendance(
        &self,
        identity_id: &str,
        confidence: f32,
        session_id: Option<&str>,
    ) -> Result<CommitReceipt, EngineError> {
        let identity_id = self
            .store
            .resolve(identity_id)
            .unwrap_or_else(|| identity_id.to_string());
        let context = self.commit_context(session_id);
        let result = self.commit_today(&identity_id, confidence, &context);

        if let Some(sid) = session_id {
            if matches!(result, Ok(_) | Err(CommitError::AlreadyCommitted { .. })) {
                self.sessions.confirm(sid, &identity_id);
            }
        }
        Ok(result?)
    }

    /// Remove an identity from the store and the crop gallery.
    pub fn remove_identity(&self, key: &str) -> Result<bool, EngineError> {
        let identity_id = self.store.resolve(key).unwrap_or_else(|| key.to_string());
        let from_store = self.store.remove(&identity_id)?;
        let from_gallery = self.fallback.remove(&identity_id);
        self.presence.clear(&identity_id);
        Ok(from_store || from_gallery)
    }

    /// Enrolled identities: store records first, then crop-only identities.
    pub fn identities(&self) -> Vec<IdentitySummary> {
        let mut out: Vec<IdentitySummary> = self
            .store
            .snapshot()
            .iter()
            .map(|r| IdentitySummary {
                id: r.id.clone(),
                display_name: r.display_name.clone(),
                aliases: r.aliases.clone(),
                sample_count: r.sample_count,
                crop_count: self.fallback.crop_count(&r.id),
                enrolled_at: Some(r.enrolled_at),
            })
            .collect();

        for id in self.fallback.identities() {
            if out.iter().all(|s| s.id != id) {
                out.push(IdentitySummary {
                    display_name: id.clone(),
                    aliases: Vec::new(),
                    sample_count: 0,
                    crop_count: self.fallback.crop_count(&id),
                    enrolled_at: None,
                    id,
                });
            }
        }
        out
    }

    pub fn settings(&self) -> Settings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_settings(&self, settings: Settings) -> Result<Settings, EngineError> {
        settings.validate()?;
        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        if current.presence_frames != settings.presence_frames {
            self.presence.set_capacity(settings.presence_frames);
        }
        *current = settings;
        tracing::info!(
            similarity_threshold = settings.similarity_threshold,
            presence_frames = settings.presence_frames,
            "settings updated"
        );
        Ok(settings)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            identities: self.store.len(),
            fallback_identities: self.fallback.identities().len(),
            embedding_dim: self.store.dimension(),
            store_generation: self.store.generation(),
            active_sessions: self.sessions.active_count(),
            committed_keys: self.committer.committed_count(),
            settings: self.settings(),
            fallback_strategies: self.fallback.policy().strategies.clone(),
        }
    }

    /// Reachability of the configured ledger.
    pub fn test_ledger(&self) -> Result<(), LedgerError> {
        self.committer.ledger().health()
    }
}
