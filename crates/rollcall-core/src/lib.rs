//! rollcall-core — attendance decisions from per-frame face detections.
//!
//! The face detector and the embedding network are external. This crate
//! takes their output (bounding boxes with an embedding or a grayscale crop)
//! and decides who is present: embedding similarity fusion, crop-based
//! fallback matching, multi-frame presence confirmation, per-session
//! bookkeeping and at-most-once-per-day ledger commits.

pub mod committer;
pub mod engine;
pub mod fallback;
pub mod ledger;
pub mod matcher;
pub mod presence;
pub mod session;
pub mod store;
pub mod types;

pub use committer::{AttendanceCommitter, CommitError, CommitReceipt};
pub use engine::{
    AttendanceEngine, AttendanceOutcome, EngineError, EngineOptions, EngineStatus, EnrollOutcome,
    IdentitySummary, LivenessCheck, Recognition, Settings,
};
pub use fallback::{FallbackMatcher, FallbackPolicy, FallbackStrategy};
pub use ledger::{AttendanceEvent, CommitContext, JournalLedger, Ledger, LedgerError, LedgerReceipt};
pub use matcher::SimilarityMatcher;
pub use presence::PresenceBuffer;
pub use session::{SessionContext, SessionRegistry};
pub use store::{EmbeddingStore, EnrollmentError, EnrollmentSample, IdentityInfo, IdentityRecord};
pub use types::{BoundingBox, Detection, Embedding, FaceCrop, FaceData, MatchResult, MatchStrategy};
