//! Enrolled-identity reference set, persisted as one JSON document.
//!
//! The whole file is rewritten on every mutation (temp file + rename); there
//! is no incremental format. Readers work on an `Arc` snapshot so they never
//! observe a half-applied enrollment and never wait on disk I/O.

use crate::types::Embedding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Detection score a sample must exceed to be kept at enrollment.
pub const DEFAULT_QUALITY_THRESHOLD: f32 = 0.5;

const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("unsupported store format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("no valid samples: none of {submitted} samples scored above {threshold}")]
    NoValidSamples { submitted: usize, threshold: f32 },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("samples average to a zero-norm reference embedding")]
    DegenerateReference,
    #[error("alias {alias:?} already belongs to identity {owner:?}")]
    AliasConflict { alias: String, owner: String },
    #[error("failed to persist enrollment: {0}")]
    PersistFailed(#[source] StoreError),
}

/// One enrollment sample: an embedding and the detector's score for that face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSample {
    pub embedding: Embedding,
    pub detection_score: f32,
}

/// Caller-supplied identity metadata for an enrollment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityInfo {
    pub id: String,
    pub display_name: Option<String>,
    /// Secondary identifiers (e.g. roll numbers) that resolve to `id`.
    pub aliases: Vec<String>,
}

impl IdentityInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A stored identity with its reference embedding and the samples it was averaged from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub display_name: String,
    /// Element-wise mean of `sample_embeddings`.
    pub reference_embedding: Embedding,
    pub sample_embeddings: Vec<Embedding>,
    pub sample_count: usize,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub enrolled_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn dim(&self) -> usize {
        self.reference_embedding.dim()
    }

    fn answers_to(&self, key: &str) -> bool {
        self.id == key || self.aliases.iter().any(|a| a == key)
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    identities: Vec<IdentityRecord>,
}

/// Persistent identity → reference embedding store.
pub struct EmbeddingStore {
    path: Option<PathBuf>,
    quality_threshold: f32,
    records: RwLock<Arc<Vec<IdentityRecord>>>,
    /// Serializes enroll/remove so each write sees the previous one.
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl EmbeddingStore {
    /// Open the store at `path`, loading it wholesale. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, quality_threshold: f32) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let records = if path.exists() {
            load_records(&path)?
        } else {
            tracing::info!(path = %path.display(), "no embedding store yet; starting empty");
            Vec::new()
        };

        tracing::info!(
            path = %path.display(),
            identities = records.len(),
            "embedding store loaded"
        );

        Ok(Self {
            path: Some(path),
            quality_threshold,
            records: RwLock::new(Arc::new(records)),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(quality_threshold: f32) -> Self {
        Self {
            path: None,
            quality_threshold,
            records: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn quality_threshold(&self) -> f32 {
        self.quality_threshold
    }

    /// Bumped after every successful enroll or remove.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Enroll `identity_id` from `samples`, replacing any previous record.
    pub fn enroll(
        &self,
        identity_id: &str,
        samples: &[EnrollmentSample],
    ) -> Result<IdentityRecord, EnrollmentError> {
        self.enroll_identity(IdentityInfo::new(identity_id), samples)
    }

    /// Enroll with a display name and aliases.
    ///
    /// Samples at or below the quality threshold (or with a zero-norm embedding)
    /// are dropped. The record is swapped in only after the file is rewritten.
    pub fn enroll_identity(
        &self,
        info: IdentityInfo,
        samples: &[EnrollmentSample],
    ) -> Result<IdentityRecord, EnrollmentError> {
        let kept: Vec<Embedding> = samples
            .iter()
            .filter(|s| s.detection_score > self.quality_threshold && s.embedding.norm() > 0.0)
            .map(|s| s.embedding.clone())
            .collect();

        tracing::debug!(
            identity = %info.id,
            submitted = samples.len(),
            kept = kept.len(),
            threshold = self.quality_threshold,
            "filtered enrollment samples"
        );

        let Some(first) = kept.first() else {
            return Err(EnrollmentError::NoValidSamples {
                submitted: samples.len(),
                threshold: self.quality_threshold,
            });
        };
        let dim = first.dim();
        if let Some(bad) = kept.iter().find(|e| e.dim() != dim) {
            return Err(EnrollmentError::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();

        if let Some(other) = current.iter().find(|r| r.id != info.id) {
            if other.dim() != dim {
                return Err(EnrollmentError::DimensionMismatch {
                    expected: other.dim(),
                    actual: dim,
                });
            }
        }

        let mut aliases: Vec<String> = Vec::new();
        for alias in info.aliases {
            if alias == info.id || aliases.contains(&alias) {
                continue;
            }
            if let Some(owner) = current
                .iter()
                .find(|r| r.id != info.id && r.answers_to(&alias))
            {
                return Err(EnrollmentError::AliasConflict {
                    alias,
                    owner: owner.id.clone(),
                });
            }
            aliases.push(alias);
        }
        if let Some(owner) = current
            .iter()
            .find(|r| r.id != info.id && r.aliases.contains(&info.id))
        {
            return Err(EnrollmentError::AliasConflict {
                alias: info.id,
                owner: owner.id.clone(),
            });
        }

        let reference = Embedding::mean(&kept).ok_or(EnrollmentError::NoValidSamples {
            submitted: samples.len(),
            threshold: self.quality_threshold,
        })?;
        if reference.norm() == 0.0 {
            return Err(EnrollmentError::DegenerateReference);
        }

        let record = IdentityRecord {
            display_name: info.display_name.unwrap_or_else(|| info.id.clone()),
            id: info.id,
            reference_embedding: reference,
            sample_count: kept.len(),
            sample_embeddings: kept,
            aliases,
            enrolled_at: Utc::now(),
        };

        let mut next: Vec<IdentityRecord> = current.as_ref().clone();
        match next.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => next.push(record.clone()),
        }

        self.persist(&next).map_err(|e| {
            tracing::error!(identity = %record.id, error = %e, "enrollment not persisted; store unchanged");
            EnrollmentError::PersistFailed(e)
        })?;
        self.swap(next);

        tracing::info!(
            identity = %record.id,
            samples = record.sample_count,
            dim,
            "identity enrolled"
        );
        Ok(record)
    }

    /// Look up a record by id or alias.
    pub fn get(&self, key: &str) -> Option<IdentityRecord> {
        self.snapshot().iter().find(|r| r.answers_to(key)).cloned()
    }

    /// Canonical id for an id or alias.
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.snapshot()
            .iter()
            .find(|r| r.answers_to(key))
            .map(|r| r.id.clone())
    }

    /// All records in insertion order.
    pub fn all(&self) -> Vec<IdentityRecord> {
        self.snapshot().as_ref().clone()
    }

    /// Cheap shared view of the current records, in insertion order.
    pub fn snapshot(&self) -> Arc<Vec<IdentityRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Embedding dimension of the enrolled set, if any identity exists.
    pub fn dimension(&self) -> Option<usize> {
        self.snapshot().first().map(IdentityRecord::dim)
    }

    /// Remove an identity by id or alias. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let Some(pos) = current.iter().position(|r| r.answers_to(key)) else {
            return Ok(false);
        };

        let mut next = current.as_ref().clone();
        let removed = next.remove(pos);
        self.persist(&next)?;
        self.swap(next);

        tracing::info!(identity = %removed.id, "identity removed");
        Ok(true)
    }

    fn swap(&self, next: Vec<IdentityRecord>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn persist(&self, records: &[IdentityRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        #[derive(Serialize)]
        struct StoreFileRef<'a> {
            version: u32,
            identities: &'a [IdentityRecord],
        }

        let bytes = serde_json::to_vec(&StoreFileRef {
            version: STORE_FORMAT_VERSION,
            identities: records,
        })?;

        let tmp = tmp_path(path);
        let result = (|| -> Result<(), StoreError> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn load_records(path: &Path) -> Result<Vec<IdentityRecord>, StoreError> {
    let raw = std::fs::read(path)?;
    let file: StoreFile = serde_json::from_slice(&raw)?;
    if file.version != STORE_FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion(file.version));
    }

    let mut records = Vec::with_capacity(file.identities.len());
    for mut record in file.identities {
        // Re-derive the reference so a hand-edited file cannot break the mean invariant.
        let Some(mean) = Embedding::mean(&record.sample_embeddings).filter(|m| m.norm() > 0.0)
        else {
            tracing::warn!(identity = %record.id, "skipping stored identity without usable samples");
            continue;
        };
        record.reference_embedding = mean;
        record.sample_count = record.sample_embeddings.len();
        records.push(record);
    }
    Ok(records)
}
