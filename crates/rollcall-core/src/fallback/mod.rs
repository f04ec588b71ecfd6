//! Fallback matching over raw face crops, for deployments without an
//! embedding model.
//!
//! Strategies run in the order listed by [`FallbackPolicy`]; the first one to
//! accept wins. `Lenient` accepts any detected face for an enrolled expected
//! identity. It trades false accepts for tolerance to lighting and pose, so
//! it is a separate entry that can be left out of the policy.

pub mod histogram;
pub mod lbp;

use crate::types::{Detection, FaceCrop, MatchResult, MatchStrategy};
use image::imageops::{self, FilterType};
use image::GrayImage;
use lbp::LbpClassifier;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

// --- Named constants ---
/// Side of the square canonical crop every gallery and probe face is resized to.
pub const CANONICAL_CROP_SIZE: u32 = 96;
/// Minimum normalized classifier confidence for acceptance (exclusive).
const CLASSIFIER_MIN_CONFIDENCE: f32 = 0.3;
/// Classifier distance that maps to confidence 0.
const CLASSIFIER_DISTANCE_SCALE: f32 = 100.0;
/// Minimum histogram correlation for acceptance (exclusive).
const CORRELATION_MIN: f32 = 0.4;
/// Stored crops per identity the correlation strategy looks at.
const CORRELATION_MAX_REFERENCES: usize = 3;
/// Confidence assigned by the lenient strategy.
const LENIENT_CONFIDENCE: f32 = 0.6;
/// Floor applied to the reported confidence of any accepted fallback match.
pub const ACCEPTED_CONFIDENCE_FLOOR: f32 = 0.7;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackError {
    #[error("no valid face crops: none of {submitted} crops scored above {threshold}")]
    NoValidSamples { submitted: usize, threshold: f32 },
    #[error("unknown fallback strategy {0:?} (expected classifier, correlation or lenient)")]
    UnknownStrategy(String),
}

/// One step of the fallback pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    Classifier,
    Correlation,
    Lenient,
}

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::Classifier => "classifier",
            FallbackStrategy::Correlation => "correlation",
            FallbackStrategy::Lenient => "lenient",
        }
    }

    fn match_strategy(self) -> MatchStrategy {
        match self {
            FallbackStrategy::Classifier => MatchStrategy::Classifier,
            FallbackStrategy::Correlation => MatchStrategy::Correlation,
            FallbackStrategy::Lenient => MatchStrategy::Lenient,
        }
    }
}

impl FromStr for FallbackStrategy {
    type Err = FallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classifier" => Ok(FallbackStrategy::Classifier),
            "correlation" => Ok(FallbackStrategy::Correlation),
            "lenient" => Ok(FallbackStrategy::Lenient),
            other => Err(FallbackError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Ordered list of enabled strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub strategies: Vec<FallbackStrategy>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            strategies: vec![
                FallbackStrategy::Classifier,
                FallbackStrategy::Correlation,
                FallbackStrategy::Lenient,
            ],
        }
    }
}

impl FallbackPolicy {
    /// Parse a comma-separated list such as `"classifier,correlation"`.
    pub fn parse(list: &str) -> Result<Self, FallbackError> {
        let mut strategies = Vec::new();
        for part in list.split(',').filter(|p| !p.trim().is_empty()) {
            let strategy: FallbackStrategy = part.parse()?;
            if !strategies.contains(&strategy) {
                strategies.push(strategy);
            }
        }
        Ok(Self { strategies })
    }

    pub fn without(mut self, strategy: FallbackStrategy) -> Self {
        self.strategies.retain(|s| *s != strategy);
        self
    }

    pub fn allows(&self, strategy: FallbackStrategy) -> bool {
        self.strategies.contains(&strategy)
    }
}

/// Result of a fallback match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackOutcome {
    /// Match as reported to callers; accepted confidences are floored.
    pub result: MatchResult,
    /// Strategy-specific confidence before flooring.
    pub raw_confidence: f32,
}

/// Identity ↔ classifier label table, rebuilt from the gallery's identity order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    identities: Vec<String>,
}

impl LabelTable {
    pub fn from_identities<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            identities: ids.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn label_of(&self, identity_id: &str) -> Option<usize> {
        self.identities.iter().position(|id| id == identity_id)
    }

    pub fn identity_of(&self, label: usize) -> Option<&str> {
        self.identities.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Canonicalized crops that passed the enrollment filter, not yet in the gallery.
#[derive(Debug, Clone)]
pub struct PreparedCrops(Vec<GrayImage>);

impl PreparedCrops {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
struct GalleryEntry {
    identity_id: String,
    /// Canonical-size crops in enrollment order.
    crops: Vec<GrayImage>,
}

struct TrainedClassifier {
    generation: u64,
    labels: LabelTable,
    classifier: LbpClassifier,
}

/// Crop gallery plus the classifier trained over it.
pub struct FallbackMatcher {
    policy: FallbackPolicy,
    quality_threshold: f32,
    gallery: RwLock<Arc<Vec<GalleryEntry>>>,
    generation: AtomicU64,
    trained: Mutex<Option<TrainedClassifier>>,
}

impl FallbackMatcher {
    pub fn new(policy: FallbackPolicy, quality_threshold: f32) -> Self {
        Self {
            policy,
            quality_threshold,
            gallery: RwLock::new(Arc::new(Vec::new())),
            generation: AtomicU64::new(0),
            trained: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Store crops for `identity_id`, replacing any previous set.
    ///
    /// Crops scoring at or below the quality threshold, or whose pixel buffer
    /// does not match their dimensions, are dropped. Returns the number kept.
    pub fn enroll(&self, identity_id: &str, crops: &[(FaceCrop, f32)]) -> Result<usize, FallbackError> {
        let prepared = self.prepare(crops)?;
        Ok(self.insert(identity_id, prepared))
    }

    /// Filter and canonicalize crops without touching the gallery.
    pub fn prepare(&self, crops: &[(FaceCrop, f32)]) -> Result<PreparedCrops, FallbackError> {
        let kept: Vec<GrayImage> = crops
            .iter()
            .filter(|(_, score)| *score > self.quality_threshold)
            .filter_map(|(crop, _)| canonicalize(crop))
            .collect();

        if kept.is_empty() {
            return Err(FallbackError::NoValidSamples {
                submitted: crops.len(),
                threshold: self.quality_threshold,
            });
        }
        Ok(PreparedCrops(kept))
    }

    /// Store crops from [`prepare`](Self::prepare), replacing any previous set.
    pub fn insert(&self, identity_id: &str, prepared: PreparedCrops) -> usize {
        let PreparedCrops(kept) = prepared;
        let count = kept.len();

        let mut gallery = self.gallery.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = gallery.as_ref().clone();
        let entry = GalleryEntry {
            identity_id: identity_id.to_string(),
            crops: kept,
        };
        match next.iter_mut().find(|e| e.identity_id == identity_id) {
            Some(slot) => *slot = entry,
            None => next.push(entry),
        }
        *gallery = Arc::new(next);
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::info!(identity = identity_id, crops = count, "fallback crops enrolled");
        count
    }

    /// Drop an identity's crops. Returns whether it was present.
    pub fn remove(&self, identity_id: &str) -> bool {
        let mut gallery = self.gallery.write().unwrap_or_else(PoisonError::into_inner);
        if !gallery.iter().any(|e| e.identity_id == identity_id) {
            return false;
        }
        let next: Vec<GalleryEntry> = gallery
            .iter()
            .filter(|e| e.identity_id != identity_id)
            .cloned()
            .collect();
        *gallery = Arc::new(next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn is_enrolled(&self, identity_id: &str) -> bool {
        self.snapshot().iter().any(|e| e.identity_id == identity_id)
    }

    pub fn crop_count(&self, identity_id: &str) -> usize {
        self.snapshot()
            .iter()
            .find(|e| e.identity_id == identity_id)
            .map_or(0, |e| e.crops.len())
    }

    /// Identities with crops, in enrollment order.
    pub fn identities(&self) -> Vec<String> {
        self.snapshot().iter().map(|e| e.identity_id.clone()).collect()
    }

    /// Label table of the currently trained classifier, retraining if stale.
    pub fn labels(&self) -> LabelTable {
        let mut trained = self.trained.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_trained(&mut trained);
        trained.as_ref().map(|t| t.labels.clone()).unwrap_or_default()
    }

    /// Match the probe's faces against `expected_identity`.
    pub fn match_probe(&self, faces: &[Detection], expected_identity: &str) -> FallbackOutcome {
        let probe = largest_crop(faces).and_then(canonicalize);
        let mut best_rejected: Option<(f32, FallbackStrategy)> = None;

        for &strategy in &self.policy.strategies {
            let attempt = match strategy {
                FallbackStrategy::Classifier => probe
                    .as_ref()
                    .and_then(|p| self.try_classifier(p, expected_identity)),
                FallbackStrategy::Correlation => probe
                    .as_ref()
                    .and_then(|p| self.try_correlation(p, expected_identity)),
                FallbackStrategy::Lenient => Some(self.try_lenient(faces, expected_identity)),
            };
            let Some((accepted, raw)) = attempt else {
                tracing::trace!(strategy = strategy.as_str(), "fallback strategy unavailable");
                continue;
            };

            if accepted {
                tracing::debug!(
                    identity = expected_identity,
                    strategy = strategy.as_str(),
                    raw_confidence = raw,
                    "fallback match accepted"
                );
                return FallbackOutcome {
                    result: MatchResult {
                        identity_id: Some(expected_identity.to_string()),
                        confidence: raw.max(ACCEPTED_CONFIDENCE_FLOOR),
                        strategy: strategy.match_strategy(),
                    },
                    raw_confidence: raw,
                };
            }
            if best_rejected.map_or(true, |(c, _)| raw > c) {
                best_rejected = Some((raw, strategy));
            }
        }

        let (raw, strategy) = best_rejected.unwrap_or((0.0, FallbackStrategy::Classifier));
        FallbackOutcome {
            result: MatchResult::no_match(raw, strategy.match_strategy()),
            raw_confidence: raw,
        }
    }

    /// `Some((accepted, confidence))`, or `None` when no classifier can be trained.
    fn try_classifier(&self, probe: &GrayImage, expected: &str) -> Option<(bool, f32)> {
        let mut trained = self.trained.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_trained(&mut trained);
        let model = trained.as_ref()?;

        let (label, distance) = model.classifier.predict(probe)?;
        let confidence = (1.0 - distance / CLASSIFIER_DISTANCE_SCALE).max(0.0);
        let predicted = model.labels.identity_of(label);
        let accepted = predicted == Some(expected) && confidence > CLASSIFIER_MIN_CONFIDENCE;

        tracing::trace!(
            expected,
            predicted = ?predicted,
            distance,
            confidence,
            accepted,
            "classifier prediction"
        );
        Some((accepted, confidence))
    }

    fn try_correlation(&self, probe: &GrayImage, expected: &str) -> Option<(bool, f32)> {
        let gallery = self.snapshot();
        let entry = gallery.iter().find(|e| e.identity_id == expected)?;
        let probe_hist = histogram::intensity_histogram(probe);

        let best = entry
            .crops
            .iter()
            .take(CORRELATION_MAX_REFERENCES)
            .map(|crop| histogram::correlation(&probe_hist, &histogram::intensity_histogram(crop)))
            .fold(f32::NEG_INFINITY, f32::max);
        if best == f32::NEG_INFINITY {
            return None;
        }

        tracing::trace!(expected, correlation = best, "histogram correlation");
        Some((best > CORRELATION_MIN, best.max(0.0)))
    }

    fn try_lenient(&self, faces: &[Detection], expected: &str) -> (bool, f32) {
        let accepted = !faces.is_empty() && self.is_enrolled(expected);
        if accepted {
            tracing::warn!(
                identity = expected,
                faces = faces.len(),
                "lenient fallback accepted an unverified face"
            );
        }
        (accepted, if accepted { LENIENT_CONFIDENCE } else { 0.0 })
    }

    /// Retrain when the gallery changed since the last fit. Leaves `None` for an empty gallery.
    fn ensure_trained(&self, trained: &mut Option<TrainedClassifier>) {
        // Read the generation before the snapshot so a concurrent enroll can only
        // cause a spurious retrain, never a stale model marked as current.
        let generation = self.generation.load(Ordering::Acquire);
        if trained.as_ref().is_some_and(|t| t.generation == generation) {
            return;
        }

        let gallery = self.snapshot();
        let labels = LabelTable::from_identities(gallery.iter().map(|e| e.identity_id.as_str()));
        let classifier = LbpClassifier::train(
            gallery
                .iter()
                .enumerate()
                .flat_map(|(label, e)| e.crops.iter().map(move |c| (label, c))),
        );

        tracing::info!(
            identities = labels.len(),
            crops = classifier.len(),
            generation,
            "fallback classifier trained"
        );

        *trained = (!classifier.is_empty()).then_some(TrainedClassifier {
            generation,
            labels,
            classifier,
        });
    }

    fn snapshot(&self) -> Arc<Vec<GalleryEntry>> {
        self.gallery
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Crop of the face with the largest bounding box (falling back to pixel area).
/// Crops whose buffer does not match their dimensions are ignored.
fn largest_crop(faces: &[Detection]) -> Option<&FaceCrop> {
    faces
        .iter()
        .filter_map(|d| d.crop().filter(|c| c.is_well_formed()).map(|c| (d, c)))
        .max_by(|(a, ca), (b, cb)| {
            let area_a = face_area(a, ca);
            let area_b = face_area(b, cb);
            area_a.partial_cmp(&area_b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(_, c)| c)
}

fn face_area(detection: &Detection, crop: &FaceCrop) -> f32 {
    let area = detection.bbox.area();
    if area > 0.0 {
        area
    } else {
        crop.area() as f32
    }
}

fn canonicalize(crop: &FaceCrop) -> Option<GrayImage> {
    if !crop.is_well_formed() {
        return None;
    }
    let img = crop.to_image()?;
    if img.dimensions() == (CANONICAL_CROP_SIZE, CANONICAL_CROP_SIZE) {
        return Some(img);
    }
    Some(imageops::resize(
        &img,
        CANONICAL_CROP_SIZE,
        CANONICAL_CROP_SIZE,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, FaceData};

    fn crop_from(img: GrayImage) -> FaceCrop {
        FaceCrop::from_image(&img)
    }

    fn stripes(period: u32) -> FaceCrop {
        crop_from(GrayImage::from_fn(96, 96, |x, _| {
            image::Luma([if (x / period) % 2 == 0 { 40 } else { 210 }])
        }))
    }

    fn rings() -> FaceCrop {
        crop_from(GrayImage::from_fn(96, 96, |x, y| {
            let dx = x as f32 - 48.0;
            let dy = y as f32 - 48.0;
            image::Luma([(((dx * dx + dy * dy).sqrt() * 9.0) as u32 % 256) as u8])
        }))
    }

    fn noise(seed: u32) -> FaceCrop {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        crop_from(GrayImage::from_fn(96, 96, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            image::Luma([(state % 256) as u8])
        }))
    }

    fn detection(crop: FaceCrop, area: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: area.sqrt(), height: area.sqrt() },
            face: FaceData::Crop(crop),
            detection_score: 0.9,
        }
    }

    fn matcher(policy: FallbackPolicy) -> FallbackMatcher {
        let m = FallbackMatcher::new(policy, 0.5);
        m.enroll("alice", &[(stripes(4), 0.9), (stripes(4), 0.8)]).unwrap();
        m.enroll("bob", &[(rings(), 0.9)]).unwrap();
        m
    }

    #[test]
    fn test_policy_parse() {
        let p = FallbackPolicy::parse("classifier, correlation,classifier").unwrap();
        assert_eq!(p.strategies, vec![FallbackStrategy::Classifier, FallbackStrategy::Correlation]);
        assert!(!p.allows(FallbackStrategy::Lenient));
        assert!(FallbackPolicy::parse("classifier,guess").is_err());
        assert!(FallbackPolicy::parse("").unwrap().strategies.is_empty());
    }

    #[test]
    fn test_enroll_filters_quality_and_bad_buffers() {
        let m = FallbackMatcher::new(FallbackPolicy::default(), 0.5);
        let broken = FaceCrop { width: 10, height: 10, pixels: vec![0; 3] };
        let kept = m
            .enroll("alice", &[(stripes(4), 0.9), (stripes(4), 0.3), (broken, 0.9)])
            .unwrap();
        assert_eq!(kept, 1);
        assert_eq!(m.crop_count("alice"), 1);

        let err = m.enroll("bob", &[(rings(), 0.5)]).unwrap_err();
        assert!(matches!(err, FallbackError::NoValidSamples { submitted: 1, .. }));
        assert!(!m.is_enrolled("bob"));
    }

    #[test]
    fn test_label_table_follows_enrollment_order() {
        let m = matcher(FallbackPolicy::default());
        let labels = m.labels();
        assert_eq!(labels.identity_of(0), Some("alice"));
        assert_eq!(labels.label_of("bob"), Some(1));

        m.remove("alice");
        let labels = m.labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.label_of("bob"), Some(0));
    }

    #[test]
    fn test_classifier_accepts_expected_identity() {
        let m = matcher(FallbackPolicy::default());
        let outcome = m.match_probe(&[detection(stripes(4), 100.0)], "alice");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("alice"));
        assert_eq!(outcome.result.strategy, MatchStrategy::Classifier);
        assert!((outcome.raw_confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_classifier_rejects_other_identity() {
        let m = matcher(FallbackPolicy::parse("classifier").unwrap());
        let outcome = m.match_probe(&[detection(stripes(4), 100.0)], "bob");
        assert!(outcome.result.identity_id.is_none());
        assert_eq!(outcome.result.strategy, MatchStrategy::Classifier);
    }

    #[test]
    fn test_correlation_used_when_classifier_disabled() {
        let m = matcher(FallbackPolicy::parse("correlation").unwrap());
        let outcome = m.match_probe(&[detection(stripes(4), 100.0)], "alice");
        assert_eq!(outcome.result.strategy, MatchStrategy::Correlation);
        assert!(outcome.raw_confidence > 0.99);
        assert!(outcome.result.confidence >= ACCEPTED_CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_lenient_accepts_with_floor_and_raw_score() {
        let m = matcher(FallbackPolicy::default());
        // Noise neither classifies as bob nor correlates with his rings.
        let outcome = m.match_probe(&[detection(noise(7), 100.0)], "bob");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("bob"));
        assert_eq!(outcome.result.strategy, MatchStrategy::Lenient);
        assert!((outcome.raw_confidence - LENIENT_CONFIDENCE).abs() < 1e-6);
        assert!((outcome.result.confidence - ACCEPTED_CONFIDENCE_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn test_lenient_disabled_rejects() {
        let m = matcher(FallbackPolicy::default().without(FallbackStrategy::Lenient));
        let outcome = m.match_probe(&[detection(noise(7), 100.0)], "bob");
        assert!(outcome.result.identity_id.is_none());
    }

    #[test]
    fn test_lenient_requires_enrollment_and_a_face() {
        let m = matcher(FallbackPolicy::parse("lenient").unwrap());
        assert!(m.match_probe(&[detection(noise(1), 100.0)], "carol").result.identity_id.is_none());
        assert!(m.match_probe(&[], "bob").result.identity_id.is_none());
    }

    #[test]
    fn test_probe_uses_largest_face() {
        let m = matcher(FallbackPolicy::parse("classifier").unwrap());
        let faces = [detection(rings(), 50.0), detection(stripes(4), 400.0)];
        let outcome = m.match_probe(&faces, "alice");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_oversized_malformed_crop_is_ignored() {
        let m = matcher(FallbackPolicy::parse("classifier").unwrap());
        let bogus = FaceCrop { width: 70_000, height: 70_000, pixels: Vec::new() };
        let faces = [detection(bogus, 0.0), detection(stripes(4), 0.0)];
        let outcome = m.match_probe(&faces, "alice");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("alice"));

        let only_bogus = [detection(FaceCrop { width: 70_000, height: 70_000, pixels: Vec::new() }, 0.0)];
        assert!(m.match_probe(&only_bogus, "alice").result.identity_id.is_none());
    }

    #[test]
    fn test_prepare_leaves_gallery_untouched() {
        let m = FallbackMatcher::new(FallbackPolicy::default(), 0.5);
        assert!(m.prepare(&[(stripes(4), 0.3)]).is_err());
        let prepared = m.prepare(&[(stripes(4), 0.9), (rings(), 0.9)]).unwrap();
        assert!(!m.is_enrolled("alice"));
        assert_eq!(m.insert("alice", prepared), 2);
        assert_eq!(m.crop_count("alice"), 2);
    }

    #[test]
    fn test_classifier_retrains_after_enrollment_change() {
        let m = matcher(FallbackPolicy::parse("classifier").unwrap());
        assert!(m.match_probe(&[detection(noise(3), 100.0)], "carol").result.identity_id.is_none());

        m.enroll("carol", &[(noise(3), 0.9)]).unwrap();
        let outcome = m.match_probe(&[detection(noise(3), 100.0)], "carol");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("carol"));
    }

    #[test]
    fn test_non_canonical_crops_are_resized() {
        let m = FallbackMatcher::new(FallbackPolicy::parse("classifier").unwrap(), 0.5);
        let small = crop_from(GrayImage::from_fn(48, 60, |x, _| {
            image::Luma([if (x / 2) % 2 == 0 { 40 } else { 210 }])
        }));
        m.enroll("dana", &[(small.clone(), 0.9)]).unwrap();
        let outcome = m.match_probe(&[detection(small, 0.0)], "dana");
        assert_eq!(outcome.result.identity_id.as_deref(), Some("dana"));
    }
}
