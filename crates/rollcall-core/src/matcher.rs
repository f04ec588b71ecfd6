//! Embedding matcher with reference/sample similarity fusion.

use crate::store::IdentityRecord;
use crate::types::{Embedding, MatchError, MatchResult, MatchStrategy};

/// Default cosine-similarity acceptance threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.4;

/// Matches a probe embedding against every enrolled identity.
///
/// Per identity the score is the best of the similarity to its reference
/// embedding and to each individual enrollment sample. The gallery is always
/// traversed completely; on an exact tie the identity seen first wins.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    pub threshold: f32,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl SimilarityMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Fused similarity of `probe` to one identity.
    pub fn score(probe: &Embedding, record: &IdentityRecord) -> Result<f32, MatchError> {
        let mut best = probe.similarity(&record.reference_embedding)?;
        for sample in &record.sample_embeddings {
            best = best.max(probe.similarity(sample)?);
        }
        Ok(best)
    }

    /// Find the best identity for `probe`.
    ///
    /// An empty gallery yields a non-match with confidence 0. A non-match
    /// still carries the best similarity seen.
    pub fn match_embedding(
        &self,
        probe: &Embedding,
        gallery: &[IdentityRecord],
    ) -> Result<MatchResult, MatchError> {
        if probe.norm() == 0.0 {
            return Err(MatchError::DegenerateVector);
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let sim = Self::score(probe, record)?;
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        let result = match best_idx {
            Some(idx) if best_sim >= self.threshold => MatchResult {
                identity_id: Some(gallery[idx].id.clone()),
                confidence: best_sim,
                strategy: MatchStrategy::Embedding,
            },
            Some(_) => MatchResult::no_match(best_sim, MatchStrategy::Embedding),
            None => MatchResult::no_match(0.0, MatchStrategy::Embedding),
        };

        tracing::trace!(
            identity = ?result.identity_id,
            confidence = result.confidence,
            threshold = self.threshold,
            gallery = gallery.len(),
            "embedding match"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn record(id: &str, samples: &[&[f32]]) -> IdentityRecord {
        let samples: Vec<Embedding> = samples.iter().map(|s| emb(s)).collect();
        IdentityRecord {
            id: id.into(),
            display_name: id.into(),
            reference_embedding: Embedding::mean(&samples).unwrap(),
            sample_count: samples.len(),
            sample_embeddings: samples,
            aliases: Vec::new(),
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn test_matcher_traverses_whole_gallery() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let gallery = vec![
            record("decoy1", &[&[0.0, 1.0, 0.0]]),
            record("decoy2", &[&[0.0, 0.0, 1.0]]),
            record("match", &[&[1.0, 0.0, 0.0]]),
        ];

        let result = SimilarityMatcher::new(0.5).match_embedding(&probe, &gallery).unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("match"));
        assert_eq!(result.strategy, MatchStrategy::Embedding);
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let probe = emb(&[1.0, 0.0]);
        let result = SimilarityMatcher::default().match_embedding(&probe, &[]).unwrap();
        assert_eq!(result, MatchResult::no_match(0.0, MatchStrategy::Embedding));
    }

    #[test]
    fn test_matcher_non_match_reports_best_similarity() {
        // cos = 0.35 against the only identity
        let probe = emb(&[0.35, (1.0f32 - 0.35 * 0.35).sqrt()]);
        let gallery = vec![record("S1", &[&[1.0, 0.0]])];

        let result = SimilarityMatcher::new(0.4).match_embedding(&probe, &gallery).unwrap();
        assert!(result.identity_id.is_none());
        assert!((result.confidence - 0.35).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let probe = emb(&[1.0, 0.0]);
        let gallery = vec![record("S1", &[&[1.0, 0.0]])];
        let result = SimilarityMatcher::new(1.0).match_embedding(&probe, &gallery);
        // cos of identical unit vectors is exactly 1.0 in f32
        assert_eq!(result.unwrap().identity_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_sample_similarity_beats_reference() {
        // Reference (mean) is [0.5, 0.5]; the probe equals one sample exactly.
        let probe = emb(&[1.0, 0.0]);
        let gallery = vec![record("S1", &[&[1.0, 0.0], &[0.0, 1.0]])];
        let result = SimilarityMatcher::new(0.9).match_embedding(&probe, &gallery).unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("S1"));
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_tie_first_wins() {
        let probe = emb(&[1.0, 0.0]);
        let a = record("A", &[&[1.0, 1.0]]);
        let b = record("B", &[&[1.0, -1.0]]);

        let ab = SimilarityMatcher::new(0.1)
            .match_embedding(&probe, &[a.clone(), b.clone()])
            .unwrap();
        let ba = SimilarityMatcher::new(0.1).match_embedding(&probe, &[b, a]).unwrap();
        assert_eq!(ab.identity_id.as_deref(), Some("A"));
        assert_eq!(ba.identity_id.as_deref(), Some("B"));
    }

    #[test]
    fn test_best_match_independent_of_order_without_ties() {
        let probe = emb(&[1.0, 0.2]);
        let a = record("A", &[&[1.0, 0.0]]);
        let b = record("B", &[&[0.0, 1.0]]);
        let c = record("C", &[&[1.0, 1.0]]);

        let orders = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b, c, a],
        ];
        for gallery in orders {
            let r = SimilarityMatcher::new(0.4).match_embedding(&probe, &gallery).unwrap();
            assert_eq!(r.identity_id.as_deref(), Some("A"));
        }
    }

    #[test]
    fn test_zero_probe_is_degenerate() {
        let probe = emb(&[0.0, 0.0]);
        let err = SimilarityMatcher::default().match_embedding(&probe, &[]).unwrap_err();
        assert_eq!(err, MatchError::DegenerateVector);
    }

    #[test]
    fn test_probe_dimension_mismatch() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let gallery = vec![record("S1", &[&[1.0, 0.0]])];
        let err = SimilarityMatcher::default().match_embedding(&probe, &gallery).unwrap_err();
        assert!(matches!(err, MatchError::DimensionMismatch { .. }));
    }
}
