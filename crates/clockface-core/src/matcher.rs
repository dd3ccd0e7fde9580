//! Probe-vs-gallery face matching with confidence tiers.

use crate::types::{Embedding, FaceEmbeddingRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.55;
const DEFAULT_HIGH_CONFIDENCE_THRESHOLD: f32 = 0.80;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no enrolled faces to match against")]
    NoEnrollments,
}

/// High/Medium relative to the configured thresholds; Low means the best
/// score fell below the acceptance threshold and is only ever logged,
/// never returned as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

/// An accepted match: score is always >= the similarity threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatch {
    pub employee_id: String,
    pub score: f32,
    pub tier: ConfidenceTier,
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub similarity_threshold: f32,
    pub high_confidence_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            high_confidence_threshold: DEFAULT_HIGH_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Cosine-similarity matcher over unit-normalized embeddings.
///
/// Since both probe and gallery vectors are unit vectors, similarity is a
/// plain dot product. The whole gallery is always scanned; the maximum
/// score wins, and on an exact tie the first candidate in iteration order
/// is kept (open ambiguity, documented in the design notes).
pub struct FaceMatcher {
    config: MatcherConfig,
}

impl FaceMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Compare `probe` against every enrolled record.
    ///
    /// `Ok(None)` means the best candidate scored below the acceptance
    /// threshold; a match below threshold is never returned.
    pub fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[FaceEmbeddingRecord],
    ) -> Result<Option<FaceMatch>, MatchError> {
        if gallery.is_empty() {
            return Err(MatchError::NoEnrollments);
        }

        let mut best_score = f32::NEG_INFINITY;
        let mut best: Option<&FaceEmbeddingRecord> = None;

        for record in gallery {
            let score = probe.dot(&record.embedding);
            // Strict > keeps the first candidate on an exact score tie.
            if score > best_score {
                best_score = score;
                best = Some(record);
            }
        }

        let record = best.expect("gallery is non-empty");

        if best_score < self.config.similarity_threshold {
            tracing::debug!(
                employee_id = %record.employee_id,
                score = best_score,
                tier = ?ConfidenceTier::Low,
                "best candidate below threshold, not recognized"
            );
            return Ok(None);
        }

        let tier = if best_score >= self.config.high_confidence_threshold {
            ConfidenceTier::High
        } else {
            ConfidenceTier::Medium
        };

        Ok(Some(FaceMatch {
            employee_id: record.employee_id.clone(),
            score: best_score,
            tier,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::Rng;

    fn record(id: &str, values: Vec<f32>) -> FaceEmbeddingRecord {
        FaceEmbeddingRecord {
            employee_id: id.to_string(),
            embedding: Embedding { values },
            crop_ref: String::new(),
            extraction_confidence: 1.0,
            registered_at: Utc::now(),
        }
    }

    fn matcher() -> FaceMatcher {
        FaceMatcher::new(MatcherConfig::default())
    }

    #[test]
    fn test_identical_probe_matches_high() {
        let gallery = vec![record("a", vec![1.0, 0.0, 0.0])];
        let probe = Embedding { values: vec![1.0, 0.0, 0.0] };
        let m = matcher().best_match(&probe, &gallery).unwrap().unwrap();
        assert_eq!(m.employee_id, "a");
        assert!((m.score - 1.0).abs() < 1e-6);
        assert_eq!(m.tier, ConfidenceTier::High);
    }

    #[test]
    fn test_orthogonal_probe_not_recognized() {
        let gallery = vec![record("a", vec![1.0, 0.0])];
        let probe = Embedding { values: vec![0.0, 1.0] };
        assert!(matcher().best_match(&probe, &gallery).unwrap().is_none());
    }

    #[test]
    fn test_empty_gallery_is_error() {
        let probe = Embedding { values: vec![1.0, 0.0] };
        let err = matcher().best_match(&probe, &[]).unwrap_err();
        assert!(matches!(err, MatchError::NoEnrollments));
    }

    #[test]
    fn test_medium_tier_between_thresholds() {
        // cos 45° ≈ 0.707: above 0.55, below 0.80.
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let gallery = vec![record("a", vec![1.0, 0.0])];
        let probe = Embedding { values: vec![s, s] };
        let m = matcher().best_match(&probe, &gallery).unwrap().unwrap();
        assert_eq!(m.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_best_of_many_wins() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let gallery = vec![
            record("far", vec![0.0, 1.0]),
            record("close", vec![s, s]),
            record("exact", vec![1.0, 0.0]),
        ];
        let probe = Embedding { values: vec![1.0, 0.0] };
        let m = matcher().best_match(&probe, &gallery).unwrap().unwrap();
        assert_eq!(m.employee_id, "exact");
    }

    #[test]
    fn test_exact_tie_keeps_first_in_iteration_order() {
        let gallery = vec![
            record("first", vec![1.0, 0.0]),
            record("second", vec![1.0, 0.0]),
        ];
        let probe = Embedding { values: vec![1.0, 0.0] };
        let m = matcher().best_match(&probe, &gallery).unwrap().unwrap();
        assert_eq!(m.employee_id, "first");
    }

    #[test]
    fn test_never_returns_sub_threshold_match() {
        // Random unit probes against a fixed gallery: any returned match
        // must carry a score at or above the threshold.
        let mut rng = rand::thread_rng();
        let gallery: Vec<_> = (0..8)
            .map(|i| {
                let v: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let e = Embedding { values: v }.l2_normalized().unwrap();
                record(&format!("e{i}"), e.values)
            })
            .collect();

        let m = matcher();
        for _ in 0..200 {
            let v: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let probe = Embedding { values: v }.l2_normalized().unwrap();
            if let Some(found) = m.best_match(&probe, &gallery).unwrap() {
                assert!(found.score >= 0.55, "sub-threshold match returned: {}", found.score);
            }
        }
    }
}
