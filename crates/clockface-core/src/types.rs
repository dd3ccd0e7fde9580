use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detection quality mode requested from the face detector.
///
/// `Accurate` runs the detector at full input resolution; `Fast` permits the
/// backend to downscale for throughput. The extraction pipeline itself is
/// identical in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMode {
    Accurate,
    Fast,
}

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Fixed-dimension face embedding vector.
///
/// Embeddings produced by [`crate::FaceEmbeddingExtractor`] are always
/// L2-normalized, so cosine similarity reduces to a plain dot product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Dot product. For unit-normalized vectors this is the cosine similarity.
    pub fn dot(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Return a unit-normalized copy, or `None` if the vector has zero norm.
    pub fn l2_normalized(&self) -> Option<Embedding> {
        let norm = self.norm();
        if norm > 0.0 {
            Some(Embedding {
                values: self.values.iter().map(|x| x / norm).collect(),
            })
        } else {
            None
        }
    }
}

/// One employee row from the external directory. Read-only here; the
/// directory service owns the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub display_name: String,
    /// Handle to the stored reference image, if one has been uploaded.
    pub reference_image: Option<String>,
}

/// Persisted face enrollment for one employee.
///
/// At most one active record exists per employee id; re-registration
/// overwrites. The embedding is unit-normalized before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEmbeddingRecord {
    pub employee_id: String,
    pub embedding: Embedding,
    /// Handle to the stored cropped face image the embedding was derived from.
    pub crop_ref: String,
    /// Detector confidence for the selected face.
    pub extraction_confidence: f32,
    pub registered_at: DateTime<Utc>,
}

/// Persisted fingerprint enrollment. Immutable once created; re-enrollment
/// replaces the row wholesale, never merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintTemplate {
    pub employee_id: String,
    /// Opaque template string derived from the hashed scan tokens.
    pub template: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_identical_unit_vectors() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0] };
        assert!((a.dot(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_orthogonal() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!(a.dot(&b).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalized() {
        let a = Embedding { values: vec![3.0, 4.0] };
        let n = a.l2_normalized().unwrap();
        assert!((n.norm() - 1.0).abs() < 1e-6);
        assert!((n.values[0] - 0.6).abs() < 1e-6);
        assert!((n.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalized_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0, 0.0] };
        assert!(a.l2_normalized().is_none());
    }

    #[test]
    fn test_bounding_box_area() {
        let b = BoundingBox { x: 10.0, y: 10.0, width: 20.0, height: 30.0, confidence: 0.9 };
        assert!((b.area() - 600.0).abs() < 1e-6);
    }
}
