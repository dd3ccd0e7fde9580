//! Pixel-sampling hash embedding model.
//!
//! Deterministic stand-in for a trained network: the crop is sampled on a
//! fixed grid, hashed, and the digest expanded into a D-dimensional vector.
//! It produces stable, well-spread vectors (the same crop always maps to the
//! same point) but carries no facial semantics; two photos of the same
//! person land nowhere near each other. Strictly a development placeholder
//! behind [`EmbeddingModel`]; swap in a real model without touching
//! extraction, matching, or session logic.

use crate::extractor::EmbeddingModel;
use image::GrayImage;
use sha2::{Digest, Sha256};

const SAMPLE_GRID: u32 = 16;

pub struct PixelHashModel {
    dim: usize,
}

impl PixelHashModel {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingModel for PixelHashModel {
    fn embed(&self, crop: &GrayImage) -> Vec<f32> {
        // Sample a fixed 16x16 grid so the digest is resolution-independent.
        let mut hasher = Sha256::new();
        hasher.update(crop.width().to_le_bytes());
        hasher.update(crop.height().to_le_bytes());
        for gy in 0..SAMPLE_GRID {
            for gx in 0..SAMPLE_GRID {
                let x = gx * crop.width() / SAMPLE_GRID;
                let y = gy * crop.height() / SAMPLE_GRID;
                let px = crop
                    .get_pixel(x.min(crop.width() - 1), y.min(crop.height() - 1))
                    .0[0];
                hasher.update([px]);
            }
        }
        let seed = hasher.finalize();

        // Expand the seed into dim values in [-1, 1], 4 digest bytes each.
        let mut values = Vec::with_capacity(self.dim);
        let mut counter = 0u32;
        let mut block = Vec::new();
        while values.len() < self.dim {
            if block.len() < 4 {
                let mut h = Sha256::new();
                h.update(&seed);
                h.update(counter.to_le_bytes());
                block = h.finalize().to_vec();
                counter += 1;
            }
            let chunk: [u8; 4] = block[..4].try_into().expect("block has at least 4 bytes");
            block.drain(..4);
            let raw = u32::from_le_bytes(chunk);
            values.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x + y) % 256) as u8]))
    }

    #[test]
    fn test_output_dimension() {
        let model = PixelHashModel::new(512);
        assert_eq!(model.embed(&gradient(100, 100)).len(), 512);
    }

    #[test]
    fn test_deterministic() {
        let model = PixelHashModel::new(128);
        let img = gradient(100, 100);
        assert_eq!(model.embed(&img), model.embed(&img));
    }

    #[test]
    fn test_different_crops_differ() {
        let model = PixelHashModel::new(128);
        let a = model.embed(&gradient(100, 100));
        let b = model.embed(&GrayImage::from_pixel(100, 100, Luma([7u8])));
        assert_ne!(a, b);
    }

    #[test]
    fn test_values_bounded() {
        let model = PixelHashModel::new(256);
        for v in model.embed(&gradient(64, 64)) {
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_nonzero_norm() {
        // 256 pseudo-random values essentially never sum squares to zero;
        // the extractor relies on a non-degenerate vector here.
        let model = PixelHashModel::new(256);
        let values = model.embed(&gradient(64, 64));
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(norm > 0.0);
    }
}
