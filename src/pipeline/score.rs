//! Score Builder (`spec.md` §4.6).
//!
//! Combines span embeddings with the count-projected label embeddings via
//! plain dot products into a `[words × widths × labels]` tensor. Kept as
//! row-major flat buffers rather than nested nearrays, per `spec.md` §9
//! ("Ragged nested tensors" design note) — the natural home for a
//! BLAS-style matrix-vector multiply.

use ndarray::{Array3, ArrayD, Axis};

/// `span_emb`: `[words, W, H]`. `structure_emb`: `[predicted_count, L, H]`.
/// `span_mask`: flat `[words * W]`. Returns `scores[words, W, L]`.
///
/// Uses only the *first* structure instance's label embeddings, per
/// `spec.md` §4.6 ("the entity-only path uses the first structure
/// instance's label embeddings only"). If `predicted_count == 0` there is
/// no structure instance at all and the result is all zeros.
pub fn build_scores(
    span_emb: &ArrayD<f32>,
    span_mask: &[f32],
    structure_emb: &ArrayD<f32>,
    predicted_count: usize,
    n_labels: usize,
) -> Array3<f32> {
    let words = span_emb.shape()[0];
    let width = span_emb.shape()[1];
    let hidden = span_emb.shape()[2];

    let mut scores = Array3::<f32>::zeros((words, width, n_labels));

    if predicted_count == 0 {
        return scores;
    }

    let labels = structure_emb.index_axis(Axis(0), 0);
    if labels.shape()[0] != n_labels || labels.shape()[1] != hidden {
        // Dimension mismatch: spec says leave zero rather than fail.
        return scores;
    }

    for w in 0..words {
        for wi in 0..width {
            let mask_idx = w * width + wi;
            if span_mask.get(mask_idx).copied().unwrap_or(0.0) < 0.5 {
                continue;
            }
            let span_vec = span_emb.index_axis(Axis(0), w);
            let span_vec = span_vec.index_axis(Axis(0), wi);
            for (label_idx, label_vec) in labels.axis_iter(Axis(0)).enumerate() {
                let dot: f32 = span_vec.iter().zip(label_vec.iter()).map(|(a, b)| a * b).sum();
                scores[[w, wi, label_idx]] = dot;
            }
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn masked_entries_stay_zero() {
        let span_emb = ArrayD::from_elem(IxDyn(&[2, 2, 3]), 1.0);
        let structure_emb = ArrayD::from_elem(IxDyn(&[1, 1, 3]), 2.0);
        let mask = vec![1.0, 0.0, 1.0, 1.0];
        let scores = build_scores(&span_emb, &mask, &structure_emb, 1, 1);
        assert_eq!(scores[[0, 1, 0]], 0.0);
        assert_eq!(scores[[0, 0, 0]], 6.0);
    }

    #[test]
    fn zero_predicted_count_yields_all_zero() {
        let span_emb = ArrayD::from_elem(IxDyn(&[1, 1, 2]), 1.0);
        let structure_emb = ArrayD::from_elem(IxDyn(&[0, 1, 2]), 0.0);
        let mask = vec![1.0];
        let scores = build_scores(&span_emb, &mask, &structure_emb, 0, 1);
        assert!(scores.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dimension_mismatch_leaves_zero() {
        let span_emb = ArrayD::from_elem(IxDyn(&[1, 1, 3]), 1.0);
        let structure_emb = ArrayD::from_elem(IxDyn(&[1, 2, 3]), 1.0);
        let mask = vec![1.0];
        // n_labels=1 but structure_emb has 2 label rows -> mismatch -> zero
        let scores = build_scores(&span_emb, &mask, &structure_emb, 1, 1);
        assert!(scores.iter().all(|&v| v == 0.0));
    }
}
