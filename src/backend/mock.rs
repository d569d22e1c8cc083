//! Deterministic in-memory [`InferenceBackend`] used only by pipeline unit
//! tests, so the span pipeline, score builder, and decoder can be exercised
//! without an ONNX Runtime environment (`SPEC_FULL.md` §10.4).

use ndarray::{ArrayD, IxDyn};

use super::InferenceBackend;
use crate::error::Result;

/// Produces embeddings deterministically from input shape/content so tests
/// can assert on the resulting scores without a real model: every encoder
/// hidden vector is filled with its sequence position (as a float), every
/// span-rep/count-embed output is filled with a small constant, and the
/// count-predictor always votes for `predicted_count = 1`.
pub struct MockBackend {
    pub hidden_size: usize,
    pub max_count: usize,
}

impl InferenceBackend for MockBackend {
    fn encoder(&self, input_ids: &ArrayD<i32>, _attention_mask: &ArrayD<i32>) -> Result<ArrayD<f32>> {
        let seq_len = input_ids.shape()[1];
        let mut out = ArrayD::zeros(IxDyn(&[1, seq_len, self.hidden_size]));
        for s in 0..seq_len {
            for h in 0..self.hidden_size {
                out[[0, s, h]] = s as f32;
            }
        }
        Ok(out)
    }

    fn span_rep(&self, token_embeddings: &ArrayD<f32>, span_indices: &ArrayD<i32>) -> Result<ArrayD<f32>> {
        let seq_len = token_embeddings.shape()[1];
        let n_spans = span_indices.shape()[1];
        let mut out = ArrayD::zeros(IxDyn(&[1, seq_len, n_spans / seq_len.max(1), self.hidden_size]));
        out.fill(1.0);
        Ok(out)
    }

    fn classifier(&self, schema_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let p = schema_embeddings.shape()[0];
        Ok(ArrayD::zeros(IxDyn(&[p, 1])))
    }

    fn count_predictor(&self, _prompt_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut out = ArrayD::zeros(IxDyn(&[self.max_count + 1]));
        out[[1]] = 10.0;
        Ok(out)
    }

    fn count_embed(&self, label_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let l = label_embeddings.shape()[0];
        let mut out = ArrayD::zeros(IxDyn(&[self.max_count, l, self.hidden_size]));
        out.fill(1.0);
        Ok(out)
    }
}
