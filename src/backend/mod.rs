//! Inference Backend Adapters (`spec.md` §4.3).
//!
//! An [`InferenceBackend`] is a thin, typed binding to the five neural
//! modules (encoder, span-rep, classifier, count-predictor, count-embed).
//! The trait is the seam the spec calls out explicitly as "out of scope":
//! the rest of the pipeline only ever talks to this interface, never to a
//! concrete ONNX Runtime session directly, mirroring the split between
//! `xd_tts::Tacotron2`'s public inference methods and whichever concrete
//! execution provider happens to back them.

pub mod ort_backend;

#[cfg(test)]
pub mod mock;

use ndarray::{ArrayD, IxDyn};

use crate::error::Result;

/// A stage name for error attribution, reused across
/// [`crate::error::NerError::InvalidOutput`] call sites.
pub type StageName = &'static str;

pub const STAGE_ENCODER: StageName = "encoder";
pub const STAGE_SPAN_REP: StageName = "span_rep";
pub const STAGE_CLASSIFIER: StageName = "classifier";
pub const STAGE_COUNT_PREDICTOR: StageName = "count_predictor";
pub const STAGE_COUNT_EMBED: StageName = "count_embed";

/// Five typed operations, one per neural module, each accepting and
/// returning dense row-major tensors. Implementations must serialise
/// concurrent calls to the same underlying module internally (`spec.md`
/// §4.3, "each adapter serialises its prediction calls on a dedicated
/// queue") while remaining safe to share across threads — hence `Sync`.
pub trait InferenceBackend: Send + Sync {
    /// `input_ids: [1,S]`, `attention_mask: [1,S]` -> hidden states `[1,S,H]`.
    fn encoder(&self, input_ids: &ArrayD<i32>, attention_mask: &ArrayD<i32>) -> Result<ArrayD<f32>>;

    /// `token_embeddings: [1,S,H]`, `span_indices: [1,S*W,2] int32` -> `[1,S,W,H]`.
    fn span_rep(&self, token_embeddings: &ArrayD<f32>, span_indices: &ArrayD<i32>) -> Result<ArrayD<f32>>;

    /// `schema_embeddings: [P,H]` -> `[P,...]` logits.
    fn classifier(&self, schema_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// `prompt_embeddings: [P,H]` -> count logits `[C_max+1]` (or compatible shape).
    fn count_predictor(&self, prompt_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// `label_embeddings: [L,H]` padded to `P_max` -> `[C_max, L_cap, H]`.
    fn count_embed(&self, label_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>>;
}

/// Validates that `tensor` has exactly `expected_rank` dimensions, wrapping
/// a mismatch into the stage's `InvalidOutput` error. Every backend
/// implementation funnels its raw output shape through this before
/// returning, so a misbehaving module fails close to its source rather
/// than deep inside the schema projector.
pub fn require_rank(stage: StageName, tensor: &ArrayD<f32>, expected_rank: usize) -> Result<()> {
    if tensor.ndim() != expected_rank {
        return Err(crate::error::NerError::invalid_output(
            stage,
            format!(
                "expected rank {expected_rank}, got rank {} (shape {:?})",
                tensor.ndim(),
                tensor.shape()
            ),
        ));
    }
    Ok(())
}

/// Builds a zero-filled tensor of the given shape; used by backends to pad
/// degenerate outputs (e.g. zero labels) to a predictable rank.
pub fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}
