//! Span Pipeline (`spec.md` §4.5).
//!
//! Orchestrates the four non-encoder heads for one encoded call: schema
//! projection, special-marker promotion, padding to the configured
//! capacity, span representation, classification, count prediction, and
//! count embedding. Each stage is a small sequential step, the way
//! `xd_tts::Tacotron2::run_decoder` sequences its LSTM/attention steps one
//! call at a time rather than hiding them behind one opaque function.

pub mod decoder;
pub mod projector;
pub mod score;

use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};

use crate::backend::InferenceBackend;
use crate::config::NerConfig;
use crate::error::{NerError, Result};
use crate::tokenizer::{PromptKind, SchemaEncoding};
use projector::ProjectedEmbeddings;

const STAGE: &str = "span_pipeline";

/// The full result bundle a span pipeline call produces (`spec.md` §4.5
/// step 8), handed to the score builder and decoder.
pub struct PipelineOutput {
    pub span_emb: ArrayD<f32>,
    pub span_mask: Vec<f32>,
    pub word_emb: Vec<Array1<f32>>,
    pub label_emb: Array2<f32>,
    pub classifier_logits: ArrayD<f32>,
    pub count_logits: ArrayD<f32>,
    pub structure_emb: ArrayD<f32>,
    pub predicted_count: usize,
    pub labels: Vec<String>,
}

fn stack_rows(rows: &[Array1<f32>]) -> Array2<f32> {
    if rows.is_empty() {
        return Array2::zeros((0, 0));
    }
    let hidden = rows[0].len();
    let mut out = Array2::zeros((rows.len(), hidden));
    for (i, row) in rows.iter().enumerate() {
        out.row_mut(i).assign(row);
    }
    out
}

fn pad_word_embeddings(word_emb: &[Array1<f32>], s_max: usize, hidden: usize) -> Array2<f32> {
    let mut out = Array2::zeros((s_max, hidden));
    for (i, row) in word_emb.iter().take(s_max).enumerate() {
        out.row_mut(i).assign(row);
    }
    out
}

fn pad_span_indices(encoding: &SchemaEncoding, s_max: usize) -> (Vec<i32>, Vec<f32>) {
    let width = encoding.max_span_width;
    let mut ids = vec![0i32; s_max * width * 2];
    let mut mask = vec![0f32; s_max * width];
    let n_words = encoding.text_words.len();
    let copy_words = n_words.min(s_max);
    for w in 0..copy_words {
        for wi in 0..width {
            let src = w * width + wi;
            let dst = w * width + wi;
            let (s, e) = encoding.span_indices[src];
            ids[dst * 2] = s as i32;
            ids[dst * 2 + 1] = e as i32;
            mask[dst] = encoding.span_mask[src];
        }
    }
    (ids, mask)
}

fn promote_specials(projected: &ProjectedEmbeddings, n_labels: usize) -> Result<(Array1<f32>, Vec<Array1<f32>>, Vec<Array1<f32>>)> {
    let group = projected
        .groups
        .first()
        .ok_or_else(|| NerError::encoding(STAGE, "no schema group produced by the projector"))?;

    let prompt = group
        .prompts
        .iter()
        .find(|p| p.kind == PromptKind::Prompt)
        .ok_or_else(|| NerError::encoding(STAGE, "schema group has no [P] prompt vector"))?
        .vector
        .clone();

    let entity_vectors: Vec<Array1<f32>> = group
        .prompts
        .iter()
        .filter(|p| p.kind == PromptKind::Entity)
        .map(|p| p.vector.clone())
        .collect();

    if entity_vectors.len() != n_labels {
        return Err(NerError::encoding(
            STAGE,
            format!(
                "expected {n_labels} [E] label vectors, projector produced {}",
                entity_vectors.len()
            ),
        ));
    }

    let ordered_specials: Vec<Array1<f32>> = group.prompts.iter().map(|p| p.vector.clone()).collect();

    Ok((prompt, entity_vectors, ordered_specials))
}

/// Runs the span pipeline for one already-encoded call.
pub fn run(
    backend: &dyn InferenceBackend,
    config: &NerConfig,
    hidden_size: usize,
    max_count: usize,
    encoding: &SchemaEncoding,
    hidden_states: &ArrayD<f32>,
) -> Result<PipelineOutput> {
    let projected = projector::project(hidden_states, encoding)?;
    let (prompt_vec, label_vecs, ordered_specials) = promote_specials(&projected, encoding.entity_labels.len())?;

    let s_max = config.max_sequence_length;
    let width = encoding.max_span_width;

    let padded_word_emb = pad_word_embeddings(&projected.word_embeddings, s_max, hidden_size);
    let (span_ids_flat, span_mask) = pad_span_indices(encoding, s_max);

    let token_embeddings = padded_word_emb
        .into_shape((1, s_max, hidden_size))
        .map_err(|e| NerError::encoding(STAGE, format!("reshaping padded word embeddings: {e}")))?
        .into_dyn();
    let span_indices = ArrayD::from_shape_vec(IxDyn(&[1, s_max * width, 2]), span_ids_flat)
        .map_err(|e| NerError::encoding(STAGE, format!("reshaping span indices: {e}")))?;

    let span_rep_out = backend.span_rep(&token_embeddings, &span_indices)?;
    if span_rep_out.ndim() != 4 {
        return Err(NerError::invalid_output(
            "span_rep",
            format!("expected rank 4 output, got rank {}", span_rep_out.ndim()),
        ));
    }
    let n_words = encoding.text_words.len();
    let trimmed = span_rep_out
        .index_axis(Axis(0), 0)
        .slice_axis(Axis(0), ndarray::Slice::from(0..n_words.min(s_max)))
        .to_owned()
        .into_dyn();

    let schema_embeddings = stack_rows(&ordered_specials);
    let classifier_logits = backend.classifier(&schema_embeddings.into_dyn())?;

    let prompt_matrix = prompt_vec.clone().insert_axis(Axis(0));
    let count_logits = backend.count_predictor(&prompt_matrix.into_dyn())?;
    let predicted_count = argmax_clamped(&count_logits, max_count);

    let label_emb = stack_rows(&label_vecs);
    let structure_emb = if predicted_count > 0 {
        let full = backend.count_embed(&label_emb.clone().into_dyn())?;
        if full.ndim() != 3 {
            return Err(NerError::invalid_output(
                "count_embed",
                format!("expected rank 3 output, got rank {}", full.ndim()),
            ));
        }
        full.slice_axis(Axis(0), ndarray::Slice::from(0..predicted_count)).to_owned()
    } else {
        ArrayD::zeros(IxDyn(&[0, label_emb.shape()[1].max(1), hidden_size]))
    };

    Ok(PipelineOutput {
        span_emb: trimmed,
        span_mask,
        word_emb: projected.word_embeddings,
        label_emb,
        classifier_logits,
        count_logits,
        structure_emb,
        predicted_count,
        labels: encoding.entity_labels.clone(),
    })
}

fn argmax_clamped(count_logits: &ArrayD<f32>, max_count: usize) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in count_logits.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    best_idx.min(max_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::tokenizer::testutil::test_tokenizer;

    #[test]
    fn pipeline_runs_end_to_end_against_mock_backend() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let encoding = tokenizer.encode_gliner2_schema("jane works", &labels, 2).unwrap();

        let backend = MockBackend {
            hidden_size: 4,
            max_count: 4,
        };
        let input_ids: Vec<i32> = encoding.input_ids.iter().map(|&x| x as i32).collect();
        let mask: Vec<i32> = encoding.attention_mask.iter().map(|&x| x as i32).collect();
        let seq_len = input_ids.len();
        let input_ids = ArrayD::from_shape_vec(IxDyn(&[1, seq_len]), input_ids).unwrap();
        let mask = ArrayD::from_shape_vec(IxDyn(&[1, seq_len]), mask).unwrap();
        let hidden = backend.encoder(&input_ids, &mask).unwrap();

        let config = NerConfig {
            max_sequence_length: 8,
            ..Default::default()
        };

        let out = run(&backend, &config, 4, 4, &encoding, &hidden).unwrap();
        assert_eq!(out.labels, labels);
        assert!(out.predicted_count <= 4);
    }
}
