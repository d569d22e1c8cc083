//! Schema Projector (`spec.md` §4.4).
//!
//! Gathers contextual subword embeddings from the encoder's hidden states
//! back onto (a) one vector per input word — first-subword lookup — and
//! (b) one vector per schema prompt location — mean pooling over its
//! subword range. Grounded in the same gather-by-index shape as
//! `elcuervo-gline-rs`'s word-mask projection (first subword marks the
//! word) combined with `xd_tts::Tacotron2::run_decoder`'s pattern of
//! slicing one `Array2` view out of a larger tensor per step.

use ndarray::{Array1, ArrayD, Axis};

use crate::error::{NerError, Result};
use crate::tokenizer::{PromptKind, Segment, SchemaEncoding};

const STAGE: &str = "schema_projector";

/// One pooled embedding for a prompt location, carrying its kind along so
/// downstream stages can pick out `[P]` vs. `[E]` vectors.
#[derive(Clone, Debug)]
pub struct PromptEmbedding {
    pub kind: PromptKind,
    pub vector: Array1<f32>,
}

/// Output of the projector for a single schema group.
#[derive(Clone, Debug, Default)]
pub struct SchemaGroupEmbeddings {
    pub prompts: Vec<PromptEmbedding>,
}

pub struct ProjectedEmbeddings {
    pub word_embeddings: Vec<Array1<f32>>,
    pub groups: Vec<SchemaGroupEmbeddings>,
}

/// Projects encoder `hidden_states` (`[1,S,H]`) onto word and prompt
/// embeddings using `encoding`'s per-subword mappings.
pub fn project(hidden_states: &ArrayD<f32>, encoding: &SchemaEncoding) -> Result<ProjectedEmbeddings> {
    if hidden_states.ndim() != 3 {
        return Err(NerError::encoding(
            STAGE,
            format!("expected rank-3 hidden states, got rank {}", hidden_states.ndim()),
        ));
    }
    let hidden = hidden_states.index_axis(Axis(0), 0);
    let seq_len = hidden.shape()[0];
    let hidden_size = hidden.shape()[1];

    if encoding.mappings.len() != seq_len {
        return Err(NerError::encoding(
            STAGE,
            format!(
                "hidden states sequence length {seq_len} does not match {} mapped subwords",
                encoding.mappings.len()
            ),
        ));
    }

    let n_words = encoding.text_words.len();
    let mut first_subword: Vec<Option<usize>> = vec![None; n_words];
    for (i, mapping) in encoding.mappings.iter().enumerate() {
        if mapping.segment == Segment::Text && first_subword[mapping.original_index].is_none() {
            first_subword[mapping.original_index] = Some(i);
        }
    }

    let mut word_embeddings = Vec::with_capacity(n_words);
    for (w, subword) in first_subword.into_iter().enumerate() {
        let i = subword.ok_or_else(|| {
            NerError::encoding(STAGE, format!("word {w} has no corresponding subword mapping"))
        })?;
        word_embeddings.push(hidden.index_axis(Axis(0), i).to_owned());
    }

    let mut group_count = 0usize;
    for loc in &encoding.prompt_locations {
        group_count = group_count.max(loc.group + 1);
    }
    let mut groups = vec![SchemaGroupEmbeddings::default(); group_count];

    for loc in &encoding.prompt_locations {
        if loc.range.is_empty() || loc.range.end > seq_len {
            return Err(NerError::encoding(
                STAGE,
                format!(
                    "prompt location for {:?} has empty or out-of-range subword span {:?}",
                    loc.kind, loc.range
                ),
            ));
        }
        let mut sum = Array1::zeros(hidden_size);
        for i in loc.range.clone() {
            sum += &hidden.index_axis(Axis(0), i);
        }
        let mean = sum / (loc.range.len() as f32);
        groups[loc.group].prompts.push(PromptEmbedding {
            kind: loc.kind,
            vector: mean,
        });
    }

    Ok(ProjectedEmbeddings {
        word_embeddings,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::testutil::test_tokenizer;
    use ndarray::IxDyn;

    #[test]
    fn word_embeddings_use_first_subword_and_prompts_use_mean() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let enc = tokenizer.encode_gliner2_schema("jane works", &labels, 4).unwrap();

        let seq_len = enc.input_ids.len();
        let hidden_size = 2;
        let mut hidden = ArrayD::zeros(IxDyn(&[1, seq_len, hidden_size]));
        for i in 0..seq_len {
            hidden[[0, i, 0]] = i as f32;
            hidden[[0, i, 1]] = (i as f32) * 2.0;
        }

        let projected = project(&hidden, &enc).unwrap();
        assert_eq!(projected.word_embeddings.len(), 2);
        assert_eq!(projected.groups.len(), 1);
        assert!(!projected.groups[0].prompts.is_empty());
    }

    #[test]
    fn rejects_mismatched_sequence_length() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let enc = tokenizer.encode_gliner2_schema("jane works", &labels, 4).unwrap();
        let hidden = ArrayD::zeros(IxDyn(&[1, enc.input_ids.len() + 3, 2]));
        let err = project(&hidden, &enc).unwrap_err();
        assert!(matches!(err, NerError::Encoding { .. }));
    }
}
