//! Schema encoding (`spec.md` §3 "Schema encoding", §4.2
//! `encode_gliner2_schema`).
//!
//! Builds the combined token stream
//! `[( [P] entities ( [E] label1 [E] label2 … ) ) [SEP_TEXT] word1 word2 …]`
//! and records, for every produced subword, which original token it came
//! from and which segment it belongs to — the projection contract every
//! downstream stage relies on. Shaped after `elcuervo-gline-rs`'s
//! `EncodedInput::from`, which builds the same kind of interleaved
//! label/separator/text subword stream and a parallel word-mask array.

use std::ops::Range;

use super::viterbi::Piece;
use super::words::{split_words, Word};
use super::Tokenizer;
use crate::error::{NerError, Result};

/// Which of the three coarse regions a subword position belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Schema,
    Separator,
    Text,
}

/// Per-subword provenance record (`spec.md` §3 `mappings[i]`).
#[derive(Clone, Copy, Debug)]
pub struct Mapping {
    pub segment: Segment,
    /// For `Schema`: index into `schema_tokens`. For `Text`: index into
    /// `text_words`. For `Separator`: unused, always `0`.
    pub original_index: usize,
    /// Index of the schema group this position belongs to. The
    /// entity-extraction core always uses a single group (`0`); multiple
    /// groups are a multi-task Schema API concern out of scope here.
    pub schema_group: usize,
}

/// What kind of special marker a [`PromptLocation`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Prompt,
    Entity,
    Relation,
    Classification,
    List,
}

/// A special marker's subword span inside the schema portion.
#[derive(Clone, Debug)]
pub struct PromptLocation {
    pub kind: PromptKind,
    pub group: usize,
    pub range: Range<usize>,
}

/// The full schema encoding consumed by every downstream pipeline stage.
#[derive(Clone, Debug)]
pub struct SchemaEncoding {
    pub schema_tokens: Vec<String>,
    pub text_words: Vec<Word>,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    pub tokens: Vec<Piece>,
    pub mappings: Vec<Mapping>,
    pub prompt_locations: Vec<PromptLocation>,
    pub text_word_ranges: Vec<Range<usize>>,
    pub span_indices: Vec<(u32, u32)>,
    pub span_mask: Vec<f32>,
    pub entity_labels: Vec<String>,
    pub max_span_width: usize,
}

struct Builder<'a> {
    tokenizer: &'a Tokenizer,
    input_ids: Vec<u32>,
    tokens: Vec<Piece>,
    mappings: Vec<Mapping>,
}

impl<'a> Builder<'a> {
    fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            input_ids: Vec::new(),
            tokens: Vec::new(),
            mappings: Vec::new(),
        }
    }

    fn push_special(
        &mut self,
        name: &str,
        segment: Segment,
        original_index: usize,
        group: usize,
    ) -> Result<Range<usize>> {
        let id = self
            .tokenizer
            .special_id(name)
            .ok_or_else(|| NerError::tokenizer(format!("unknown special token '{name}'")))?;
        let start = self.input_ids.len();
        self.input_ids.push(id);
        self.tokens.push(Piece {
            id,
            surface: name.to_string(),
        });
        self.mappings.push(Mapping {
            segment,
            original_index,
            schema_group: group,
        });
        Ok(start..start + 1)
    }

    fn push_text(
        &mut self,
        text: &str,
        segment: Segment,
        original_index: usize,
        group: usize,
    ) -> Range<usize> {
        let pieces = self.tokenizer.tokenize_word(text);
        let start = self.input_ids.len();
        for piece in pieces {
            self.input_ids.push(piece.id);
            self.mappings.push(Mapping {
                segment,
                original_index,
                schema_group: group,
            });
            self.tokens.push(piece);
        }
        start..self.input_ids.len()
    }
}

/// Builds the full GLiNER2 entity schema encoding for `text` against
/// `labels`. See `spec.md` §4.2.
pub fn encode_gliner2_schema(
    tokenizer: &Tokenizer,
    text: &str,
    labels: &[String],
    max_span_width: usize,
) -> Result<SchemaEncoding> {
    let mut schema_tokens = Vec::new();
    let mut prompt_locations = Vec::new();
    let mut b = Builder::new(tokenizer);

    b.push_special("[CLS]", Segment::Separator, 0, 0)?;

    let mut push_schema_text = |b: &mut Builder, schema_tokens: &mut Vec<String>, text: &str| {
        schema_tokens.push(text.to_string());
        b.push_text(text, Segment::Schema, schema_tokens.len() - 1, 0)
    };

    push_schema_text(&mut b, &mut schema_tokens, "(");

    schema_tokens.push("[P]".to_string());
    let p_range = b.push_special("[P]", Segment::Schema, schema_tokens.len() - 1, 0)?;
    prompt_locations.push(PromptLocation {
        kind: PromptKind::Prompt,
        group: 0,
        range: p_range,
    });

    push_schema_text(&mut b, &mut schema_tokens, "entities");
    push_schema_text(&mut b, &mut schema_tokens, "(");

    if labels.is_empty() {
        return Err(NerError::invalid_input(
            "encode_gliner2_schema requires at least one label",
        ));
    }

    for label in labels {
        schema_tokens.push("[E]".to_string());
        let e_range = b.push_special("[E]", Segment::Schema, schema_tokens.len() - 1, 0)?;
        prompt_locations.push(PromptLocation {
            kind: PromptKind::Entity,
            group: 0,
            range: e_range,
        });
        push_schema_text(&mut b, &mut schema_tokens, label);
    }

    push_schema_text(&mut b, &mut schema_tokens, ")");
    push_schema_text(&mut b, &mut schema_tokens, ")");

    b.push_special("[SEP_TEXT]", Segment::Separator, 0, 0)?;

    let text_words = split_words(text);
    let text_word_ranges: Vec<Range<usize>> =
        text_words.iter().map(|w| w.start..w.end).collect();

    for (wi, word) in text_words.iter().enumerate() {
        let lowered = word.text.to_lowercase();
        b.push_text(&lowered, Segment::Text, wi, 0);
    }

    b.push_special("[SEP]", Segment::Separator, 0, 0)?;

    if b.input_ids.len() > tokenizer.max_length() {
        return Err(NerError::tokenizer(format!(
            "schema encoding produced {} subwords, exceeds max_length {}",
            b.input_ids.len(),
            tokenizer.max_length()
        )));
    }

    let attention_mask = vec![1u8; b.input_ids.len()];

    let n_words = text_words.len();
    let mut span_indices = Vec::with_capacity(n_words * max_span_width);
    let mut span_mask = Vec::with_capacity(n_words * max_span_width);
    for s in 0..n_words {
        for w in 0..max_span_width {
            let end = s + w;
            if end < n_words {
                span_indices.push((s as u32, end as u32));
                span_mask.push(1.0);
            } else {
                span_indices.push((0, 0));
                span_mask.push(0.0);
            }
        }
    }

    Ok(SchemaEncoding {
        schema_tokens,
        text_words,
        input_ids: b.input_ids,
        attention_mask,
        tokens: b.tokens,
        mappings: b.mappings,
        prompt_locations,
        text_word_ranges,
        span_indices,
        span_mask,
        entity_labels: labels.to_vec(),
        max_span_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::testutil::test_tokenizer;

    #[test]
    fn schema_token_sequence_matches_literal_structure() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string(), "company".to_string()];
        let enc = encode_gliner2_schema(&tokenizer, "Jane works at Acme", &labels, 4).unwrap();
        assert_eq!(
            enc.schema_tokens,
            vec!["(", "[P]", "entities", "(", "[E]", "person", "[E]", "company", ")", ")"]
        );
    }

    #[test]
    fn one_mapping_per_subword() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let enc = encode_gliner2_schema(&tokenizer, "Jane works", &labels, 4).unwrap();
        assert_eq!(enc.mappings.len(), enc.input_ids.len());
    }

    #[test]
    fn span_indices_and_mask_shapes() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let enc = encode_gliner2_schema(&tokenizer, "a b c", &labels, 2).unwrap();
        assert_eq!(enc.text_words.len(), 3);
        assert_eq!(enc.span_indices.len(), 3 * 2);
        assert_eq!(enc.span_mask.len(), 3 * 2);
        // word 2 ("c"), width 0 -> (2,2) valid since 2 < 3
        assert_eq!(enc.span_indices[2 * 2], (2, 2));
        assert_eq!(enc.span_mask[2 * 2], 1.0);
        // word 2, width 1 -> end 3 not < 3 -> padding
        assert_eq!(enc.span_indices[2 * 2 + 1], (0, 0));
        assert_eq!(enc.span_mask[2 * 2 + 1], 0.0);
    }

    #[test]
    fn rejects_empty_labels() {
        let tokenizer = test_tokenizer();
        let err = encode_gliner2_schema(&tokenizer, "hi", &[], 4).unwrap_err();
        assert!(matches!(err, NerError::InvalidInput { .. }));
    }

    #[test]
    fn entity_prompt_locations_count_matches_labels() {
        let tokenizer = test_tokenizer();
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let enc = encode_gliner2_schema(&tokenizer, "x", &labels, 4).unwrap();
        let entity_count = enc
            .prompt_locations
            .iter()
            .filter(|p| p.kind == PromptKind::Entity)
            .count();
        assert_eq!(entity_count, 3);
        let prompt_count = enc
            .prompt_locations
            .iter()
            .filter(|p| p.kind == PromptKind::Prompt)
            .count();
        assert_eq!(prompt_count, 1);
    }
}
