//! SentencePiece Unigram Tokenizer (`spec.md` §4.2).
//!
//! Ties together normalisation, Viterbi segmentation, and the vocabulary
//! loader behind the three encode entry points the rest of the pipeline
//! calls: plain `encode`, `encode_prompted` (used by the count-embed and
//! classification prompt paths), and `encode_gliner2_schema` (the entity
//! extraction core path). Modelled after `xd_tts::Tacotron2`, which keeps
//! one struct owning both its artifact and the small bit of runtime state
//! (here, the registered specials) callers need to drive it.

mod normalize;
mod schema;
mod viterbi;
mod vocab;
mod words;

pub use schema::{encode_gliner2_schema, Mapping, PromptKind, PromptLocation, Segment, SchemaEncoding};
pub use viterbi::Piece;
pub use vocab::{Vocab, VocabEntry};
pub use words::{split_words, Word};

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{NerError, Result};

/// Special tokens every manifest's tokenizer directory must register,
/// per `spec.md` §6.
const REQUIRED_SPECIALS: &[&str] = &["[CLS]", "[SEP]", "[UNK]", "[PAD]"];

/// The subword tokenizer, plus a registry of special-token ids looked up
/// by name at schema-encoding time.
pub struct Tokenizer {
    vocab: Vocab,
    specials: RwLock<HashMap<String, u32>>,
    max_length: usize,
}

impl Tokenizer {
    /// Loads the vocabulary from `tokenizer_dir` and validates that the
    /// required special tokens (`spec.md` §6) are present, either as
    /// ordinary vocabulary entries or `added_tokens`.
    pub fn load(tokenizer_dir: impl AsRef<Path>, max_length: usize) -> Result<Self> {
        let (vocab, added) = Vocab::open(tokenizer_dir)?;

        let mut specials = HashMap::new();
        for (content, id) in added {
            specials.insert(content, id);
        }
        for name in REQUIRED_SPECIALS {
            if !specials.contains_key(*name) {
                if let Some(id) = vocab.id_for(name) {
                    specials.insert((*name).to_string(), id);
                }
            }
        }
        for name in REQUIRED_SPECIALS {
            if !specials.contains_key(*name) {
                return Err(NerError::resource(format!(
                    "tokenizer is missing required special token '{name}'"
                )));
            }
        }

        if max_length == 0 {
            return Err(NerError::tokenizer("max_length must be > 0"));
        }

        Ok(Self {
            vocab,
            specials: RwLock::new(specials),
            max_length,
        })
    }

    /// Registers (or overrides) a special token id, e.g. for the
    /// GLiNER2-specific `[P]`, `[E]`, `[SEP_TEXT]` markers sourced from the
    /// span-head metadata rather than the base vocabulary.
    pub fn register_special(&self, name: impl Into<String>, id: u32) {
        self.specials
            .write()
            .expect("specials registry poisoned")
            .insert(name.into(), id);
    }

    pub fn special_id(&self, name: &str) -> Option<u32> {
        self.specials
            .read()
            .expect("specials registry poisoned")
            .get(name)
            .copied()
    }

    pub fn cls_id(&self) -> u32 {
        self.special_id("[CLS]").expect("validated at load time")
    }

    pub fn sep_id(&self) -> u32 {
        self.special_id("[SEP]").expect("validated at load time")
    }

    pub fn unk_id(&self) -> u32 {
        self.special_id("[UNK]").expect("validated at load time")
    }

    pub fn pad_id(&self) -> u32 {
        self.special_id("[PAD]").expect("validated at load time")
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Normalises and Viterbi-segments a single word into subword pieces.
    pub(crate) fn tokenize_word(&self, word: &str) -> Vec<Piece> {
        let normalized = normalize::normalize(word);
        viterbi::segment(&normalized, &self.vocab)
    }

    /// Plain `[CLS] word1 word2 … [SEP]` encoding, optionally padded to
    /// `max_length` with `[PAD]` / a zeroed attention mask.
    pub fn encode(&self, text: &str, pad_to_max: bool) -> Result<EncodeOutput> {
        let mut input_ids = vec![self.cls_id()];
        let mut word_spans = Vec::new();

        for word in split_words(text) {
            let start = input_ids.len();
            let pieces = self.tokenize_word(&word.text);
            input_ids.extend(pieces.iter().map(|p| p.id));
            word_spans.push(start..input_ids.len());
        }
        input_ids.push(self.sep_id());

        if input_ids.len() > self.max_length {
            return Err(NerError::tokenizer(format!(
                "encoded sequence has {} tokens, exceeds max_length {}",
                input_ids.len(),
                self.max_length
            )));
        }

        let mut attention_mask = vec![1u8; input_ids.len()];
        if pad_to_max {
            let pad_id = self.pad_id();
            while input_ids.len() < self.max_length {
                input_ids.push(pad_id);
                attention_mask.push(0);
            }
        }

        Ok(EncodeOutput {
            input_ids,
            attention_mask,
            word_spans,
        })
    }

    /// `[CLS] [E] label1 [E] label2 … [SEP_mid] text_word1 … [SEP]`, a
    /// schema-free prompt used by the count-embed / classification prompt
    /// path (`spec.md` §4.2). Unlike [`Self::encode_gliner2_schema`], there
    /// is no enclosing `( [P] entities ( … ) )` structure: the labels are
    /// prefixed directly with `[E]` markers, no span planning is done, and
    /// the only provenance recorded is `word_mask` plus each `[E]`
    /// marker's own subword index.
    pub fn encode_prompted(&self, text: &str, labels: &[String], pad_to_max: bool) -> Result<PromptEncoding> {
        let mut input_ids = vec![self.cls_id()];
        let mut entity_marker_indices = Vec::with_capacity(labels.len());

        for label in labels {
            let e_id = self
                .special_id("[E]")
                .ok_or_else(|| NerError::tokenizer("unknown special token '[E]'"))?;
            entity_marker_indices.push(input_ids.len());
            input_ids.push(e_id);

            let pieces = self.tokenize_word(&label.to_lowercase());
            input_ids.extend(pieces.iter().map(|p| p.id));
        }

        let sep_mid = self.special_id("[SEP_TEXT]").unwrap_or_else(|| self.sep_id());
        input_ids.push(sep_mid);

        let text_words = split_words(text);
        let mut word_mask = vec![0u32; input_ids.len()];
        let mut text_word_ranges = Vec::with_capacity(text_words.len());
        for (wi, word) in text_words.iter().enumerate() {
            text_word_ranges.push(word.start..word.end);
            let pieces = self.tokenize_word(&word.text.to_lowercase());
            for (pi, piece) in pieces.iter().enumerate() {
                input_ids.push(piece.id);
                word_mask.push(if pi == 0 { (wi + 1) as u32 } else { 0 });
            }
        }
        input_ids.push(self.sep_id());
        word_mask.push(0);

        if input_ids.len() > self.max_length {
            return Err(NerError::tokenizer(format!(
                "prompted encoding has {} tokens, exceeds max_length {}",
                input_ids.len(),
                self.max_length
            )));
        }

        let mut attention_mask = vec![1u8; input_ids.len()];
        if pad_to_max {
            let pad_id = self.pad_id();
            while input_ids.len() < self.max_length {
                input_ids.push(pad_id);
                attention_mask.push(0);
                word_mask.push(0);
            }
        }

        Ok(PromptEncoding {
            input_ids,
            attention_mask,
            word_mask,
            text_word_ranges,
            entity_marker_indices,
        })
    }

    /// The GLiNER2 entity-schema encoding; see [`schema::encode_gliner2_schema`].
    pub fn encode_gliner2_schema(
        &self,
        text: &str,
        labels: &[String],
        max_span_width: usize,
    ) -> Result<SchemaEncoding> {
        schema::encode_gliner2_schema(self, text, labels, max_span_width)
    }
}

/// Result of a plain encode call.
#[derive(Clone, Debug)]
pub struct EncodeOutput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    /// Subword ranges, one per input word, in the same order the words
    /// appeared in the source text.
    pub word_spans: Vec<std::ops::Range<usize>>,
}

/// Result of [`Tokenizer::encode_prompted`] (`spec.md` §4.2).
#[derive(Clone, Debug)]
pub struct PromptEncoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    /// One entry per subword: the 1-based index of the text word whose
    /// first subword this position is, or `0` for every other position
    /// (prompt tokens, continuation subwords, padding).
    pub word_mask: Vec<u32>,
    /// Character range of each text word in the original input.
    pub text_word_ranges: Vec<std::ops::Range<usize>>,
    /// Subword index of each `[E]` marker, in label order.
    pub entity_marker_indices: Vec<usize>,
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A minimal in-memory tokenizer covering the handful of words the
    /// tokenizer/schema unit tests exercise, plus the GLiNER2 specials.
    pub fn test_tokenizer() -> Tokenizer {
        let words = [
            "jane", "works", "at", "acme", "person", "company", "hi", "x", "a", "b", "c",
        ];
        let mut vocab_entries = vec![("<unk>".to_string(), 0.0f64)];
        for w in words {
            vocab_entries.push((format!("\u{2581}{w}"), -1.0));
        }
        let vocab_json = serde_json::json!({
            "model": { "type": "unigram", "unk_id": 0, "vocab": vocab_entries },
            "added_tokens": [
                { "id": 100, "content": "[CLS]" },
                { "id": 101, "content": "[SEP]" },
                { "id": 102, "content": "[PAD]" },
                { "id": 103, "content": "[UNK]" },
                { "id": 104, "content": "[P]" },
                { "id": 105, "content": "[E]" },
                { "id": 106, "content": "[SEP_TEXT]" },
                { "id": 107, "content": "(" },
                { "id": 108, "content": ")" },
                { "id": 109, "content": "entities" },
            ]
        });
        let (vocab, added) = Vocab::from_json(&vocab_json.to_string()).unwrap();
        let mut specials = HashMap::new();
        for (content, id) in added {
            specials.insert(content, id);
        }
        Tokenizer {
            vocab,
            specials: RwLock::new(specials),
            max_length: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::test_tokenizer;
    use super::*;

    #[test]
    fn encode_wraps_with_cls_and_sep() {
        let tokenizer = test_tokenizer();
        let out = tokenizer.encode("jane works", false).unwrap();
        assert_eq!(out.input_ids.first(), Some(&tokenizer.cls_id()));
        assert_eq!(out.input_ids.last(), Some(&tokenizer.sep_id()));
        assert_eq!(out.word_spans.len(), 2);
    }

    #[test]
    fn encode_pads_to_max_length_when_requested() {
        let tokenizer = test_tokenizer();
        let out = tokenizer.encode("hi", true).unwrap();
        assert_eq!(out.input_ids.len(), tokenizer.max_length());
        assert_eq!(out.attention_mask.len(), tokenizer.max_length());
        assert_eq!(out.attention_mask.iter().filter(|&&m| m == 0).count() > 0, true);
    }

    #[test]
    fn encode_prompted_has_entity_markers_and_word_mask() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string(), "company".to_string()];
        let out = tokenizer.encode_prompted("jane works", &labels, false).unwrap();
        assert_eq!(out.input_ids.first(), Some(&tokenizer.cls_id()));
        assert_eq!(out.input_ids.last(), Some(&tokenizer.sep_id()));
        assert_eq!(out.entity_marker_indices.len(), 2);
        for &idx in &out.entity_marker_indices {
            assert_eq!(out.input_ids[idx], tokenizer.special_id("[E]").unwrap());
        }
        assert_eq!(out.text_word_ranges.len(), 2);
        // exactly one nonzero word_mask entry per text word, 1-based.
        let nonzero: Vec<u32> = out.word_mask.iter().copied().filter(|&m| m != 0).collect();
        assert_eq!(nonzero, vec![1, 2]);
    }

    #[test]
    fn encode_prompted_pads_to_max_length_when_requested() {
        let tokenizer = test_tokenizer();
        let labels = vec!["person".to_string()];
        let out = tokenizer.encode_prompted("hi", &labels, true).unwrap();
        assert_eq!(out.input_ids.len(), tokenizer.max_length());
        assert_eq!(out.word_mask.len(), tokenizer.max_length());
        assert_eq!(out.attention_mask.iter().filter(|&&m| m == 0).count() > 0, true);
    }

    #[test]
    fn register_special_overrides_lookup() {
        let tokenizer = test_tokenizer();
        tokenizer.register_special("[P]", 999);
        assert_eq!(tokenizer.special_id("[P]"), Some(999));
    }

    #[test]
    fn rejects_zero_max_length_at_load_shape() {
        // max_length validation happens in load(); exercised indirectly via
        // encode() honoring max_length() here since load() needs a real dir.
        let tokenizer = test_tokenizer();
        assert!(tokenizer.max_length() > 0);
    }
}
