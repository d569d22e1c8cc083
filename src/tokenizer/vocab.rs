//! Loads a SentencePiece Unigram vocabulary from a tokenizer directory
//! (`spec.md` §6 "Tokenizer directory").
//!
//! Mirrors the shape of `xd_tts::cmu_dict::CmuDictionary`: a thin I/O entry
//! point (`Vocab::open`) delegating to a reader/struct-based constructor
//! (`Vocab::from_json`) so tests exercise the parser directly without
//! touching the filesystem.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NerError, Result};

#[derive(Deserialize)]
struct TokenizerJson {
    model: ModelJson,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
}

#[derive(Deserialize)]
struct ModelJson {
    #[serde(rename = "type")]
    model_type: String,
    vocab: Vec<(String, f64)>,
    unk_id: usize,
}

#[derive(Deserialize)]
struct AddedToken {
    id: u32,
    content: String,
}

/// A single SentencePiece Unigram vocabulary entry.
#[derive(Clone, Debug)]
pub struct VocabEntry {
    pub surface: String,
    pub log_prob: f64,
}

/// The Unigram vocabulary plus the id<->surface maps needed for encoding
/// and decoding.
#[derive(Clone, Debug)]
pub struct Vocab {
    entries: Vec<VocabEntry>,
    surface_to_id: HashMap<String, u32>,
    pub unk_id: u32,
    pub max_piece_len: usize,
}

impl Vocab {
    /// Locates and parses the tokenizer JSON file inside `tokenizer_dir`,
    /// per `spec.md` §6: either `tokenizer/tokenizer.json` or
    /// `tokenizer.json` directly inside the directory.
    pub fn open(tokenizer_dir: impl AsRef<Path>) -> Result<(Self, Vec<(String, u32)>)> {
        let tokenizer_dir = tokenizer_dir.as_ref();
        let candidates = [
            tokenizer_dir.join("tokenizer").join("tokenizer.json"),
            tokenizer_dir.join("tokenizer.json"),
        ];
        let path = candidates
            .iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                NerError::resource(format!(
                    "no tokenizer.json found under {} (looked for tokenizer/tokenizer.json and tokenizer.json)",
                    tokenizer_dir.display()
                ))
            })?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            NerError::resource_with(
                format!("reading tokenizer file {}", path.display()),
                anyhow::Error::new(e),
            )
        })?;

        Self::from_json(&contents)
    }

    /// Parses the tokenizer JSON body directly; the entry point tests use.
    pub fn from_json(contents: &str) -> Result<(Self, Vec<(String, u32)>)> {
        let parsed: TokenizerJson = serde_json::from_str(contents).map_err(|e| {
            NerError::resource_with("tokenizer.json is not valid JSON", anyhow::Error::new(e))
        })?;

        if parsed.model.model_type != "unigram" {
            return Err(NerError::tokenizer(format!(
                "unsupported tokenizer model type '{}', expected 'unigram'",
                parsed.model.model_type
            )));
        }

        if parsed.model.vocab.is_empty() {
            return Err(NerError::resource("tokenizer vocab is empty"));
        }

        let mut entries = Vec::with_capacity(parsed.model.vocab.len());
        let mut surface_to_id = HashMap::with_capacity(parsed.model.vocab.len());
        let mut max_piece_len = 1;
        for (id, (surface, score)) in parsed.model.vocab.into_iter().enumerate() {
            max_piece_len = max_piece_len.max(surface.chars().count());
            surface_to_id.insert(surface.clone(), id as u32);
            entries.push(VocabEntry {
                surface,
                log_prob: score,
            });
        }

        let unk_id = parsed.model.unk_id as u32;
        if (unk_id as usize) >= entries.len() {
            return Err(NerError::resource(format!(
                "unk_id {unk_id} out of range for vocab of size {}",
                entries.len()
            )));
        }

        let added: Vec<(String, u32)> = parsed
            .added_tokens
            .into_iter()
            .map(|t| (t.content, t.id))
            .collect();

        for (content, id) in &added {
            surface_to_id.insert(content.clone(), *id);
            max_piece_len = max_piece_len.max(content.chars().count());
            let idx = *id as usize;
            if idx >= entries.len() {
                entries.resize(
                    idx + 1,
                    VocabEntry {
                        surface: String::new(),
                        log_prob: f64::NEG_INFINITY,
                    },
                );
            }
            entries[idx] = VocabEntry {
                surface: content.clone(),
                log_prob: 0.0,
            };
        }

        let vocab = Vocab {
            entries,
            surface_to_id,
            unk_id,
            max_piece_len,
        };
        Ok((vocab, added))
    }

    pub fn id_for(&self, surface: &str) -> Option<u32> {
        self.surface_to_id.get(surface).copied()
    }

    pub fn surface_for(&self, id: u32) -> Option<&str> {
        self.entries.get(id as usize).map(|e| e.surface.as_str())
    }

    pub fn score_for(&self, surface: &str) -> Option<f64> {
        self.surface_to_id
            .get(surface)
            .and_then(|&id| self.entries.get(id as usize))
            .map(|e| e.log_prob)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "model": {
                "type": "unigram",
                "unk_id": 0,
                "vocab": [
                    ["<unk>", 0.0],
                    ["▁", -1.0],
                    ["▁hel", -2.0],
                    ["lo", -2.5],
                    ["▁hello", -1.5]
                ]
            },
            "added_tokens": [
                { "id": 100, "content": "[CLS]" },
                { "id": 101, "content": "[SEP]" },
                { "id": 102, "content": "[PAD]" }
            ]
        }"#
    }

    #[test]
    fn parses_vocab_and_added_tokens() {
        let (vocab, added) = Vocab::from_json(sample_json()).unwrap();
        assert_eq!(vocab.len(), 103);
        assert_eq!(vocab.unk_id, 0);
        assert_eq!(vocab.id_for("▁hello"), Some(4));
        assert_eq!(added.len(), 3);
        assert_eq!(vocab.surface_for(100), Some("[CLS]"));
    }

    #[test]
    fn rejects_non_unigram_model() {
        let json = r#"{"model": {"type": "bpe", "unk_id": 0, "vocab": [["a", 0.0]]}}"#;
        let err = Vocab::from_json(json).unwrap_err();
        assert!(matches!(err, NerError::Tokenizer { .. }));
    }
}
