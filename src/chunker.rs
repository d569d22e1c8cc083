//! Chunker + Merger (`spec.md` §4.8).
//!
//! Splits long inputs into overlapping character windows so each window
//! fits the tokenizer/backend capacity, then merges per-chunk entities back
//! into one deduplicated list ordered by `start` ascending. The boundary-preference
//! (newline, then whitespace, then hard cut) mirrors
//! `xd_tts::text_normaliser`'s habit of preferring a natural break over a
//! blind character cut when splitting text for the TTS front end.

use std::collections::HashSet;

use crate::config::ChunkerConfig;
use crate::entity::Entity;
use crate::tokenizer::split_words;

/// A chunk of the original text plus its `[char_start, char_end)` range in
/// that original text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

fn word_count(text: &str) -> usize {
    split_words(text).len()
}

/// `spec.md` §4.8: true iff `text` has more words than `max_words`.
pub fn should_chunk(text: &str, config: &ChunkerConfig) -> bool {
    word_count(text) > config.max_words
}

fn trim_range(text: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && text.as_bytes()[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && text.as_bytes()[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

fn preferred_end(text: &str, window_start: usize, window_end: usize) -> usize {
    let window = &text[window_start..window_end];
    if let Some(pos) = window.rfind('\n') {
        return window_start + pos + 1;
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        return window_start + pos + 1;
    }
    window_end
}

fn shrink_to_word_limit(text: &str, start: usize, mut end: usize, max_words: usize) -> usize {
    while end > start && word_count(&text[start..end]) > max_words {
        let shrunk = match text[start..end].trim_end().rfind(char::is_whitespace) {
            Some(pos) => start + pos,
            None => break,
        };
        if shrunk >= end {
            break;
        }
        end = shrunk;
    }
    end
}

/// Splits `text` into non-empty [`TextChunk`]s per `spec.md` §4.8.
pub fn chunk(text: &str, config: &ChunkerConfig) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let len = text.len();
    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    while cursor < len {
        let window_end = (cursor + config.max_chars).min(len);
        let mut end = if window_end < len {
            preferred_end(text, cursor, window_end)
        } else {
            window_end
        };
        if end <= cursor {
            end = window_end;
        }
        end = shrink_to_word_limit(text, cursor, end, config.max_words);
        if end <= cursor {
            end = window_end.max(cursor + 1).min(len);
        }

        let (trimmed_start, trimmed_end) = trim_range(text, cursor, end);
        if trimmed_end > trimmed_start {
            chunks.push(TextChunk {
                text: text[trimmed_start..trimmed_end].to_string(),
                char_start: trimmed_start,
                char_end: trimmed_end,
            });
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(config.overlap_chars);
        cursor = if next > cursor { next } else { end };
    }

    chunks
}

/// Merges per-chunk entity lists (`spec.md` §4.8): sort by score descending
/// so deduplication keeps the higher-scoring survivor, deduplicate
/// case-insensitive identical text across any label (`spec.md` §8) and
/// same-label overlapping character ranges, then re-sort the survivors by
/// `start` ascending (ties by score descending) to satisfy the externally
/// visible ordering `spec.md` §8 and its scenario 3 both require.
pub fn merge(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<Entity> = Vec::new();
    let mut seen_text: HashSet<String> = HashSet::new();

    'outer: for entity in entities {
        let lower_text = entity.text.to_lowercase();
        if seen_text.contains(&lower_text) {
            continue;
        }
        for existing in &kept {
            if existing.label == entity.label && existing.overlaps(&entity) {
                continue 'outer;
            }
        }
        seen_text.insert(lower_text);
        kept.push(entity);
    }

    kept.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });
    kept
}
