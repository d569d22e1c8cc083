//! Span Decoder (`spec.md` §4.7).
//!
//! Sigmoid + threshold, sort by probability, greedily suppress any
//! candidate overlapping an already-accepted one regardless of label, then
//! re-sort for deterministic output. The greedy accept-in-score-order shape
//! mirrors `xd_tts::phonemes::best_match_for_unit`'s pattern of scanning a
//! sorted candidate list and keeping the first structurally valid one.

use std::ops::Range;

use ndarray::Array3;

use crate::entity::Entity;

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    start_word: usize,
    end_word: usize,
    label_index: usize,
    prob: f32,
}

/// Decodes `scores[words, width, labels]` into entities, given the caller's
/// `labels`, `threshold`, the source `text`, and each word's character
/// range. Empty inputs return an empty list without error, per `spec.md`
/// §4.7 and §7.
pub fn decode(
    scores: &Array3<f32>,
    labels: &[String],
    threshold: f32,
    text: &str,
    text_word_ranges: &[Range<usize>],
) -> Vec<Entity> {
    let words = scores.shape()[0];
    let width = scores.shape()[1];
    let n_labels = scores.shape()[2];

    if words == 0 || text_word_ranges.is_empty() || n_labels == 0 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for start_word in 0..words {
        for w in 0..width {
            let end_word = start_word + w;
            if end_word >= text_word_ranges.len() {
                continue;
            }
            for label_index in 0..n_labels {
                let prob = sigmoid(scores[[start_word, w, label_index]]);
                if prob >= threshold {
                    candidates.push(Candidate {
                        start_word,
                        end_word,
                        label_index,
                        prob,
                    });
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal));

    let mut accepted: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = accepted.iter().any(|a| {
            candidate.start_word <= a.end_word && a.start_word <= candidate.end_word
        });
        if !overlaps {
            accepted.push(candidate);
        }
    }

    accepted.sort_by(|a, b| {
        a.start_word
            .cmp(&b.start_word)
            .then_with(|| b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal))
    });

    accepted
        .into_iter()
        .filter_map(|c| {
            let char_start = text_word_ranges.get(c.start_word)?.start as u32;
            let char_end = text_word_ranges.get(c.end_word)?.end as u32;
            let label = labels.get(c.label_index)?.clone();
            let entity_text = text.get(char_start as usize..char_end as usize)?.to_string();
            Some(Entity::new(entity_text, label, c.prob, char_start, char_end))
        })
        .collect()
}
