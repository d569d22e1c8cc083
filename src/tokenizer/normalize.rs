//! Normalisation pipeline applied before SentencePiece Viterbi tokenization
//! (`spec.md` §4.2).
//!
//! Each step is a small standalone function so the pipeline order is
//! visible at the call site and individually testable, the way
//! `xd_tts::text_normaliser` keeps each normalisation rule as its own
//! function rather than one large pass.

use unicode_normalization::UnicodeNormalization;

/// The SentencePiece word-continuation marker, U+2581 LOWER ONE EIGHTH
/// BLOCK ("▁").
pub const SPM_SPACE: char = '\u{2581}';

/// Runs the full five-step pipeline from `spec.md` §4.2 on raw input text.
pub fn normalize(text: &str) -> String {
    let trimmed = strip_whitespace(text);
    let nfkc = nfkc(&trimmed);
    let collapsed = collapse_whitespace(&nfkc);
    let prefixed = prepend_space(&collapsed);
    replace_spaces_with_marker(&prefixed)
}

fn strip_whitespace(text: &str) -> String {
    text.trim().to_string()
}

fn nfkc(text: &str) -> String {
    text.nfkc().collect()
}

/// Collapses any run of whitespace — including ideographic space U+3000 and
/// BOM U+FEFF, which `char::is_whitespace` does not treat as whitespace on
/// their own — into a single ASCII space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if is_collapsible_whitespace(c) {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn is_collapsible_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{3000}' || c == '\u{FEFF}'
}

fn prepend_space(text: &str) -> String {
    if text.is_empty() || text.starts_with(' ') {
        text.to_string()
    } else {
        format!(" {text}")
    }
}

fn replace_spaces_with_marker(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' { SPM_SPACE } else { c })
        .collect()
}
