//! Word splitting (`spec.md` §3 "Word").
//!
//! A word is either a contiguous run of letters/digits (allowing internal
//! `-`/`_` joiners, so "state-of-the-art" and "snake_case" are each one
//! word) or a single non-whitespace character (so punctuation becomes its
//! own word-level span boundary). Whitespace is never itself a word.

/// A word and the byte range `[start, end)` it occupies in the text it was
/// split from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Splits `text` into [`Word`]s, each carrying its original byte range.
pub fn split_words(text: &str) -> Vec<Word> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let mut words = Vec::new();
    let mut i = 0;

    while i < n {
        let (byte_pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if is_word_char(c) {
            let start = byte_pos;
            let mut last_end = byte_pos + c.len_utf8();
            let mut j = i + 1;
            loop {
                if j >= n {
                    break;
                }
                let (bp, cc) = chars[j];
                if is_word_char(cc) {
                    last_end = bp + cc.len_utf8();
                    j += 1;
                } else if (cc == '-' || cc == '_') && j + 1 < n && is_word_char(chars[j + 1].1) {
                    last_end = bp + cc.len_utf8();
                    j += 1;
                } else {
                    break;
                }
            }
            words.push(Word {
                text: text[start..last_end].to_string(),
                start,
                end: last_end,
            });
            i = j;
        } else {
            let start = byte_pos;
            let end = byte_pos + c.len_utf8();
            words.push(Word {
                text: text[start..end].to_string(),
                start,
                end,
            });
            i += 1;
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace_and_keeps_internal_joiners() {
        let words = split_words("state-of-the-art snake_case plain");
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["state-of-the-art", "snake_case", "plain"]);
    }

    #[test]
    fn punctuation_becomes_single_char_words() {
        let words = split_words("ACME Corp hired Jane Doe in Paris.");
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["ACME", "Corp", "hired", "Jane", "Doe", "in", "Paris", "."]
        );
    }

    #[test]
    fn trailing_hyphen_is_its_own_word() {
        let words = split_words("wait- go");
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["wait", "-", "go"]);
    }

    #[test]
    fn ranges_point_back_into_original_text() {
        let text = "Hi there";
        let words = split_words(text);
        assert_eq!(&text[words[1].start..words[1].end], "there");
    }

    #[test]
    fn empty_text_has_no_words() {
        assert!(split_words("   ").is_empty());
    }
}
