//! Classical SentencePiece Viterbi segmentation (`spec.md` §4.2).
//!
//! Operates over a normalised character sequence and a [`Vocab`], producing
//! an ordered list of `(id, surface)` pieces. Scratch buffers (the DP score
//! array and back-pointer arrays) are kept in thread-local storage and
//! reused across calls on the same thread, the way the teacher keeps
//! per-thread reusable work arrays for its hot text path (`spec.md` §4.2/§9
//! "Per-call scratch buffers").

use std::cell::RefCell;

use super::vocab::Vocab;

/// One decoded subword piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    pub id: u32,
    pub surface: String,
}

/// Score assigned to the synthetic single-character fallback edge inserted
/// at any position with no vocabulary match at all. Finite (not
/// `NEG_INFINITY`) so DP comparisons stay well-defined, but low enough that
/// a real vocabulary match is always preferred when one exists.
const UNK_EDGE_SCORE: f64 = -1.0e6;

thread_local! {
    static SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::default());
}

#[derive(Default)]
struct Scratch {
    best_score: Vec<f64>,
    back_pos: Vec<Option<usize>>,
    back_len: Vec<usize>,
}

impl Scratch {
    fn reset(&mut self, n: usize) {
        self.best_score.clear();
        self.best_score.resize(n + 1, f64::NEG_INFINITY);
        self.best_score[0] = 0.0;
        self.back_pos.clear();
        self.back_pos.resize(n + 1, None);
        self.back_len.clear();
        self.back_len.resize(n + 1, 0);
    }
}

/// Runs Viterbi segmentation over `text` (already normalised) against
/// `vocab`, returning the highest-total-log-probability segmentation into
/// vocabulary pieces. A start position with no vocabulary match at any
/// length gets a synthetic single-character fallback edge; a position that
/// ends up with no back-pointer at all (should not occur given that
/// fallback, but handled defensively per `spec.md` §4.2) emits a
/// one-character `[UNK]` piece at backtrack time.
pub fn segment(text: &str, vocab: &Vocab) -> Vec<Piece> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    SCRATCH.with(|scratch| {
        let mut scratch = scratch.borrow_mut();
        scratch.reset(n);

        for i in 0..n {
            let max_len = vocab.max_piece_len.min(n - i);
            let mut matched_any = false;
            for len in 1..=max_len {
                let piece: String = chars[i..i + len].iter().collect();
                if let Some(score) = vocab.score_for(&piece) {
                    matched_any = true;
                    let candidate = scratch.best_score[i] + score;
                    if candidate > scratch.best_score[i + len] {
                        scratch.best_score[i + len] = candidate;
                        scratch.back_pos[i + len] = Some(i);
                        scratch.back_len[i + len] = len;
                    }
                }
            }
            if !matched_any {
                let candidate = scratch.best_score[i] + UNK_EDGE_SCORE;
                if candidate > scratch.best_score[i + 1] {
                    scratch.best_score[i + 1] = candidate;
                    scratch.back_pos[i + 1] = Some(i);
                    scratch.back_len[i + 1] = 1;
                }
            }
        }

        let mut pieces_rev = Vec::new();
        let mut pos = n;
        while pos > 0 {
            match scratch.back_pos[pos] {
                Some(start) => {
                    let len = scratch.back_len[pos];
                    let surface: String = chars[start..start + len].iter().collect();
                    let id = vocab.id_for(&surface).unwrap_or(vocab.unk_id);
                    pieces_rev.push(Piece { id, surface });
                    pos = start;
                }
                None => {
                    let start = pos - 1;
                    let surface: String = chars[start..pos].iter().collect();
                    pieces_rev.push(Piece {
                        id: vocab.unk_id,
                        surface,
                    });
                    pos = start;
                }
            }
        }

        pieces_rev.reverse();
        pieces_rev
    })
}
