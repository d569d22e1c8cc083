//! Caller-facing configuration. See `spec.md` §6.

use serde::{Deserialize, Serialize};

/// Similarity metric reserved for the legacy pooled-embedding fallback path.
/// Not read by the GLiNER2 entity decoder (`spec.md` §9 Design Notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
    Dot,
}

/// Pooling strategy reserved for the legacy pooled-embedding fallback path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMethod {
    Mean,
    Max,
    Concat,
}

/// Chunking knobs for the Chunker (`spec.md` §4.8).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub max_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1600,
            overlap_chars: 200,
            max_words: 240,
        }
    }
}

/// Every recognised configuration option from `spec.md` §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    /// Global sigmoid cutoff applied by the Span Decoder.
    pub threshold: f32,
    /// Must equal the backend's compiled sequence capacity.
    pub max_sequence_length: usize,
    /// Maximum span width `W` considered by the Span Pipeline.
    pub max_span_length: usize,
    /// Chunk advance distance used only by callers that drive the chunker
    /// manually with a stride distinct from `chunker.overlap_chars`.
    pub stride_length: usize,
    pub chunker: ChunkerConfig,
    /// Reserved for the legacy fallback path; unused by the GLiNER2 decoder.
    pub similarity_metric: SimilarityMetric,
    /// Reserved for the legacy fallback path; unused by the GLiNER2 decoder.
    pub pooling_method: PoolingMethod,
    /// Reserved IoU threshold for the legacy NMS path; the GLiNER2 decoder
    /// uses strict interval overlap instead (see `pipeline::decoder`).
    pub nms_threshold: f32,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_sequence_length: 384,
            max_span_length: 8,
            stride_length: 192,
            chunker: ChunkerConfig::default(),
            similarity_metric: SimilarityMetric::Dot,
            pooling_method: PoolingMethod::Mean,
            nms_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = NerConfig::default();
        assert_eq!(cfg.threshold, 0.3);
        assert_eq!(cfg.max_sequence_length, 384);
        assert_eq!(cfg.max_span_length, 8);
        assert_eq!(cfg.stride_length, 192);
        assert_eq!(cfg.chunker.max_chars, 1600);
        assert_eq!(cfg.chunker.overlap_chars, 200);
        assert_eq!(cfg.chunker.max_words, 240);
        assert_eq!(cfg.nms_threshold, 0.5);
    }
}
