//! Error taxonomy for the GLiNER2 runtime.
//!
//! Every stage of the pipeline fails into one of the kinds below rather than
//! a bare string error, so callers can branch on *what kind* of thing went
//! wrong (a bad manifest vs. a bad label list vs. a backend shape mismatch)
//! without parsing messages.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NerError>;

/// Sum-type error taxonomy. See `spec.md` §7 for the kind definitions this
/// mirrors.
#[derive(Debug, thiserror::Error)]
pub enum NerError {
    /// Manifest missing, artifact path unresolved, tokenizer directory
    /// absent, or a required special token absent from the vocabulary.
    #[error("resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Unsupported tokenizer model type, invalid `max_length`, unknown
    /// special token at encode time, or an encoded sequence that exceeds
    /// `max_length` when padding was requested.
    #[error("tokenizer error: {message}")]
    Tokenizer { message: String },

    /// Sequence-length / hidden-size / mask-length mismatches between
    /// stages, a missing first-subword mapping for a word, a prompt
    /// location with an empty or out-of-range subword span, or a
    /// class-token count below `|labels|`.
    #[error("encoding error in stage '{stage}': {message}")]
    Encoding { stage: &'static str, message: String },

    /// Empty labels when text was provided, label count exceeding schema
    /// capacity, a malformed span-index tensor shape, or an embedding row
    /// width mismatch.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A backend output tensor of unexpected rank/dtype, or a missing
    /// expected feature name.
    #[error("invalid output from stage '{stage}': {message}")]
    InvalidOutput { stage: &'static str, message: String },

    /// Cooperative cancellation fired between pipeline stages.
    #[error("cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },
}

impl NerError {
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            source: None,
        }
    }

    pub fn resource_with(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Resource {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn missing_artifact(which: &str, path: &PathBuf) -> Self {
        Self::resource(format!(
            "manifest is missing artifact '{which}' (resolved path: {})",
            path.display()
        ))
    }

    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    pub fn encoding(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Encoding {
            stage,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_output(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            stage,
            message: message.into(),
        }
    }
}
