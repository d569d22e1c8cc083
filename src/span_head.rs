//! Span-head metadata loader (`spec.md` §6).
//!
//! A small JSON sidecar declaring the shape constants and special-token IDs
//! the GLiNER2 head expects beyond the base tokenizer vocabulary. Loaded
//! once per tokenizer directory and cached alongside it (`spec.md` §3,
//! "Caches") by [`crate::caches::get_or_load_tokenizer`], the same
//! stateless-reader-plus-cache-one-layer-up split [`crate::manifest::Manifest`]
//! uses.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NerError, Result};
use crate::tokenizer::Tokenizer;

/// Names of the GLiNER2-specific markers registered on top of the base
/// vocabulary's required specials (`spec.md` §4.2: "a model-wide marker
/// token, the entity-class marker, a separator marker").
pub const PROMPT_MARKER: &str = "[P]";
pub const ENTITY_MARKER: &str = "[E]";
pub const SEP_STRUCT_MARKER: &str = "[SEP_STRUCT]";
pub const SEP_TEXT_MARKER: &str = "[SEP_TEXT]";

#[derive(Deserialize)]
pub struct SpanHeadMetadata {
    pub hidden_size: usize,
    pub max_width: usize,
    pub class_token_index: usize,
    pub ent_token: u32,
    pub sep_token: u32,
    #[serde(default)]
    pub special_tokens: HashMap<String, u32>,
}

impl SpanHeadMetadata {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NerError::resource_with(
                format!("reading span-head metadata at {}", path.display()),
                anyhow::Error::new(e),
            )
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let metadata: Self = serde_json::from_str(contents).map_err(|e| {
            NerError::resource_with("span-head metadata is not valid JSON", anyhow::Error::new(e))
        })?;
        if metadata.hidden_size == 0 {
            return Err(NerError::resource("span-head metadata hidden_size must be > 0"));
        }
        if metadata.max_width == 0 {
            return Err(NerError::resource("span-head metadata max_width must be > 0"));
        }
        Ok(metadata)
    }

    /// Registers every declared special token on `tokenizer`, plus the three
    /// GLiNER2 markers the schema formatter looks up by name. The separator
    /// marker is shared between `[SEP_STRUCT]` (between schema groups) and
    /// `[SEP_TEXT]` (before text words) since the metadata declares only one
    /// separator marker id.
    pub fn register_specials(&self, tokenizer: &Tokenizer) {
        for (name, id) in &self.special_tokens {
            tokenizer.register_special(name, *id);
        }
        if let Some(&prompt_id) = self.special_tokens.get(PROMPT_MARKER) {
            tokenizer.register_special(PROMPT_MARKER, prompt_id);
        }
        tokenizer.register_special(ENTITY_MARKER, self.ent_token);
        tokenizer.register_special(SEP_STRUCT_MARKER, self.sep_token);
        tokenizer.register_special(SEP_TEXT_MARKER, self.sep_token);
    }
}
