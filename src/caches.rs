//! Process-wide tokenizer-directory cache (`spec.md` §3 "Caches", §5
//! "Shared mutable state"). Built lazily on first use, keyed by canonical
//! tokenizer directory path, never evicted — the loaded tokenizer plus its
//! span-head metadata are pure functions of the directory's contents, so
//! memoising them process-wide is safe for the lifetime of the process.
//! The manifest itself is read fresh on every [`crate::manifest::Manifest::load`]
//! call (`spec.md` §3/§5 require caching only the tokenizer, not the
//! manifest); this is the one cache that actually exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::Result;
use crate::span_head::SpanHeadMetadata;
use crate::tokenizer::Tokenizer;

/// A loaded tokenizer plus the span-head metadata registered onto it.
pub struct LoadedTokenizer {
    pub tokenizer: Tokenizer,
    pub span_head: SpanHeadMetadata,
}

static TOKENIZER_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<LoadedTokenizer>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Loads (or returns the cached) tokenizer + span-head metadata for
/// `tokenizer_dir`. The span-head descriptor is expected at
/// `tokenizer_dir/span_head.json`.
pub fn get_or_load_tokenizer(tokenizer_dir: &Path, max_length: usize) -> Result<Arc<LoadedTokenizer>> {
    let key = tokenizer_dir
        .canonicalize()
        .unwrap_or_else(|_| tokenizer_dir.to_path_buf());

    {
        let cache = TOKENIZER_CACHE.lock().expect("tokenizer cache poisoned");
        if let Some(existing) = cache.get(&key) {
            debug!(dir = %key.display(), "tokenizer cache hit");
            return Ok(Arc::clone(existing));
        }
    }

    debug!(dir = %key.display(), "tokenizer cache miss, loading from disk");
    let tokenizer = Tokenizer::load(tokenizer_dir, max_length)?;
    let span_head = SpanHeadMetadata::load(tokenizer_dir.join("span_head.json"))?;
    span_head.register_specials(&tokenizer);

    let loaded = Arc::new(LoadedTokenizer { tokenizer, span_head });

    let mut cache = TOKENIZER_CACHE.lock().expect("tokenizer cache poisoned");
    let entry = cache.entry(key).or_insert_with(|| Arc::clone(&loaded));
    Ok(Arc::clone(entry))
}
