//! On-device zero-shot named-entity recognition runtime built around the
//! GLiNER2 model family.
//!
//! The public entry point is [`Ner`]: load a manifest, then call
//! [`Ner::extract_entities`] with a passage of text and a caller-supplied
//! list of entity type labels. See `DESIGN.md` for how each module here
//! grounds in the teacher/example corpus this crate was built from.

use std::env;
use std::sync::Arc;
use std::time::Instant;

use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, Registry};

pub mod backend;
pub mod caches;
pub mod chunker;
pub mod config;
pub mod entity;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod span_head;
pub mod tokenizer;

pub use config::NerConfig;
pub use entity::Entity;

use backend::ort_backend::OrtBackend;
use backend::InferenceBackend;
use caches::LoadedTokenizer;
use chunker::TextChunk;
use error::{NerError, Result};
use manifest::Manifest;
use tokenizer::SchemaEncoding;

/// Convenience function for any binary built on this crate. Sets the crate
/// and any `info`-level default, honouring `RUST_LOG` when set.
pub fn setup_logging() {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_env("RUST_LOG"),
        _ => EnvFilter::new("gliner2_ner=info"),
    };

    let fmt = tracing_subscriber::fmt::Layer::default();
    let subscriber = filter.and_then(fmt).with_subscriber(Registry::default());
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A cooperative cancellation probe: returns `true` once the surrounding
/// runtime wants the in-flight call abandoned (`spec.md` §5). Checked at
/// stage boundaries only; never polled mid-stage, since a single backend
/// call is not interruptible.
pub type CancellationCheck = Arc<dyn Fn() -> bool + Send + Sync>;

fn check_cancelled(stage: &'static str, should_cancel: Option<&CancellationCheck>) -> Result<()> {
    if should_cancel.map(|f| f()).unwrap_or(false) {
        return Err(NerError::Cancelled { stage });
    }
    Ok(())
}

/// The top-level handle: immutable after construction, freely shareable
/// across threads (`spec.md` §5). Owns the manifest, the cached tokenizer
/// handle, the backend adapters, and the resolved configuration.
pub struct Ner {
    manifest: Manifest,
    tokenizer: Arc<LoadedTokenizer>,
    backend: Arc<dyn InferenceBackend>,
    config: NerConfig,
}

impl Ner {
    /// Loads the manifest, compiles the five backend modules, and loads
    /// (or reuses a cached) tokenizer. This constructor is the only
    /// blocking initialisation point (`spec.md` §5).
    pub fn new(manifest_path: impl AsRef<std::path::Path>, config: NerConfig) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        info!(model_id = %manifest.model_id, "loading GLiNER2 model");

        let tokenizer = caches::get_or_load_tokenizer(&manifest.tokenizer_dir, manifest.max_seq_len)?;
        let backend: Arc<dyn InferenceBackend> = Arc::new(OrtBackend::load(&manifest.artifacts)?);

        Ok(Self {
            manifest,
            tokenizer,
            backend,
            config,
        })
    }

    /// Builds an [`Ner`] from already-constructed parts; used by tests that
    /// substitute a [`backend::mock::MockBackend`] for the real ONNX
    /// Runtime adapters.
    #[cfg(test)]
    fn from_parts(manifest: Manifest, tokenizer: Arc<LoadedTokenizer>, backend: Arc<dyn InferenceBackend>, config: NerConfig) -> Self {
        Self {
            manifest,
            tokenizer,
            backend,
            config,
        }
    }

    /// Extracts labelled entity spans from `text` given `labels`. An
    /// explicit `threshold` overrides the configured default for this call
    /// only. Empty text or an empty label list return an empty list
    /// without error (`spec.md` §7).
    pub fn extract_entities(&self, text: &str, labels: &[String], threshold: Option<f32>) -> Result<Vec<Entity>> {
        self.extract_entities_cancellable(text, labels, threshold, None)
    }

    /// As [`Self::extract_entities`], but checks `should_cancel` at every
    /// stage boundary and returns `NerError::Cancelled` at the next
    /// boundary without running further backend calls if it returns `true`
    /// (`spec.md` §5 "Cancellation"). No partial entities are ever
    /// returned on cancellation.
    pub fn extract_entities_cancellable(
        &self,
        text: &str,
        labels: &[String],
        threshold: Option<f32>,
        should_cancel: Option<&CancellationCheck>,
    ) -> Result<Vec<Entity>> {
        if text.is_empty() || labels.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let threshold = threshold.unwrap_or(self.config.threshold);
        let chunker_cfg = &self.config.chunker;

        let chunks: Vec<TextChunk> = if chunker::should_chunk(text, chunker_cfg) {
            let chunks = chunker::chunk(text, chunker_cfg);
            debug!(chunks = chunks.len(), chars = text.len(), "split input into chunks");
            chunks
        } else {
            vec![TextChunk {
                text: text.to_string(),
                char_start: 0,
                char_end: text.len(),
            }]
        };

        let mut all_entities = Vec::new();
        for chunk in &chunks {
            check_cancelled("chunk", should_cancel)?;
            let entities = self.extract_from_chunk(chunk, labels, threshold, should_cancel)?;
            all_entities.extend(entities);
        }

        let merged = chunker::merge(all_entities);
        if merged.is_empty() {
            warn!(labels = labels.len(), threshold = threshold as f64, "no entities above threshold");
        }
        info!(
            entities = merged.len(),
            chunks = chunks.len(),
            elapsed = ?start.elapsed(),
            "extract_entities finished"
        );
        Ok(merged)
    }

    fn extract_from_chunk(
        &self,
        chunk: &TextChunk,
        labels: &[String],
        threshold: f32,
        should_cancel: Option<&CancellationCheck>,
    ) -> Result<Vec<Entity>> {
        if labels.len() > self.manifest.max_schema_tokens {
            return Err(NerError::invalid_input(format!(
                "{} labels exceed schema capacity of {}",
                labels.len(),
                self.manifest.max_schema_tokens
            )));
        }

        let tokenizer = &self.tokenizer.tokenizer;
        let encoding = tokenizer.encode_gliner2_schema(&chunk.text, labels, self.config.max_span_length)?;

        check_cancelled("encoder", should_cancel)?;
        let hidden_states = self.run_encoder(&encoding)?;

        check_cancelled("span_pipeline", should_cancel)?;
        let pipeline_out = pipeline::run(
            self.backend.as_ref(),
            &self.config,
            self.manifest.hidden_size,
            self.manifest.max_count,
            &encoding,
            &hidden_states,
        )?;

        check_cancelled("score_builder", should_cancel)?;
        let scores = pipeline::score::build_scores(
            &pipeline_out.span_emb,
            &pipeline_out.span_mask,
            &pipeline_out.structure_emb,
            pipeline_out.predicted_count,
            labels.len(),
        );

        check_cancelled("decoder", should_cancel)?;
        let local_entities = pipeline::decoder::decode(&scores, labels, threshold, &chunk.text, &encoding.text_word_ranges);
        debug!(chunk_entities = local_entities.len(), chunk_chars = chunk.text.len(), "decoded chunk");

        Ok(local_entities
            .into_iter()
            .map(|e| {
                let start = e.start + chunk.char_start as u32;
                let end = e.end + chunk.char_start as u32;
                Entity::new(e.text, e.label, e.score, start, end)
            })
            .collect())
    }

    fn run_encoder(&self, encoding: &SchemaEncoding) -> Result<ArrayD<f32>> {
        let input_ids: Vec<i32> = encoding.input_ids.iter().map(|&id| id as i32).collect();
        let attention_mask: Vec<i32> = encoding.attention_mask.iter().map(|&m| m as i32).collect();
        let seq_len = input_ids.len();

        debug!(seq_len, "running encoder");

        let input_ids = ArrayD::from_shape_vec(IxDyn(&[1, seq_len]), input_ids)
            .map_err(|e| NerError::encoding("encoder", format!("shaping input_ids: {e}")))?;
        let attention_mask = ArrayD::from_shape_vec(IxDyn(&[1, seq_len]), attention_mask)
            .map_err(|e| NerError::encoding("encoder", format!("shaping attention_mask: {e}")))?;

        self.backend.encoder(&input_ids, &attention_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::mock::MockBackend;
    use manifest::ArtifactPaths;
    use std::path::PathBuf;

    fn test_ner(backend: MockBackend) -> Ner {
        let tokenizer = crate::tokenizer::testutil::test_tokenizer();
        let span_head = crate::span_head::SpanHeadMetadata::from_json(
            r#"{"hidden_size":4,"max_width":2,"class_token_index":0,"ent_token":105,"sep_token":106}"#,
        )
        .unwrap();
        let loaded = Arc::new(LoadedTokenizer { tokenizer, span_head });

        let manifest = Manifest::for_test(
            "test",
            64,
            32,
            2,
            4,
            4,
            ArtifactPaths {
                encoder: PathBuf::new(),
                span_rep: PathBuf::new(),
                classifier: PathBuf::new(),
                count_predictor: PathBuf::new(),
                count_embed: PathBuf::new(),
            },
            PathBuf::new(),
        );

        let config = NerConfig {
            max_sequence_length: 16,
            max_span_length: 2,
            ..Default::default()
        };

        Ner::from_parts(manifest, loaded, Arc::new(backend), config)
    }

    #[test]
    fn empty_text_returns_empty() {
        let ner = test_ner(MockBackend { hidden_size: 4, max_count: 4 });
        let out = ner.extract_entities("", &["person".to_string()], None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_labels_returns_empty() {
        let ner = test_ner(MockBackend { hidden_size: 4, max_count: 4 });
        let out = ner.extract_entities("John Smith works at Apple.", &[], None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn extracts_against_mock_backend_without_erroring() {
        let ner = test_ner(MockBackend { hidden_size: 4, max_count: 4 });
        let out = ner.extract_entities("Jane works", &["person".to_string()], Some(0.1));
        assert!(out.is_ok());
    }

    #[test]
    fn cancellation_check_aborts_before_any_backend_call() {
        let ner = test_ner(MockBackend { hidden_size: 4, max_count: 4 });
        let should_cancel: CancellationCheck = Arc::new(|| true);
        let out = ner.extract_entities_cancellable(
            "Jane works",
            &["person".to_string()],
            Some(0.1),
            Some(&should_cancel),
        );
        assert!(matches!(out, Err(NerError::Cancelled { .. })));
    }

    #[test]
    fn too_many_labels_is_invalid_input() {
        let ner = test_ner(MockBackend { hidden_size: 4, max_count: 4 });
        let labels: Vec<String> = (0..64).map(|i| format!("label{i}")).collect();
        let out = ner.extract_entities("Jane works", &labels, None);
        assert!(matches!(out, Err(NerError::InvalidInput { .. })));
    }
}
