//! ONNX Runtime-backed [`InferenceBackend`] (`spec.md` §4.3).
//!
//! Loads the five module files named by the manifest's [`ArtifactPaths`]
//! into five `ort::Session`s and wraps each in its own `Mutex`, the way
//! `xd_tts::Tacotron2` loads its three graphs up front in `load()` and runs
//! them with `Session::run(inputs![...])`. One mutex per module (rather
//! than one global lock) lets independent adapters run concurrently while
//! still serialising repeated calls into the same module, per the "dedicated
//! queue" requirement in `spec.md` §4.3.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use ndarray::{ArrayD, IxDyn};
use ort::{inputs, CPUExecutionProvider, GraphOptimizationLevel, Session, Value};
use tracing::debug;

use super::{InferenceBackend, STAGE_CLASSIFIER, STAGE_COUNT_EMBED, STAGE_COUNT_PREDICTOR, STAGE_ENCODER, STAGE_SPAN_REP};
use crate::error::{NerError, Result};
use crate::manifest::ArtifactPaths;

pub struct OrtBackend {
    encoder: Mutex<Session>,
    span_rep: Mutex<Session>,
    classifier: Mutex<Session>,
    count_predictor: Mutex<Session>,
    count_embed: Mutex<Session>,
}

fn load_session(path: &Path, name: &str) -> Result<Session> {
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
        .and_then(|b| b.with_model_from_file(path))
        .with_context(|| format!("loading {name} module from {}", path.display()))
        .map_err(|e| NerError::resource_with(format!("compiling {name} module"), e))
}

impl OrtBackend {
    /// Initialises the ONNX Runtime environment and compiles all five
    /// modules named by `artifacts`. Compilation happens exactly once,
    /// here, never per call (`spec.md` §4.3).
    pub fn load(artifacts: &ArtifactPaths) -> Result<Self> {
        ort::init()
            .with_name("gliner2-ner")
            .with_execution_providers(&[CPUExecutionProvider::default().build()])
            .commit()
            .map_err(|e| {
                NerError::resource_with("initialising ONNX Runtime environment", anyhow::Error::new(e))
            })?;

        debug!("compiling GLiNER2 backend modules");

        Ok(Self {
            encoder: Mutex::new(load_session(&artifacts.encoder, "encoder")?),
            span_rep: Mutex::new(load_session(&artifacts.span_rep, "span_rep")?),
            classifier: Mutex::new(load_session(&artifacts.classifier, "classifier")?),
            count_predictor: Mutex::new(load_session(&artifacts.count_predictor, "count_predictor")?),
            count_embed: Mutex::new(load_session(&artifacts.count_embed, "count_embed")?),
        })
    }
}

/// Extracts a named output as `f32`, converting from `f16` when that is the
/// module's native output precision (`spec.md` §4.3: "Output tensors of
/// precision float16 must be converted to float32").
fn extract_f32(
    outputs: &ort::SessionOutputs,
    name: &str,
    stage: &'static str,
) -> Result<ArrayD<f32>> {
    let value = outputs
        .get(name)
        .ok_or_else(|| NerError::invalid_output(stage, format!("missing output tensor '{name}'")))?;

    if let Ok(tensor) = value.extract_tensor::<f32>() {
        return Ok(tensor.view().to_owned().into_dyn());
    }
    match value.extract_tensor::<half::f16>() {
        Ok(tensor) => Ok(tensor.view().mapv(|v| v.to_f32()).into_dyn()),
        Err(e) => Err(NerError::invalid_output(
            stage,
            format!("output '{name}' has unsupported dtype: {e}"),
        )),
    }
}

fn run_single_output(
    session: &Mutex<Session>,
    inputs: Vec<(&'static str, Value)>,
    output_name: &str,
    stage: &'static str,
) -> Result<ArrayD<f32>> {
    let start = std::time::Instant::now();
    let session = session.lock().expect("backend session mutex poisoned");
    let outputs = session
        .run(inputs)
        .map_err(|e| NerError::invalid_output(stage, format!("backend call failed: {e}")))?;
    let result = extract_f32(&outputs, output_name, stage);
    debug!(stage, elapsed = ?start.elapsed(), "adapter call finished");
    result
}

impl InferenceBackend for OrtBackend {
    fn encoder(&self, input_ids: &ArrayD<i32>, attention_mask: &ArrayD<i32>) -> Result<ArrayD<f32>> {
        let inputs = inputs![
            "input_ids" => input_ids.view(),
            "attention_mask" => attention_mask.view(),
        ]
        .map_err(|e| NerError::invalid_output(STAGE_ENCODER, format!("building input tensors: {e}")))?;
        run_single_output(&self.encoder, inputs, "hidden_states", STAGE_ENCODER)
    }

    fn span_rep(&self, token_embeddings: &ArrayD<f32>, span_indices: &ArrayD<i32>) -> Result<ArrayD<f32>> {
        let inputs = inputs![
            "token_embeddings" => token_embeddings.view(),
            "span_indices" => span_indices.view(),
        ]
        .map_err(|e| NerError::invalid_output(STAGE_SPAN_REP, format!("building input tensors: {e}")))?;
        run_single_output(&self.span_rep, inputs, "span_embeddings", STAGE_SPAN_REP)
    }

    fn classifier(&self, schema_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let inputs = inputs!["schema_embeddings" => schema_embeddings.view()]
            .map_err(|e| NerError::invalid_output(STAGE_CLASSIFIER, format!("building input tensors: {e}")))?;
        run_single_output(&self.classifier, inputs, "logits", STAGE_CLASSIFIER)
    }

    fn count_predictor(&self, prompt_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let inputs = inputs!["prompt_embeddings" => prompt_embeddings.view()]
            .map_err(|e| NerError::invalid_output(STAGE_COUNT_PREDICTOR, format!("building input tensors: {e}")))?;
        run_single_output(&self.count_predictor, inputs, "count_logits", STAGE_COUNT_PREDICTOR)
    }

    fn count_embed(&self, label_embeddings: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let inputs = inputs!["label_embeddings" => label_embeddings.view()]
            .map_err(|e| NerError::invalid_output(STAGE_COUNT_EMBED, format!("building input tensors: {e}")))?;
        run_single_output(&self.count_embed, inputs, "structure_embeddings", STAGE_COUNT_EMBED)
    }
}

/// Shape helper: builds a `[1, a, b]`-style dynamic shape for readability at
/// call sites that assemble encoder/span-rep inputs.
pub fn shape3(a: usize, b: usize, c: usize) -> IxDyn {
    IxDyn(&[a, b, c])
}
