//! Manifest Loader (`spec.md` §4.1).
//!
//! Reads the small JSON descriptor that names the five model artifacts, the
//! tokenizer directory, and the shape constants everything downstream is
//! built against. Stateless: every call to [`Manifest::load`] re-reads the
//! file from disk, the way `Tacotron2::load` re-opens its three ONNX files
//! with no caching of its own (caching lives one layer up, in the process
//! registry).

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

/// Artifact paths for the five neural modules (`spec.md` §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub encoder: PathBuf,
    pub span_rep: PathBuf,
    pub classifier: PathBuf,
    pub count_predictor: PathBuf,
    pub count_embed: PathBuf,
}

impl ArtifactPaths {
    fn resolve(&mut self, base: &Path) {
        for path in [
            &mut self.encoder,
            &mut self.span_rep,
            &mut self.classifier,
            &mut self.count_predictor,
            &mut self.count_embed,
        ] {
            if path.is_relative() {
                *path = base.join(&path);
            }
        }
    }

    /// Iterates `(name, path)` pairs, the shape a cache keyed by name wants.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> {
        [
            ("encoder", self.encoder.as_path()),
            ("span_rep", self.span_rep.as_path()),
            ("classifier", self.classifier.as_path()),
            ("count_predictor", self.count_predictor.as_path()),
            ("count_embed", self.count_embed.as_path()),
        ]
        .into_iter()
    }
}

/// Deserialized shape of the manifest JSON (`spec.md` §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub model_id: String,
    pub max_seq_len: usize,
    pub max_schema_tokens: usize,
    pub max_width: usize,
    pub hidden_size: usize,
    #[serde(default)]
    pub counting_layer: Option<String>,
    pub max_count: usize,
    #[serde(default = "default_precision")]
    pub precision: String,
    pub artifacts: ArtifactPaths,
    pub tokenizer_dir: PathBuf,
    /// Directory the manifest file itself was read from; relative
    /// artifact/tokenizer paths resolve against this.
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_precision() -> String {
    "float32".to_string()
}

impl Manifest {
    /// Reads and validates a manifest file. Relative artifact paths and the
    /// tokenizer directory are resolved against the manifest's own
    /// directory, not the process's current directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let contents = std::fs::read_to_string(path).with_context(|| {
            format!("reading manifest file at {}", path.display())
        });
        let contents = contents
            .map_err(|e| NerError::resource_with(format!("cannot read manifest {}", path.display()), e))?;

        let mut manifest: Manifest = serde_json::from_str(&contents).map_err(|e| {
            NerError::resource_with(
                format!("manifest at {} is not valid JSON", path.display()),
                anyhow::Error::new(e),
            )
        })?;

        manifest.base_dir = base_dir.clone();
        manifest.artifacts.resolve(&base_dir);
        if manifest.tokenizer_dir.is_relative() {
            manifest.tokenizer_dir = base_dir.join(&manifest.tokenizer_dir);
        }

        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (name, path) in self.artifacts.iter() {
            if !path.exists() {
                return Err(NerError::missing_artifact(name, &path.to_path_buf()));
            }
        }
        if !self.tokenizer_dir.exists() {
            return Err(NerError::resource(format!(
                "tokenizer directory does not exist: {}",
                self.tokenizer_dir.display()
            )));
        }
        if self.max_width == 0 {
            return Err(NerError::resource("manifest max_width must be > 0"));
        }
        if self.hidden_size == 0 {
            return Err(NerError::resource("manifest hidden_size must be > 0"));
        }
        Ok(())
    }

    /// Directory the manifest was loaded from.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Builds a manifest directly from already-resolved parts, skipping
    /// file I/O and validation. Used by tests that substitute a
    /// [`crate::backend::mock::MockBackend`] and never touch the
    /// filesystem for artifacts.
    #[cfg(test)]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn for_test(
        model_id: impl Into<String>,
        max_seq_len: usize,
        max_schema_tokens: usize,
        max_width: usize,
        hidden_size: usize,
        max_count: usize,
        artifacts: ArtifactPaths,
        tokenizer_dir: PathBuf,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            max_seq_len,
            max_schema_tokens,
            max_width,
            hidden_size,
            counting_layer: None,
            max_count,
            precision: default_precision(),
            artifacts,
            tokenizer_dir,
            base_dir: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_artifact(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::File::create(&p).unwrap().write_all(b"x").unwrap();
        p
    }

    #[test]
    fn loads_and_resolves_relative_paths() {
        let tmp = tempdir();
        let models = tmp.join("models");
        std::fs::create_dir_all(&models).unwrap();
        write_artifact(&models, "encoder.onnx");
        write_artifact(&models, "span_rep.onnx");
        write_artifact(&models, "classifier.onnx");
        write_artifact(&models, "count_predictor.onnx");
        write_artifact(&models, "count_embed.onnx");
        let tok_dir = tmp.join("tokenizer");
        std::fs::create_dir_all(&tok_dir).unwrap();

        let manifest_json = serde_json::json!({
            "model_id": "gliner2-test",
            "max_seq_len": 384,
            "max_schema_tokens": 64,
            "max_width": 8,
            "hidden_size": 768,
            "max_count": 4,
            "precision": "float32",
            "artifacts": {
                "encoder": "models/encoder.onnx",
                "span_rep": "models/span_rep.onnx",
                "classifier": "models/classifier.onnx",
                "count_predictor": "models/count_predictor.onnx",
                "count_embed": "models/count_embed.onnx",
            },
            "tokenizer_dir": "tokenizer",
        });
        let manifest_path = tmp.join("manifest.json");
        std::fs::write(&manifest_path, manifest_json.to_string()).unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.hidden_size, 768);
        assert!(manifest.artifacts.encoder.is_absolute());
        assert!(manifest.tokenizer_dir.is_absolute());
    }

    #[test]
    fn fails_on_missing_artifact() {
        let tmp = tempdir();
        let tok_dir = tmp.join("tokenizer");
        std::fs::create_dir_all(&tok_dir).unwrap();
        let manifest_json = serde_json::json!({
            "model_id": "gliner2-test",
            "max_seq_len": 384,
            "max_schema_tokens": 64,
            "max_width": 8,
            "hidden_size": 768,
            "max_count": 4,
            "artifacts": {
                "encoder": "missing/encoder.onnx",
                "span_rep": "missing/span_rep.onnx",
                "classifier": "missing/classifier.onnx",
                "count_predictor": "missing/count_predictor.onnx",
                "count_embed": "missing/count_embed.onnx",
            },
            "tokenizer_dir": "tokenizer",
        });
        let manifest_path = tmp.join("manifest.json");
        std::fs::write(&manifest_path, manifest_json.to_string()).unwrap();

        let err = Manifest::load(&manifest_path).unwrap_err();
        assert!(matches!(err, NerError::Resource { .. }));
    }

    /// Minimal scratch-directory helper so tests don't depend on an extra
    /// dev-dependency just for temp directories.
    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "gliner2-ner-test-{}-{}",
            std::process::id(),
            ADDR.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    static ADDR: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
}
