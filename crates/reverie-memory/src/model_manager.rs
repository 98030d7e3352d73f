// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model download manager for first-run ONNX embedding model setup.
//!
//! Downloads the all-MiniLM-L6-v2 INT8 quantized model from HuggingFace
//! on first run and caches it in the data directory.

use std::path::{Path, PathBuf};

use reverie_core::ReverieError;
use tracing::info;

const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Resolved locations of the local embedding model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

/// Manages ONNX model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    model_name: String,
}

impl ModelManager {
    /// Creates a manager rooted at the given data directory.
    pub fn new(data_dir: PathBuf, model_name: &str) -> Self {
        Self {
            data_dir,
            model_name: model_name.to_string(),
        }
    }

    /// Directory where this model's files live.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(&self.model_name)
    }

    /// Paths for the model and tokenizer files.
    pub fn paths(&self) -> ModelPaths {
        let dir = self.model_dir();
        ModelPaths {
            model: dir.join("model.onnx"),
            tokenizer: dir.join("tokenizer.json"),
        }
    }

    /// True if both model and tokenizer files exist on disk.
    pub fn is_available(&self) -> bool {
        let paths = self.paths();
        paths.model.exists() && paths.tokenizer.exists()
    }

    /// Ensures the model is downloaded and available.
    ///
    /// Downloads from HuggingFace on first run; subsequent calls are no-ops.
    pub async fn ensure(&self) -> Result<ModelPaths, ReverieError> {
        let paths = self.paths();
        if self.is_available() {
            return Ok(paths);
        }

        info!(model = %self.model_name, "embedding model not found, downloading");

        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| ReverieError::Internal(format!("failed to create model directory: {e}")))?;

        for (dest, url) in [(&paths.model, MODEL_URL), (&paths.tokenizer, TOKENIZER_URL)] {
            if dest.exists() {
                continue;
            }
            match download_file(url, dest).await {
                Ok(size) => info!(file = %dest.display(), size, "downloaded model file"),
                Err(e) => {
                    // Do not leave a truncated file behind.
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(e);
                }
            }
        }

        info!(dir = %model_dir.display(), "embedding model ready");
        Ok(paths)
    }
}

async fn download_file(url: &str, dest: &Path) -> Result<usize, ReverieError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ReverieError::Internal(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(ReverieError::Internal(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReverieError::Internal(format!("failed to read response body from {url}: {e}")))?;

    let size = bytes.len();
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| ReverieError::Internal(format!("failed to write {}: {e}", dest.display())))?;

    Ok(size)
}
