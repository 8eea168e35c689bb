//! Local semantic embeddings via fastembed (ONNX-based, local inference).
//!
//! Grounded on the teacher's `embeddings/local.rs`; retargeted from
//! nomic-embed-text-v1.5 (768d) to `AllMiniLML6V2` (384d) to match the
//! fixed-width vector the spec treats as an opaque embedder dependency.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::{Embedder, EmbedderError, Result};
use crate::EMBEDDING_DIMENSIONS;

/// Resolve the on-disk model cache directory, respecting
/// `FASTEMBED_CACHE_PATH` before falling back to the platform cache dir.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "memory-continuity", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/memory-continuity/fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    pub fn try_new() -> Result<Self> {
        let dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("failed to create fastembed cache dir {:?}: {}", dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(true)
            .with_cache_dir(dir);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EmbedderError::Init(format!(
                "failed to initialize all-MiniLM-L6-v2 embedding model: {e}"
            ))
        })?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let owned = text.to_string();
        embed_blocking(&self.model, vec![owned]).map(|mut v| v.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_blocking(&self.model, texts.to_vec())
    }
}

fn embed_blocking(model: &Mutex<TextEmbedding>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let mut guard = model.lock();
    let embeddings = guard
        .embed(texts, None)
        .map_err(|e| EmbedderError::Inference(e.to_string()))?;

    for v in &embeddings {
        if v.len() != EMBEDDING_DIMENSIONS {
            return Err(EmbedderError::Inference(format!(
                "model produced {} dimensions, expected {}",
                v.len(),
                EMBEDDING_DIMENSIONS
            )));
        }
    }
    Ok(embeddings)
}
