//! Embedding provider abstraction and the fastembed-backed default.
//!
//! The model is expensive to construct (hundreds of MB, downloaded on first
//! use), so [`FastEmbedder`] defers construction to the first embed call and
//! serializes both construction and inference behind one lock. Everything
//! that touches ONNX runs under `spawn_blocking`.

use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::info;

/// Black-box text embedding: `embed(texts) -> matrix`, one row per input,
/// in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;
}

/// Lazily-initialized fastembed provider.
pub struct FastEmbedder {
    model_name: String,
    model: EmbeddingModel,
    state: tokio::sync::Mutex<Option<Arc<std::sync::Mutex<TextEmbedding>>>>,
}

impl FastEmbedder {
    /// Resolve a configured model identifier. Fails fast so an unknown name
    /// is a configuration error, not a mid-ingestion surprise.
    pub fn new(model_name: &str) -> Result<Self> {
        let model = parse_model_name(model_name)?;
        Ok(Self {
            model_name: model_name.to_string(),
            model,
            state: tokio::sync::Mutex::new(None),
        })
    }

    /// The shared model instance, constructed exactly once.
    async fn instance(&self) -> Result<Arc<std::sync::Mutex<TextEmbedding>>> {
        let mut guard = self.state.lock().await;
        if let Some(model) = guard.as_ref() {
            return Ok(model.clone());
        }
        info!(model = %self.model_name, "loading embedding model");
        let model = self.model.clone();
        let built = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
        })
        .await
        .map_err(|e| ServiceError::EmbedInit(e.to_string()))?
        .map_err(|e| ServiceError::EmbedInit(e.to_string()))?;
        info!(model = %self.model_name, "embedding model ready");
        let shared = Arc::new(std::sync::Mutex::new(built));
        *guard = Some(shared.clone());
        Ok(shared)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.instance().await?;
        let count = texts.len();
        let rows = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap();
            model.embed(texts, None)
        })
        .await
        .map_err(|e| ServiceError::EmbedFailed(e.to_string()))?
        .map_err(|e| ServiceError::EmbedFailed(e.to_string()))?;
        if rows.len() != count {
            return Err(ServiceError::EmbedFailed(format!(
                "model returned {} rows for {} inputs",
                rows.len(),
                count
            )));
        }
        Ok(rows)
    }

    fn model_id(&self) -> &str {
        &self.model_name
    }
}

/// Map a configured model string onto a fastembed model. Accepts both the
/// short names and the upstream repository ids.
fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
    let normalized = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match normalized.as_str() {
        "all-minilm" | "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small" | "bge-small-en" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base" | "bge-base-en" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large" | "bge-large-en" | "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text" | "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        _ => Err(ServiceError::Config(format!("unknown embedding model: {name}"))),
    }
}
