use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

use crate::config::{parse_provider_model, provider_base_url, EmbeddingsConfig};
use crate::error::{Result, RmcError};

use super::api::{ApiConfig, EmbeddingApiClient};
use super::cache::QueryEmbeddingCache;
use super::hashed::HashedEmbedder;

/// Turns text into fixed-width vectors. Passages are stored content, queries
/// are search text; some models embed the two differently.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_passage(&self, passage: &str) -> Result<Vec<f32>>;
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

enum EmbeddingBackend {
    Local {
        model: Arc<Mutex<TextEmbedding>>,
        batch_size: usize,
    },
    Api {
        client: EmbeddingApiClient,
    },
    Hashed(HashedEmbedder),
}

pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
    query_cache: Option<QueryEmbeddingCache>,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model_name) = parse_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "hash" => {
                tracing::info!(dimensions = config.dimensions, "Using hashed embeddings");
                EmbeddingBackend::Hashed(HashedEmbedder::new(config.dimensions))
            }
            "local" => {
                tracing::info!(model = %model_name, "Loading local embedding model");
                EmbeddingBackend::Local {
                    model: Arc::new(Mutex::new(build_model(resolve_embedding_model(model_name))?)),
                    batch_size: config.batch_size.max(1),
                }
            }
            api_provider => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| provider_base_url(api_provider).to_string());
                tracing::info!(provider = %api_provider, model = %model_name, "Using API embeddings");
                EmbeddingBackend::Api {
                    client: EmbeddingApiClient::new(ApiConfig {
                        base_url,
                        api_key: config.api_key.clone(),
                        model: model_name.to_string(),
                        timeout_secs: config.timeout_secs,
                        max_retries: config.max_retries,
                    })?,
                }
            }
        };

        Ok(Self {
            backend,
            dimensions: config.dimensions,
            query_cache: QueryEmbeddingCache::new(config.query_cache_size),
        })
    }

    /// Offline provider used when no model is configured and in tests.
    pub fn hashed(dimensions: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Hashed(HashedEmbedder::new(dimensions)),
            dimensions,
            query_cache: None,
        }
    }

    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => {
                let model = Arc::clone(model);
                let batch_size = *batch_size;
                tokio::task::spawn_blocking(move || {
                    let mut model = model.lock().map_err(|e| {
                        RmcError::EmbeddingProvider(format!("Embedding model lock poisoned: {e}"))
                    })?;
                    model
                        .embed(texts, Some(batch_size))
                        .map_err(|e| RmcError::EmbeddingProvider(e.to_string()))
                })
                .await
                .map_err(|e| RmcError::EmbeddingProvider(format!("Embedding worker failed: {e}")))??
            }
            EmbeddingBackend::Api { client } => {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                client.embed(&refs).await?
            }
            EmbeddingBackend::Hashed(hashed) => texts.iter().map(|t| hashed.embed(t)).collect(),
        };

        for embedding in &embeddings {
            if embedding.len() != self.dimensions {
                return Err(RmcError::EmbeddingProvider(format!(
                    "Provider returned {} dimensions, expected {}",
                    embedding.len(),
                    self.dimensions
                )));
            }
        }

        Ok(embeddings)
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RmcError::EmbeddingProvider("No embedding generated".to_string()))
    }

    fn prefixed(&self, prefix: &str, text: &str) -> String {
        match &self.backend {
            // e5/bge style local models expect role prefixes
            EmbeddingBackend::Local { .. } => format!("{prefix}: {text}"),
            EmbeddingBackend::Api { .. } | EmbeddingBackend::Hashed(_) => text.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed_passage(&self, passage: &str) -> Result<Vec<f32>> {
        self.embed_single(&self.prefixed("passage", passage)).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.as_ref().and_then(|c| c.get(query)) {
            return Ok(cached);
        }

        let embedding = self.embed_single(&self.prefixed("query", query)).await?;
        if let Some(cache) = &self.query_cache {
            cache.put(query, embedding.clone());
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn resolve_embedding_model(model_name: &str) -> EmbeddingModel {
    match model_name {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
            EmbeddingModel::AllMiniLML12V2
        }
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            EmbeddingModel::NomicEmbedTextV15
        }
        _ => EmbeddingModel::BGESmallENV15,
    }
}

fn build_model(embedding_model: EmbeddingModel) -> Result<TextEmbedding> {
    TextEmbedding::try_new(InitOptions::new(embedding_model).with_show_download_progress(true))
        .map_err(|e| RmcError::EmbeddingProvider(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_config(dimensions: usize, cache: usize) -> EmbeddingsConfig {
        EmbeddingsConfig {
            model: "hash".to_string(),
            dimensions,
            batch_size: 8,
            api_key: None,
            base_url: None,
            timeout_secs: 5,
            max_retries: 0,
            query_cache_size: cache,
        }
    }

    #[tokio::test]
    async fn test_hash_provider_from_config() {
        let provider = EmbeddingProvider::new(&hash_config(32, 4)).unwrap();
        let v = provider.embed_passage("cache miss rate").await.unwrap();
        assert_eq!(v.len(), 32);
        assert_eq!(provider.dimensions(), 32);
    }

    #[tokio::test]
    async fn test_query_and_passage_agree_without_prefixes() {
        let provider = EmbeddingProvider::hashed(16);
        let q = provider.embed_query("api latency").await.unwrap();
        let p = provider.embed_passage("api latency").await.unwrap();
        assert_eq!(q, p);
    }

    #[tokio::test]
    async fn test_query_cache_populated() {
        let provider = EmbeddingProvider::new(&hash_config(16, 4)).unwrap();
        provider.embed_query("api latency").await.unwrap();
        let cache = provider.query_cache.as_ref().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("api latency").is_some());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let provider = EmbeddingProvider::hashed(16);
        assert!(provider.embed(Vec::new()).await.unwrap().is_empty());
    }
}
