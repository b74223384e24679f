use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RmcError};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Done(Vec<Vec<f32>>),
    Retry(RmcError),
    Fail(RmcError),
}

/// Client for `POST {base_url}/embeddings` on OpenAI-compatible servers.
/// Rate limits, 5xx responses and transport errors are retried with
/// exponential backoff; auth failures and other 4xx responses are not.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    config: ApiConfig,
    endpoint: String,
}

impl EmbeddingApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RmcError::EmbeddingProvider(format!("Failed to create HTTP client: {e}")))?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }

            match self.attempt(&request).await {
                Attempt::Done(embeddings) => return Ok(embeddings),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(error) => {
                    tracing::debug!(attempt, error = %error, "Embedding request failed, retrying");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RmcError::EmbeddingProvider("No attempt made".to_string())))
    }

    async fn attempt(&self, request: &EmbeddingRequest<'_>) -> Attempt {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        match builder.send().await {
            Ok(response) => classify(response).await,
            Err(e) => Attempt::Retry(RmcError::EmbeddingProvider(format!("Request failed: {e}"))),
        }
    }
}

async fn classify(response: Response) -> Attempt {
    let status = response.status();

    if status.is_success() {
        return match response.json::<EmbeddingResponse>().await {
            Ok(body) => Attempt::Done(ordered(body.data)),
            Err(e) => Attempt::Fail(RmcError::EmbeddingProvider(format!(
                "Failed to parse response: {e}"
            ))),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        return Attempt::Retry(RmcError::ApiRateLimit { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Attempt::Fail(RmcError::ApiAuth(body)),
        s if s.is_server_error() => {
            Attempt::Retry(RmcError::EmbeddingProvider(format!("Server error {s}: {body}")))
        }
        s => Attempt::Fail(RmcError::EmbeddingProvider(format!("API error {s}: {body}"))),
    }
}

/// Servers may return items out of order; `index` restores input order.
fn ordered(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2_u64.pow(attempt.saturating_sub(1).min(6)))
}
