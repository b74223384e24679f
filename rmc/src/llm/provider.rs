use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, RmcError};
use crate::llm::api::LlmApiClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

impl LlmBackend {
    fn for_config(config: &LlmConfig) -> Self {
        let (provider, _) = parse_llm_provider_model(&config.model);
        match provider.to_lowercase().as_str() {
            "openai" => Self::OpenAI,
            "openrouter" => Self::OpenRouter,
            "ollama" => Self::Ollama,
            "lmstudio" => Self::LmStudio,
            _ => match &config.base_url {
                Some(base_url) => Self::OpenAICompatible {
                    base_url: base_url.clone(),
                },
                None => Self::Unavailable {
                    reason: format!("Unknown provider in model: {}", config.model),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Settings for extraction-style prompts where repeatability matters.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            max_tokens: Some(1024),
        }
    }
}

/// Optional LLM used by the model-based extraction and classification
/// strategies. An unavailable provider fails every call with
/// [`RmcError::LlmUnavailable`] so callers can fall back to rules.
#[derive(Debug, Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    client: Option<LlmApiClient>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let backend = LlmBackend::for_config(config);
        if let LlmBackend::Unavailable { reason } = &backend {
            return Self::unavailable(reason);
        }

        match LlmApiClient::new(config) {
            Ok(client) => {
                tracing::info!(?backend, model = client.model(), "LLM provider configured");
                Self {
                    backend,
                    client: Some(client),
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "LLM provider disabled");
                Self::unavailable(&error.to_string())
            }
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            client: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub async fn complete_json(
        &self,
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<Value> {
        match (&self.client, &self.backend) {
            (Some(client), _) => client.complete_json(prompt, options).await,
            (None, LlmBackend::Unavailable { reason }) => {
                Err(RmcError::LlmUnavailable(reason.clone()))
            }
            (None, _) => Err(RmcError::LlmUnavailable("No client available".to_string())),
        }
    }

    pub async fn complete_structured<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let json_value = self
            .complete_json(prompt, Some(&CompletionOptions::deterministic()))
            .await?;

        serde_json::from_value(json_value)
            .map_err(|e| RmcError::Llm(format!("Failed to deserialize response: {e}")))
    }
}
