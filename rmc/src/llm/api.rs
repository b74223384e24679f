use std::fmt;
use std::time::Duration;

use serde_json::Value;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use reqwest::StatusCode;

use crate::{
    config::{parse_llm_provider_model, provider_base_url, LlmConfig},
    error::{Result, RmcError},
    llm::provider::CompletionOptions,
};

const JSON_SYSTEM_PROMPT: &str =
    "You are a precise information extraction engine. Respond with a single JSON value and nothing else.";

/// How a failed chat call should be handled.
#[derive(Debug)]
enum Failure {
    /// Worth another attempt (transport errors, 5xx, untyped API errors).
    Transient(RmcError),
    /// Returned immediately: rate limits, auth, bad requests, bad replies.
    Final(RmcError),
}

/// Chat-completions client for OpenAI-compatible servers. Every prompt is
/// sent with a system message that asks for bare JSON.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
}

impl fmt::Debug for LlmApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmApiClient")
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let (provider, bare_model) = parse_llm_provider_model(&config.model);
        let provider = provider.to_lowercase();

        let keyless = matches!(provider.as_str(), "ollama" | "local" | "lmstudio");
        if !keyless && config.api_key.is_none() {
            return Err(RmcError::Config(format!(
                "API key required for LLM provider '{provider}'"
            )));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| provider_base_url(&provider).to_string());
        // "local" means no recognised prefix, so the name is sent untouched.
        let model = if provider == "local" {
            config.model.clone()
        } else {
            bare_model.to_string()
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| RmcError::Llm(format!("Failed to create LLM HTTP client: {error}")))?;

        // async-openai retries 5xx internally with its own backoff; cap it at
        // the request timeout so our retry loop stays in charge.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_base(base_url)
                .with_api_key(config.api_key.clone().unwrap_or_default()),
        )
        .with_http_client(http_client)
        .with_backoff(backoff);

        Ok(Self {
            client,
            model,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `prompt` and parses the reply as JSON. Markdown code fences
    /// around the payload are tolerated.
    pub async fn complete_json(
        &self,
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<Value> {
        if prompt.trim().is_empty() {
            return Err(RmcError::Validation("Prompt cannot be empty".to_string()));
        }

        let request = self.request(prompt, options)?;
        let content = self.send(request).await?;
        tracing::debug!(model = %self.model, response_len = content.len(), "LLM reply received");

        serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            tracing::warn!(
                response_preview = %content.chars().take(100).collect::<String>(),
                error = %e,
                "LLM reply is not JSON"
            );
            RmcError::Llm(format!("Failed to parse JSON response: {e}"))
        })
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            let outcome = match self.client.chat().create(request.clone()).await {
                Ok(response) => first_choice(response),
                Err(error) => Err(classify(error)),
            };

            match outcome {
                Ok(content) => return Ok(content),
                Err(Failure::Final(error)) => return Err(error),
                Err(Failure::Transient(error)) if attempt >= self.max_retries => return Err(error),
                Err(Failure::Transient(error)) => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %error, "Retrying LLM request");
                    tokio::time::sleep(Duration::from_millis(100 << (attempt - 1).min(6))).await;
                }
            }
        }
    }

    fn request(
        &self,
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let invalid = |error: OpenAIError| RmcError::Validation(format!("Invalid LLM request: {error}"));

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(JSON_SYSTEM_PROMPT)
                .build()
                .map_err(invalid)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(invalid)?
                .into(),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.model.clone()).messages(messages);
        if let Some(temperature) = options.and_then(|o| o.temperature) {
            request.temperature(temperature);
        }
        if let Some(max_tokens) = options.and_then(|o| o.max_tokens) {
            request.max_tokens(max_tokens);
        }

        request.build().map_err(invalid)
    }
}

fn first_choice(response: CreateChatCompletionResponse) -> std::result::Result<String, Failure> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(Failure::Final(RmcError::Llm(
            "LLM response contained no content".to_string(),
        )));
    }
    Ok(content)
}

fn classify(error: OpenAIError) -> Failure {
    match error {
        OpenAIError::Reqwest(error) => match error.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                Failure::Final(RmcError::LlmRateLimit { retry_after: None })
            }
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Failure::Final(
                RmcError::ApiAuth(format!("LLM authentication failed: {error}")),
            ),
            Some(status) if !status.is_server_error() => {
                Failure::Final(RmcError::Llm(format!("LLM request failed: {error}")))
            }
            _ => Failure::Transient(RmcError::Llm(format!("LLM request failed: {error}"))),
        },
        OpenAIError::ApiError(api_error) => classify_api_error(api_error),
        OpenAIError::JSONDeserialize(error) => {
            Failure::Final(RmcError::Llm(format!("Failed to parse LLM response: {error}")))
        }
        OpenAIError::InvalidArgument(message) => Failure::Final(RmcError::Validation(message)),
        other => Failure::Final(RmcError::Llm(other.to_string())),
    }
}

/// Servers report rate limits and auth problems in the error body as well as
/// the status code, and they word them differently.
fn classify_api_error(api_error: ApiError) -> Failure {
    let message = api_error.message.to_lowercase();
    let kind = api_error.r#type.as_deref().unwrap_or_default().to_lowercase();
    let code = api_error.code.as_deref().unwrap_or_default().to_lowercase();

    if message.contains("rate limit")
        || message.contains("too many requests")
        || kind.contains("rate_limit")
        || code.contains("rate_limit")
        || code == "insufficient_quota"
    {
        return Failure::Final(RmcError::LlmRateLimit { retry_after: None });
    }

    if message.contains("unauthorized")
        || message.contains("invalid api key")
        || code.contains("invalid_api_key")
        || kind.contains("authentication")
    {
        return Failure::Final(RmcError::ApiAuth(format!(
            "LLM authentication failed: {api_error}"
        )));
    }

    let error = RmcError::Llm(format!("LLM API error: {api_error}"));
    if api_error.r#type.is_none() && api_error.code.is_none() {
        Failure::Transient(error)
    } else {
        Failure::Final(error)
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
