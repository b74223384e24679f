use thiserror::Error;

#[derive(Error, Debug)]
pub enum RmcError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("Conflict detection failed: {0}")]
    ConflictDetection(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RmcError {
    /// Whether a caller may reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RmcError::EmbeddingProvider(_)
                | RmcError::ApiRateLimit { .. }
                | RmcError::LlmRateLimit { .. }
        )
    }
}

impl From<validator::ValidationErrors> for RmcError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{field}: {}", reasons.join(", "))
            })
            .collect();
        fields.sort();
        RmcError::Validation(fields.join("; "))
    }
}

pub type Result<T> = std::result::Result<T, RmcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_errors_are_retryable() {
        assert!(RmcError::EmbeddingProvider("timeout".to_string()).is_retryable());
        assert!(RmcError::ApiRateLimit { retry_after: Some(3) }.is_retryable());
    }

    #[test]
    fn test_structural_errors_are_not_retryable() {
        assert!(!RmcError::Validation("missing org_id".to_string()).is_retryable());
        assert!(!RmcError::NotFound("mem_1".to_string()).is_retryable());
        assert!(!RmcError::ApiAuth("bad key".to_string()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = RmcError::NotFound("Memory entry abc".to_string());
        assert_eq!(err.to_string(), "Not found: Memory entry abc");
    }
}
