//! Wire-level tests for the embeddings client and the provider on top of it.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::config::EmbeddingsConfig;
use crate::embeddings::api::{ApiConfig, EmbeddingApiClient};
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::error::RmcError;

fn vectors(embeddings: &[&[f32]]) -> serde_json::Value {
    json!({ "data": embeddings.iter().map(|e| json!({ "embedding": e })).collect::<Vec<_>>() })
}

fn ok(embeddings: &[&[f32]]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(vectors(embeddings))
}

/// Starts a server whose n-th request (zero based) is answered by
/// `respond(n)`, and returns it with the request counter.
async fn scripted(
    respond: impl Fn(usize) -> ResponseTemplate + Send + Sync + 'static,
) -> (MockServer, Arc<AtomicUsize>) {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(move |_: &Request| respond(counter.fetch_add(1, Ordering::SeqCst)))
        .mount(&server)
        .await;
    (server, calls)
}

fn client(server: &MockServer, max_retries: u32) -> EmbeddingApiClient {
    EmbeddingApiClient::new(ApiConfig {
        base_url: server.uri(),
        api_key: Some("rmc-test-key".to_string()),
        model: "text-embedding-3-small".to_string(),
        timeout_secs: 10,
        max_retries,
    })
    .unwrap()
}

#[tokio::test]
async fn test_request_carries_model_input_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer rmc-test-key"))
        .and(body_json(json!({
            "model": "text-embedding-3-small",
            "input": ["checkout latency", "ledger outage"]
        })))
        .respond_with(ok(&[&[0.1, 0.2], &[0.3, 0.4]]))
        .expect(1)
        .mount(&server)
        .await;

    let embeddings = client(&server, 3)
        .embed(&["checkout latency", "ledger outage"])
        .await
        .unwrap();
    assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let (server, calls) = scripted(|n| {
        if n < 2 {
            ResponseTemplate::new(429).insert_header("retry-after", "1")
        } else {
            ok(&[&[0.5, 0.5, 0.5]])
        }
    })
    .await;

    assert!(client(&server, 3).embed(&["q"]).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_limit_surfaces_retry_after_when_exhausted() {
    let (server, calls) =
        scripted(|_| ResponseTemplate::new(429).insert_header("retry-after", "7")).await;

    let err = client(&server, 1).embed(&["q"]).await.unwrap_err();
    assert!(matches!(err, RmcError::ApiRateLimit { retry_after: Some(7) }));
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (server, calls) = scripted(|n| {
        if n == 0 {
            ResponseTemplate::new(503).set_body_string("overloaded")
        } else {
            ok(&[&[1.0, 1.0, 1.0]])
        }
    })
    .await;

    assert!(client(&server, 3).embed(&["q"]).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (server, calls) = scripted(|_| ResponseTemplate::new(401)).await;
    let err = client(&server, 3).embed(&["q"]).await.unwrap_err();
    assert!(matches!(err, RmcError::ApiAuth(_)));
    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (server, calls) = scripted(|_| ResponseTemplate::new(400).set_body_string("bad input")).await;
    let err = client(&server, 3).embed(&["q"]).await.unwrap_err();
    assert!(matches!(err, RmcError::EmbeddingProvider(ref msg) if msg.contains("400")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_body_is_an_error() {
    let (server, _) = scripted(|_| ResponseTemplate::new(200).set_body_string("not json")).await;
    assert!(matches!(
        client(&server, 0).embed(&["q"]).await,
        Err(RmcError::EmbeddingProvider(_))
    ));
}

fn provider(server: &MockServer, dimensions: usize) -> EmbeddingProvider {
    EmbeddingProvider::new(&EmbeddingsConfig {
        model: "openai/text-embedding-3-small".to_string(),
        dimensions,
        batch_size: 8,
        api_key: Some("rmc-test-key".to_string()),
        base_url: Some(server.uri()),
        timeout_secs: 5,
        max_retries: 0,
        query_cache_size: 8,
    })
    .unwrap()
}

#[tokio::test]
async fn test_provider_rejects_wrong_width() {
    let (server, _) = scripted(|_| ok(&[&[0.1, 0.1, 0.1]])).await;
    let err = provider(&server, 4).embed_passage("hello").await.unwrap_err();
    assert!(matches!(err, RmcError::EmbeddingProvider(ref msg) if msg.contains("expected 4")));
}

#[tokio::test]
async fn test_provider_caches_query_vectors() {
    let (server, calls) = scripted(|_| ok(&[&[0.25, 0.25, 0.25, 0.25]])).await;
    let provider = provider(&server, 4);

    let first = provider.embed_query("latency").await.unwrap();
    let second = provider.embed_query("latency").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Passages bypass the cache.
    provider.embed_passage("latency").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
