//! OpenAiProvider against a mock chat-completions endpoint

use async_openai::config::OpenAIConfig;
use gmail_autoreply::llm::{CompletionProvider, OpenAiProvider, ProviderError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> OpenAiProvider {
    let config = OpenAIConfig::new()
        .with_api_key("sk-test")
        .with_api_base(server.uri());
    OpenAiProvider::new(config, "gpt-4o-mini")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn api_error(kind: &str, code: &str, message: &str) -> serde_json::Value {
    json!({
        "error": {"message": message, "type": kind, "param": null, "code": code}
    })
}

#[tokio::test]
async fn test_completion_is_returned_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 500})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "  interested\nThanks for writing!\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let output = provider_for(&server)
        .complete("system", "Label the following email", 500)
        .await
        .unwrap();

    assert_eq!(output, "interested\nThanks for writing!");
}

#[tokio::test]
async fn test_http_429_is_a_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(api_error(
            "requests",
            "rate_limit_exceeded",
            "Rate limit reached for requests",
        )))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete("system", "user", 100)
        .await
        .unwrap_err();

    assert!(err.is_rate_limited(), "expected rate limit, got {:?}", err);
}

#[tokio::test]
async fn test_insufficient_quota_is_a_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(api_error(
            "insufficient_quota",
            "insufficient_quota",
            "You exceeded your current quota",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete("system", "user", 100)
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_invalid_request_is_not_a_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(api_error(
            "invalid_request_error",
            "model_not_found",
            "The model does not exist",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete("system", "user", 100)
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::Api("The model does not exist".to_string()));
}

#[tokio::test]
async fn test_blank_completion_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete("system", "user", 100)
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::EmptyCompletion);
}
