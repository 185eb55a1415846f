//! Gemini generateContent against a mock server

mod common;

use common::{data_lines, ready_provider, request_bodies, settings_for};
use connector_hub_core::config::Vendor;
use connector_hub_core::protocol::{CompletionRequest, FinishReason, Message, MessageRole, ToolCall};
use connector_hub_core::providers::{collect_stream, ErrorKind};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Paris is the capital of France."}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 8, "totalTokenCount": 15},
            "modelVersion": "gemini-2.0-flash-001",
            "responseId": "resp-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let request = CompletionRequest::new(
        "gemini-2.0-flash",
        vec![
            Message::system("Be factual."),
            Message::user("Capital of France?"),
        ],
    )
    .with_max_tokens(64);
    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.id, "resp-1");
    assert_eq!(response.model, "gemini-2.0-flash-001");
    assert_eq!(response.content(), "Paris is the capital of France.");
    assert_eq!(response.usage.unwrap().total_tokens, 15);

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be factual.");
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
}

#[tokio::test]
async fn test_missing_model_version_uses_requested_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}]
        })))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let response = provider
        .complete(&CompletionRequest::new("gemini-1.5-flash", vec![Message::user("Hi")]))
        .await
        .unwrap();
    assert_eq!(response.model, "gemini-1.5-flash");
}

#[tokio::test]
async fn test_stream() {
    let server = MockServer::start().await;
    let body = data_lines(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Once upon"}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": " a time"}]}}]}),
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "."}]}, "finishReason": "MAX_TOKENS"}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3}
        }),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let acc = collect_stream(
        provider
            .stream(&CompletionRequest::new("gemini-1.5-pro", vec![Message::user("Tell a story")]))
            .await
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(acc.role(), Some(MessageRole::Assistant));
    assert_eq!(acc.content(), "Once upon a time.");
    assert_eq!(acc.finish_reason(), Some(FinishReason::Length));
    assert_eq!(acc.usage().unwrap().total_tokens, 7);
}

#[tokio::test]
async fn test_quota_error_with_retry_info() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "You exceeded your current quota.",
                "status": "RESOURCE_EXHAUSTED",
                "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "1s"}]
            }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let err = provider
        .complete(&CompletionRequest::new("gemini-2.0-flash", vec![Message::user("Hi")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(1));
    assert!(err.to_string().contains("ai.google.dev"));
}

#[tokio::test]
async fn test_bad_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let err = provider
        .complete(&CompletionRequest::new("gemini-2.0-flash", vec![Message::user("Hi")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_streamed_result_matches_complete() {
    let server = MockServer::start().await;
    let body = data_lines(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Checking "}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "both."}]}}]}),
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}},
                    {"functionCall": {"name": "get_time"}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 12}
        }),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Checking both."},
                    {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}},
                    {"functionCall": {"name": "get_time"}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 12}
        })))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Google, &server)).await;
    let request = CompletionRequest::new("gemini-2.0-flash", vec![Message::user("Weather and time in Paris?")]);

    let complete = provider.complete(&request).await.unwrap();
    let streamed = collect_stream(provider.stream(&request).await.unwrap()).await.unwrap();

    assert_eq!(streamed.content(), complete.content());
    // call ids are minted locally on each path
    let calls = |calls: &[ToolCall]| -> Vec<(String, String)> {
        calls
            .iter()
            .map(|c| (c.function.name.clone(), c.function.arguments.clone()))
            .collect()
    };
    assert_eq!(calls(&streamed.tool_calls()), calls(complete.tool_calls()));
    assert_eq!(calls(complete.tool_calls())[1].1, "{}");
    assert_eq!(streamed.finish_reason(), complete.finish_reason());
    assert_eq!(streamed.usage(), complete.usage);
}
