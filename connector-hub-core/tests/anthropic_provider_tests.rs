//! Anthropic Messages API against a mock server

mod common;

use common::{event_records, ready_provider, request_bodies, settings_for};
use connector_hub_core::config::Vendor;
use connector_hub_core::protocol::{CompletionRequest, FinishReason, Message, MessageRole, ToolCall};
use connector_hub_core::providers::{collect_stream, ErrorKind};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message_body() -> serde_json::Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-5-sonnet-20241022",
        "content": [{"type": "text", "text": "Bonjour!"}],
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 14, "output_tokens": 4}
    })
}

#[tokio::test]
async fn test_complete_moves_system_prompt_and_injects_max_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let request = CompletionRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![
            Message::system("You are helpful."),
            Message::system("Answer in French."),
            Message::user("Hello"),
        ],
    );
    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.content(), "Bonjour!");
    assert_eq!(response.finish_reason(), Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().total_tokens, 18);

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["system"], "You are helpful.\n\nAnswer in French.");
    assert_eq!(body["max_tokens"], 4096);
    let roles: Vec<_> = body["messages"].as_array().unwrap().iter().map(|m| m["role"].clone()).collect();
    assert_eq!(roles, vec![json!("user")]);
}

#[tokio::test]
async fn test_stream_block_lifecycle() {
    let server = MockServer::start().await;
    let body = event_records(&[
        json!({"type": "message_start", "message": {"id": "msg_02", "type": "message", "role": "assistant", "model": "claude-3-5-sonnet-20241022", "content": [], "usage": {"input_tokens": 25, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "ping"}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me check"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " the weather."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"location\":"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"Paris\""}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use", "stop_sequence": null}, "usage": {"output_tokens": 30}}),
        json!({"type": "message_stop"}),
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let request = CompletionRequest::new("claude-3-5-sonnet-20241022", vec![Message::user("Weather in Paris?")]);
    let acc = collect_stream(provider.stream(&request).await.unwrap()).await.unwrap();

    assert_eq!(acc.role(), Some(MessageRole::Assistant));
    assert_eq!(acc.content(), "Let me check the weather.");
    let calls = acc.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_01");
    assert_eq!(calls[0].function.arguments, "{\"location\":\"Paris\"}");
    assert_eq!(acc.finish_reason(), Some(FinishReason::ToolCalls));

    let usage = acc.usage().unwrap();
    assert_eq!(usage.prompt_tokens, 25);
    assert_eq!(usage.completion_tokens, 30);

    let sent = &request_bodies(&server).await[0];
    assert_eq!(sent["stream"], true);
}

#[tokio::test]
async fn test_stream_error_event_raises() {
    let server = MockServer::start().await;
    let body = event_records(&[
        json!({"type": "message_start", "message": {"id": "msg_03", "model": "claude-3-5-haiku-20241022", "usage": {"input_tokens": 3, "output_tokens": 0}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let mut stream = provider
        .stream(&CompletionRequest::new("claude-3-5-haiku-20241022", vec![Message::user("Hi")]))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.role, Some(MessageRole::Assistant));
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert!(err.is_retryable());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_overloaded_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let response = provider
        .complete(&CompletionRequest::new("claude-3-5-sonnet-20241022", vec![Message::user("Hi")]))
        .await
        .unwrap();
    assert_eq!(response.id, "msg_01");
}

#[tokio::test]
async fn test_invalid_request_surfaces_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "messages: roles must alternate"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let err = provider
        .complete(&CompletionRequest::new("claude-3-5-sonnet-20241022", vec![Message::user("Hi")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.status_code(), Some(400));
    assert!(err.to_string().contains("roles must alternate"));
}

#[tokio::test]
async fn test_streamed_result_matches_complete() {
    let server = MockServer::start().await;
    let body = event_records(&[
        json!({"type": "message_start", "message": {"id": "msg_04", "type": "message", "role": "assistant", "model": "claude-3-5-sonnet-20241022", "content": [], "usage": {"input_tokens": 20, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Checking "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "both."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_a", "name": "get_weather", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"location\":"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_b", "name": "get_time", "input": {}}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": ""}}),
        json!({"type": "content_block_stop", "index": 2}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use", "stop_sequence": null}, "usage": {"output_tokens": 33}}),
        json!({"type": "message_stop"}),
    ]);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_04",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Checking both."},
                {"type": "tool_use", "id": "toolu_a", "name": "get_weather", "input": {"location": "Paris"}},
                {"type": "tool_use", "id": "toolu_b", "name": "get_time", "input": {}}
            ],
            "stop_reason": "tool_use",
            "stop_sequence": null,
            "usage": {"input_tokens": 20, "output_tokens": 33}
        })))
        .mount(&server)
        .await;

    let provider = ready_provider(settings_for(Vendor::Anthropic, &server)).await;
    let request = CompletionRequest::new("claude-3-5-sonnet-20241022", vec![Message::user("Weather and time in Paris?")]);

    let complete = provider.complete(&request).await.unwrap();
    let streamed = collect_stream(provider.stream(&request).await.unwrap()).await.unwrap();

    assert_eq!(streamed.content(), complete.content());
    let calls = |calls: &[ToolCall]| -> Vec<(String, String, String)> {
        calls
            .iter()
            .map(|c| (c.id.clone(), c.function.name.clone(), c.function.arguments.clone()))
            .collect()
    };
    assert_eq!(calls(&streamed.tool_calls()), calls(complete.tool_calls()));
    assert_eq!(calls(complete.tool_calls())[1].2, "{}");
    assert_eq!(streamed.finish_reason(), complete.finish_reason());
    assert_eq!(streamed.usage(), complete.usage);
}
