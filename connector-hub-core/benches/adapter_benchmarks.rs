//! Criterion benchmarks for request translation and stream decoding
//!
//! Run with `cargo bench -p connector-hub-core`.

use bytes::Bytes;
use connector_hub_core::config::{ProviderSettings, SecretString, Vendor};
use connector_hub_core::protocol::{
    CompletionRequest, FunctionDefinition, Message, ToolCall, ToolDefinition,
};
use connector_hub_core::providers::stream::{decode_stream, RecordDecoder, RecordSeparator};
use connector_hub_core::providers::{
    collect_stream, AnthropicAdapter, GoogleAdapter, OpenAIAdapter, VendorAdapter,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::stream;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn conversation() -> CompletionRequest {
    let weather = FunctionDefinition {
        name: "get_weather".to_string(),
        description: Some("Current weather for a city".to_string()),
        parameters: Some(json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        })),
    };

    let mut messages = vec![
        Message::system("You are a helpful assistant."),
        Message::system("Answer briefly."),
    ];
    for turn in 0..10 {
        messages.push(Message::user(format!("Question number {}?", turn)));
        messages.push(Message::assistant(format!("Answer number {}.", turn)));
    }
    messages.push(Message::user("What is the weather in Oslo?"));
    messages.push(Message::assistant_tool_calls(vec![ToolCall::function(
        "call_1",
        "get_weather",
        "{\"city\":\"Oslo\"}",
    )]));
    messages.push(Message::tool("call_1", "{\"temp\":-3}"));

    CompletionRequest::new("model", messages)
        .with_temperature(0.7)
        .with_tools(vec![ToolDefinition::function(weather)])
}

fn bench_adapter<A: VendorAdapter>(c: &mut Criterion, adapter: A, model: &str) {
    let settings = ProviderSettings::new(adapter.vendor(), SecretString::new("key"));
    let mut request = conversation();
    request.model = model.to_string();

    c.bench_with_input(
        BenchmarkId::new("to_vendor_request", adapter.name()),
        &request,
        |b, request| {
            b.iter(|| {
                let payload = adapter.to_vendor_request(black_box(request), &settings, false);
                black_box(serde_json::to_vec(&payload))
            })
        },
    );
}

fn benchmark_request_translation(c: &mut Criterion) {
    bench_adapter(c, OpenAIAdapter, "gpt-4o");
    bench_adapter(c, AnthropicAdapter, "claude-3-5-sonnet-20241022");
    bench_adapter(c, GoogleAdapter, "gemini-2.0-flash");
}

fn openai_stream_body(chunks: usize) -> String {
    let mut body = String::new();
    for i in 0..chunks {
        let event = json!({"choices": [{"index": 0, "delta": {"content": format!("token{} ", i)}}]});
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

fn benchmark_record_decoder(c: &mut Criterion) {
    let body = openai_stream_body(500);
    let mut group = c.benchmark_group("record_decoder");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for piece_len in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(piece_len), &piece_len, |b, &len| {
            b.iter(|| {
                let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
                let mut records = 0;
                for piece in body.as_bytes().chunks(len) {
                    records += decoder.push(piece).len();
                }
                records += decoder.finish().len();
                black_box(records)
            })
        });
    }
    group.finish();
}

fn benchmark_stream_accumulation(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let pieces: Vec<Bytes> = openai_stream_body(500)
        .as_bytes()
        .chunks(512)
        .map(Bytes::copy_from_slice)
        .collect();

    c.bench_function("decode_and_collect_openai_stream", |b| {
        b.iter(|| {
            let bytes = stream::iter(pieces.clone().into_iter().map(Ok::<_, reqwest::Error>));
            let chunks = decode_stream(OpenAIAdapter, bytes, CancellationToken::new(), Uuid::new_v4());
            let acc = runtime.block_on(collect_stream(chunks));
            black_box(acc.map(|acc| acc.content().len()))
        })
    });
}

criterion_group!(
    benches,
    benchmark_request_translation,
    benchmark_record_decoder,
    benchmark_stream_accumulation
);
criterion_main!(benches);
