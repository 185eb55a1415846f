//! Shared helpers for the integration tests

#![allow(dead_code)]

use connector_hub_core::config::{ProviderSettings, RetrySettings, SecretString, Vendor};
use connector_hub_core::providers::Provider;
use serde_json::Value;
use std::sync::{Arc, Once};
use wiremock::{MockServer, Request};

/// Retry settings that keep backoff sleeps in the millisecond range
pub fn fast_retry(max_retries: u32) -> RetrySettings {
    RetrySettings {
        max_retries,
        base_delay_ms: 5,
        max_delay_ms: 20,
        jitter_factor: 0.25,
    }
}

pub fn settings_for(vendor: Vendor, server: &MockServer) -> ProviderSettings {
    let base = match vendor {
        Vendor::OpenAI | Vendor::Anthropic => format!("{}/v1", server.uri()),
        Vendor::Azure => server.uri(),
        Vendor::Google => format!("{}/v1beta", server.uri()),
    };
    let settings = ProviderSettings::new(vendor, SecretString::new("test-key"))
        .with_base_url(base)
        .with_retry(fast_retry(2));
    match vendor {
        Vendor::Azure => settings.with_deployment("gpt-4o-prod"),
        _ => settings,
    }
}

/// Route adapter logs to the test harness; `RUST_LOG` selects the level
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn ready_provider(settings: ProviderSettings) -> Arc<dyn Provider> {
    init_tracing();
    let provider = settings.vendor.create_provider(settings).unwrap();
    provider.initialize().await.unwrap();
    provider
}

/// `data:` lines for the newline-delimited grammars
pub fn data_lines(events: &[Value]) -> String {
    events.iter().map(|e| format!("data: {}\n\n", e)).collect()
}

/// `event:` + `data:` records for the block-lifecycle grammar
pub fn event_records(events: &[Value]) -> String {
    events
        .iter()
        .map(|e| format!("event: {}\ndata: {}\n\n", e["type"].as_str().unwrap_or("message"), e))
        .collect()
}

pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r: &Request| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
