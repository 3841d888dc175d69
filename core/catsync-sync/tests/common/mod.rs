//! Shared helpers for tests against a mocked catalog service.

#![allow(dead_code)]

use catsync_sync::SyncConfig;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "session-token-1";
pub const AUTH_PATH: &str = "/api/v1/auth";
pub const SCHEMA_PATH: &str = "/api/v1/retail/resource/schema";

/// Config pointing at the mock server, business service `retail`, country `de`.
pub fn mock_config(server: &MockServer) -> SyncConfig {
    SyncConfig {
        service_host: server.uri(),
        business_service: "retail".to_string(),
        user: "collector".to_string(),
        password: "secret".to_string(),
        country: "de".to_string(),
        ..Default::default()
    }
}

pub fn lines_path(resource: &str, pass: &str) -> String {
    format!("/api/v1/retail/resource/{resource}/de/{pass}/lines")
}

pub fn state_path(resource: &str) -> String {
    format!("/api/v1/retail/resource/{resource}/de/state")
}

/// Accepts any login with [`TOKEN`].
pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": TOKEN })))
        .mount(server)
        .await;
}

/// One JSON document per line.
pub fn ndjson(records: &[Value]) -> String {
    records.iter().map(|r| format!("{r}\n")).collect()
}

pub fn ndjson_response(records: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(ndjson(records))
}

pub fn state_response(total_items: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "total_items": total_items }))
}

/// Two change-tracked resources with integer keys.
pub fn schema_document() -> Value {
    let attributes = json!([
        {"id": {"primary_key": true, "foreign_key": null, "type": "int64"}},
        {"title": {"primary_key": false, "foreign_key": null, "type": "string"}},
        {"created_at": {"primary_key": false, "foreign_key": null, "type": "time"}},
        {"updated_at": {"primary_key": false, "foreign_key": null, "type": "time"}}
    ]);
    json!({
        "resources": {
            "promotions": {"attributes": attributes, "allowedQueryModes": ["full", "delta"]},
            "articles": {"attributes": attributes, "allowedQueryModes": ["full", "delta"]}
        }
    })
}

pub async fn mount_schema(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SCHEMA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(schema_document()))
        .mount(server)
        .await;
}

pub fn record(id: i64, title: &str, created_at: &str) -> Value {
    json!({"id": id, "title": title, "created_at": created_at, "updated_at": null})
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
