use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use prodash_table::{
    table_router, ColumnRegistry, DatasetFetcher, FetchConfig, FetchError, InMemoryTableSource,
    LiveTableSource,
};
use serde_json::Value;
use tower::util::ServiceExt;

fn demo_app() -> Router {
    table_router(Arc::new(InMemoryTableSource::demo()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> Value {
    let (status, _, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

struct OfflineFetcher;

impl DatasetFetcher for OfflineFetcher {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        Err(FetchError::HttpRequest {
            url: url.to_string(),
            message: "offline".to_string(),
        })
    }
}

#[tokio::test]
async fn snapshot_defaults_to_parent_protocol_grouping() {
    let json = get_json(demo_app(), "/table/snapshot").await;

    assert_eq!(json["grouping"], "parent-protocol");
    assert_eq!(json["strategyType"], "protocols");
    assert_eq!(json["chains"], serde_json::json!(["All"]));
    assert_eq!(json["columns"][0]["id"], "name");
    assert_eq!(json["leafCount"], 5);

    let rows = json["rows"].as_array().unwrap();
    let aave = rows.iter().find(|row| row["label"] == "Aave").unwrap();
    assert_eq!(aave["kind"], "group");
    assert_eq!(aave["children"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn snapshot_groups_by_chain_when_requested() {
    let json = get_json(demo_app(), "/table/snapshot?grouping=chain-protocol").await;

    assert_eq!(
        json["rowHeaders"],
        serde_json::json!(["chain", "parent-protocol", "protocol"])
    );
    let rows = json["rows"].as_array().unwrap();
    assert!(rows.iter().all(|row| row["header"] == "chain"));
    assert!(rows
        .iter()
        .any(|row| row["label"] == "Ethereum" && row["kind"] == "group"));
}

#[tokio::test]
async fn snapshot_applies_category_filter() {
    let json = get_json(
        demo_app(),
        "/table/snapshot?grouping=protocol-only&categories=Lending",
    )
    .await;

    assert_eq!(json["leafCount"], 2);
    let labels: Vec<&str> = json["rows"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row["label"].as_str())
        .collect();
    assert!(labels.contains(&"Aave V3"));
    assert!(labels.contains(&"Aave V2"));
}

#[tokio::test]
async fn export_returns_csv_with_chain_column() {
    let (status, content_type, body) = get(demo_app(), "/table/export.csv").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/csv"));
    let text = String::from_utf8(body).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("Name,Chain,"));
    assert_eq!(text.lines().count(), 6);
}

#[tokio::test]
async fn export_at_group_level_writes_one_line_per_group() {
    let (status, _, body) = get(demo_app(), "/table/export.csv?level=0").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.lines().next().unwrap().starts_with("Protocol,Rows"));
    assert!(text.lines().any(|line| line.starts_with("Aave,2,")));
}

#[tokio::test]
async fn columns_route_lists_registry_and_presets() {
    let json = get_json(demo_app(), "/table/columns").await;

    assert_eq!(
        json["columns"].as_array().unwrap().len(),
        ColumnRegistry::new().items().len()
    );
    assert!(!json["presets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn live_source_degrades_to_empty_table_when_offline() {
    let config = FetchConfig {
        base_url: "http://api.test".to_string(),
        datasets_base_url: "http://site.test".to_string(),
        max_retries: 0,
        retry_backoff_ms: 0,
        ..FetchConfig::default()
    };
    let source = LiveTableSource::new(Arc::new(OfflineFetcher), config);
    let json = get_json(table_router(Arc::new(source)), "/table/snapshot?chains=Ethereum").await;

    assert_eq!(json["source"], "live");
    assert_eq!(json["leafCount"], 0);
    assert!(json["rows"].as_array().unwrap().is_empty());
}
