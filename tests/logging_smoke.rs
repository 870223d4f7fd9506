use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use prodash_table::{
    load_merge_inputs, log_app_bind, log_app_start, log_source_selected, table_router,
    valid_custom_columns, ColumnRegistry, CustomColumnDefinition, DatasetFetcher, FetchConfig,
    FetchError, InMemoryTableSource, LoggingConfig, SourceSelection, ValueFormat,
};
use serde_json::Value;
use tower::util::ServiceExt;
use tracing::Level;

/// JSON log lines written by the subscriber under test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer lock should not be poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().expect("log buffer lock should not be poisoned");
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

fn capture_events(max_level: Level, f: impl FnOnce()) -> Vec<Value> {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, f);
    logs.events()
}

fn find_event<'a>(events: &'a [Value], name: &str) -> Option<&'a Value> {
    events.iter().find(|event| event["event"] == name)
}

struct OfflineFetcher;

impl DatasetFetcher for OfflineFetcher {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 503,
        })
    }
}

#[test]
fn failed_dataset_fetches_log_warnings_and_degrade() {
    let cfg = FetchConfig {
        base_url: "http://api.test".to_string(),
        datasets_base_url: "http://site.test".to_string(),
        max_retries: 0,
        retry_backoff_ms: 0,
        ..FetchConfig::default()
    };
    let events = capture_events(Level::INFO, || {
        let inputs = load_merge_inputs(&OfflineFetcher, &cfg, &["Ethereum".to_string()]);
        assert!(inputs.protocols.is_empty());
        assert_eq!(inputs.loaded_dataset_count(), 0);
    });

    let protocols = find_event(&events, "protocols.fetch.failed").expect("protocols failure logged");
    assert_eq!(protocols["level"], "WARN");
    let failed_dataset = |dataset: &str| {
        events.iter().any(|event| {
            event["event"] == "dataset.fetch.failed" && event["dataset"] == dataset
        })
    };
    assert!(failed_dataset("earnings"));
    // Fees are fetched per chain on worker threads.
    let per_chain = events
        .iter()
        .find(|event| event["event"] == "dataset.fetch.failed" && event["dataset"] == "fees")
        .expect("per-chain fees failure logged");
    assert_eq!(per_chain["data_type"], "default");
    assert_eq!(per_chain["level"], "WARN");
}

#[test]
fn invalid_custom_columns_are_logged_and_dropped() {
    let registry = ColumnRegistry::new();
    let broken = CustomColumnDefinition::new("Broken", "fees24h +", ValueFormat::Number);
    let columns = vec![
        CustomColumnDefinition::new("Fee yield", "fees24h / tvl", ValueFormat::Percent),
        broken.clone(),
    ];
    let events = capture_events(Level::INFO, || {
        let valid = valid_custom_columns(&columns, &registry);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].name, "Fee yield");
    });

    let invalid = find_event(&events, "custom_column.invalid").expect("invalid column logged");
    assert_eq!(invalid["column_id"], broken.id.as_str());
    assert_eq!(invalid["component"], "custom_columns");
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let events = capture_events(Level::INFO, || {
        log_app_start(&LoggingConfig::default());
        log_source_selected(SourceSelection::Demo {
            reason: "PRODASH_TABLE_USE_DEMO",
        });
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(find_event(&events, "app.start").is_some());
    let source = find_event(&events, "source.selected").expect("source logged");
    assert_eq!(source["source"], "demo");
    let bind = find_event(&events, "app.bind").expect("bind logged");
    assert_eq!(bind["bind_addr"], "127.0.0.1:8080");
    assert_eq!(
        bind["routes"],
        "/table/snapshot,/table/export.csv,/table/columns"
    );
}

#[test]
fn snapshot_route_emits_http_snapshot_event() {
    let events = capture_events(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let response = table_router(Arc::new(InMemoryTableSource::demo()))
                .oneshot(
                    Request::builder()
                        .uri("/table/snapshot?grouping=chain-protocol")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("snapshot request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    let request = find_event(&events, "http.snapshot.request").expect("request logged");
    assert_eq!(request["grouping"], "chain-protocol");
}
