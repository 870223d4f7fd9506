#![cfg(feature = "live-api-tests")]

use std::sync::Arc;

use prodash_table::{
    fetch_config_from_env, fetch_protocols, LiveTableSource, ReqwestDatasetFetcher,
    SnapshotQuery, TablePipeline,
};

#[test]
#[ignore = "requires external network access"]
fn live_protocols_list_is_not_empty() {
    let cfg = fetch_config_from_env();
    let fetcher = ReqwestDatasetFetcher::new(cfg.timeout_ms).expect("client should build");

    let response = fetch_protocols(&fetcher, &cfg).expect("protocols should load");
    assert!(!response.protocols.is_empty());
    assert!(!response.parent_protocols.is_empty());
}

#[test]
#[ignore = "requires external network access"]
fn live_ethereum_snapshot_has_rows() {
    let cfg = fetch_config_from_env();
    let fetcher = ReqwestDatasetFetcher::new(cfg.timeout_ms).expect("client should build");
    let pipeline = TablePipeline::new(Arc::new(LiveTableSource::new(Arc::new(fetcher), cfg)));

    let snapshot = pipeline.snapshot(&SnapshotQuery {
        chains: Some("Ethereum".to_string()),
        ..SnapshotQuery::default()
    });
    assert!(snapshot.leaf_count > 0);
    assert!(!snapshot.rows.is_empty());
}
