//! HTTP loading for the protocol list and the dimension datasets.
//!
//! Every dataset request is independent. A failed request is logged and turned into an absent
//! source so the merge still runs with whatever did load.

use std::thread;

use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chains::to_dimensions_slug;
use crate::datasets::{
    aggregate_multi_chain, build_protocol_list, chains_to_fetch, combine_fees_and_revenue,
    ChainPayload, DatasetKind, DimensionProtocol, ProtocolsResponse, ALL_CHAINS,
};
use crate::merge::MergeInputs;

pub const DEFAULT_API_BASE: &str = "https://api.llama.fi";
pub const DEFAULT_DATASETS_BASE: &str = "https://defillama.com";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub base_url: String,
    pub datasets_base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            datasets_base_url: DEFAULT_DATASETS_BASE.to_string(),
            timeout_ms: 15_000,
            max_retries: 1,
            retry_backoff_ms: 200,
        }
    }
}

pub fn fetch_config_from_env() -> FetchConfig {
    fetch_config_from_lookup(|key| std::env::var(key).ok())
}

fn fetch_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FetchConfig {
    let mut cfg = FetchConfig::default();
    if let Some(base) = lookup("PRODASH_API_BASE").filter(|value| !value.trim().is_empty()) {
        cfg.base_url = base.trim().trim_end_matches('/').to_string();
    }
    if let Some(base) = lookup("PRODASH_DATASETS_BASE").filter(|value| !value.trim().is_empty()) {
        cfg.datasets_base_url = base.trim().trim_end_matches('/').to_string();
    }
    if let Some(timeout) = lookup("PRODASH_FETCH_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
        cfg.timeout_ms = timeout;
    }
    cfg
}

/// Source of decoded JSON documents; tests swap in canned responses.
pub trait DatasetFetcher: Send + Sync {
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

pub struct ReqwestDatasetFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestDatasetFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FetchError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl DatasetFetcher for ReqwestDatasetFetcher {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(|err| FetchError::HttpRequest {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

pub fn protocols_url(cfg: &FetchConfig) -> String {
    format!("{}/lite/protocols2?b=2", cfg.base_url)
}

/// `/overview/{path}/{chain}` for a per-chain dataset; `data_type` selects e.g. `dailyRevenue`.
pub fn overview_url(
    cfg: &FetchConfig,
    kind: DatasetKind,
    chain: &str,
    data_type: Option<&str>,
) -> Result<String, FetchError> {
    let path = kind.overview_path().unwrap_or_else(|| kind.as_str());
    let mut raw = format!("{}/overview/{}", cfg.base_url, path);
    if !chain.is_empty() && chain != ALL_CHAINS {
        raw.push('/');
        raw.push_str(&to_dimensions_slug(chain));
    }

    let mut url = parse_url(&raw)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("excludeTotalDataChart", "true");
        query.append_pair("excludeTotalDataChartBreakdown", "true");
        if let Some(data_type) = data_type {
            query.append_pair("dataType", data_type);
        }
    }
    Ok(url.into())
}

/// `/api/datasets/{kind}` with sorted, deduplicated `chains=` parameters.
pub fn dataset_url(
    cfg: &FetchConfig,
    kind: DatasetKind,
    chains: &[String],
) -> Result<String, FetchError> {
    let mut url = parse_url(&format!(
        "{}/api/datasets/{}",
        cfg.datasets_base_url,
        kind.as_str()
    ))?;

    let mut selected: Vec<&str> = chains
        .iter()
        .map(String::as_str)
        .filter(|chain| !chain.is_empty())
        .collect();
    if !selected.contains(&ALL_CHAINS) {
        selected.sort_unstable();
        selected.dedup();
        if !selected.is_empty() {
            let mut query = url.query_pairs_mut();
            for chain in selected {
                query.append_pair("chains", chain);
            }
        }
    }
    Ok(url.into())
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|err| FetchError::InvalidUrl {
        url: raw.to_string(),
        message: err.to_string(),
    })
}

/// Accepts both `{"protocols": [...]}` and bare array documents.
pub fn decode_protocols(url: &str, value: Value) -> Result<Vec<DimensionProtocol>, FetchError> {
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("protocols").unwrap_or(Value::Array(Vec::new())),
        Value::Null => Value::Array(Vec::new()),
        other => {
            return Err(FetchError::Decode {
                url: url.to_string(),
                message: format!("expected array or object, found {other}"),
            })
        }
    };
    serde_json::from_value(list).map_err(|err| FetchError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

fn get_with_retry(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    url: &str,
) -> Result<Value, FetchError> {
    retry(cfg, || fetcher.get_json(url))
}

fn retry<T>(
    cfg: &FetchConfig,
    mut f: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err @ FetchError::Decode { .. }) => return Err(err),
            Err(err) if attempt >= cfg.max_retries => return Err(err),
            Err(_) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let factor = 1u64 << shift;
                let sleep_ms = cfg.retry_backoff_ms.saturating_mul(factor);
                thread::sleep(std::time::Duration::from_millis(sleep_ms));
            }
        }
    }
}

fn fetch_overview(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    kind: DatasetKind,
    chain: &str,
    data_type: Option<&str>,
) -> Result<Vec<DimensionProtocol>, FetchError> {
    let url = overview_url(cfg, kind, chain, data_type)?;
    let value = get_with_retry(fetcher, cfg, &url)?;
    decode_protocols(&url, value)
}

fn fetch_chain_payload(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    kind: DatasetKind,
    chain: &str,
) -> Result<Vec<DimensionProtocol>, FetchError> {
    let primary = fetch_overview(fetcher, cfg, kind, chain, None)?;
    if kind != DatasetKind::Fees {
        return Ok(primary);
    }

    let revenue = fetch_overview(fetcher, cfg, kind, chain, Some("dailyRevenue"))
        .unwrap_or_else(|err| {
            log_fetch_failure(kind, chain, "dailyRevenue", &err);
            Vec::new()
        });
    let holders = fetch_overview(fetcher, cfg, kind, chain, Some("dailyHoldersRevenue"))
        .unwrap_or_else(|err| {
            log_fetch_failure(kind, chain, "dailyHoldersRevenue", &err);
            Vec::new()
        });
    Ok(combine_fees_and_revenue(primary, &revenue, &holders))
}

fn log_fetch_failure(kind: DatasetKind, chain: &str, data_type: &str, err: &FetchError) {
    warn!(
        component = "fetch",
        event = "dataset.fetch.failed",
        dataset = kind.as_str(),
        chain = chain,
        data_type = data_type,
        error = %err
    );
}

/// One request per chain, issued in parallel. Failures become `protocols: None`.
pub fn fetch_chain_payloads(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    kind: DatasetKind,
    chains: &[String],
) -> Vec<ChainPayload> {
    let targets = chains_to_fetch(chains);
    // Scoped subscribers are thread-local; workers log through the caller's dispatcher.
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());

    thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|chain| {
                let dispatch = dispatch.clone();
                scope.spawn(move || tracing::dispatcher::with_default(&dispatch, || {
                    let protocols = match fetch_chain_payload(fetcher, cfg, kind, chain) {
                        Ok(protocols) => {
                            debug!(
                                component = "fetch",
                                event = "dataset.fetch.chain_loaded",
                                dataset = kind.as_str(),
                                chain = chain.as_str(),
                                protocol_count = protocols.len()
                            );
                            Some(protocols)
                        }
                        Err(err) => {
                            log_fetch_failure(kind, chain, "default", &err);
                            None
                        }
                    };
                    ChainPayload {
                        chain: chain.clone(),
                        protocols,
                    }
                }))
            })
            .collect();

        handles
            .into_iter()
            .zip(targets.iter())
            .map(|(handle, chain)| {
                handle.join().unwrap_or_else(|_| ChainPayload {
                    chain: chain.clone(),
                    protocols: None,
                })
            })
            .collect()
    })
}

/// Loads one dataset for the selection, folding per-chain payloads where needed.
pub fn fetch_dataset(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    kind: DatasetKind,
    chains: &[String],
) -> Option<Vec<DimensionProtocol>> {
    if kind.is_per_chain() {
        let payloads = fetch_chain_payloads(fetcher, cfg, kind, chains);
        if payloads.iter().all(|payload| payload.protocols.is_none()) {
            return None;
        }
        return Some(aggregate_multi_chain(kind, chains, &payloads));
    }

    let url = match dataset_url(cfg, kind, chains) {
        Ok(url) => url,
        Err(err) => {
            log_fetch_failure(kind, ALL_CHAINS, "default", &err);
            return None;
        }
    };
    match get_with_retry(fetcher, cfg, &url).and_then(|value| decode_protocols(&url, value)) {
        Ok(protocols) => Some(protocols),
        Err(err) => {
            log_fetch_failure(kind, ALL_CHAINS, "default", &err);
            None
        }
    }
}

pub fn fetch_protocols(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
) -> Result<ProtocolsResponse, FetchError> {
    let url = protocols_url(cfg);
    let value = get_with_retry(fetcher, cfg, &url)?;
    serde_json::from_value(value).map_err(|err| FetchError::Decode {
        url,
        message: err.to_string(),
    })
}

/// Loads the protocol list and all eight dimension datasets for a chain selection.
pub fn load_merge_inputs(
    fetcher: &dyn DatasetFetcher,
    cfg: &FetchConfig,
    chains: &[String],
) -> MergeInputs {
    info!(
        component = "fetch",
        event = "dataset.load.start",
        chain_count = chains.len(),
        chains = %chains.join(",")
    );

    let (protocols, parent_protocols) = match fetch_protocols(fetcher, cfg) {
        Ok(response) => {
            let list = build_protocol_list(&response, chains);
            (list, response.parent_protocols)
        }
        Err(err) => {
            warn!(
                component = "fetch",
                event = "protocols.fetch.failed",
                error = %err
            );
            (Vec::new(), Vec::new())
        }
    };

    let mut inputs = MergeInputs {
        protocols,
        parent_protocols,
        ..MergeInputs::default()
    };
    for kind in DatasetKind::ALL {
        inputs.set_dataset(kind, fetch_dataset(fetcher, cfg, kind, chains));
    }

    info!(
        component = "fetch",
        event = "dataset.load.finish",
        protocol_count = inputs.protocols.len(),
        loaded_datasets = inputs.loaded_dataset_count()
    );
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockFetcher {
        responses: HashMap<String, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn new(responses: Vec<(String, Value)>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl DatasetFetcher for MockFetcher {
        fn get_json(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn cfg() -> FetchConfig {
        FetchConfig {
            base_url: "http://api.test".to_string(),
            datasets_base_url: "http://site.test".to_string(),
            max_retries: 0,
            retry_backoff_ms: 0,
            ..FetchConfig::default()
        }
    }

    fn chains(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn overview_urls_use_dimension_slugs() {
        let url = overview_url(&cfg(), DatasetKind::Fees, "OP Mainnet", Some("dailyRevenue")).unwrap();
        assert_eq!(
            url,
            "http://api.test/overview/fees/optimism?excludeTotalDataChart=true&excludeTotalDataChartBreakdown=true&dataType=dailyRevenue"
        );
        let all = overview_url(&cfg(), DatasetKind::Perps, "All", None).unwrap();
        assert!(all.starts_with("http://api.test/overview/derivatives?"));
    }

    #[test]
    fn dataset_urls_sort_and_encode_chains() {
        let url = dataset_url(
            &cfg(),
            DatasetKind::BridgeAggregators,
            &chains(&["OP Mainnet", "Base", "Base"]),
        )
        .unwrap();
        assert_eq!(
            url,
            "http://site.test/api/datasets/bridge-aggregators?chains=Base&chains=OP+Mainnet"
        );
        let all = dataset_url(&cfg(), DatasetKind::Options, &chains(&["All"])).unwrap();
        assert_eq!(all, "http://site.test/api/datasets/options");
    }

    #[test]
    fn failed_chain_requests_become_absent_payloads() {
        let eth = overview_url(&cfg(), DatasetKind::Volume, "Ethereum", None).unwrap();
        let fetcher = MockFetcher::new(vec![(
            eth,
            serde_json::json!({"protocols": [{"name": "Uniswap", "total24h": 10.0}]}),
        )]);

        let payloads = fetch_chain_payloads(
            &fetcher,
            &cfg(),
            DatasetKind::Volume,
            &chains(&["Ethereum", "Base"]),
        );
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].chain, "Ethereum");
        assert_eq!(payloads[0].protocols.as_ref().map(Vec::len), Some(1));
        assert_eq!(payloads[1].protocols, None);
    }

    #[test]
    fn fees_payload_is_joined_with_revenue() {
        let c = cfg();
        let fetcher = MockFetcher::new(vec![
            (
                overview_url(&c, DatasetKind::Fees, "Ethereum", None).unwrap(),
                serde_json::json!({"protocols": [{"name": "Aave", "total24h": 100.0}]}),
            ),
            (
                overview_url(&c, DatasetKind::Fees, "Ethereum", Some("dailyRevenue")).unwrap(),
                serde_json::json!({"protocols": [{"name": "Aave", "total24h": 30.0}]}),
            ),
        ]);

        let data = fetch_dataset(&fetcher, &c, DatasetKind::Fees, &chains(&["Ethereum"])).unwrap();
        assert_eq!(data[0].total_24h, Some(100.0));
        assert_eq!(data[0].revenue_24h, Some(30.0));
        assert_eq!(data[0].holders_revenue_24h, None);
    }

    #[test]
    fn retries_transport_errors_but_not_decode_errors() {
        let c = FetchConfig {
            max_retries: 2,
            ..cfg()
        };
        let mut calls = 0;
        let result: Result<(), FetchError> = retry(&c, || {
            calls += 1;
            Err(FetchError::Status {
                url: "u".to_string(),
                status: 500,
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<(), FetchError> = retry(&c, || {
            calls += 1;
            Err(FetchError::Decode {
                url: "u".to_string(),
                message: "bad".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn decode_accepts_arrays_and_wrapped_lists() {
        let wrapped = decode_protocols("u", serde_json::json!({"protocols": [{"name": "A"}]})).unwrap();
        let bare = decode_protocols("u", serde_json::json!([{"name": "B"}])).unwrap();
        assert_eq!(wrapped[0].name, "A");
        assert_eq!(bare[0].name, "B");
        assert!(decode_protocols("u", serde_json::json!(3)).is_err());
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let cfg = fetch_config_from_lookup(|key| match key {
            "PRODASH_API_BASE" => Some("http://localhost:5001/".to_string()),
            "PRODASH_FETCH_TIMEOUT_MS" => Some("250".to_string()),
            _ => None,
        });
        assert_eq!(cfg.base_url, "http://localhost:5001");
        assert_eq!(cfg.datasets_base_url, DEFAULT_DATASETS_BASE);
        assert_eq!(cfg.timeout_ms, 250);
    }

    #[test]
    fn load_merge_inputs_degrades_when_everything_fails() {
        let fetcher = MockFetcher::new(Vec::new());
        let inputs = load_merge_inputs(&fetcher, &cfg(), &chains(&["Ethereum"]));
        assert!(inputs.protocols.is_empty());
        assert_eq!(inputs.loaded_dataset_count(), 0);
    }
}
