//! Table snapshot pipeline and its HTTP routes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::columns::{
    sanitize_config_columns, visible_columns, ColumnDictionaryItem, ColumnRegistry, ColumnRender,
    PresetRegistry, UnifiedTablePreset, NAME_COLUMN_ID,
};
use crate::datasets::{ChainTvl, DimensionProtocol, ParentProtocol, ProtocolLite, ALL_CHAINS};
use crate::export::{export_grouped_csv, export_leaf_csv};
use crate::fetch::{load_merge_inputs, DatasetFetcher, FetchConfig};
use crate::filters::{apply_filters, sanitize_filters, TableFilters};
use crate::grouping::{
    grouping_option, grouping_option_for_headers, sort_nodes_by, GroupingCache, RowHeader,
    UnifiedRowNode, DEFAULT_ROW_HEADERS,
};
use crate::merge::{format_protocols_list, ExtraTvlSettings, MergeInputs};
use crate::strategy::{build_protocol_rows, NormalizedRow, ProtocolsStrategyParams, StrategyType};

/// Where merge inputs come from: canned demo data or live dataset fetches.
pub trait TableSnapshotSource: Send + Sync + 'static {
    fn merge_inputs(&self, chains: &[String]) -> MergeInputs;

    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct InMemoryTableSource {
    inner: Arc<RwLock<MergeInputs>>,
}

impl InMemoryTableSource {
    pub fn new(inputs: MergeInputs) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inputs)),
        }
    }

    pub fn demo() -> Self {
        Self::new(demo_merge_inputs())
    }

    pub fn replace_inputs(&self, inputs: MergeInputs) {
        let mut guard = self.inner.write().unwrap_or_else(|err| err.into_inner());
        *guard = inputs;
    }
}

impl TableSnapshotSource for InMemoryTableSource {
    fn merge_inputs(&self, _chains: &[String]) -> MergeInputs {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Loads the protocol list and dimension datasets through a `DatasetFetcher` on every call.
pub struct LiveTableSource {
    fetcher: Arc<dyn DatasetFetcher>,
    config: FetchConfig,
}

impl LiveTableSource {
    pub fn new(fetcher: Arc<dyn DatasetFetcher>, config: FetchConfig) -> Self {
        Self { fetcher, config }
    }
}

impl TableSnapshotSource for LiveTableSource {
    fn merge_inputs(&self, chains: &[String]) -> MergeInputs {
        load_merge_inputs(self.fetcher.as_ref(), &self.config, chains)
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnapshotQuery {
    /// Grouping option id such as `chain-protocol`.
    pub grouping: Option<String>,
    /// Comma separated chain names; empty means all chains.
    pub chains: Option<String>,
    pub preset: Option<String>,
    /// Comma separated categories to keep.
    pub categories: Option<String>,
    /// Grouping level for `export.csv`; absent exports leaf rows.
    pub level: Option<usize>,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

impl SnapshotQuery {
    pub fn chain_list(&self) -> Vec<String> {
        let chains = split_list(self.chains.as_deref());
        if chains.is_empty() {
            vec![ALL_CHAINS.to_string()]
        } else {
            chains
        }
    }

    pub fn filters(&self) -> Option<TableFilters> {
        let categories = split_list(self.categories.as_deref());
        sanitize_filters(&TableFilters::new().with_list("categories", &categories))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotColumn {
    pub id: String,
    pub header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<ColumnRender>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub generated_at: String,
    pub source: &'static str,
    pub strategy_type: StrategyType,
    pub preset_id: String,
    pub chains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<&'static str>,
    pub row_headers: Vec<RowHeader>,
    pub columns: Vec<SnapshotColumn>,
    pub leaf_count: usize,
    pub rows: Vec<UnifiedRowNode>,
}

impl TableSnapshot {
    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.id.clone()).collect()
    }
}

/// Shared pieces every request needs: the source plus the registries and grouping memo.
#[derive(Clone)]
pub struct TablePipeline {
    source: Arc<dyn TableSnapshotSource>,
    registry: Arc<ColumnRegistry>,
    presets: Arc<PresetRegistry>,
    cache: Arc<Mutex<GroupingCache>>,
}

impl TablePipeline {
    pub fn new(source: Arc<dyn TableSnapshotSource>) -> Self {
        let registry = ColumnRegistry::new();
        let presets = PresetRegistry::new(&registry);
        Self {
            source,
            registry: Arc::new(registry),
            presets: Arc::new(presets),
            cache: Arc::new(Mutex::new(GroupingCache::default())),
        }
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    /// The requested protocol preset, or the default one.
    fn preset(&self, id: Option<&str>) -> Option<&UnifiedTablePreset> {
        let requested = id.and_then(|id| self.presets.get(id));
        match requested {
            Some(preset) if preset.strategy_type == StrategyType::Protocols => Some(preset),
            _ => {
                if let Some(id) = id {
                    warn!(
                        component = "dashboard",
                        event = "snapshot.preset.unsupported",
                        preset_id = id
                    );
                }
                self.presets.default_for(StrategyType::Protocols)
            }
        }
    }

    pub fn rows(
        &self,
        chains: &[String],
        row_headers: &[RowHeader],
        filters: Option<&TableFilters>,
    ) -> Vec<NormalizedRow> {
        let inputs = self.source.merge_inputs(chains);
        let formatted = format_protocols_list(&inputs, &ExtraTvlSettings::default(), false);
        let params = ProtocolsStrategyParams {
            chains: chains.to_vec(),
            extra_tvl: ExtraTvlSettings::default(),
        };
        let rows = build_protocol_rows(&formatted, &inputs.parent_protocols, &params, row_headers, None);
        match filters {
            Some(filters) => apply_filters(rows, filters),
            None => rows,
        }
    }

    pub fn snapshot(&self, query: &SnapshotQuery) -> TableSnapshot {
        let chains = query.chain_list();
        let preset = self.preset(query.preset.as_deref());

        let row_headers: Vec<RowHeader> = match query.grouping.as_deref().and_then(grouping_option) {
            Some(option) => option.headers.to_vec(),
            None => preset
                .map(|preset| preset.row_headers.clone())
                .unwrap_or_else(|| DEFAULT_ROW_HEADERS.to_vec()),
        };

        let column_state = preset
            .map(|preset| sanitize_config_columns(&self.registry, &preset.column_state(), &[]))
            .unwrap_or_default();
        let columns = visible_columns(&column_state)
            .into_iter()
            .map(|id| self.snapshot_column(id))
            .collect();

        let rows = self.rows(&chains, &row_headers, query.filters().as_ref());
        let mut nodes = self
            .cache
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get_or_build(&rows, &row_headers);
        if let Some(sort) = column_state.sorting.first() {
            sort_nodes_by(&mut nodes, sort);
        }

        TableSnapshot {
            generated_at: Utc::now().to_rfc3339(),
            source: self.source.name(),
            strategy_type: StrategyType::Protocols,
            preset_id: preset.map(|preset| preset.id.clone()).unwrap_or_default(),
            chains,
            grouping: grouping_option_for_headers(&row_headers).map(|option| option.id),
            row_headers,
            columns,
            leaf_count: rows.len(),
            rows: nodes,
        }
    }

    fn snapshot_column(&self, id: String) -> SnapshotColumn {
        if id == NAME_COLUMN_ID {
            return SnapshotColumn {
                id,
                header: "Name".to_string(),
                render: None,
            };
        }
        let item = self.registry.get(&id);
        SnapshotColumn {
            header: item.map(|item| item.header.to_string()).unwrap_or_else(|| id.clone()),
            render: item.map(|item| item.render),
            id,
        }
    }

    pub fn export_csv(&self, query: &SnapshotQuery) -> Result<String, crate::export::ExportError> {
        let snapshot = self.snapshot(query);
        let columns = snapshot.column_ids();
        match query.level {
            Some(level) => export_grouped_csv(&snapshot.rows, level, &columns, &[], &self.registry),
            None => {
                let leaves: Vec<NormalizedRow> = snapshot
                    .rows
                    .iter()
                    .flat_map(|node| node.leaves())
                    .cloned()
                    .collect();
                export_leaf_csv(&leaves, &columns, &[], &self.registry)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnDictionaryItem>,
    pub presets: Vec<UnifiedTablePreset>,
}

pub const SNAPSHOT_ROUTE: &str = "/table/snapshot";
pub const EXPORT_ROUTE: &str = "/table/export.csv";
pub const COLUMNS_ROUTE: &str = "/table/columns";
pub const TABLE_ROUTES: [&str; 3] = [SNAPSHOT_ROUTE, EXPORT_ROUTE, COLUMNS_ROUTE];

pub fn table_router(source: Arc<dyn TableSnapshotSource>) -> Router {
    Router::new()
        .route(SNAPSHOT_ROUTE, get(get_table_snapshot))
        .route(EXPORT_ROUTE, get(get_table_csv))
        .route(COLUMNS_ROUTE, get(get_table_columns))
        .with_state(TablePipeline::new(source))
}

async fn get_table_snapshot(
    State(pipeline): State<TablePipeline>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    info!(
        component = "http",
        event = "http.snapshot.request",
        grouping = query.grouping.as_deref().unwrap_or("default"),
        chains = query.chains.as_deref().unwrap_or(ALL_CHAINS),
        preset = query.preset.as_deref().unwrap_or("default")
    );
    match tokio::task::spawn_blocking(move || pipeline.snapshot(&query)).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => {
            warn!(component = "http", event = "http.snapshot.failed", error = %err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_table_csv(
    State(pipeline): State<TablePipeline>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    info!(
        component = "http",
        event = "http.export.request",
        export_level = query.level,
        chains = query.chains.as_deref().unwrap_or(ALL_CHAINS)
    );
    match tokio::task::spawn_blocking(move || pipeline.export_csv(&query)).await {
        Ok(Ok(csv)) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response(),
        Ok(Err(err)) => {
            warn!(component = "http", event = "http.export.failed", error = %err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            warn!(component = "http", event = "http.export.failed", error = %err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_table_columns(State(pipeline): State<TablePipeline>) -> impl IntoResponse {
    Json(ColumnsResponse {
        columns: pipeline.registry.items().to_vec(),
        presets: pipeline.presets.all().to_vec(),
    })
}

fn chain_tvls(entries: &[(&str, f64, f64)]) -> BTreeMap<String, ChainTvl> {
    entries
        .iter()
        .map(|(chain, tvl, prev)| {
            (
                chain.to_string(),
                ChainTvl {
                    tvl: Some(*tvl),
                    tvl_prev_day: Some(*prev),
                    ..ChainTvl::default()
                },
            )
        })
        .collect()
}

fn demo_protocol(
    id: &str,
    name: &str,
    category: &str,
    parent: Option<&str>,
    tvls: &[(&str, f64, f64)],
) -> ProtocolLite {
    let tvl: f64 = tvls.iter().map(|(_, tvl, _)| tvl).sum();
    let prev: f64 = tvls.iter().map(|(_, _, prev)| prev).sum();
    ProtocolLite {
        name: name.to_string(),
        defillama_id: Some(id.to_string()),
        slug: Some(name.to_lowercase().replace(' ', "-")),
        category: Some(category.to_string()),
        chains: tvls.iter().map(|(chain, _, _)| chain.to_string()).collect(),
        parent_protocol: parent.map(str::to_string),
        tvl: Some(tvl),
        tvl_prev_day: Some(prev),
        chain_tvls: chain_tvls(tvls),
        ..ProtocolLite::default()
    }
}

fn demo_dimension(id: &str, name: &str, total_24h: f64, total_7d: f64) -> DimensionProtocol {
    DimensionProtocol {
        name: name.to_string(),
        defillama_id: Some(id.to_string()),
        total_24h: Some(total_24h),
        total_7d: Some(total_7d),
        ..DimensionProtocol::default()
    }
}

/// Small fixed data set served when no live API is configured.
pub fn demo_merge_inputs() -> MergeInputs {
    let protocols = vec![
        demo_protocol(
            "111",
            "Aave V3",
            "Lending",
            Some("parent#aave"),
            &[("Ethereum", 12.0e9, 11.5e9), ("Arbitrum", 1.5e9, 1.4e9)],
        ),
        demo_protocol("112", "Aave V2", "Lending", Some("parent#aave"), &[("Ethereum", 0.9e9, 1.0e9)]),
        demo_protocol(
            "1599",
            "Uniswap V3",
            "Dexs",
            Some("parent#uniswap"),
            &[("Ethereum", 2.8e9, 2.7e9), ("Arbitrum", 0.4e9, 0.41e9), ("Base", 0.3e9, 0.28e9)],
        ),
        demo_protocol("182", "Lido", "Liquid Staking", None, &[("Ethereum", 24.0e9, 23.6e9)]),
        demo_protocol("2269", "Hyperliquid", "Derivatives", None, &[("Hyperliquid L1", 0.5e9, 0.48e9)]),
    ];
    let parent_protocols = vec![
        ParentProtocol {
            id: "parent#aave".to_string(),
            name: "Aave".to_string(),
            chains: vec!["Ethereum".to_string(), "Arbitrum".to_string()],
            ..ParentProtocol::default()
        },
        ParentProtocol {
            id: "parent#uniswap".to_string(),
            name: "Uniswap".to_string(),
            chains: vec!["Ethereum".to_string(), "Arbitrum".to_string(), "Base".to_string()],
            ..ParentProtocol::default()
        },
    ];

    MergeInputs {
        protocols,
        parent_protocols,
        volume: Some(vec![demo_dimension("1599", "Uniswap V3", 1.1e9, 7.4e9)]),
        fees: Some(vec![
            demo_dimension("111", "Aave V3", 2.1e6, 15.0e6),
            demo_dimension("1599", "Uniswap V3", 1.6e6, 11.2e6),
            demo_dimension("182", "Lido", 2.4e6, 16.9e6),
            demo_dimension("2269", "Hyperliquid", 3.0e6, 20.1e6),
        ]),
        perps: Some(vec![demo_dimension("2269", "Hyperliquid", 8.0e9, 55.0e9)]),
        ..MergeInputs::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> TablePipeline {
        TablePipeline::new(Arc::new(InMemoryTableSource::demo()))
    }

    #[test]
    fn chain_list_defaults_to_all() {
        assert_eq!(SnapshotQuery::default().chain_list(), vec!["All".to_string()]);
        let query = SnapshotQuery {
            chains: Some("Ethereum, Base,".into()),
            ..SnapshotQuery::default()
        };
        assert_eq!(query.chain_list(), vec!["Ethereum".to_string(), "Base".to_string()]);
    }

    #[test]
    fn empty_category_filter_is_dropped() {
        assert!(SnapshotQuery::default().filters().is_none());
        let query = SnapshotQuery {
            categories: Some("Lending".into()),
            ..SnapshotQuery::default()
        };
        assert!(query.filters().is_some());
    }

    #[test]
    fn default_snapshot_groups_by_parent_protocol() {
        let snapshot = pipeline().snapshot(&SnapshotQuery::default());
        assert_eq!(snapshot.grouping, Some("parent-protocol"));
        assert_eq!(snapshot.columns[0].id, "name");
        assert_eq!(snapshot.leaf_count, 5);
        assert!(snapshot
            .rows
            .iter()
            .any(|node| node.is_group() && node.label == "Aave"));
    }

    #[test]
    fn unknown_preset_falls_back_to_default() {
        let snapshot = pipeline().snapshot(&SnapshotQuery {
            preset: Some("nope".into()),
            ..SnapshotQuery::default()
        });
        let expected = PresetRegistry::new(&ColumnRegistry::new())
            .default_for(StrategyType::Protocols)
            .map(|preset| preset.id.clone())
            .unwrap_or_default();
        assert_eq!(snapshot.preset_id, expected);
    }

    #[test]
    fn category_filter_limits_rows() {
        let snapshot = pipeline().snapshot(&SnapshotQuery {
            categories: Some("lending".into()),
            grouping: Some("protocol-only".into()),
            ..SnapshotQuery::default()
        });
        assert_eq!(snapshot.leaf_count, 2);
        assert_eq!(snapshot.rows.len(), 2);
    }
}
