//! Add/edit item modal as a pure state machine.
//!
//! `modal_reducer` is the only way state changes. `initialize_from_edit_item` rebuilds the
//! state from a saved item and `build_submission` turns the state back into items, so editing
//! an item round-trips through the same shape used for creation.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::item_config::{
    is_groupable_chart_type, ChartBuilderConfig, ChartBuilderItem, ChartConfig, ChartGrouping,
    DashboardItemConfig, ItemMeta, MetricAggregator, MetricCompare, MetricConfig, MetricSubject,
    MetricSubjectType, MetricWindow, MultiChartConfig, ProtocolChartConfig, ProtocolsTableConfig,
    StablecoinAssetConfig, StablecoinsConfig, TableType, TextConfig, YieldsConfig,
    GECKO_CHAIN_CHART_TYPES,
};

pub const MAX_SELECTED_TOKENS: usize = 4;
const METRIC_COL_SPAN: f64 = 0.5;
const DEFAULT_TRENDING_TIMEFRAME: &str = "1d";

/// Metric types whose natural aggregate over a window is a sum.
pub const CUMULATIVE_METRIC_TYPES: [&str; 23] = [
    "volume",
    "fees",
    "revenue",
    "perps",
    "aggregators",
    "bridgeAggregators",
    "perpsAggregators",
    "bribes",
    "tokenTax",
    "holdersRevenue",
    "optionsPremium",
    "optionsNotional",
    "tokenVolume",
    "users",
    "txs",
    "activeUsers",
    "newUsers",
    "gasUsed",
    "stablecoinInflows",
    "chainFees",
    "chainRevenue",
    "incentives",
    "options",
];

pub fn default_metric_aggregator(metric_type: &str) -> MetricAggregator {
    if CUMULATIVE_METRIC_TYPES.contains(&metric_type) {
        MetricAggregator::Sum
    } else {
        MetricAggregator::Latest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MainTab {
    #[default]
    Charts,
    Table,
    UnifiedTable,
    Text,
    Builder,
    Metric,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartTab {
    #[default]
    Chain,
    Protocol,
    Yields,
    Stablecoins,
    AdvancedTvl,
    Borrowed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    Manual,
    #[default]
    Builder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartCreationMode {
    Separate,
    #[default]
    Combined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StablecoinMode {
    #[default]
    Chain,
    Asset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinedTableType {
    #[default]
    Protocols,
    Stablecoins,
    Cex,
    Revenue,
    HoldersRevenue,
    Earnings,
    Fees,
    TokenUsage,
    Yields,
    Aggregators,
    Perps,
    Options,
    Dexs,
    BridgeAggregators,
    TrendingContracts,
    Chains,
}

impl CombinedTableType {
    pub const ALL: [CombinedTableType; 16] = [
        CombinedTableType::Protocols,
        CombinedTableType::Stablecoins,
        CombinedTableType::Cex,
        CombinedTableType::Revenue,
        CombinedTableType::HoldersRevenue,
        CombinedTableType::Earnings,
        CombinedTableType::Fees,
        CombinedTableType::TokenUsage,
        CombinedTableType::Yields,
        CombinedTableType::Aggregators,
        CombinedTableType::Perps,
        CombinedTableType::Options,
        CombinedTableType::Dexs,
        CombinedTableType::BridgeAggregators,
        CombinedTableType::TrendingContracts,
        CombinedTableType::Chains,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CombinedTableType::Protocols => "protocols",
            CombinedTableType::Stablecoins => "stablecoins",
            CombinedTableType::Cex => "cex",
            CombinedTableType::Revenue => "revenue",
            CombinedTableType::HoldersRevenue => "holders-revenue",
            CombinedTableType::Earnings => "earnings",
            CombinedTableType::Fees => "fees",
            CombinedTableType::TokenUsage => "token-usage",
            CombinedTableType::Yields => "yields",
            CombinedTableType::Aggregators => "aggregators",
            CombinedTableType::Perps => "perps",
            CombinedTableType::Options => "options",
            CombinedTableType::Dexs => "dexs",
            CombinedTableType::BridgeAggregators => "bridge-aggregators",
            CombinedTableType::TrendingContracts => "trending-contracts",
            CombinedTableType::Chains => "chains",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldPoolSelection {
    #[serde(rename = "configID")]
    pub config_id: String,
    pub name: String,
    pub project: String,
    pub chain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalState {
    pub selected_main_tab: MainTab,
    pub selected_chart_tab: ChartTab,
    pub chart_mode: ChartMode,
    pub composer_items: Vec<ChartConfig>,
    pub selected_chain: Option<String>,
    pub selected_chains: Vec<String>,
    pub selected_protocol: Option<String>,
    pub selected_protocols: Vec<String>,
    pub selected_chart_type: String,
    pub selected_chart_types: Vec<String>,
    pub unified_chart_name: String,
    pub chart_creation_mode: ChartCreationMode,
    pub text_title: String,
    pub text_content: String,
    pub selected_table_type: CombinedTableType,
    pub selected_dataset_chain: Option<String>,
    pub selected_dataset_timeframe: Option<String>,
    pub selected_tokens: Vec<String>,
    pub include_cex: bool,
    pub chart_builder_name: String,
    pub chart_builder: ChartBuilderConfig,
    pub metric_subject_type: MetricSubjectType,
    pub metric_chain: Option<String>,
    pub metric_protocol: Option<String>,
    pub metric_type: String,
    pub metric_aggregator: MetricAggregator,
    pub metric_window: MetricWindow,
    pub metric_label: String,
    pub metric_show_sparkline: bool,
    pub selected_yield_pool: Option<YieldPoolSelection>,
    pub selected_yield_chart_type: String,
    pub selected_yield_chains: Vec<String>,
    pub selected_yield_projects: Vec<String>,
    pub selected_yield_categories: Vec<String>,
    pub selected_yield_tokens: Vec<String>,
    pub min_tvl: Option<f64>,
    pub max_tvl: Option<f64>,
    pub selected_stablecoin_chain: String,
    pub selected_stablecoin_chart_type: String,
    pub stablecoin_mode: StablecoinMode,
    pub selected_stablecoin_asset: Option<String>,
    pub selected_stablecoin_asset_id: Option<String>,
    pub selected_stablecoin_asset_chart_type: String,
    pub selected_advanced_tvl_protocol: Option<String>,
    pub selected_advanced_tvl_protocol_name: Option<String>,
    pub selected_advanced_tvl_chart_type: String,
    pub selected_borrowed_protocol: Option<String>,
    pub selected_borrowed_protocol_name: Option<String>,
    pub selected_borrowed_chart_type: String,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            selected_main_tab: MainTab::Charts,
            selected_chart_tab: ChartTab::Chain,
            chart_mode: ChartMode::Builder,
            composer_items: Vec::new(),
            selected_chain: None,
            selected_chains: Vec::new(),
            selected_protocol: None,
            selected_protocols: Vec::new(),
            selected_chart_type: "tvl".to_string(),
            selected_chart_types: Vec::new(),
            unified_chart_name: String::new(),
            chart_creation_mode: ChartCreationMode::Combined,
            text_title: String::new(),
            text_content: String::new(),
            selected_table_type: CombinedTableType::Protocols,
            selected_dataset_chain: None,
            selected_dataset_timeframe: None,
            selected_tokens: Vec::new(),
            include_cex: false,
            chart_builder_name: String::new(),
            chart_builder: ChartBuilderConfig::default(),
            metric_subject_type: MetricSubjectType::Chain,
            metric_chain: None,
            metric_protocol: None,
            metric_type: "tvl".to_string(),
            metric_aggregator: MetricAggregator::Latest,
            metric_window: MetricWindow::Days30,
            metric_label: String::new(),
            metric_show_sparkline: true,
            selected_yield_pool: None,
            selected_yield_chart_type: "tvl-apy".to_string(),
            selected_yield_chains: Vec::new(),
            selected_yield_projects: Vec::new(),
            selected_yield_categories: Vec::new(),
            selected_yield_tokens: Vec::new(),
            min_tvl: None,
            max_tvl: None,
            selected_stablecoin_chain: "All".to_string(),
            selected_stablecoin_chart_type: "totalMcap".to_string(),
            stablecoin_mode: StablecoinMode::Chain,
            selected_stablecoin_asset: None,
            selected_stablecoin_asset_id: None,
            selected_stablecoin_asset_chart_type: "totalCirc".to_string(),
            selected_advanced_tvl_protocol: None,
            selected_advanced_tvl_protocol_name: None,
            selected_advanced_tvl_chart_type: "tvl".to_string(),
            selected_borrowed_protocol: None,
            selected_borrowed_protocol_name: None,
            selected_borrowed_chart_type: "chainsBorrowed".to_string(),
        }
    }
}

impl ModalState {
    pub fn initial() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalAction {
    SetSelectedMainTab(MainTab),
    SetSelectedChartTab(ChartTab),
    SetChartMode(ChartMode),
    SetComposerItems(Vec<ChartConfig>),
    SetSelectedChain(Option<String>),
    SetSelectedChains(Vec<String>),
    SetSelectedProtocol(Option<String>),
    SetSelectedProtocols(Vec<String>),
    SetSelectedChartType(String),
    SetSelectedChartTypes(Vec<String>),
    SetUnifiedChartName(String),
    SetChartCreationMode(ChartCreationMode),
    SetTextTitle(String),
    SetTextContent(String),
    SetSelectedTableType(CombinedTableType),
    SetSelectedDatasetChain(Option<String>),
    SetSelectedDatasetTimeframe(Option<String>),
    SetSelectedTokens(Vec<String>),
    SetIncludeCex(bool),
    SetChartBuilderName(String),
    SetChartBuilder(ChartBuilderConfig),
    SetMetricSubjectType(MetricSubjectType),
    SetMetricChain(Option<String>),
    SetMetricProtocol(Option<String>),
    /// Also resets the aggregator to the metric type's default.
    SetMetricType(String),
    SetMetricAggregator(MetricAggregator),
    SetMetricWindow(MetricWindow),
    SetMetricLabel(String),
    SetMetricShowSparkline(bool),
    SetSelectedYieldPool(Option<YieldPoolSelection>),
    SetSelectedYieldChartType(String),
    SetSelectedYieldChains(Vec<String>),
    SetSelectedYieldProjects(Vec<String>),
    SetSelectedYieldCategories(Vec<String>),
    SetSelectedYieldTokens(Vec<String>),
    SetMinTvl(Option<f64>),
    SetMaxTvl(Option<f64>),
    SetSelectedStablecoinChain(String),
    SetSelectedStablecoinChartType(String),
    SetStablecoinMode(StablecoinMode),
    SetSelectedStablecoinAsset(Option<String>),
    SetSelectedStablecoinAssetId(Option<String>),
    SetSelectedStablecoinAssetChartType(String),
    SetSelectedAdvancedTvlProtocol(Option<String>),
    SetSelectedAdvancedTvlProtocolName(Option<String>),
    SetSelectedAdvancedTvlChartType(String),
    SetSelectedBorrowedProtocol(Option<String>),
    SetSelectedBorrowedProtocolName(Option<String>),
    SetSelectedBorrowedChartType(String),
    ResetState,
    InitializeFromEditItem(Option<DashboardItemConfig>),
}

pub fn modal_reducer(state: ModalState, action: ModalAction) -> ModalState {
    use ModalAction as A;

    match action {
        A::SetSelectedMainTab(tab) => ModalState { selected_main_tab: tab, ..state },
        A::SetSelectedChartTab(tab) => ModalState { selected_chart_tab: tab, ..state },
        A::SetChartMode(mode) => ModalState { chart_mode: mode, ..state },
        A::SetComposerItems(items) => ModalState { composer_items: items, ..state },
        A::SetSelectedChain(chain) => ModalState { selected_chain: chain, ..state },
        A::SetSelectedChains(chains) => ModalState { selected_chains: chains, ..state },
        A::SetSelectedProtocol(protocol) => ModalState { selected_protocol: protocol, ..state },
        A::SetSelectedProtocols(protocols) => ModalState { selected_protocols: protocols, ..state },
        A::SetSelectedChartType(chart_type) => ModalState { selected_chart_type: chart_type, ..state },
        A::SetSelectedChartTypes(types) => ModalState { selected_chart_types: types, ..state },
        A::SetUnifiedChartName(name) => ModalState { unified_chart_name: name, ..state },
        A::SetChartCreationMode(mode) => ModalState { chart_creation_mode: mode, ..state },
        A::SetTextTitle(title) => ModalState { text_title: title, ..state },
        A::SetTextContent(content) => ModalState { text_content: content, ..state },
        A::SetSelectedTableType(kind) => ModalState { selected_table_type: kind, ..state },
        A::SetSelectedDatasetChain(chain) => ModalState { selected_dataset_chain: chain, ..state },
        A::SetSelectedDatasetTimeframe(timeframe) => ModalState {
            selected_dataset_timeframe: timeframe,
            ..state
        },
        A::SetSelectedTokens(tokens) => ModalState { selected_tokens: tokens, ..state },
        A::SetIncludeCex(include) => ModalState { include_cex: include, ..state },
        A::SetChartBuilderName(name) => ModalState { chart_builder_name: name, ..state },
        A::SetChartBuilder(config) => ModalState { chart_builder: config, ..state },
        A::SetMetricSubjectType(kind) => ModalState { metric_subject_type: kind, ..state },
        A::SetMetricChain(chain) => ModalState { metric_chain: chain, ..state },
        A::SetMetricProtocol(protocol) => ModalState { metric_protocol: protocol, ..state },
        A::SetMetricType(metric_type) => ModalState {
            metric_aggregator: default_metric_aggregator(&metric_type),
            metric_type,
            ..state
        },
        A::SetMetricAggregator(aggregator) => ModalState { metric_aggregator: aggregator, ..state },
        A::SetMetricWindow(window) => ModalState { metric_window: window, ..state },
        A::SetMetricLabel(label) => ModalState { metric_label: label, ..state },
        A::SetMetricShowSparkline(show) => ModalState { metric_show_sparkline: show, ..state },
        A::SetSelectedYieldPool(pool) => ModalState { selected_yield_pool: pool, ..state },
        A::SetSelectedYieldChartType(chart_type) => ModalState {
            selected_yield_chart_type: chart_type,
            ..state
        },
        A::SetSelectedYieldChains(chains) => ModalState { selected_yield_chains: chains, ..state },
        A::SetSelectedYieldProjects(projects) => ModalState {
            selected_yield_projects: projects,
            ..state
        },
        A::SetSelectedYieldCategories(categories) => ModalState {
            selected_yield_categories: categories,
            ..state
        },
        A::SetSelectedYieldTokens(tokens) => ModalState { selected_yield_tokens: tokens, ..state },
        A::SetMinTvl(value) => ModalState { min_tvl: value, ..state },
        A::SetMaxTvl(value) => ModalState { max_tvl: value, ..state },
        A::SetSelectedStablecoinChain(chain) => ModalState {
            selected_stablecoin_chain: chain,
            ..state
        },
        A::SetSelectedStablecoinChartType(chart_type) => ModalState {
            selected_stablecoin_chart_type: chart_type,
            ..state
        },
        A::SetStablecoinMode(mode) => ModalState { stablecoin_mode: mode, ..state },
        A::SetSelectedStablecoinAsset(asset) => ModalState {
            selected_stablecoin_asset: asset,
            ..state
        },
        A::SetSelectedStablecoinAssetId(id) => ModalState {
            selected_stablecoin_asset_id: id,
            ..state
        },
        A::SetSelectedStablecoinAssetChartType(chart_type) => ModalState {
            selected_stablecoin_asset_chart_type: chart_type,
            ..state
        },
        A::SetSelectedAdvancedTvlProtocol(protocol) => ModalState {
            selected_advanced_tvl_protocol: protocol,
            ..state
        },
        A::SetSelectedAdvancedTvlProtocolName(name) => ModalState {
            selected_advanced_tvl_protocol_name: name,
            ..state
        },
        A::SetSelectedAdvancedTvlChartType(chart_type) => ModalState {
            selected_advanced_tvl_chart_type: chart_type,
            ..state
        },
        A::SetSelectedBorrowedProtocol(protocol) => ModalState {
            selected_borrowed_protocol: protocol,
            ..state
        },
        A::SetSelectedBorrowedProtocolName(name) => ModalState {
            selected_borrowed_protocol_name: name,
            ..state
        },
        A::SetSelectedBorrowedChartType(chart_type) => ModalState {
            selected_borrowed_chart_type: chart_type,
            ..state
        },
        A::ResetState => ModalState::initial(),
        A::InitializeFromEditItem(item) => initialize_from_edit_item(item.as_ref()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Modal state for editing `item`, or the initial state when there is none.
pub fn initialize_from_edit_item(item: Option<&DashboardItemConfig>) -> ModalState {
    let base = ModalState::initial();
    let Some(item) = item else {
        return base;
    };

    match item {
        DashboardItemConfig::Chart(chart) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: if chart.protocol.is_some() {
                ChartTab::Protocol
            } else {
                ChartTab::Chain
            },
            selected_chain: non_empty(&chart.chain),
            selected_protocol: chart.protocol.clone(),
            selected_chart_type: chart.chart_type.clone(),
            selected_chart_types: vec![chart.chart_type.clone()],
            chart_creation_mode: ChartCreationMode::Combined,
            unified_chart_name: String::new(),
            ..base
        },
        DashboardItemConfig::Multi(multi) => {
            let first = multi.items.first();
            ModalState {
                selected_main_tab: MainTab::Charts,
                chart_mode: ChartMode::Manual,
                composer_items: multi.items.clone(),
                unified_chart_name: multi.name.clone().unwrap_or_default(),
                chart_creation_mode: ChartCreationMode::Combined,
                selected_chart_tab: if first.is_some_and(|chart| chart.protocol.is_some()) {
                    ChartTab::Protocol
                } else {
                    ChartTab::Chain
                },
                selected_chart_types: Vec::new(),
                selected_protocol: first.and_then(|chart| chart.protocol.clone()),
                selected_chain: first.and_then(|chart| non_empty(&chart.chain)),
                ..base
            }
        }
        DashboardItemConfig::Table(table) => ModalState {
            selected_main_tab: MainTab::Table,
            selected_chains: table.chains.clone(),
            selected_table_type: match table.table_type {
                TableType::Dataset => table
                    .dataset_type
                    .as_deref()
                    .and_then(CombinedTableType::parse)
                    .unwrap_or(CombinedTableType::Stablecoins),
                TableType::Protocols => CombinedTableType::Protocols,
            },
            selected_dataset_chain: table.dataset_chain.clone(),
            selected_dataset_timeframe: table.dataset_timeframe.clone(),
            selected_tokens: table.token_symbols.clone().unwrap_or_default(),
            include_cex: table.include_cex.unwrap_or(false),
            ..base
        },
        DashboardItemConfig::UnifiedTable(_) => ModalState {
            selected_main_tab: MainTab::UnifiedTable,
            ..base
        },
        DashboardItemConfig::Text(text) => ModalState {
            selected_main_tab: MainTab::Text,
            text_title: text.title.clone().unwrap_or_default(),
            text_content: text.content.clone(),
            ..base
        },
        DashboardItemConfig::Builder(builder) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Builder,
            chart_builder_name: builder.name.clone().unwrap_or_default(),
            chart_builder: builder.config.clone(),
            ..base
        },
        DashboardItemConfig::Metric(metric) => ModalState {
            selected_main_tab: MainTab::Metric,
            metric_subject_type: metric.subject.item_type,
            metric_chain: metric.subject.chain.clone(),
            metric_protocol: metric.subject.protocol.clone(),
            metric_type: metric.metric_type.clone(),
            metric_aggregator: metric.aggregator,
            metric_window: metric.window,
            metric_label: metric.label.clone().unwrap_or_default(),
            metric_show_sparkline: metric.show_sparkline != Some(false),
            ..base
        },
        DashboardItemConfig::Yields(yields) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: ChartTab::Yields,
            selected_yield_pool: Some(YieldPoolSelection {
                config_id: yields.pool_config_id.clone(),
                name: yields.pool_name.clone(),
                project: yields.project.clone(),
                chain: yields.chain.clone(),
            }),
            selected_yield_chart_type: yields
                .chart_type
                .clone()
                .unwrap_or_else(|| base.selected_yield_chart_type.clone()),
            ..base
        },
        DashboardItemConfig::Stablecoins(stablecoins) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: ChartTab::Stablecoins,
            stablecoin_mode: StablecoinMode::Chain,
            selected_stablecoin_chain: stablecoins.chain.clone(),
            selected_stablecoin_chart_type: stablecoins.chart_type.clone(),
            ..base
        },
        DashboardItemConfig::StablecoinAsset(asset) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: ChartTab::Stablecoins,
            stablecoin_mode: StablecoinMode::Asset,
            selected_stablecoin_asset: Some(asset.stablecoin.clone()),
            selected_stablecoin_asset_id: Some(asset.stablecoin_id.clone()),
            selected_stablecoin_asset_chart_type: asset.chart_type.clone(),
            ..base
        },
        DashboardItemConfig::AdvancedTvl(chart) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: ChartTab::AdvancedTvl,
            selected_advanced_tvl_protocol: Some(chart.protocol.clone()),
            selected_advanced_tvl_protocol_name: Some(chart.protocol_name.clone()),
            selected_advanced_tvl_chart_type: chart.chart_type.clone(),
            ..base
        },
        DashboardItemConfig::AdvancedBorrowed(chart) => ModalState {
            selected_main_tab: MainTab::Charts,
            chart_mode: ChartMode::Manual,
            selected_chart_tab: ChartTab::Borrowed,
            selected_borrowed_protocol: Some(chart.protocol.clone()),
            selected_borrowed_protocol_name: Some(chart.protocol_name.clone()),
            selected_borrowed_chart_type: chart.chart_type.clone(),
            ..base
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogChain {
    pub name: String,
    #[serde(default, rename = "gecko_id")]
    pub gecko_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProtocol {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub gecko_id: Option<String>,
    #[serde(default)]
    pub parent_protocol: Option<String>,
    #[serde(default)]
    pub tvl: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolOption {
    pub value: String,
    pub label: String,
    pub logo: Option<String>,
    pub is_child: bool,
}

/// Chains and protocols the modal can pick from; used for gecko id lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalCatalog {
    pub chains: Vec<CatalogChain>,
    pub protocols: Vec<CatalogProtocol>,
}

impl ModalCatalog {
    pub fn chain_gecko_id(&self, chain: &str) -> Option<String> {
        self.chains
            .iter()
            .find(|entry| entry.name == chain)
            .and_then(|entry| entry.gecko_id.clone())
    }

    pub fn protocol_gecko_id(&self, slug: &str) -> Option<String> {
        self.protocols
            .iter()
            .find(|entry| entry.slug == slug)
            .and_then(|entry| entry.gecko_id.clone())
    }

    fn gecko_for_chain_chart(&self, chain: &str, chart_type: &str) -> Option<String> {
        if GECKO_CHAIN_CHART_TYPES.contains(&chart_type) {
            self.chain_gecko_id(chain)
        } else {
            None
        }
    }

    /// Parents (and standalone protocols) by TVL, each followed by its children by TVL.
    pub fn protocol_options(&self) -> Vec<ProtocolOption> {
        let by_tvl = |a: &&CatalogProtocol, b: &&CatalogProtocol| {
            b.tvl.unwrap_or(0.0).total_cmp(&a.tvl.unwrap_or(0.0))
        };
        let mut roots: Vec<&CatalogProtocol> = self
            .protocols
            .iter()
            .filter(|protocol| protocol.parent_protocol.is_none())
            .collect();
        roots.sort_by(by_tvl);

        let mut options = Vec::new();
        for root in roots {
            options.push(ProtocolOption {
                value: root.slug.clone(),
                label: root.name.clone(),
                logo: root.logo.clone(),
                is_child: false,
            });
            let mut children: Vec<&CatalogProtocol> = self
                .protocols
                .iter()
                .filter(|protocol| protocol.parent_protocol.as_deref() == Some(root.id.as_str()))
                .collect();
            children.sort_by(by_tvl);
            options.extend(children.into_iter().map(|child| ProtocolOption {
                value: child.slug.clone(),
                label: child.name.clone(),
                logo: child.logo.clone(),
                is_child: true,
            }));
        }
        options
    }
}

static ITEM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn generate_item_id(prefix: &str) -> String {
    let sequence = ITEM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", chrono::Utc::now().timestamp_millis())
}

/// Selecting a chain clears protocol picks and resets the chart type.
pub fn chain_change(state: ModalState, chain: &str) -> ModalState {
    ModalState {
        selected_chain: Some(chain.to_string()),
        selected_protocol: None,
        selected_protocols: Vec::new(),
        selected_chart_type: "tvl".to_string(),
        ..state
    }
}

pub fn protocol_change(state: ModalState, protocol: &str) -> ModalState {
    ModalState {
        selected_protocol: Some(protocol.to_string()),
        selected_chain: None,
        selected_protocols: Vec::new(),
        selected_chart_type: "tvl".to_string(),
        ..state
    }
}

pub fn main_tab_change(state: ModalState, tab: MainTab) -> ModalState {
    let state = ModalState {
        selected_main_tab: tab,
        selected_chain: None,
        selected_protocol: None,
        selected_chart_type: "tvl".to_string(),
        selected_chart_types: Vec::new(),
        ..state
    };
    if tab == MainTab::Charts {
        ModalState {
            unified_chart_name: String::new(),
            chart_creation_mode: ChartCreationMode::Separate,
            ..state
        }
    } else {
        state
    }
}

pub fn chart_tab_change(state: ModalState, tab: ChartTab) -> ModalState {
    ModalState {
        selected_chart_tab: tab,
        selected_chain: None,
        selected_protocol: None,
        selected_chart_type: "tvl".to_string(),
        ..state
    }
}

/// Token selection is capped; larger selections are ignored.
pub fn tokens_change(state: ModalState, tokens: Vec<String>) -> ModalState {
    if tokens.len() <= MAX_SELECTED_TOKENS {
        ModalState {
            selected_tokens: tokens,
            ..state
        }
    } else {
        state
    }
}

/// Grouping for newly composed charts: whatever the existing items agree on, else daily.
fn composer_grouping(state: &ModalState) -> ChartGrouping {
    if state.chart_creation_mode != ChartCreationMode::Combined {
        return ChartGrouping::Day;
    }
    let groupings: Vec<ChartGrouping> = state
        .composer_items
        .iter()
        .filter_map(|item| item.grouping)
        .collect();
    match groupings.first() {
        Some(&first) if groupings.iter().all(|grouping| *grouping == first) => first,
        _ => ChartGrouping::Day,
    }
}

/// Adds one chart per (target, type) pair not already in the composer. Returns the new state
/// and how many charts were added.
pub fn add_to_composer(
    state: ModalState,
    types: Option<&[String]>,
    catalog: &ModalCatalog,
) -> (ModalState, usize) {
    let mut chart_types: Vec<String> = Vec::new();
    for chart_type in types.unwrap_or(&state.selected_chart_types) {
        if !chart_types.contains(chart_type) {
            chart_types.push(chart_type.clone());
        }
    }
    if chart_types.is_empty() {
        return (state, 0);
    }

    let grouping = composer_grouping(&state);
    let mut added = Vec::new();

    match state.selected_chart_tab {
        ChartTab::Chain => {
            let chains = if !state.selected_chains.is_empty() {
                state.selected_chains.clone()
            } else {
                state.selected_chain.iter().cloned().collect()
            };
            for chain in chains {
                for chart_type in &chart_types {
                    let exists = state
                        .composer_items
                        .iter()
                        .any(|item| item.chain == chain && &item.chart_type == chart_type);
                    if exists {
                        continue;
                    }
                    added.push(ChartConfig {
                        meta: ItemMeta::with_id(generate_item_id(&format!("{chain}-{chart_type}"))),
                        chain: chain.clone(),
                        protocol: None,
                        chart_type: chart_type.clone(),
                        grouping: Some(grouping),
                        gecko_id: catalog.gecko_for_chain_chart(&chain, chart_type),
                    });
                }
            }
        }
        ChartTab::Protocol => {
            let protocols = if !state.selected_protocols.is_empty() {
                state.selected_protocols.clone()
            } else {
                state.selected_protocol.iter().cloned().collect()
            };
            for slug in protocols {
                for chart_type in &chart_types {
                    let exists = state
                        .composer_items
                        .iter()
                        .any(|item| item.protocol.as_deref() == Some(slug.as_str()) && &item.chart_type == chart_type);
                    if exists {
                        continue;
                    }
                    added.push(ChartConfig {
                        meta: ItemMeta::with_id(generate_item_id(&format!("{slug}-{chart_type}"))),
                        chain: String::new(),
                        protocol: Some(slug.clone()),
                        chart_type: chart_type.clone(),
                        grouping: Some(grouping),
                        gecko_id: catalog.protocol_gecko_id(&slug),
                    });
                }
            }
        }
        _ => {}
    }

    let count = added.len();
    debug!(component = "modal", event = "modal.composer.added", added = count);
    let mut composer_items = state.composer_items;
    composer_items.extend(added);
    (
        ModalState {
            composer_items,
            ..state
        },
        count,
    )
}

pub fn remove_from_composer(state: ModalState, id: &str) -> ModalState {
    let composer_items = state
        .composer_items
        .into_iter()
        .filter(|item| item.meta.id != id)
        .collect();
    ModalState {
        composer_items,
        ..state
    }
}

/// What a submit produces: a replacement for the edited item, or new items to append.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Edit { id: String, item: DashboardItemConfig },
    Create(Vec<DashboardItemConfig>),
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn single_chart(chain: String, protocol: Option<String>, chart_type: String, gecko_id: Option<String>) -> ChartConfig {
    ChartConfig {
        meta: ItemMeta::default(),
        grouping: is_groupable_chart_type(&chart_type).then_some(ChartGrouping::Day),
        chain,
        protocol,
        chart_type,
        gecko_id,
    }
}

fn chain_chart(catalog: &ModalCatalog, chain: &str, chart_type: &str) -> DashboardItemConfig {
    DashboardItemConfig::Chart(single_chart(
        chain.to_string(),
        None,
        chart_type.to_string(),
        catalog.gecko_for_chain_chart(chain, chart_type),
    ))
}

fn protocol_chart(catalog: &ModalCatalog, slug: &str, chart_type: &str) -> DashboardItemConfig {
    DashboardItemConfig::Chart(single_chart(
        String::new(),
        Some(slug.to_string()),
        chart_type.to_string(),
        catalog.protocol_gecko_id(slug),
    ))
}

fn primary_chart_type(state: &ModalState) -> String {
    state
        .selected_chart_types
        .first()
        .cloned()
        .unwrap_or_else(|| state.selected_chart_type.clone())
}

fn dataset_table(kind: CombinedTableType, chains: Vec<String>) -> ProtocolsTableConfig {
    ProtocolsTableConfig {
        table_type: TableType::Dataset,
        dataset_type: Some(kind.as_str().to_string()),
        chains,
        ..ProtocolsTableConfig::default()
    }
}

fn table_draft(state: &ModalState, require_tokens: bool) -> Option<DashboardItemConfig> {
    use CombinedTableType as T;

    let table = match state.selected_table_type {
        T::Protocols => {
            if state.selected_chains.is_empty() {
                return None;
            }
            ProtocolsTableConfig {
                table_type: TableType::Protocols,
                chains: state.selected_chains.clone(),
                ..ProtocolsTableConfig::default()
            }
        }
        T::Stablecoins => {
            let chain = state.selected_dataset_chain.clone()?;
            ProtocolsTableConfig {
                dataset_chain: Some(chain.clone()),
                ..dataset_table(T::Stablecoins, vec![chain])
            }
        }
        T::Cex => dataset_table(T::Cex, Vec::new()),
        T::TokenUsage => {
            if require_tokens && state.selected_tokens.is_empty() {
                return None;
            }
            ProtocolsTableConfig {
                token_symbols: Some(state.selected_tokens.clone()),
                include_cex: Some(state.include_cex),
                ..dataset_table(T::TokenUsage, Vec::new())
            }
        }
        T::TrendingContracts => {
            let chain = state.selected_dataset_chain.clone()?;
            ProtocolsTableConfig {
                dataset_chain: Some(chain.clone()),
                dataset_timeframe: Some(
                    state
                        .selected_dataset_timeframe
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TRENDING_TIMEFRAME.to_string()),
                ),
                ..dataset_table(T::TrendingContracts, vec![chain])
            }
        }
        T::Chains => ProtocolsTableConfig {
            dataset_chain: state.selected_dataset_chain.clone(),
            ..dataset_table(T::Chains, Vec::new())
        },
        kind @ (T::Revenue
        | T::HoldersRevenue
        | T::Earnings
        | T::Fees
        | T::Yields
        | T::Aggregators
        | T::Perps
        | T::Options
        | T::Dexs
        | T::BridgeAggregators) => dataset_table(kind, state.selected_chains.clone()),
    };
    Some(DashboardItemConfig::Table(table))
}

fn metric_draft(state: &ModalState) -> Option<DashboardItemConfig> {
    let subject = match state.metric_subject_type {
        MetricSubjectType::Chain => MetricSubject {
            item_type: MetricSubjectType::Chain,
            chain: Some(state.metric_chain.clone().filter(|chain| !chain.is_empty())?),
            protocol: None,
        },
        MetricSubjectType::Protocol => MetricSubject {
            item_type: MetricSubjectType::Protocol,
            chain: None,
            protocol: Some(state.metric_protocol.clone().filter(|protocol| !protocol.is_empty())?),
        },
    };
    Some(DashboardItemConfig::Metric(MetricConfig {
        meta: ItemMeta::default(),
        subject,
        metric_type: state.metric_type.clone(),
        aggregator: state.metric_aggregator,
        window: state.metric_window,
        compare: Some(MetricCompare::default()),
        show_sparkline: Some(state.metric_show_sparkline),
        label: non_empty(&state.metric_label),
    }))
}

fn builder_draft(state: &ModalState) -> DashboardItemConfig {
    DashboardItemConfig::Builder(ChartBuilderItem {
        meta: ItemMeta::default(),
        name: trimmed(&state.chart_builder_name),
        config: state.chart_builder.clone(),
    })
}

fn text_draft(state: &ModalState) -> Option<DashboardItemConfig> {
    let content = trimmed(&state.text_content)?;
    Some(DashboardItemConfig::Text(TextConfig {
        meta: ItemMeta::default(),
        title: trimmed(&state.text_title),
        content,
    }))
}

/// Items owned by the yields, stablecoin, advanced TVL and borrowed tabs.
fn special_chart_draft(state: &ModalState) -> Option<DashboardItemConfig> {
    match state.selected_chart_tab {
        ChartTab::Yields => {
            let pool = state.selected_yield_pool.as_ref()?;
            Some(DashboardItemConfig::Yields(YieldsConfig {
                meta: ItemMeta::default(),
                pool_config_id: pool.config_id.clone(),
                pool_name: pool.name.clone(),
                project: pool.project.clone(),
                chain: pool.chain.clone(),
                chart_type: Some(state.selected_yield_chart_type.clone()),
            }))
        }
        ChartTab::Stablecoins => match state.stablecoin_mode {
            StablecoinMode::Chain => {
                if state.selected_stablecoin_chain.is_empty() {
                    return None;
                }
                Some(DashboardItemConfig::Stablecoins(StablecoinsConfig {
                    meta: ItemMeta::default(),
                    chain: state.selected_stablecoin_chain.clone(),
                    chart_type: state.selected_stablecoin_chart_type.clone(),
                }))
            }
            StablecoinMode::Asset => Some(DashboardItemConfig::StablecoinAsset(StablecoinAssetConfig {
                meta: ItemMeta::default(),
                stablecoin: state.selected_stablecoin_asset.clone()?,
                stablecoin_id: state.selected_stablecoin_asset_id.clone()?,
                chart_type: state.selected_stablecoin_asset_chart_type.clone(),
            })),
        },
        ChartTab::AdvancedTvl => {
            let protocol = state.selected_advanced_tvl_protocol.clone()?;
            Some(DashboardItemConfig::AdvancedTvl(ProtocolChartConfig {
                meta: ItemMeta::default(),
                protocol_name: state
                    .selected_advanced_tvl_protocol_name
                    .clone()
                    .unwrap_or_else(|| protocol.clone()),
                protocol,
                chart_type: state.selected_advanced_tvl_chart_type.clone(),
            }))
        }
        ChartTab::Borrowed => {
            let protocol = state.selected_borrowed_protocol.clone()?;
            Some(DashboardItemConfig::AdvancedBorrowed(ProtocolChartConfig {
                meta: ItemMeta::default(),
                protocol_name: state
                    .selected_borrowed_protocol_name
                    .clone()
                    .unwrap_or_else(|| protocol.clone()),
                protocol,
                chart_type: state.selected_borrowed_chart_type.clone(),
            }))
        }
        ChartTab::Chain | ChartTab::Protocol => None,
    }
}

fn edit_draft(
    state: &ModalState,
    edit_item: &DashboardItemConfig,
    catalog: &ModalCatalog,
) -> Option<DashboardItemConfig> {
    match state.selected_main_tab {
        MainTab::Charts => {
            if state.chart_creation_mode == ChartCreationMode::Combined && !state.composer_items.is_empty() {
                return Some(DashboardItemConfig::Multi(MultiChartConfig {
                    meta: ItemMeta::default(),
                    name: trimmed(&state.unified_chart_name),
                    items: state.composer_items.clone(),
                }));
            }
            if state.chart_mode == ChartMode::Builder {
                return Some(builder_draft(state));
            }
            match state.selected_chart_tab {
                ChartTab::Chain => {
                    let chain = state.selected_chain.as_deref()?;
                    Some(chain_chart(catalog, chain, &primary_chart_type(state)))
                }
                ChartTab::Protocol => {
                    let slug = state.selected_protocol.as_deref()?;
                    Some(protocol_chart(catalog, slug, &primary_chart_type(state)))
                }
                _ => special_chart_draft(state),
            }
        }
        MainTab::Table => table_draft(state, false),
        MainTab::UnifiedTable => match edit_item {
            DashboardItemConfig::UnifiedTable(_) => Some(edit_item.clone()),
            _ => None,
        },
        MainTab::Text => text_draft(state),
        MainTab::Builder => Some(builder_draft(state)),
        MainTab::Metric => metric_draft(state),
    }
}

fn create_drafts(state: &ModalState, catalog: &ModalCatalog) -> Vec<DashboardItemConfig> {
    match state.selected_main_tab {
        MainTab::Charts => {
            if state.chart_mode == ChartMode::Builder && state.composer_items.is_empty() {
                return vec![builder_draft(state)];
            }
            if let Some(item) = special_chart_draft(state) {
                return vec![item];
            }
            if !state.composer_items.is_empty() {
                return match state.chart_creation_mode {
                    ChartCreationMode::Combined => vec![DashboardItemConfig::Multi(MultiChartConfig {
                        meta: ItemMeta::default(),
                        name: trimmed(&state.unified_chart_name),
                        items: state.composer_items.clone(),
                    })],
                    ChartCreationMode::Separate => state
                        .composer_items
                        .iter()
                        .filter_map(|item| {
                            if !item.chain.is_empty() {
                                Some(chain_chart(catalog, &item.chain, &item.chart_type))
                            } else {
                                item.protocol
                                    .as_deref()
                                    .map(|slug| protocol_chart(catalog, slug, &item.chart_type))
                            }
                        })
                        .collect(),
                };
            }
            if state.chart_creation_mode == ChartCreationMode::Separate {
                if let Some(chain) = state.selected_chain.as_deref() {
                    return state
                        .selected_chart_types
                        .iter()
                        .map(|chart_type| chain_chart(catalog, chain, chart_type))
                        .collect();
                }
                if let Some(slug) = state.selected_protocol.as_deref() {
                    return state
                        .selected_chart_types
                        .iter()
                        .map(|chart_type| protocol_chart(catalog, slug, chart_type))
                        .collect();
                }
            }
            Vec::new()
        }
        MainTab::Table => table_draft(state, true).into_iter().collect(),
        // The unified table wizard builds its own config.
        MainTab::UnifiedTable => Vec::new(),
        MainTab::Text => text_draft(state).into_iter().collect(),
        MainTab::Builder => vec![builder_draft(state)],
        MainTab::Metric => metric_draft(state)
            .map(|item| {
                item.with_meta(ItemMeta {
                    id: String::new(),
                    col_span: Some(METRIC_COL_SPAN),
                })
            })
            .into_iter()
            .collect(),
    }
}

/// Builds what a submit would save. In edit mode the result keeps the edited item's id and
/// column span. `None` when the current selection is incomplete.
pub fn build_submission(
    state: &ModalState,
    edit_item: Option<&DashboardItemConfig>,
    catalog: &ModalCatalog,
) -> Option<Submission> {
    match edit_item {
        Some(edit_item) => {
            let item = edit_draft(state, edit_item, catalog)?.with_meta(edit_item.meta().clone());
            debug!(
                component = "modal",
                event = "modal.submit.edit",
                item_id = %edit_item.id(),
                kind = item.kind()
            );
            Some(Submission::Edit {
                id: edit_item.id().to_string(),
                item,
            })
        }
        None => {
            let items: Vec<DashboardItemConfig> = create_drafts(state, catalog)
                .into_iter()
                .map(|item| {
                    let meta = ItemMeta {
                        id: generate_item_id(item.kind()),
                        col_span: item.meta().col_span,
                    };
                    item.with_meta(meta)
                })
                .collect();
            if items.is_empty() {
                return None;
            }
            debug!(
                component = "modal",
                event = "modal.submit.create",
                item_count = items.len()
            );
            Some(Submission::Create(items))
        }
    }
}

/// True when submitting would not save anything.
pub fn is_submit_disabled(
    state: &ModalState,
    edit_item: Option<&DashboardItemConfig>,
    catalog: &ModalCatalog,
) -> bool {
    match edit_item {
        Some(edit_item) => edit_draft(state, edit_item, catalog).is_none(),
        None => create_drafts(state, catalog).is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModalCatalog {
        ModalCatalog {
            chains: vec![CatalogChain {
                name: "Ethereum".into(),
                gecko_id: Some("ethereum".into()),
            }],
            protocols: vec![
                CatalogProtocol {
                    id: "parent#aave".into(),
                    slug: "aave".into(),
                    name: "Aave".into(),
                    gecko_id: Some("aave".into()),
                    tvl: Some(10.0),
                    ..CatalogProtocol::default()
                },
                CatalogProtocol {
                    id: "1".into(),
                    slug: "aave-v3".into(),
                    name: "Aave V3".into(),
                    parent_protocol: Some("parent#aave".into()),
                    tvl: Some(8.0),
                    ..CatalogProtocol::default()
                },
                CatalogProtocol {
                    id: "2".into(),
                    slug: "lido".into(),
                    name: "Lido".into(),
                    tvl: Some(20.0),
                    ..CatalogProtocol::default()
                },
            ],
        }
    }

    #[test]
    fn metric_type_resets_aggregator() {
        let state = modal_reducer(ModalState::initial(), ModalAction::SetMetricType("fees".into()));
        assert_eq!(state.metric_aggregator, MetricAggregator::Sum);
        let state = modal_reducer(state, ModalAction::SetMetricType("tvl".into()));
        assert_eq!(state.metric_aggregator, MetricAggregator::Latest);
        assert_eq!(state.metric_type, "tvl");
    }

    #[test]
    fn reset_returns_initial_state() {
        let state = modal_reducer(ModalState::initial(), ModalAction::SetTextTitle("x".into()));
        let state = modal_reducer(state, ModalAction::ResetState);
        assert_eq!(state, ModalState::initial());
    }

    #[test]
    fn composer_dedupes_and_inherits_grouping() {
        let catalog = catalog();
        let state = ModalState {
            selected_chart_tab: ChartTab::Chain,
            selected_chains: vec!["Ethereum".into()],
            selected_chart_types: vec!["tvl".into(), "chainMcap".into(), "tvl".into()],
            ..ModalState::initial()
        };
        let (state, added) = add_to_composer(state, None, &catalog);
        assert_eq!(added, 2);
        assert_eq!(state.composer_items[1].gecko_id.as_deref(), Some("ethereum"));
        assert_eq!(state.composer_items[0].gecko_id, None);

        let (mut state, added) = add_to_composer(state, None, &catalog);
        assert_eq!(added, 0);

        for item in &mut state.composer_items {
            item.grouping = Some(ChartGrouping::Week);
        }
        let (state, added) = add_to_composer(state, Some(&["fees".to_string()][..]), &catalog);
        assert_eq!(added, 1);
        assert_eq!(state.composer_items[2].grouping, Some(ChartGrouping::Week));

        let id = state.composer_items[0].meta.id.clone();
        let state = remove_from_composer(state, &id);
        assert_eq!(state.composer_items.len(), 2);
    }

    #[test]
    fn token_selection_is_capped() {
        let tokens: Vec<String> = ["a", "b", "c", "d"].iter().map(|t| t.to_string()).collect();
        let state = tokens_change(ModalState::initial(), tokens.clone());
        assert_eq!(state.selected_tokens, tokens);
        let mut five = tokens.clone();
        five.push("e".into());
        let state = tokens_change(state, five);
        assert_eq!(state.selected_tokens, tokens);
    }

    #[test]
    fn protocol_table_needs_chains() {
        let catalog = catalog();
        let state = ModalState {
            selected_main_tab: MainTab::Table,
            ..ModalState::initial()
        };
        assert!(is_submit_disabled(&state, None, &catalog));
        let state = ModalState {
            selected_chains: vec!["Ethereum".into()],
            ..state
        };
        assert!(!is_submit_disabled(&state, None, &catalog));

        let Some(Submission::Create(items)) = build_submission(&state, None, &catalog) else {
            panic!("expected created items");
        };
        assert_eq!(items.len(), 1);
        assert!(!items[0].id().is_empty());
    }

    #[test]
    fn separate_mode_creates_one_chart_per_type() {
        let catalog = catalog();
        let state = ModalState {
            chart_mode: ChartMode::Manual,
            chart_creation_mode: ChartCreationMode::Separate,
            selected_protocol: Some("aave".into()),
            selected_chart_tab: ChartTab::Protocol,
            selected_chart_types: vec!["tvl".into(), "fees".into()],
            ..ModalState::initial()
        };
        let Some(Submission::Create(items)) = build_submission(&state, None, &catalog) else {
            panic!("expected created items");
        };
        assert_eq!(items.len(), 2);
        let DashboardItemConfig::Chart(fees) = &items[1] else {
            panic!("expected chart");
        };
        assert_eq!(fees.grouping, Some(ChartGrouping::Day));
        assert_eq!(fees.gecko_id.as_deref(), Some("aave"));
    }

    #[test]
    fn metric_needs_subject() {
        let catalog = catalog();
        let state = ModalState {
            selected_main_tab: MainTab::Metric,
            metric_subject_type: MetricSubjectType::Protocol,
            ..ModalState::initial()
        };
        assert!(is_submit_disabled(&state, None, &catalog));
        let state = modal_reducer(state, ModalAction::SetMetricProtocol(Some("lido".into())));
        let Some(Submission::Create(items)) = build_submission(&state, None, &catalog) else {
            panic!("expected created items");
        };
        assert_eq!(items[0].meta().col_span, Some(0.5));
    }

    #[test]
    fn protocol_options_nest_children_under_parents() {
        let options = catalog().protocol_options();
        let labels: Vec<(&str, bool)> = options.iter().map(|o| (o.label.as_str(), o.is_child)).collect();
        assert_eq!(labels, vec![("Lido", false), ("Aave", false), ("Aave V3", true)]);
    }
}
