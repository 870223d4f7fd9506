//! Persisted dashboard item configurations.
//!
//! `DashboardItemConfig` is tagged by `kind` on the wire, one variant per item type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::columns::ColumnSort;
use crate::custom_columns::CustomColumnDefinition;
use crate::filters::TableFilters;
use crate::grouping::RowHeader;
use crate::strategy::StrategyType;

/// Chart types whose series are bucketed by `ChartGrouping`.
pub const GROUPABLE_CHART_TYPES: [&str; 16] = [
    "volume",
    "fees",
    "revenue",
    "perps",
    "aggregators",
    "bridgeAggregators",
    "perpsAggregators",
    "options",
    "holdersRevenue",
    "bribes",
    "tokenTax",
    "incentives",
    "chainFees",
    "chainRevenue",
    "txs",
    "stablecoinInflows",
];

/// Chain chart types that need the chain's gecko id.
pub const GECKO_CHAIN_CHART_TYPES: [&str; 2] = ["chainMcap", "chainPrice"];

pub fn is_groupable_chart_type(chart_type: &str) -> bool {
    GROUPABLE_CHART_TYPES.contains(&chart_type)
}

/// Fields every item carries regardless of kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_span: Option<f64>,
}

impl ItemMeta {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            col_span: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartGrouping {
    Day,
    Week,
    Month,
    Quarter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default)]
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "type")]
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<ChartGrouping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gecko_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChartConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub items: Vec<ChartConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    #[default]
    Protocols,
    Dataset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolsTableConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub table_type: TableType,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_symbols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_cex: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedTableParams {
    #[serde(default)]
    pub chains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedTableConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default)]
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub params: UnifiedTableParams,
    #[serde(default)]
    pub row_headers: Vec<RowHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<TableFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_preset_id: Option<String>,
    #[serde(default)]
    pub column_order: Vec<String>,
    #[serde(default)]
    pub column_visibility: BTreeMap<String, bool>,
    #[serde(default)]
    pub default_sorting: Vec<ColumnSort>,
    #[serde(default)]
    pub custom_columns: Vec<CustomColumnDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderMode {
    #[default]
    Chains,
    Protocols,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBuilderConfig {
    pub metric: String,
    #[serde(default)]
    pub mode: BuilderMode,
    #[serde(default)]
    pub filter_mode: FilterMode,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub chain_categories: Vec<String>,
    #[serde(default)]
    pub protocol_categories: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub group_by: String,
    pub limit: u32,
    pub chart_type: String,
    pub display_as: String,
    #[serde(default)]
    pub additional_filters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub series_colors: BTreeMap<String, String>,
}

impl Default for ChartBuilderConfig {
    fn default() -> Self {
        Self {
            metric: "tvl".to_string(),
            mode: BuilderMode::Chains,
            filter_mode: FilterMode::Include,
            chains: Vec::new(),
            chain_categories: Vec::new(),
            protocol_categories: Vec::new(),
            categories: Vec::new(),
            group_by: "protocol".to_string(),
            limit: 10,
            chart_type: "stackedArea".to_string(),
            display_as: "timeSeries".to_string(),
            additional_filters: BTreeMap::new(),
            series_colors: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBuilderItem {
    #[serde(flatten)]
    pub meta: ItemMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub config: ChartBuilderConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSubjectType {
    #[default]
    Chain,
    Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSubject {
    pub item_type: MetricSubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricAggregator {
    #[default]
    Latest,
    Sum,
    Avg,
    Max,
    Min,
    Median,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricWindow {
    #[serde(rename = "7d")]
    Days7,
    #[default]
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "365d")]
    Days365,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "3y")]
    Years3,
    #[serde(rename = "all")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCompare {
    pub mode: String,
    pub format: String,
}

impl Default for MetricCompare {
    fn default() -> Self {
        Self {
            mode: "previous_value".to_string(),
            format: "percent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub subject: MetricSubject,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub aggregator: MetricAggregator,
    pub window: MetricWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare: Option<MetricCompare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_sparkline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldsConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub pool_config_id: String,
    pub pool_name: String,
    pub project: String,
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StablecoinsConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub chain: String,
    pub chart_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StablecoinAssetConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub stablecoin: String,
    pub stablecoin_id: String,
    pub chart_type: String,
}

/// Shared by the advanced TVL and borrowed charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolChartConfig {
    #[serde(flatten)]
    pub meta: ItemMeta,
    pub protocol: String,
    pub protocol_name: String,
    pub chart_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DashboardItemConfig {
    Chart(ChartConfig),
    Multi(MultiChartConfig),
    Table(ProtocolsTableConfig),
    UnifiedTable(UnifiedTableConfig),
    Text(TextConfig),
    Builder(ChartBuilderItem),
    Metric(MetricConfig),
    Yields(YieldsConfig),
    Stablecoins(StablecoinsConfig),
    StablecoinAsset(StablecoinAssetConfig),
    AdvancedTvl(ProtocolChartConfig),
    AdvancedBorrowed(ProtocolChartConfig),
}

impl DashboardItemConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardItemConfig::Chart(_) => "chart",
            DashboardItemConfig::Multi(_) => "multi",
            DashboardItemConfig::Table(_) => "table",
            DashboardItemConfig::UnifiedTable(_) => "unified-table",
            DashboardItemConfig::Text(_) => "text",
            DashboardItemConfig::Builder(_) => "builder",
            DashboardItemConfig::Metric(_) => "metric",
            DashboardItemConfig::Yields(_) => "yields",
            DashboardItemConfig::Stablecoins(_) => "stablecoins",
            DashboardItemConfig::StablecoinAsset(_) => "stablecoin-asset",
            DashboardItemConfig::AdvancedTvl(_) => "advanced-tvl",
            DashboardItemConfig::AdvancedBorrowed(_) => "advanced-borrowed",
        }
    }

    pub fn meta(&self) -> &ItemMeta {
        match self {
            DashboardItemConfig::Chart(item) => &item.meta,
            DashboardItemConfig::Multi(item) => &item.meta,
            DashboardItemConfig::Table(item) => &item.meta,
            DashboardItemConfig::UnifiedTable(item) => &item.meta,
            DashboardItemConfig::Text(item) => &item.meta,
            DashboardItemConfig::Builder(item) => &item.meta,
            DashboardItemConfig::Metric(item) => &item.meta,
            DashboardItemConfig::Yields(item) => &item.meta,
            DashboardItemConfig::Stablecoins(item) => &item.meta,
            DashboardItemConfig::StablecoinAsset(item) => &item.meta,
            DashboardItemConfig::AdvancedTvl(item) | DashboardItemConfig::AdvancedBorrowed(item) => &item.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ItemMeta {
        match self {
            DashboardItemConfig::Chart(item) => &mut item.meta,
            DashboardItemConfig::Multi(item) => &mut item.meta,
            DashboardItemConfig::Table(item) => &mut item.meta,
            DashboardItemConfig::UnifiedTable(item) => &mut item.meta,
            DashboardItemConfig::Text(item) => &mut item.meta,
            DashboardItemConfig::Builder(item) => &mut item.meta,
            DashboardItemConfig::Metric(item) => &mut item.meta,
            DashboardItemConfig::Yields(item) => &mut item.meta,
            DashboardItemConfig::Stablecoins(item) => &mut item.meta,
            DashboardItemConfig::StablecoinAsset(item) => &mut item.meta,
            DashboardItemConfig::AdvancedTvl(item) | DashboardItemConfig::AdvancedBorrowed(item) => {
                &mut item.meta
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    /// Replaces id and column span, keeping everything else.
    pub fn with_meta(mut self, meta: ItemMeta) -> Self {
        *self.meta_mut() = meta;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_tagged_by_kind() {
        let item = DashboardItemConfig::Chart(ChartConfig {
            meta: ItemMeta::with_id("c1"),
            chain: "Ethereum".into(),
            chart_type: "tvl".into(),
            ..ChartConfig::default()
        });
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "chart");
        assert_eq!(json["id"], "c1");
        assert_eq!(json["type"], "tvl");
        assert!(json.get("protocol").is_none());

        let back: DashboardItemConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn parses_saved_unified_table() {
        let raw = r#"{
            "kind": "unified-table",
            "id": "t1",
            "colSpan": 2,
            "params": { "chains": ["Ethereum"] },
            "rowHeaders": ["chain", "parent-protocol", "protocol"],
            "filters": { "tvlMin": 1000000, "hasFees": true },
            "activePresetId": "fees-protocols",
            "columnOrder": ["name", "tvl"],
            "columnVisibility": { "tvl": true },
            "defaultSorting": [{ "id": "tvl", "desc": true }],
            "customColumns": [
                { "id": "custom_1_abc", "name": "Yield", "expression": "fees24h / tvl",
                  "aggregation": "recalculate", "format": "percent" }
            ]
        }"#;
        let item: DashboardItemConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(item.kind(), "unified-table");
        assert_eq!(item.meta().col_span, Some(2.0));
        let DashboardItemConfig::UnifiedTable(table) = item else {
            panic!("expected unified table");
        };
        assert_eq!(table.row_headers, vec![RowHeader::Chain, RowHeader::ParentProtocol, RowHeader::Protocol]);
        assert_eq!(table.filters.as_ref().and_then(|f| f.number("tvlMin")), Some(1_000_000.0));
        assert_eq!(table.custom_columns.len(), 1);
        assert_eq!(table.strategy_type, StrategyType::Protocols);
    }

    #[test]
    fn metric_window_uses_short_labels() {
        let json = serde_json::to_string(&MetricWindow::Days365).unwrap();
        assert_eq!(json, "\"365d\"");
        let parsed: MetricWindow = serde_json::from_str("\"ytd\"").unwrap();
        assert_eq!(parsed, MetricWindow::YearToDate);
    }

    #[test]
    fn with_meta_replaces_identity() {
        let item = DashboardItemConfig::Text(TextConfig {
            meta: ItemMeta::default(),
            title: None,
            content: "hello".into(),
        });
        let meta = ItemMeta {
            id: "keep".into(),
            col_span: Some(1.0),
        };
        let item = item.with_meta(meta.clone());
        assert_eq!(item.meta(), &meta);
        assert_eq!(item.id(), "keep");
    }
}
