//! Row filters: the filter catalog offered per strategy and the predicate that applies a saved
//! `TableFilters` map to normalized rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::strategy::{NormalizedRow, StrategyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    NumericRange,
    NumericSingle,
    Boolean,
    Array,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterFormat {
    #[default]
    Currency,
    Percent,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterCategory {
    Metrics,
    Volume,
    Fees,
    Revenue,
    Changes,
    Dominance,
    Aggregators,
    ChainMetrics,
    Flags,
}

impl FilterCategory {
    pub fn label(self) -> &'static str {
        match self {
            FilterCategory::Metrics => "Metrics",
            FilterCategory::Volume => "Volume",
            FilterCategory::Fees => "Fees",
            FilterCategory::Revenue => "Revenue",
            FilterCategory::Changes => "Changes",
            FilterCategory::Dominance => "Dominance",
            FilterCategory::Aggregators => "Aggregators",
            FilterCategory::ChainMetrics => "Chain Metrics",
            FilterCategory::Flags => "Flags",
        }
    }
}

const BOTH: &[StrategyType] = &[StrategyType::Protocols, StrategyType::Chains];
const PROTOCOLS: &[StrategyType] = &[StrategyType::Protocols];
const CHAINS: &[StrategyType] = &[StrategyType::Chains];

/// One entry of the filter catalog. Range filters read `{id}Min` / `{id}Max` from
/// `TableFilters` and compare against `metric`; boolean filters read `{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub id: &'static str,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    pub kind: FilterKind,
    pub category: FilterCategory,
    pub strategies: &'static [StrategyType],
    pub format: FilterFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<&'static str>,
}

impl FilterConfig {
    const fn range(
        id: &'static str,
        label: &'static str,
        category: FilterCategory,
        strategies: &'static [StrategyType],
        format: FilterFormat,
        metric: &'static str,
    ) -> Self {
        Self {
            id,
            label,
            description: None,
            kind: FilterKind::NumericRange,
            category,
            strategies,
            format,
            min: None,
            metric: Some(metric),
        }
    }

    const fn flag(id: &'static str, label: &'static str, strategies: &'static [StrategyType]) -> Self {
        Self {
            id,
            label,
            description: None,
            kind: FilterKind::Boolean,
            category: FilterCategory::Flags,
            strategies,
            format: FilterFormat::Number,
            min: None,
            metric: None,
        }
    }

    const fn floor(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    const fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn min_key(&self) -> Option<String> {
        matches!(self.kind, FilterKind::NumericRange | FilterKind::NumericSingle)
            .then(|| format!("{}Min", self.id))
    }

    pub fn max_key(&self) -> Option<String> {
        (self.kind == FilterKind::NumericRange).then(|| format!("{}Max", self.id))
    }

    pub fn boolean_key(&self) -> Option<&'static str> {
        (self.kind == FilterKind::Boolean).then_some(self.id)
    }
}

use FilterCategory as C;
use FilterFormat as F;

type Fc = FilterConfig;

pub const FILTER_CONFIGS: &[FilterConfig] = &[
    Fc::range("tvl", "TVL", C::Metrics, BOTH, F::Currency, "tvl"),
    Fc::range("mcap", "Market Cap", C::Metrics, PROTOCOLS, F::Currency, "mcap"),
    Fc::range("pfRatio", "P/F Ratio", C::Metrics, PROTOCOLS, F::Number, "pf"),
    Fc::range("volumeDex24h", "DEX Volume (24h)", C::Volume, BOTH, F::Currency, "volume24h"),
    Fc::range("volume7d", "Volume (7d)", C::Volume, BOTH, F::Currency, "volume_7d"),
    Fc::range("volume30d", "Volume (30d)", C::Volume, BOTH, F::Currency, "volume_30d"),
    Fc::range("fees24h", "Fees (24h)", C::Fees, BOTH, F::Currency, "fees24h"),
    Fc::range("fees7d", "Fees (7d)", C::Fees, BOTH, F::Currency, "fees_7d"),
    Fc::range("fees30d", "Fees (30d)", C::Fees, BOTH, F::Currency, "fees_30d"),
    Fc::range("fees1y", "Fees (1y)", C::Fees, BOTH, F::Currency, "fees_1y"),
    Fc::range("revenue24h", "Revenue (24h)", C::Revenue, PROTOCOLS, F::Currency, "revenue24h"),
    Fc::range("revenue7d", "Revenue (7d)", C::Revenue, BOTH, F::Currency, "revenue_7d"),
    Fc::range("revenue30d", "Revenue (30d)", C::Revenue, BOTH, F::Currency, "revenue_30d"),
    Fc::range("revenue1y", "Revenue (1y)", C::Revenue, BOTH, F::Currency, "revenue_1y"),
    Fc::range(
        "holderRevenue24h",
        "Holder Revenue (24h)",
        C::Revenue,
        PROTOCOLS,
        F::Currency,
        "holderRevenue_24h",
    ),
    Fc::range(
        "treasuryRevenue24h",
        "Treasury Revenue (24h)",
        C::Revenue,
        PROTOCOLS,
        F::Currency,
        "treasuryRevenue_24h",
    ),
    Fc::range("change1d", "TVL Change (1d)", C::Changes, PROTOCOLS, F::Percent, "change1d").floor(-1000.0),
    Fc::range("change7d", "TVL Change (7d)", C::Changes, PROTOCOLS, F::Percent, "change7d").floor(-1000.0),
    Fc::range("change1m", "TVL Change (30d)", C::Changes, PROTOCOLS, F::Percent, "change1m").floor(-1000.0),
    Fc::range(
        "volumeChange1d",
        "Volume Change (1d)",
        C::Changes,
        PROTOCOLS,
        F::Percent,
        "volumeChange_1d",
    )
    .floor(-1000.0),
    Fc::range(
        "volumeChange7d",
        "Volume Change (7d)",
        C::Changes,
        PROTOCOLS,
        F::Percent,
        "volumeChange_7d",
    )
    .floor(-1000.0),
    Fc::range(
        "volumeChange1m",
        "Volume Change (30d)",
        C::Changes,
        PROTOCOLS,
        F::Percent,
        "volumeChange_1m",
    )
    .floor(-1000.0),
    Fc::range("feesChange1d", "Fees Change (1d)", C::Changes, BOTH, F::Percent, "feesChange_1d").floor(-1000.0),
    Fc::range("feesChange7d", "Fees Change (7d)", C::Changes, BOTH, F::Percent, "feesChange_7d").floor(-1000.0),
    Fc::range("feesChange1m", "Fees Change (30d)", C::Changes, BOTH, F::Percent, "feesChange_1m").floor(-1000.0),
    Fc::range(
        "revenueChange1d",
        "Revenue Change (1d)",
        C::Changes,
        BOTH,
        F::Percent,
        "revenueChange_1d",
    )
    .floor(-1000.0),
    Fc::range(
        "revenueChange7d",
        "Revenue Change (7d)",
        C::Changes,
        BOTH,
        F::Percent,
        "revenueChange_7d",
    )
    .floor(-1000.0),
    Fc::range(
        "revenueChange1m",
        "Revenue Change (30d)",
        C::Changes,
        BOTH,
        F::Percent,
        "revenueChange_1m",
    )
    .floor(-1000.0),
    Fc::range(
        "volumeDominance24h",
        "Volume Dominance (24h)",
        C::Dominance,
        PROTOCOLS,
        F::Percent,
        "volumeDominance_24h",
    )
    .floor(0.0),
    Fc::range(
        "volumeMarketShare7d",
        "Volume Market Share (7d)",
        C::Dominance,
        PROTOCOLS,
        F::Percent,
        "volumeMarketShare7d",
    )
    .floor(0.0),
    Fc::range("tvlShare", "TVL Share", C::Dominance, CHAINS, F::Percent, "tvlShare").floor(0.0),
    Fc::range(
        "perpsVolumeDominance24h",
        "Perps Volume Dominance (24h)",
        C::Dominance,
        PROTOCOLS,
        F::Percent,
        "perps_volume_dominance_24h",
    )
    .floor(0.0),
    Fc::range(
        "optionsVolumeDominance24h",
        "Options Volume Dominance (24h)",
        C::Dominance,
        PROTOCOLS,
        F::Percent,
        "options_volume_dominance_24h",
    )
    .floor(0.0),
    Fc::range(
        "aggregatorsVolume24h",
        "Aggregator Volume (24h)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "aggregators_volume_24h",
    ),
    Fc::range(
        "aggregatorsVolume7d",
        "Aggregator Volume (7d)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "aggregators_volume_7d",
    ),
    Fc::range(
        "aggregatorsVolume30d",
        "Aggregator Volume (30d)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "aggregators_volume_30d",
    ),
    Fc::range(
        "derivativesAggregatorsVolume24h",
        "Derivatives Aggregator Volume (24h)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "derivatives_aggregators_volume_24h",
    ),
    Fc::range(
        "derivativesAggregatorsVolume7d",
        "Derivatives Aggregator Volume (7d)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "derivatives_aggregators_volume_7d",
    ),
    Fc::range(
        "derivativesAggregatorsVolume30d",
        "Derivatives Aggregator Volume (30d)",
        C::Aggregators,
        PROTOCOLS,
        F::Currency,
        "derivatives_aggregators_volume_30d",
    ),
    Fc::range(
        "stablesMcap",
        "Stablecoin Market Cap",
        C::ChainMetrics,
        CHAINS,
        F::Currency,
        "stablesMcap",
    ),
    Fc::range("bridgedTvl", "Bridged TVL", C::ChainMetrics, CHAINS, F::Currency, "bridgedTvl"),
    Fc::range(
        "protocolCount",
        "Protocol Count",
        C::ChainMetrics,
        CHAINS,
        F::Number,
        "protocolCount",
    ),
    Fc::flag("hasPerps", "Has Perps", PROTOCOLS),
    Fc::flag("hasOptions", "Has Options", PROTOCOLS),
    Fc::flag("hasOpenInterest", "Has Open Interest", PROTOCOLS),
    Fc::flag("multiChainOnly", "Multi-chain Only", PROTOCOLS),
    Fc::flag("parentProtocolsOnly", "Parent Protocols Only", PROTOCOLS),
    Fc::flag("subProtocolsOnly", "Sub-protocols Only", PROTOCOLS),
    Fc::flag("hasVolume", "Has Volume", PROTOCOLS),
    Fc::flag("hasFees", "Has Fees", PROTOCOLS),
    Fc::flag("hasRevenue", "Has Revenue", PROTOCOLS),
    Fc::flag("hasMarketCap", "Has Market Cap", PROTOCOLS),
    Fc::flag("hasAggregators", "Has DEX Aggregator Volume", PROTOCOLS),
    Fc::flag("hasDerivativesAggregators", "Has Derivatives Aggregator Volume", PROTOCOLS),
    Fc::flag("hasBridgedTVL", "Has Bridged TVL", CHAINS),
    Fc::flag("hasStables", "Has Stablecoins", CHAINS),
    Fc::flag("hasHolderRevenue", "Has Holder Revenue", PROTOCOLS),
    Fc::flag("hasTreasuryRevenue", "Has Treasury Revenue", PROTOCOLS),
    Fc::flag("hasMcapTVLRatio", "Has MC/TVL Ratio", PROTOCOLS),
    Fc::flag("isVolumeGrowing", "Volume Growing", PROTOCOLS)
        .describe("DEX volume increased over the past 7 days compared to previous 7 days"),
    Fc::flag("isRevenueGrowing", "Revenue Growing", PROTOCOLS)
        .describe("Revenue increased over the past 7 days compared to previous 7 days"),
];

/// Keys of the list-valued filters.
pub const ARRAY_FILTER_KEYS: [&str; 5] = ["categories", "excludedCategories", "oracles", "chains", "protocols"];

pub fn filters_for_strategy(strategy: StrategyType) -> Vec<&'static FilterConfig> {
    FILTER_CONFIGS
        .iter()
        .filter(|config| config.strategies.contains(&strategy))
        .collect()
}

pub fn filters_by_category(strategy: StrategyType) -> BTreeMap<FilterCategory, Vec<&'static FilterConfig>> {
    let mut grouped: BTreeMap<FilterCategory, Vec<&'static FilterConfig>> = BTreeMap::new();
    for config in filters_for_strategy(strategy) {
        grouped.entry(config.category).or_default().push(config);
    }
    grouped
}

pub fn filter_config(id: &str) -> Option<&'static FilterConfig> {
    FILTER_CONFIGS.iter().find(|config| config.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// Saved filter state as persisted with a table config (`tvlMin`, `hasPerps`, `categories`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableFilters {
    values: BTreeMap<String, Option<FilterValue>>,
}

impl TableFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), Some(FilterValue::Number(value)));
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.values.insert(key.to_string(), Some(FilterValue::Flag(value)));
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), Some(FilterValue::Text(value.to_string())));
        self
    }

    pub fn with_list<S: AsRef<str>>(mut self, key: &str, values: &[S]) -> Self {
        let values = values.iter().map(|value| value.as_ref().to_string()).collect();
        self.values.insert(key.to_string(), Some(FilterValue::List(values)));
        self
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key).and_then(Option::as_ref)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(FilterValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(FilterValue::Flag(true)))
    }

    pub fn list(&self, key: &str) -> &[String] {
        match self.get(key) {
            Some(FilterValue::List(values)) => values,
            _ => &[],
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Drops nulls, false flags, blank strings and empty lists. `None` when nothing is left.
pub fn sanitize_filters(filters: &TableFilters) -> Option<TableFilters> {
    let values: BTreeMap<String, Option<FilterValue>> = filters
        .values
        .iter()
        .filter_map(|(key, value)| {
            let keep = match value.as_ref()? {
                FilterValue::Flag(flag) => *flag,
                FilterValue::Text(text) => !text.trim().is_empty(),
                FilterValue::List(values) => !values.is_empty(),
                FilterValue::Number(_) => true,
            };
            keep.then(|| (key.clone(), value.clone()))
        })
        .collect();

    (!values.is_empty()).then_some(TableFilters { values })
}

fn positive(row: &NormalizedRow, metric: &str) -> bool {
    row.metrics.get(metric).is_some_and(|value| value > 0.0)
}

fn flag_matches(id: &str, row: &NormalizedRow) -> bool {
    match id {
        "hasPerps" => positive(row, "perpsVolume24h"),
        "hasOptions" => positive(row, "options_volume_24h"),
        "hasOpenInterest" => positive(row, "openInterest"),
        "multiChainOnly" => row.chains.len() > 1,
        "parentProtocolsOnly" => row.parent_protocol_id.is_none(),
        "subProtocolsOnly" => row.parent_protocol_id.is_some(),
        "hasVolume" => positive(row, "volume24h"),
        "hasFees" => positive(row, "fees24h"),
        "hasRevenue" => positive(row, "revenue24h"),
        "hasMarketCap" => positive(row, "mcap"),
        "hasAggregators" => positive(row, "aggregators_volume_24h"),
        "hasDerivativesAggregators" => positive(row, "derivatives_aggregators_volume_24h"),
        "hasBridgedTVL" => positive(row, "bridgedTvl"),
        "hasStables" => positive(row, "stablesMcap"),
        "hasHolderRevenue" => positive(row, "holderRevenue_24h"),
        "hasTreasuryRevenue" => positive(row, "treasuryRevenue_24h"),
        "hasMcapTVLRatio" => row.metrics.mcaptvl.is_some(),
        "isVolumeGrowing" => positive(row, "volumeChange_7d"),
        "isRevenueGrowing" => positive(row, "revenueChange_7d"),
        _ => true,
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|item| item.eq_ignore_ascii_case(needle))
}

fn passes_config(config: &FilterConfig, filters: &TableFilters, row: &NormalizedRow) -> bool {
    match config.kind {
        FilterKind::NumericRange | FilterKind::NumericSingle => {
            let min = config.min_key().and_then(|key| filters.number(&key));
            let max = config.max_key().and_then(|key| filters.number(&key));
            if min.is_none() && max.is_none() {
                return true;
            }
            let Some(value) = config.metric.and_then(|metric| row.metrics.get(metric)) else {
                return false;
            };
            min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
        }
        FilterKind::Boolean => !filters.flag(config.id) || flag_matches(config.id, row),
        FilterKind::Array => true,
    }
}

fn passes_lists(filters: &TableFilters, row: &NormalizedRow) -> bool {
    let categories = filters.list("categories");
    if !categories.is_empty() {
        match row.category.as_deref() {
            Some(category) if contains_ignore_case(categories, category) => {}
            _ => return false,
        }
    }
    if let Some(category) = row.category.as_deref() {
        if contains_ignore_case(filters.list("excludedCategories"), category) {
            return false;
        }
    }

    let oracles = filters.list("oracles");
    if !oracles.is_empty() && !row.oracles.iter().any(|oracle| contains_ignore_case(oracles, oracle)) {
        return false;
    }

    let chains = filters.list("chains");
    if !chains.is_empty() {
        let in_row_chains = row.chains.iter().any(|chain| contains_ignore_case(chains, chain));
        let in_row_chain = row.chain.as_deref().is_some_and(|chain| contains_ignore_case(chains, chain));
        if !in_row_chains && !in_row_chain {
            return false;
        }
    }

    let protocols = filters.list("protocols");
    if !protocols.is_empty() {
        let matches = [Some(row.name.as_str()), row.protocol_id.as_deref(), row.parent_protocol_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|candidate| contains_ignore_case(protocols, candidate));
        if !matches {
            return false;
        }
    }
    true
}

/// True when `row` satisfies every filter that applies to its strategy.
pub fn row_matches(filters: &TableFilters, row: &NormalizedRow) -> bool {
    FILTER_CONFIGS
        .iter()
        .filter(|config| config.strategies.contains(&row.strategy_type))
        .all(|config| passes_config(config, filters, row))
        && passes_lists(filters, row)
}

pub fn apply_filters(rows: Vec<NormalizedRow>, filters: &TableFilters) -> Vec<NormalizedRow> {
    if filters.is_empty() {
        return rows;
    }
    let before = rows.len();
    let kept: Vec<NormalizedRow> = rows.into_iter().filter(|row| row_matches(filters, row)).collect();
    debug!(
        component = "filters",
        event = "filters.applied",
        filter_count = filters.len(),
        rows_before = before,
        rows_after = kept.len()
    );
    kept
}

/// `1234567.891` -> `1,234,567.891` (at most three fraction digits).
fn grouped_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    let text = format!("{:.3}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if !frac_part.is_empty() {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_filter_value(value: f64, format: FilterFormat) -> String {
    match format {
        FilterFormat::Percent => format!("{value}%"),
        FilterFormat::Number => grouped_number(value),
        FilterFormat::Currency => {
            let abs = value.abs();
            if abs >= 1e9 {
                format!("${:.1}B", value / 1e9)
            } else if abs >= 1e6 {
                format!("${:.1}M", value / 1e6)
            } else if abs >= 1e3 {
                format!("${:.1}K", value / 1e3)
            } else {
                format!("${}", grouped_number(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NumericMetrics;

    fn protocol_row(name: &str, metrics: NumericMetrics) -> NormalizedRow {
        NormalizedRow {
            id: name.to_lowercase(),
            name: name.to_string(),
            category: Some("Dexs".to_string()),
            chains: vec!["Ethereum".to_string()],
            metrics,
            ..NormalizedRow::default()
        }
    }

    #[test]
    fn catalog_is_partitioned_by_strategy() {
        let protocol_ids: Vec<&str> = filters_for_strategy(StrategyType::Protocols).iter().map(|c| c.id).collect();
        let chain_ids: Vec<&str> = filters_for_strategy(StrategyType::Chains).iter().map(|c| c.id).collect();
        assert!(protocol_ids.contains(&"hasPerps"));
        assert!(!protocol_ids.contains(&"stablesMcap"));
        assert!(chain_ids.contains(&"stablesMcap"));
        assert!(chain_ids.contains(&"tvl"));
        assert!(!chain_ids.contains(&"mcap"));

        let grouped = filters_by_category(StrategyType::Chains);
        assert!(grouped.contains_key(&FilterCategory::ChainMetrics));
        assert!(!grouped.contains_key(&FilterCategory::Aggregators));
        assert_eq!(filter_config("pfRatio").and_then(|c| c.max_key()), Some("pfRatioMax".to_string()));
    }

    #[test]
    fn sanitize_keeps_only_meaningful_values() {
        let filters = TableFilters::new()
            .with_flag("hasPerps", false)
            .with_flag("hasFees", true)
            .with_text("search", "   ")
            .with_list::<&str>("categories", &[])
            .with_number("tvlMin", 0.0);
        let sanitized = sanitize_filters(&filters).unwrap();
        let keys: Vec<&str> = sanitized.keys().collect();
        assert_eq!(keys, vec!["hasFees", "tvlMin"]);

        let empty = TableFilters::new().with_flag("hasPerps", false);
        assert_eq!(sanitize_filters(&empty), None);

        let parsed: TableFilters = serde_json::from_str(r#"{"tvlMin":null,"hasVolume":false}"#).unwrap();
        assert_eq!(sanitize_filters(&parsed), None);
    }

    #[test]
    fn numeric_ranges_exclude_missing_values() {
        let rows = vec![
            protocol_row("Big", NumericMetrics { tvl: Some(5e9), ..NumericMetrics::default() }),
            protocol_row("Small", NumericMetrics { tvl: Some(1e6), ..NumericMetrics::default() }),
            protocol_row("Unknown", NumericMetrics::default()),
        ];
        let filters = TableFilters::new().with_number("tvlMin", 1e7);
        let kept = apply_filters(rows.clone(), &filters);
        assert_eq!(kept.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["Big"]);

        let filters = TableFilters::new().with_number("tvlMax", 1e7);
        let kept = apply_filters(rows, &filters);
        assert_eq!(kept.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["Small"]);
    }

    #[test]
    fn flags_and_lists() {
        let mut child = protocol_row("Child", NumericMetrics { perps_volume_24h: Some(10.0), ..NumericMetrics::default() });
        child.parent_protocol_id = Some("parent#x".to_string());
        child.chains.push("Arbitrum".to_string());
        child.oracles = vec!["Chainlink".to_string()];
        let mut lending = protocol_row("Lender", NumericMetrics::default());
        lending.category = Some("Lending".to_string());
        let rows = vec![child, lending];

        let names = |filters: &TableFilters| -> Vec<String> {
            apply_filters(rows.clone(), filters).into_iter().map(|r| r.name).collect()
        };

        assert_eq!(names(&TableFilters::new().with_flag("hasPerps", true)), vec!["Child"]);
        assert_eq!(names(&TableFilters::new().with_flag("multiChainOnly", true)), vec!["Child"]);
        assert_eq!(names(&TableFilters::new().with_flag("parentProtocolsOnly", true)), vec!["Lender"]);
        assert_eq!(names(&TableFilters::new().with_flag("subProtocolsOnly", true)), vec!["Child"]);
        assert_eq!(names(&TableFilters::new().with_list("categories", &["lending"])), vec!["Lender"]);
        assert_eq!(names(&TableFilters::new().with_list("excludedCategories", &["Dexs"])), vec!["Lender"]);
        assert_eq!(names(&TableFilters::new().with_list("oracles", &["chainlink"])), vec!["Child"]);
        assert_eq!(names(&TableFilters::new().with_list("chains", &["arbitrum"])), vec!["Child"]);
        assert_eq!(names(&TableFilters::new().with_flag("hasPerps", false)).len(), 2);
    }

    #[test]
    fn chain_only_filters_skip_protocol_rows() {
        let row = protocol_row("Aave", NumericMetrics::default());
        let filters = TableFilters::new().with_flag("hasStables", true);
        assert!(row_matches(&filters, &row));
    }

    #[test]
    fn filter_value_formatting() {
        assert_eq!(format_filter_value(5.0, FilterFormat::Percent), "5%");
        assert_eq!(format_filter_value(2.5, FilterFormat::Percent), "2.5%");
        assert_eq!(format_filter_value(1234567.5, FilterFormat::Number), "1,234,567.5");
        assert_eq!(format_filter_value(1.5e9, FilterFormat::Currency), "$1.5B");
        assert_eq!(format_filter_value(2.26e6, FilterFormat::Currency), "$2.3M");
        assert_eq!(format_filter_value(-4_000.0, FilterFormat::Currency), "$-4.0K");
        assert_eq!(format_filter_value(950.0, FilterFormat::Currency), "$950");
    }
}
