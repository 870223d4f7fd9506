//! Column dictionary, presets and saved-view sanitization.
//!
//! The registry is built once and passed by reference. Saved column ids are checked against it
//! (plus the table's custom columns) so stale configurations degrade instead of failing.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::custom_columns::CustomColumnDefinition;
use crate::grouping::RowHeader;
use crate::strategy::StrategyType;

pub const NAME_COLUMN_ID: &str = "name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnRender {
    Usd,
    Percent,
    Ratio,
    Number,
    Meta,
    MetaCategory,
    MetaChains,
    MetaOracles,
}

impl ColumnRender {
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            ColumnRender::Meta
                | ColumnRender::MetaCategory
                | ColumnRender::MetaChains
                | ColumnRender::MetaOracles
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnGroup {
    Meta,
    Tvl,
    Volume,
    Fees,
    Revenue,
    Perps,
    Aggregators,
    BridgeAggregators,
    DerivativesAggregators,
    Options,
    Ratios,
}

const BOTH: &[StrategyType] = &[StrategyType::Protocols, StrategyType::Chains];
const CHAINS_ONLY: &[StrategyType] = &[StrategyType::Chains];
const PROTOCOLS_ONLY: &[StrategyType] = &[StrategyType::Protocols];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDictionaryItem {
    pub id: &'static str,
    pub header: &'static str,
    pub group: ColumnGroup,
    pub render: ColumnRender,
    pub tags: &'static [&'static str],
    pub chain_group_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    pub strategies: &'static [StrategyType],
}

impl ColumnDictionaryItem {
    const fn new(
        id: &'static str,
        header: &'static str,
        group: ColumnGroup,
        render: ColumnRender,
    ) -> Self {
        Self {
            id,
            header,
            group,
            render,
            tags: &[],
            chain_group_only: false,
            description: None,
            strategies: BOTH,
        }
    }

    const fn tags(mut self, tags: &'static [&'static str]) -> Self {
        self.tags = tags;
        self
    }

    const fn chain_only(mut self) -> Self {
        self.chain_group_only = true;
        self.strategies = CHAINS_ONLY;
        self
    }

    const fn protocols_only(mut self) -> Self {
        self.strategies = PROTOCOLS_ONLY;
        self
    }

    const fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

use ColumnGroup as G;
use ColumnRender as R;

const CHANGE: &[&str] = &["change"];
const DOMINANCE: &[&str] = &["dominance"];
const SPECIALIZED: &[&str] = &["specialized"];
const SPECIALIZED_CHANGE: &[&str] = &["change", "specialized"];
const SPECIALIZED_DOMINANCE: &[&str] = &["specialized", "dominance"];
const DISTRIBUTION: &[&str] = &["distribution"];
const CUMULATIVE: &[&str] = &["cumulative"];
const DERIVED: &[&str] = &["derived"];

type Col = ColumnDictionaryItem;

const DICTIONARY: &[ColumnDictionaryItem] = &[
    Col::new("category", "Category", G::Meta, R::MetaCategory),
    Col::new("chains", "Chains", G::Meta, R::MetaChains),
    Col::new("oracles", "Oracles", G::Meta, R::MetaOracles).protocols_only(),
    Col::new("protocolCount", "Protocols", G::Meta, R::Number),
    Col::new("tvl", "TVL", G::Tvl, R::Usd),
    Col::new("change1d", "1d Change", G::Tvl, R::Percent).tags(CHANGE),
    Col::new("change7d", "7d Change", G::Tvl, R::Percent).tags(CHANGE),
    Col::new("change1m", "30d Change", G::Tvl, R::Percent).tags(CHANGE),
    Col::new("bridgedTvl", "Bridged TVL", G::Tvl, R::Usd).chain_only(),
    Col::new("stablesMcap", "Stables", G::Tvl, R::Usd).chain_only(),
    Col::new("tvlShare", "TVL Share", G::Tvl, R::Percent)
        .tags(DOMINANCE)
        .chain_only(),
    Col::new("stablesShare", "Stables Share", G::Tvl, R::Percent)
        .tags(DOMINANCE)
        .chain_only(),
    Col::new("volume24h", "24h Volume", G::Volume, R::Usd),
    Col::new("volume_7d", "7d Volume", G::Volume, R::Usd),
    Col::new("volume_30d", "30d Volume", G::Volume, R::Usd),
    Col::new("cumulativeVolume", "Cumulative Volume", G::Volume, R::Usd).tags(CUMULATIVE),
    Col::new("volumeChange_1d", "1d Volume Change", G::Volume, R::Percent).tags(CHANGE),
    Col::new("volumeChange_7d", "7d Volume Change", G::Volume, R::Percent).tags(CHANGE),
    Col::new("volumeChange_1m", "30d Volume Change", G::Volume, R::Percent).tags(CHANGE),
    Col::new("volumeDominance_24h", "24h Volume Share", G::Volume, R::Percent).tags(DOMINANCE),
    Col::new("volumeMarketShare7d", "7d Volume Share", G::Volume, R::Percent).tags(DOMINANCE),
    Col::new("volume24hShare", "24h Chain Volume Share", G::Volume, R::Percent)
        .tags(DOMINANCE)
        .chain_only(),
    Col::new("fees24h", "24h Fees", G::Fees, R::Usd),
    Col::new("fees_7d", "7d Fees", G::Fees, R::Usd),
    Col::new("fees_30d", "30d Fees", G::Fees, R::Usd),
    Col::new("fees_1y", "1y Fees", G::Fees, R::Usd),
    Col::new("average_1y", "1y Monthly Avg Fees", G::Fees, R::Usd).tags(DERIVED),
    Col::new("cumulativeFees", "Cumulative Fees", G::Fees, R::Usd).tags(CUMULATIVE),
    Col::new("userFees_24h", "24h User Fees", G::Fees, R::Usd).tags(DISTRIBUTION),
    Col::new("holderRevenue_24h", "24h Holder Revenue", G::Fees, R::Usd).tags(DISTRIBUTION),
    Col::new("holderRevenue_7d", "7d Holder Revenue", G::Fees, R::Usd).tags(DISTRIBUTION),
    Col::new("holdersRevenue30d", "30d Holder Revenue", G::Fees, R::Usd).tags(DISTRIBUTION),
    Col::new("treasuryRevenue_24h", "24h Treasury Revenue", G::Fees, R::Usd).tags(DISTRIBUTION),
    Col::new("supplySideRevenue_24h", "24h Supply Side Revenue", G::Fees, R::Usd)
        .tags(DISTRIBUTION),
    Col::new("feesChange_1d", "1d Fees Change", G::Fees, R::Percent).tags(CHANGE),
    Col::new("feesChange_7d", "7d Fees Change", G::Fees, R::Percent).tags(CHANGE),
    Col::new("feesChange_1m", "30d Fees Change", G::Fees, R::Percent).tags(CHANGE),
    Col::new("revenue24h", "24h Revenue", G::Revenue, R::Usd),
    Col::new("revenue_7d", "7d Revenue", G::Revenue, R::Usd),
    Col::new("revenue_30d", "30d Revenue", G::Revenue, R::Usd),
    Col::new("revenue_1y", "1y Revenue", G::Revenue, R::Usd),
    Col::new("average_revenue_1y", "1y Monthly Avg Revenue", G::Revenue, R::Usd).tags(DERIVED),
    Col::new("revenueChange_1d", "1d Revenue Change", G::Revenue, R::Percent).tags(CHANGE),
    Col::new("revenueChange_7d", "7d Revenue Change", G::Revenue, R::Percent).tags(CHANGE),
    Col::new("revenueChange_1m", "30d Revenue Change", G::Revenue, R::Percent).tags(CHANGE),
    Col::new("perpsVolume24h", "24h Perps Volume", G::Perps, R::Usd),
    Col::new("perps_volume_7d", "7d Perps Volume", G::Perps, R::Usd),
    Col::new("perps_volume_30d", "30d Perps Volume", G::Perps, R::Usd),
    Col::new("perps_volume_change_1d", "1d Perps Volume Change", G::Perps, R::Percent).tags(CHANGE),
    Col::new("perps_volume_change_7d", "7d Perps Volume Change", G::Perps, R::Percent).tags(CHANGE),
    Col::new("perps_volume_change_1m", "30d Perps Volume Change", G::Perps, R::Percent)
        .tags(CHANGE),
    Col::new("perps_volume_dominance_24h", "24h Perps Volume Share", G::Perps, R::Percent)
        .tags(DOMINANCE),
    Col::new("openInterest", "Open Interest", G::Perps, R::Usd),
    Col::new("aggregators_volume_24h", "24h Aggregator Volume", G::Aggregators, R::Usd)
        .tags(SPECIALIZED),
    Col::new("aggregators_volume_7d", "7d Aggregator Volume", G::Aggregators, R::Usd)
        .tags(SPECIALIZED),
    Col::new("aggregators_volume_30d", "30d Aggregator Volume", G::Aggregators, R::Usd)
        .tags(SPECIALIZED),
    Col::new(
        "aggregators_volume_change_1d",
        "1d Aggregator Volume Change",
        G::Aggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "aggregators_volume_change_7d",
        "7d Aggregator Volume Change",
        G::Aggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "aggregators_volume_dominance_24h",
        "24h Aggregator Share",
        G::Aggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_DOMINANCE),
    Col::new(
        "aggregators_volume_marketShare7d",
        "7d Aggregator Share",
        G::Aggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_DOMINANCE),
    Col::new(
        "bridge_aggregators_volume_24h",
        "24h Bridge Aggregator Volume",
        G::BridgeAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED)
    .protocols_only(),
    Col::new(
        "bridge_aggregators_volume_7d",
        "7d Bridge Aggregator Volume",
        G::BridgeAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED)
    .protocols_only(),
    Col::new(
        "bridge_aggregators_volume_30d",
        "30d Bridge Aggregator Volume",
        G::BridgeAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED)
    .protocols_only(),
    Col::new(
        "bridge_aggregators_volume_change_1d",
        "1d Bridge Aggregator Change",
        G::BridgeAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE)
    .protocols_only(),
    Col::new(
        "bridge_aggregators_volume_change_7d",
        "7d Bridge Aggregator Change",
        G::BridgeAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE)
    .protocols_only(),
    Col::new(
        "bridge_aggregators_volume_dominance_24h",
        "24h Bridge Aggregator Share",
        G::BridgeAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_DOMINANCE)
    .protocols_only(),
    Col::new(
        "derivatives_aggregators_volume_24h",
        "24h Derivatives Aggregator Volume",
        G::DerivativesAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED),
    Col::new(
        "derivatives_aggregators_volume_7d",
        "7d Derivatives Aggregator Volume",
        G::DerivativesAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED),
    Col::new(
        "derivatives_aggregators_volume_30d",
        "30d Derivatives Aggregator Volume",
        G::DerivativesAggregators,
        R::Usd,
    )
    .tags(SPECIALIZED),
    Col::new(
        "derivatives_aggregators_volume_change_1d",
        "1d Derivatives Aggregator Change",
        G::DerivativesAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "derivatives_aggregators_volume_change_7d",
        "7d Derivatives Aggregator Change",
        G::DerivativesAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "derivatives_aggregators_volume_change_1m",
        "30d Derivatives Aggregator Change",
        G::DerivativesAggregators,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new("options_volume_24h", "24h Options Volume", G::Options, R::Usd).tags(SPECIALIZED),
    Col::new("options_volume_7d", "7d Options Volume", G::Options, R::Usd).tags(SPECIALIZED),
    Col::new("options_volume_30d", "30d Options Volume", G::Options, R::Usd).tags(SPECIALIZED),
    Col::new(
        "options_volume_change_1d",
        "1d Options Volume Change",
        G::Options,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "options_volume_change_7d",
        "7d Options Volume Change",
        G::Options,
        R::Percent,
    )
    .tags(SPECIALIZED_CHANGE),
    Col::new(
        "options_volume_dominance_24h",
        "24h Options Volume Share",
        G::Options,
        R::Percent,
    )
    .tags(SPECIALIZED_DOMINANCE),
    Col::new("mcap", "Market Cap", G::Ratios, R::Usd),
    Col::new("fdv", "FDV", G::Ratios, R::Usd),
    Col::new("mcaptvl", "Mcap / TVL", G::Ratios, R::Ratio)
        .describe("Market Cap divided by Total Value Locked"),
    Col::new("pf", "P/F", G::Ratios, R::Ratio).describe("Price to Fees ratio"),
    Col::new("ps", "P/S", G::Ratios, R::Ratio).describe("Price to Sales (Revenue) ratio"),
];

/// Immutable lookup over the column dictionary.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    items: Vec<ColumnDictionaryItem>,
    by_id: HashMap<&'static str, usize>,
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnRegistry {
    pub fn new() -> Self {
        let items = DICTIONARY.to_vec();
        let by_id = items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.id, index))
            .collect();
        Self { items, by_id }
    }

    pub fn items(&self) -> &[ColumnDictionaryItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&ColumnDictionaryItem> {
        self.by_id.get(id).map(|index| &self.items[*index])
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn is_legal_for(&self, id: &str, strategy: StrategyType) -> bool {
        id == NAME_COLUMN_ID
            || self
                .get(id)
                .is_some_and(|item| item.strategies.contains(&strategy))
    }

    pub fn items_for_group(&self, group: ColumnGroup) -> Vec<&ColumnDictionaryItem> {
        self.items.iter().filter(|item| item.group == group).collect()
    }

    pub fn items_for_strategy(&self, strategy: StrategyType) -> Vec<&ColumnDictionaryItem> {
        self.items
            .iter()
            .filter(|item| item.strategies.contains(&strategy))
            .collect()
    }

    pub fn is_percent(&self, id: &str) -> bool {
        self.get(id)
            .is_some_and(|item| item.render == ColumnRender::Percent)
    }

    /// `name` followed by every dictionary id.
    pub fn all_column_ids(&self) -> Vec<&'static str> {
        std::iter::once(NAME_COLUMN_ID)
            .chain(self.items.iter().map(|item| item.id))
            .collect()
    }

    /// Visibility map with every known column set, `name` always visible.
    pub fn visibility_for(&self, visible: &[&str]) -> BTreeMap<String, bool> {
        self.all_column_ids()
            .into_iter()
            .map(|id| (id.to_string(), id == NAME_COLUMN_ID || visible.contains(&id)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSort {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

impl ColumnSort {
    pub fn desc(id: &str) -> Self {
        Self {
            id: id.to_string(),
            desc: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnConfigState {
    pub column_order: Vec<String>,
    pub column_visibility: BTreeMap<String, bool>,
    pub sorting: Vec<ColumnSort>,
}

/// Drops ids that are neither `name`, a dictionary column nor one of `custom_columns`.
pub fn sanitize_config_columns(
    registry: &ColumnRegistry,
    state: &ColumnConfigState,
    custom_columns: &[CustomColumnDefinition],
) -> ColumnConfigState {
    let custom_ids: HashSet<&str> = custom_columns.iter().map(|column| column.id.as_str()).collect();
    let allowed = |id: &str| id == NAME_COLUMN_ID || registry.is_known(id) || custom_ids.contains(id);

    let mut seen = HashSet::new();
    let column_order: Vec<String> = state
        .column_order
        .iter()
        .filter(|id| allowed(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    let column_visibility: BTreeMap<String, bool> = state
        .column_visibility
        .iter()
        .filter(|(id, _)| allowed(id.as_str()))
        .map(|(id, visible)| (id.clone(), *visible))
        .collect();
    let sorting: Vec<ColumnSort> = state
        .sorting
        .iter()
        .filter(|sort| allowed(sort.id.as_str()))
        .cloned()
        .collect();

    let dropped = (state.column_order.len() - column_order.len())
        + (state.column_visibility.len() - column_visibility.len())
        + (state.sorting.len() - sorting.len());
    if dropped > 0 {
        debug!(
            component = "columns",
            event = "columns.config.sanitized",
            dropped,
            custom_column_count = custom_ids.len()
        );
    }

    ColumnConfigState {
        column_order,
        column_visibility,
        sorting,
    }
}

/// Visible columns in display order; ids missing from the visibility map count as hidden.
pub fn visible_columns(state: &ColumnConfigState) -> Vec<String> {
    state
        .column_order
        .iter()
        .filter(|id| state.column_visibility.get(*id).copied().unwrap_or(false))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedTablePreset {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub strategy_type: StrategyType,
    pub column_order: Vec<String>,
    pub column_visibility: BTreeMap<String, bool>,
    pub row_headers: Vec<RowHeader>,
    pub default_sorting: Vec<ColumnSort>,
}

impl UnifiedTablePreset {
    pub fn column_state(&self) -> ColumnConfigState {
        ColumnConfigState {
            column_order: self.column_order.clone(),
            column_visibility: self.column_visibility.clone(),
            sorting: self.default_sorting.clone(),
        }
    }
}

struct PresetSpec {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    strategy: StrategyType,
    columns: &'static [&'static str],
    sort: &'static str,
}

const PROTOCOL_META: [&str; 3] = ["name", "category", "chains"];

const PRESET_SPECS: &[PresetSpec] = &[
    PresetSpec {
        id: "essential-protocols",
        name: "Essential Protocols",
        description: "Core protocol overview with TVL, fees, revenue, volume and ratios.",
        strategy: StrategyType::Protocols,
        columns: &[
            "tvl", "change1d", "change7d", "fees24h", "fees_7d", "revenue24h", "revenue_7d",
            "volume24h", "volume_7d", "mcap", "mcaptvl",
        ],
        sort: "tvl",
    },
    PresetSpec {
        id: "fees-protocols",
        name: "Fees",
        description: "Daily/weekly/monthly fees with holder & treasury splits.",
        strategy: StrategyType::Protocols,
        columns: &[
            "fees24h",
            "fees_7d",
            "fees_30d",
            "fees_1y",
            "average_1y",
            "cumulativeFees",
            "userFees_24h",
            "holderRevenue_24h",
            "holdersRevenue30d",
            "treasuryRevenue_24h",
            "supplySideRevenue_24h",
            "feesChange_1d",
            "feesChange_7d",
            "feesChange_1m",
        ],
        sort: "fees24h",
    },
    PresetSpec {
        id: "volume-protocols",
        name: "DEXs",
        description: "Volume with changes and market share metrics.",
        strategy: StrategyType::Protocols,
        columns: &[
            "volume24h",
            "volume_7d",
            "volume_30d",
            "cumulativeVolume",
            "volumeChange_1d",
            "volumeChange_7d",
            "volumeChange_1m",
            "volumeDominance_24h",
            "volumeMarketShare7d",
        ],
        sort: "volume24h",
    },
    PresetSpec {
        id: "perps-protocols",
        name: "Perpetuals",
        description: "Perpetual volume, changes and open interest.",
        strategy: StrategyType::Protocols,
        columns: &[
            "perpsVolume24h",
            "perps_volume_7d",
            "perps_volume_30d",
            "perps_volume_change_1d",
            "perps_volume_change_7d",
            "perps_volume_change_1m",
            "perps_volume_dominance_24h",
            "openInterest",
        ],
        sort: "perpsVolume24h",
    },
    PresetSpec {
        id: "revenue-protocols",
        name: "Revenue",
        description: "Revenue performance with longer-term trends and efficiency ratios.",
        strategy: StrategyType::Protocols,
        columns: &[
            "revenue24h",
            "revenue_7d",
            "revenue_30d",
            "revenue_1y",
            "average_revenue_1y",
            "revenueChange_1d",
            "revenueChange_7d",
            "revenueChange_1m",
            "fees24h",
            "fees_7d",
            "mcap",
            "mcaptvl",
        ],
        sort: "revenue24h",
    },
    PresetSpec {
        id: "growth-protocols",
        name: "Growth",
        description: "TVL, volume and fee momentum to spot what is trending.",
        strategy: StrategyType::Protocols,
        columns: &[
            "tvl",
            "change1d",
            "change7d",
            "change1m",
            "volume24h",
            "volumeChange_1d",
            "volumeChange_7d",
            "volumeChange_1m",
            "fees24h",
            "feesChange_1d",
            "feesChange_7d",
            "revenue24h",
            "revenueChange_1d",
            "revenueChange_7d",
            "mcaptvl",
        ],
        sort: "change7d",
    },
    PresetSpec {
        id: "aggregators-protocols",
        name: "DEX Aggregators",
        description: "Aggregator volumes, share and momentum.",
        strategy: StrategyType::Protocols,
        columns: &[
            "aggregators_volume_24h",
            "aggregators_volume_7d",
            "aggregators_volume_30d",
            "aggregators_volume_change_1d",
            "aggregators_volume_change_7d",
            "aggregators_volume_dominance_24h",
            "aggregators_volume_marketShare7d",
            "volume24h",
            "volume_7d",
        ],
        sort: "aggregators_volume_24h",
    },
    PresetSpec {
        id: "bridge-aggregators-protocols",
        name: "Bridge Aggregators",
        description: "Bridge flow volumes and market share.",
        strategy: StrategyType::Protocols,
        columns: &[
            "bridge_aggregators_volume_24h",
            "bridge_aggregators_volume_7d",
            "bridge_aggregators_volume_30d",
            "bridge_aggregators_volume_change_1d",
            "bridge_aggregators_volume_change_7d",
            "bridge_aggregators_volume_dominance_24h",
            "volume24h",
            "volume_7d",
        ],
        sort: "bridge_aggregators_volume_24h",
    },
    PresetSpec {
        id: "options-protocols",
        name: "Options",
        description: "Options volume with growth and market share.",
        strategy: StrategyType::Protocols,
        columns: &[
            "options_volume_24h",
            "options_volume_7d",
            "options_volume_30d",
            "options_volume_change_1d",
            "options_volume_change_7d",
            "options_volume_dominance_24h",
            "volume24h",
            "volume_7d",
        ],
        sort: "options_volume_24h",
    },
    PresetSpec {
        id: "chains-essential",
        name: "Essential Chains",
        description: "Chain TVL, fees, revenue and volume overview.",
        strategy: StrategyType::Chains,
        columns: &[
            "protocolCount",
            "tvl",
            "change1d",
            "change7d",
            "change1m",
            "stablesMcap",
            "fees24h",
            "revenue24h",
            "volume24h",
            "mcaptvl",
        ],
        sort: "tvl",
    },
    PresetSpec {
        id: "chains-fees",
        name: "Chain Fees & Revenue",
        description: "Track fee and revenue contribution by chain.",
        strategy: StrategyType::Chains,
        columns: &[
            "protocolCount",
            "tvl",
            "change1d",
            "change7d",
            "fees24h",
            "fees_7d",
            "fees_30d",
            "revenue24h",
            "revenue_7d",
            "volume24h",
            "volume_7d",
            "mcaptvl",
        ],
        sort: "fees24h",
    },
    PresetSpec {
        id: "chains-growth",
        name: "Chain Growth",
        description: "Momentum view across TVL, volume and fees.",
        strategy: StrategyType::Chains,
        columns: &[
            "protocolCount",
            "tvl",
            "change1d",
            "change7d",
            "change1m",
            "volume24h",
            "fees24h",
            "revenue24h",
            "mcaptvl",
        ],
        sort: "change7d",
    },
    PresetSpec {
        id: "chains-market-share",
        name: "Chain Market Share",
        description: "Compare chains by TVL, stables and 24h volume share.",
        strategy: StrategyType::Chains,
        columns: &[
            "tvl",
            "tvlShare",
            "stablesMcap",
            "stablesShare",
            "volume24h",
            "volume24hShare",
        ],
        sort: "tvlShare",
    },
];

#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: Vec<UnifiedTablePreset>,
}

impl PresetRegistry {
    pub fn new(registry: &ColumnRegistry) -> Self {
        let presets = PRESET_SPECS
            .iter()
            .map(|spec| {
                let column_order: Vec<&str> = match spec.strategy {
                    StrategyType::Protocols => PROTOCOL_META
                        .iter()
                        .chain(spec.columns.iter())
                        .copied()
                        .collect(),
                    StrategyType::Chains => std::iter::once(NAME_COLUMN_ID)
                        .chain(spec.columns.iter().copied())
                        .collect(),
                };
                let row_headers = match spec.strategy {
                    StrategyType::Protocols => {
                        vec![RowHeader::ParentProtocol, RowHeader::Protocol]
                    }
                    StrategyType::Chains => vec![RowHeader::Chain],
                };
                UnifiedTablePreset {
                    id: spec.id.to_string(),
                    name: spec.name.to_string(),
                    description: Some(spec.description.to_string()),
                    strategy_type: spec.strategy,
                    column_visibility: registry.visibility_for(&column_order),
                    column_order: column_order.iter().map(|id| id.to_string()).collect(),
                    row_headers,
                    default_sorting: vec![ColumnSort::desc(spec.sort)],
                }
            })
            .collect();
        Self { presets }
    }

    pub fn all(&self) -> &[UnifiedTablePreset] {
        &self.presets
    }

    pub fn get(&self, id: &str) -> Option<&UnifiedTablePreset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn for_strategy(&self, strategy: StrategyType) -> Vec<&UnifiedTablePreset> {
        self.presets
            .iter()
            .filter(|preset| preset.strategy_type == strategy)
            .collect()
    }

    /// First preset of the strategy, the one new tables start from.
    pub fn default_for(&self, strategy: StrategyType) -> Option<&UnifiedTablePreset> {
        self.presets
            .iter()
            .find(|preset| preset.strategy_type == strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_ids_are_unique_and_metric_backed() {
        let registry = ColumnRegistry::new();
        let mut seen = HashSet::new();
        for item in registry.items() {
            assert!(seen.insert(item.id), "duplicate column {}", item.id);
            if !item.render.is_meta() {
                assert!(
                    crate::metrics::NumericMetrics::is_metric_key(item.id),
                    "column {} has no metric",
                    item.id
                );
            }
        }
    }

    #[test]
    fn legality_follows_strategies() {
        let registry = ColumnRegistry::new();
        assert!(registry.is_legal_for("tvlShare", StrategyType::Chains));
        assert!(!registry.is_legal_for("tvlShare", StrategyType::Protocols));
        assert!(registry.is_legal_for("name", StrategyType::Protocols));
        assert!(!registry.is_legal_for("nope", StrategyType::Chains));
        assert!(registry.is_percent("volumeDominance_24h"));
        assert!(!registry.is_percent("tvl"));
    }

    #[test]
    fn presets_only_reference_known_columns() {
        let registry = ColumnRegistry::new();
        let presets = PresetRegistry::new(&registry);
        for preset in presets.all() {
            for id in &preset.column_order {
                assert!(
                    registry.is_legal_for(id, preset.strategy_type),
                    "{} references {}",
                    preset.id,
                    id
                );
            }
            assert_eq!(preset.column_visibility.get("name"), Some(&true));
        }
        let essential = presets.get("essential-protocols").unwrap();
        assert_eq!(essential.column_visibility.get("tvl"), Some(&true));
        assert_eq!(essential.column_visibility.get("fdv"), Some(&false));
        assert_eq!(
            presets.default_for(StrategyType::Chains).map(|p| p.id.as_str()),
            Some("chains-essential")
        );
    }

    #[test]
    fn visible_columns_respect_order_and_visibility() {
        let state = ColumnConfigState {
            column_order: vec!["name".into(), "tvl".into(), "fees24h".into()],
            column_visibility: [("name".to_string(), true), ("fees24h".to_string(), true)]
                .into_iter()
                .collect(),
            sorting: vec![],
        };
        assert_eq!(visible_columns(&state), vec!["name".to_string(), "fees24h".to_string()]);
    }
}
