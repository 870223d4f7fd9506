//! Cross-dataset merge: one formatted record per protocol.
//!
//! The base list and each dimension dataset are folded into a map keyed by lowercased protocol
//! name. Every dataset writes only the fields it owns, so the fold order does not change the
//! result. Dominance shares and the parent/child rollup run after all datasets are in.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::chains::chain_key;
use crate::datasets::{
    ChainBreakdown, ChainTvl, DatasetKind, DimensionProtocol, ParentProtocol, ProtocolLite,
};
use crate::metrics::{annualized_ratio, finite, percent_change_opt, round2};

/// Categories whose TVL is shown struck through because chain TVL excludes them.
pub const REMOVED_CATEGORIES_FROM_CHAIN_TVL: [&str; 20] = [
    "Chain",
    "CEX",
    "Infrastructure",
    "Staking Pool",
    "RWA",
    "Basis Trading",
    "CeDeFi",
    "Bridge",
    "Canonical Bridge",
    "Farm",
    "Yield Aggregator",
    "Yield",
    "Liquidity manager",
    "Onchain Capital Allocator",
    "Risk Curators",
    "Treasury Manager",
    "Anchor BTC",
    "CDP Manager",
    "Restaked BTC",
    "RWA Lending",
];

pub const LIQUID_STAKING_CATEGORY: &str = "Liquid Staking";

/// Dataset fold order used by `format_protocols_list`.
pub const MERGE_ORDER: [DatasetKind; 8] = [
    DatasetKind::Fees,
    DatasetKind::Volume,
    DatasetKind::Perps,
    DatasetKind::OpenInterest,
    DatasetKind::Earnings,
    DatasetKind::Aggregators,
    DatasetKind::BridgeAggregators,
    DatasetKind::Options,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeInputs {
    pub protocols: Vec<ProtocolLite>,
    pub parent_protocols: Vec<ParentProtocol>,
    pub volume: Option<Vec<DimensionProtocol>>,
    pub fees: Option<Vec<DimensionProtocol>>,
    pub perps: Option<Vec<DimensionProtocol>>,
    pub open_interest: Option<Vec<DimensionProtocol>>,
    pub earnings: Option<Vec<DimensionProtocol>>,
    pub aggregators: Option<Vec<DimensionProtocol>>,
    pub bridge_aggregators: Option<Vec<DimensionProtocol>>,
    pub options: Option<Vec<DimensionProtocol>>,
}

impl MergeInputs {
    pub fn dataset(&self, kind: DatasetKind) -> Option<&[DimensionProtocol]> {
        let slot = match kind {
            DatasetKind::Volume => &self.volume,
            DatasetKind::Fees => &self.fees,
            DatasetKind::Perps => &self.perps,
            DatasetKind::OpenInterest => &self.open_interest,
            DatasetKind::Earnings => &self.earnings,
            DatasetKind::Aggregators => &self.aggregators,
            DatasetKind::BridgeAggregators => &self.bridge_aggregators,
            DatasetKind::Options => &self.options,
        };
        slot.as_deref()
    }

    pub fn set_dataset(&mut self, kind: DatasetKind, data: Option<Vec<DimensionProtocol>>) {
        let slot = match kind {
            DatasetKind::Volume => &mut self.volume,
            DatasetKind::Fees => &mut self.fees,
            DatasetKind::Perps => &mut self.perps,
            DatasetKind::OpenInterest => &mut self.open_interest,
            DatasetKind::Earnings => &mut self.earnings,
            DatasetKind::Aggregators => &mut self.aggregators,
            DatasetKind::BridgeAggregators => &mut self.bridge_aggregators,
            DatasetKind::Options => &mut self.options,
        };
        *slot = data;
    }

    pub fn loaded_dataset_count(&self) -> usize {
        DatasetKind::ALL
            .iter()
            .filter(|kind| self.dataset(**kind).is_some())
            .count()
    }
}

/// Extra-TVL toggles (`staking`, `pool2`, `borrowed`, `doublecounted`, `liquidstaking`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraTvlSettings {
    enabled: BTreeMap<String, bool>,
}

impl ExtraTvlSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, enabled: bool) -> Self {
        self.enabled.insert(key.to_lowercase(), enabled);
        self
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled
            .get(&key.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    /// Whether any toggle changes the base TVL. Double counted TVL is removed unless enabled.
    fn modifies_tvl(&self) -> bool {
        !self.is_enabled("doublecounted")
            || self
                .enabled
                .iter()
                .any(|(key, on)| *on && key != "doublecounted")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedProtocol {
    pub name: String,
    pub defillama_id: Option<String>,
    pub slug: Option<String>,
    pub logo: Option<String>,
    pub url: Option<String>,
    pub symbol: Option<String>,
    pub category: Option<String>,
    pub chains: Vec<String>,
    pub parent_protocol: Option<String>,
    pub chain_tvls: BTreeMap<String, ChainTvl>,
    pub extra_tvl: BTreeMap<String, ChainTvl>,
    pub oracles: Vec<String>,
    pub oracles_by_chain: BTreeMap<String, Vec<String>>,
    pub strike_tvl: bool,
    pub parent_excluded: bool,
    pub is_parent_protocol: bool,
    pub sub_rows: Vec<FormattedProtocol>,

    pub tvl: Option<f64>,
    pub tvl_prev_day: Option<f64>,
    pub tvl_prev_week: Option<f64>,
    pub tvl_prev_month: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_7d: Option<f64>,
    pub change_1m: Option<f64>,
    pub mcap: Option<f64>,
    pub mcaptvl: Option<f64>,

    pub fees_24h: Option<f64>,
    pub fees_7d: Option<f64>,
    pub fees_30d: Option<f64>,
    pub fees_1y: Option<f64>,
    pub fees_change_1d: Option<f64>,
    pub fees_change_7d: Option<f64>,
    pub fees_change_1m: Option<f64>,
    pub average_1y: Option<f64>,
    pub cumulative_fees: Option<f64>,
    pub user_fees_24h: Option<f64>,
    pub revenue_24h: Option<f64>,
    pub revenue_7d: Option<f64>,
    pub revenue_30d: Option<f64>,
    pub revenue_1y: Option<f64>,
    pub revenue_change_1d: Option<f64>,
    pub revenue_change_7d: Option<f64>,
    pub revenue_change_1m: Option<f64>,
    pub average_revenue_1y: Option<f64>,
    pub holder_revenue_24h: Option<f64>,
    pub holder_revenue_7d: Option<f64>,
    pub holders_revenue_30d: Option<f64>,
    pub treasury_revenue_24h: Option<f64>,
    pub supply_side_revenue_24h: Option<f64>,
    pub pf: Option<f64>,
    pub ps: Option<f64>,

    pub volume_24h: Option<f64>,
    pub volume_7d: Option<f64>,
    pub volume_30d: Option<f64>,
    pub volume_change_1d: Option<f64>,
    pub volume_change_7d: Option<f64>,
    pub volume_change_1m: Option<f64>,
    pub cumulative_volume: Option<f64>,

    pub perps_volume_24h: Option<f64>,
    pub perps_volume_7d: Option<f64>,
    pub perps_volume_30d: Option<f64>,
    pub perps_volume_change_1d: Option<f64>,
    pub perps_volume_change_7d: Option<f64>,
    pub perps_volume_change_1m: Option<f64>,
    pub open_interest: Option<f64>,

    pub earnings_24h: Option<f64>,
    pub earnings_7d: Option<f64>,
    pub earnings_30d: Option<f64>,
    pub earnings_1y: Option<f64>,
    pub earnings_change_1d: Option<f64>,
    pub earnings_change_7d: Option<f64>,
    pub earnings_change_1m: Option<f64>,

    pub aggregators_volume_24h: Option<f64>,
    pub aggregators_volume_7d: Option<f64>,
    pub aggregators_volume_30d: Option<f64>,
    pub aggregators_volume_change_1d: Option<f64>,
    pub aggregators_volume_change_7d: Option<f64>,
    pub bridge_aggregators_volume_24h: Option<f64>,
    pub bridge_aggregators_volume_7d: Option<f64>,
    pub bridge_aggregators_volume_30d: Option<f64>,
    pub bridge_aggregators_volume_change_1d: Option<f64>,
    pub bridge_aggregators_volume_change_7d: Option<f64>,
    pub options_volume_24h: Option<f64>,
    pub options_volume_7d: Option<f64>,
    pub options_volume_30d: Option<f64>,
    pub options_volume_change_1d: Option<f64>,
    pub options_volume_change_7d: Option<f64>,

    pub volume_dominance_24h: Option<f64>,
    pub volume_market_share_7d: Option<f64>,
    pub perps_volume_dominance_24h: Option<f64>,
    pub aggregators_volume_dominance_24h: Option<f64>,
    pub aggregators_volume_market_share_7d: Option<f64>,
    pub bridge_aggregators_volume_dominance_24h: Option<f64>,
    pub options_volume_dominance_24h: Option<f64>,

    pub fees_by_chain: ChainBreakdown,
    pub revenue_by_chain: ChainBreakdown,
    pub volume_by_chain: ChainBreakdown,
    pub perps_volume_by_chain: ChainBreakdown,
    pub open_interest_by_chain: ChainBreakdown,
    pub earnings_by_chain: ChainBreakdown,
    pub aggregators_volume_by_chain: ChainBreakdown,
    pub bridge_aggregators_volume_by_chain: ChainBreakdown,
    pub options_volume_by_chain: ChainBreakdown,
}

impl FormattedProtocol {
    /// Every per-chain breakdown map, for chain discovery.
    pub fn breakdowns(&self) -> [&ChainBreakdown; 9] {
        [
            &self.fees_by_chain,
            &self.revenue_by_chain,
            &self.volume_by_chain,
            &self.perps_volume_by_chain,
            &self.open_interest_by_chain,
            &self.earnings_by_chain,
            &self.aggregators_volume_by_chain,
            &self.bridge_aggregators_volume_by_chain,
            &self.options_volume_by_chain,
        ]
    }
}

/// Merges `incoming` into `existing`, re-keying entries by normalized chain name.
pub fn merge_chain_breakdown(existing: &mut ChainBreakdown, incoming: Option<&ChainBreakdown>) {
    let Some(incoming) = incoming else {
        return;
    };
    for (key, value) in incoming {
        let label = value
            .chain
            .as_deref()
            .filter(|chain| !chain.trim().is_empty())
            .unwrap_or(key.as_str())
            .to_string();
        let normalized = if label.trim().is_empty() {
            chain_key(key)
        } else {
            chain_key(&label)
        };
        let mut snapshot = value.clone();
        snapshot.chain = Some(label);
        existing.insert(normalized, snapshot);
    }
}

/// Where a synthetic row was first seen: `(merge priority, position in that dataset)`.
type Origin = (usize, usize);

/// Insertion-ordered map of protocols keyed by lowercased name.
///
/// Rows that only exist in datasets are named and ordered by their origin, and chains picked up
/// from datasets are appended sorted, so neither depends on the fold order.
#[derive(Debug, Default)]
struct ProtocolTable {
    rows: Vec<FormattedProtocol>,
    index: HashMap<String, usize>,
    synthetic: HashMap<usize, Origin>,
    extra_chains: HashMap<usize, BTreeSet<String>>,
}

impl ProtocolTable {
    fn insert(&mut self, key: String, row: FormattedProtocol) {
        match self.index.get(&key) {
            Some(position) => self.rows[*position] = row,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    /// Existing row for `item`, or a synthetic one named after the highest-priority entry.
    fn entry_for(
        &mut self,
        kind: DatasetKind,
        item_position: usize,
        item: &DimensionProtocol,
    ) -> Option<&mut FormattedProtocol> {
        let key = item.name.to_lowercase();
        if key.is_empty() {
            return None;
        }
        let origin = (merge_priority(kind), item_position);
        let name = || item.display_name.clone().unwrap_or_else(|| item.name.clone());
        let position = match self.index.get(&key) {
            Some(position) => {
                let position = *position;
                if let Some(seen) = self.synthetic.get_mut(&position) {
                    if origin < *seen {
                        *seen = origin;
                        self.rows[position].name = name();
                    }
                }
                position
            }
            None => {
                let position = self.rows.len();
                self.index.insert(key, position);
                self.synthetic.insert(position, origin);
                self.rows.push(FormattedProtocol {
                    name: name(),
                    ..FormattedProtocol::default()
                });
                position
            }
        };

        self.extra_chains
            .entry(position)
            .or_default()
            .extend(item.chains.iter().cloned());
        Some(&mut self.rows[position])
    }

    /// Base rows in input order, then synthetic rows by origin.
    fn into_rows(self) -> Vec<FormattedProtocol> {
        let ProtocolTable {
            rows,
            synthetic,
            mut extra_chains,
            ..
        } = self;
        let mut base = Vec::with_capacity(rows.len());
        let mut created = Vec::with_capacity(synthetic.len());
        for (position, mut row) in rows.into_iter().enumerate() {
            for chain in extra_chains.remove(&position).unwrap_or_default() {
                if !row.chains.contains(&chain) {
                    row.chains.push(chain);
                }
            }
            match synthetic.get(&position) {
                Some(origin) => created.push((*origin, row)),
                None => base.push(row),
            }
        }
        created.sort_by(|a, b| a.0.cmp(&b.0));
        base.extend(created.into_iter().map(|(_, row)| row));
        base
    }
}

fn merge_priority(kind: DatasetKind) -> usize {
    MERGE_ORDER
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(MERGE_ORDER.len())
}

fn format_base(protocol: &ProtocolLite, settings: &ExtraTvlSettings) -> FormattedProtocol {
    let mut tvl = protocol.tvl;
    let mut tvl_prev_day = protocol.tvl_prev_day;
    let mut tvl_prev_week = protocol.tvl_prev_week;
    let mut tvl_prev_month = protocol.tvl_prev_month;
    let mut strike_tvl = false;
    let category = protocol.category.as_deref();
    let is_liquid_staking = category == Some(LIQUID_STAKING_CATEGORY);

    if settings.modifies_tvl() {
        if is_liquid_staking && !settings.is_enabled("liquidstaking") {
            strike_tvl = true;
        }
        if category.is_some_and(|c| REMOVED_CATEGORIES_FROM_CHAIN_TVL.contains(&c)) {
            strike_tvl = true;
        }

        for (prop, extra) in &protocol.extra_tvl {
            let prop = prop.to_lowercase();
            let hides_double_count = prop == "doublecounted"
                && !settings.is_enabled("doublecounted")
                && (!is_liquid_staking || !settings.is_enabled("liquidstaking"));
            if hides_double_count {
                strike_tvl = true;
                continue;
            }
            if settings.is_enabled(&prop) && prop != "doublecounted" && prop != "liquidstaking" {
                add_extra(&mut tvl, extra.tvl);
                add_extra(&mut tvl_prev_day, extra.tvl_prev_day);
                add_extra(&mut tvl_prev_week, extra.tvl_prev_week);
                add_extra(&mut tvl_prev_month, extra.tvl_prev_month);
            }
        }
    }

    let mcaptvl = match (protocol.mcap, tvl) {
        (Some(mcap), Some(tvl)) if tvl > 0.0 => finite(mcap / tvl).map(round2),
        _ => None,
    };

    FormattedProtocol {
        name: protocol.name.clone(),
        defillama_id: protocol.defillama_id.clone(),
        slug: protocol.slug.clone(),
        logo: protocol.logo.clone(),
        url: protocol.url.clone(),
        symbol: protocol.symbol.clone(),
        category: protocol.category.clone(),
        chains: protocol.chains.clone(),
        parent_protocol: protocol.parent_protocol.clone(),
        chain_tvls: protocol.chain_tvls.clone(),
        extra_tvl: protocol.extra_tvl.clone(),
        oracles: protocol.oracles.clone(),
        oracles_by_chain: protocol.oracles_by_chain.clone(),
        strike_tvl,
        tvl,
        tvl_prev_day,
        tvl_prev_week,
        tvl_prev_month,
        change_1d: percent_change_opt(tvl, tvl_prev_day),
        change_7d: percent_change_opt(tvl, tvl_prev_week),
        change_1m: percent_change_opt(tvl, tvl_prev_month),
        mcap: protocol.mcap,
        mcaptvl,
        ..FormattedProtocol::default()
    }
}

fn add_extra(target: &mut Option<f64>, extra: Option<f64>) {
    if let Some(extra) = extra {
        *target = Some(target.unwrap_or(0.0) + extra);
    }
}

fn assign_dataset(kind: DatasetKind, p: &mut FormattedProtocol, item: &DimensionProtocol) {
    let breakdown = item.chain_breakdown.as_ref();
    match kind {
        DatasetKind::Fees => {
            p.fees_24h = item.total_24h;
            p.fees_7d = item.total_7d;
            p.fees_30d = item.total_30d;
            p.fees_1y = item.total_1y;
            p.revenue_24h = item.revenue_24h;
            p.revenue_7d = item.revenue_7d;
            p.revenue_30d = item.revenue_30d;
            p.revenue_1y = item.revenue_1y;
            p.fees_change_1d = item.fees_change_1d.or(p.fees_change_1d);
            p.fees_change_7d = item.fees_change_7d.or(p.fees_change_7d);
            p.fees_change_1m = item.fees_change_1m.or(p.fees_change_1m);
            p.revenue_change_1d = item.revenue_change_1d.or(p.revenue_change_1d);
            p.revenue_change_7d = item.revenue_change_7d.or(p.revenue_change_7d);
            p.revenue_change_1m = item.revenue_change_1m.or(p.revenue_change_1m);
            p.average_1y = item.monthly_average_1y;
            p.average_revenue_1y = item.average_revenue_1y;
            p.holder_revenue_24h = item.holders_revenue_24h;
            p.holder_revenue_7d = item.holders_revenue_7d;
            p.holders_revenue_30d = item.holders_revenue_30d;
            p.treasury_revenue_24h = item.daily_protocol_revenue;
            p.supply_side_revenue_24h = item.daily_supply_side_revenue;
            p.user_fees_24h = item.daily_user_fees;
            p.cumulative_fees = item.total_all_time;
            p.pf = item.pf.or(p.pf);
            p.ps = item.ps.or(p.ps);
            merge_chain_breakdown(&mut p.fees_by_chain, breakdown);
            merge_chain_breakdown(&mut p.revenue_by_chain, breakdown);
        }
        DatasetKind::Volume => {
            p.volume_24h = item.total_24h;
            p.volume_7d = item.total_7d;
            p.volume_30d = item.total_30d;
            p.volume_change_1d = item.change_1d.or(p.volume_change_1d);
            p.volume_change_7d = item.change_7d.or(p.volume_change_7d);
            p.volume_change_1m = item.change_1m.or(p.volume_change_1m);
            p.cumulative_volume = item.total_all_time.or(p.cumulative_volume);
            merge_chain_breakdown(&mut p.volume_by_chain, breakdown);
        }
        DatasetKind::Perps => {
            p.perps_volume_24h = item.total_24h;
            p.perps_volume_7d = item.total_7d;
            p.perps_volume_30d = item.total_30d;
            p.perps_volume_change_1d = item.change_1d.or(p.perps_volume_change_1d);
            p.perps_volume_change_7d = item.change_7d.or(p.perps_volume_change_7d);
            p.perps_volume_change_1m = item.change_1m.or(p.perps_volume_change_1m);
            merge_chain_breakdown(&mut p.perps_volume_by_chain, breakdown);
        }
        DatasetKind::OpenInterest => {
            p.open_interest = item.total_24h;
            merge_chain_breakdown(&mut p.open_interest_by_chain, breakdown);
        }
        DatasetKind::Earnings => {
            p.earnings_24h = item.total_24h.or(p.earnings_24h);
            p.earnings_7d = item.total_7d.or(p.earnings_7d);
            p.earnings_30d = item.total_30d.or(p.earnings_30d);
            p.earnings_1y = item.total_1y.or(p.earnings_1y);
            p.earnings_change_1d = item.change_1d.or(p.earnings_change_1d);
            p.earnings_change_7d = item.change_7d.or(p.earnings_change_7d);
            p.earnings_change_1m = item.change_1m.or(p.earnings_change_1m);
            merge_chain_breakdown(&mut p.earnings_by_chain, breakdown);
        }
        DatasetKind::Aggregators => {
            p.aggregators_volume_24h = item.total_24h.or(p.aggregators_volume_24h);
            p.aggregators_volume_7d = item.total_7d.or(p.aggregators_volume_7d);
            p.aggregators_volume_30d = item.total_30d.or(p.aggregators_volume_30d);
            p.aggregators_volume_change_1d = item.change_1d.or(p.aggregators_volume_change_1d);
            p.aggregators_volume_change_7d = item.change_7d.or(p.aggregators_volume_change_7d);
            merge_chain_breakdown(&mut p.aggregators_volume_by_chain, breakdown);
        }
        DatasetKind::BridgeAggregators => {
            p.bridge_aggregators_volume_24h = item.total_24h.or(p.bridge_aggregators_volume_24h);
            p.bridge_aggregators_volume_7d = item.total_7d.or(p.bridge_aggregators_volume_7d);
            p.bridge_aggregators_volume_30d = item.total_30d.or(p.bridge_aggregators_volume_30d);
            p.bridge_aggregators_volume_change_1d =
                item.change_1d.or(p.bridge_aggregators_volume_change_1d);
            p.bridge_aggregators_volume_change_7d =
                item.change_7d.or(p.bridge_aggregators_volume_change_7d);
            merge_chain_breakdown(&mut p.bridge_aggregators_volume_by_chain, breakdown);
        }
        DatasetKind::Options => {
            p.options_volume_24h = item.total_24h.or(p.options_volume_24h);
            p.options_volume_7d = item.total_7d.or(p.options_volume_7d);
            p.options_volume_30d = item.total_30d.or(p.options_volume_30d);
            p.options_volume_change_1d = item.change_1d.or(p.options_volume_change_1d);
            p.options_volume_change_7d = item.change_7d.or(p.options_volume_change_7d);
            merge_chain_breakdown(&mut p.options_volume_by_chain, breakdown);
        }
    }
}

/// Builds the merged protocol list with datasets folded in the default order.
pub fn format_protocols_list(
    inputs: &MergeInputs,
    settings: &ExtraTvlSettings,
    no_sub_rows: bool,
) -> Vec<FormattedProtocol> {
    format_protocols_list_in_order(inputs, settings, no_sub_rows, &MERGE_ORDER)
}

/// Same as `format_protocols_list` with an explicit dataset fold order.
pub fn format_protocols_list_in_order(
    inputs: &MergeInputs,
    settings: &ExtraTvlSettings,
    no_sub_rows: bool,
    order: &[DatasetKind],
) -> Vec<FormattedProtocol> {
    let mut table = ProtocolTable::default();

    for protocol in &inputs.protocols {
        let key = protocol.name.to_lowercase();
        if key.is_empty() {
            continue;
        }
        table.insert(key, format_base(protocol, settings));
    }

    for kind in order {
        let Some(items) = inputs.dataset(*kind) else {
            continue;
        };
        for (position, item) in items.iter().enumerate() {
            if let Some(row) = table.entry_for(*kind, position, item) {
                assign_dataset(*kind, row, item);
            }
        }
    }

    let mut rows = table.into_rows();
    apply_dominance(&mut rows);

    debug!(
        component = "merge",
        event = "merge.formatted",
        protocol_count = rows.len(),
        dataset_count = inputs.loaded_dataset_count()
    );

    if inputs.parent_protocols.is_empty() {
        rows
    } else {
        group_protocols(rows, &inputs.parent_protocols, no_sub_rows)
    }
}

fn share_of(
    rows: &mut [FormattedProtocol],
    value: fn(&FormattedProtocol) -> Option<f64>,
    share: fn(&mut FormattedProtocol) -> &mut Option<f64>,
) {
    let total: f64 = rows.iter().filter_map(value).sum();
    if total <= 0.0 {
        return;
    }
    for row in rows.iter_mut() {
        if let Some(v) = value(row).filter(|v| *v != 0.0) {
            *share(row) = Some(v / total * 100.0);
        }
    }
}

/// Percent-of-total shares for spot, perps, aggregator, bridge aggregator and options volume.
pub fn apply_dominance(rows: &mut [FormattedProtocol]) {
    share_of(rows, |p| p.volume_24h, |p| &mut p.volume_dominance_24h);
    share_of(rows, |p| p.volume_7d, |p| &mut p.volume_market_share_7d);
    share_of(
        rows,
        |p| p.perps_volume_24h,
        |p| &mut p.perps_volume_dominance_24h,
    );
    share_of(
        rows,
        |p| p.aggregators_volume_24h,
        |p| &mut p.aggregators_volume_dominance_24h,
    );
    share_of(
        rows,
        |p| p.aggregators_volume_7d,
        |p| &mut p.aggregators_volume_market_share_7d,
    );
    share_of(
        rows,
        |p| p.bridge_aggregators_volume_24h,
        |p| &mut p.bridge_aggregators_volume_dominance_24h,
    );
    share_of(
        rows,
        |p| p.options_volume_24h,
        |p| &mut p.options_volume_dominance_24h,
    );
}

/// Replaces children of every parent with at least two members by one rolled-up row, then sorts
/// by TVL descending.
pub fn group_protocols(
    protocols: Vec<FormattedProtocol>,
    parents: &[ParentProtocol],
    no_sub_rows: bool,
) -> Vec<FormattedProtocol> {
    let mut data = protocols;

    for parent in parents {
        let members = data
            .iter()
            .filter(|p| p.parent_protocol.as_deref() == Some(parent.id.as_str()))
            .count();
        if members < 2 {
            continue;
        }
        let (children, rest): (Vec<_>, Vec<_>) = data
            .into_iter()
            .partition(|p| p.parent_protocol.as_deref() == Some(parent.id.as_str()));
        data = rest;
        data.push(group_data(children, parent, no_sub_rows));
    }

    data.sort_by(|a, b| compare_tvl_desc(a.tvl, b.tvl));
    data
}

fn compare_tvl_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    b.unwrap_or(0.0).total_cmp(&a.unwrap_or(0.0))
}

fn add_element(acc: &mut Option<f64>, value: Option<f64>) {
    if let Some(value) = value {
        *acc = Some(acc.unwrap_or(0.0) + value);
    }
}

fn group_data(
    children: Vec<FormattedProtocol>,
    parent: &ParentProtocol,
    no_sub_rows: bool,
) -> FormattedProtocol {
    let mut out = FormattedProtocol {
        name: parent.name.clone(),
        logo: parent.logo.clone(),
        url: parent.url.clone(),
        chains: parent.chains.clone(),
        defillama_id: Some(parent.id.clone()),
        is_parent_protocol: true,
        ..FormattedProtocol::default()
    };

    let mut categories: BTreeSet<String> = BTreeSet::new();
    let mut tvl = 0.0;
    let mut prev = [Some(0.0), Some(0.0), Some(0.0)];
    let mut mcap = 0.0;
    let mut volume_weighted = (0.0, 0.0);
    let mut perps_weighted = (0.0, 0.0);

    for child in &children {
        out.strike_tvl |= child.strike_tvl;
        if let Some(category) = child.category.as_ref() {
            categories.insert(category.clone());
        }
        if let Some(child_tvl) = child.tvl.filter(|v| *v != 0.0) {
            tvl += child_tvl;
        }

        let child_prev = [child.tvl_prev_day, child.tvl_prev_week, child.tvl_prev_month];
        for (slot, value) in prev.iter_mut().zip(child_prev) {
            if let Some(current) = *slot {
                *slot = value.map(|v| current + v);
            }
        }

        if let Some(excluded) = child.extra_tvl.get("excludeParent") {
            out.parent_excluded = true;
            tvl -= excluded.tvl.unwrap_or(0.0);
            let excluded_prev = [
                excluded.tvl_prev_day,
                excluded.tvl_prev_week,
                excluded.tvl_prev_month,
            ];
            for (slot, value) in prev.iter_mut().zip(excluded_prev) {
                if let (Some(current), Some(value)) = (slot.as_mut(), value) {
                    *current -= value;
                }
            }
        }

        add_element(&mut out.volume_24h, child.volume_24h);
        add_element(&mut out.volume_7d, child.volume_7d);
        add_element(&mut out.volume_30d, child.volume_30d);
        add_element(&mut out.cumulative_volume, child.cumulative_volume);
        add_element(&mut out.perps_volume_24h, child.perps_volume_24h);
        add_element(&mut out.perps_volume_7d, child.perps_volume_7d);
        add_element(&mut out.perps_volume_30d, child.perps_volume_30d);
        add_element(&mut out.open_interest, child.open_interest);
        add_element(&mut out.fees_24h, child.fees_24h);
        add_element(&mut out.fees_7d, child.fees_7d);
        add_element(&mut out.fees_30d, child.fees_30d);
        add_element(&mut out.fees_1y, child.fees_1y);
        add_element(&mut out.revenue_24h, child.revenue_24h);
        add_element(&mut out.revenue_7d, child.revenue_7d);
        add_element(&mut out.revenue_30d, child.revenue_30d);
        add_element(&mut out.revenue_1y, child.revenue_1y);
        add_element(&mut out.holder_revenue_24h, child.holder_revenue_24h);
        add_element(&mut out.holders_revenue_30d, child.holders_revenue_30d);
        add_element(&mut out.user_fees_24h, child.user_fees_24h);
        add_element(&mut out.cumulative_fees, child.cumulative_fees);
        add_element(&mut out.treasury_revenue_24h, child.treasury_revenue_24h);
        add_element(&mut out.supply_side_revenue_24h, child.supply_side_revenue_24h);

        if let Some(child_mcap) = child.mcap.filter(|v| *v != 0.0) {
            mcap += child_mcap;
        }

        if let (Some(weight), Some(change)) = (child.volume_7d.filter(|v| *v != 0.0), child.volume_change_7d) {
            volume_weighted.0 += change * weight;
            volume_weighted.1 += weight;
        }
        if let (Some(weight), Some(change)) = (
            child.perps_volume_7d.filter(|v| *v != 0.0),
            child.perps_volume_change_7d,
        ) {
            perps_weighted.0 += change * weight;
            perps_weighted.1 += weight;
        }
    }

    out.tvl = Some(tvl);
    out.tvl_prev_day = prev[0];
    out.tvl_prev_week = prev[1];
    out.tvl_prev_month = prev[2];
    out.change_1d = percent_change_opt(out.tvl, out.tvl_prev_day);
    out.change_7d = percent_change_opt(out.tvl, out.tvl_prev_week);
    out.change_1m = percent_change_opt(out.tvl, out.tvl_prev_month);

    if volume_weighted.1 > 0.0 {
        out.volume_change_7d = Some(volume_weighted.0 / volume_weighted.1);
    }
    if perps_weighted.1 > 0.0 {
        out.perps_volume_change_7d = Some(perps_weighted.0 / perps_weighted.1);
    }

    let final_mcap = if mcap > 0.0 {
        mcap
    } else {
        parent.mcap.unwrap_or(0.0)
    };
    out.mcap = (final_mcap > 0.0).then_some(final_mcap);
    out.pf = annualized_ratio(out.mcap, out.fees_30d);
    out.ps = annualized_ratio(out.mcap, out.revenue_30d);
    out.mcaptvl = (tvl > 0.0 && final_mcap > 0.0).then(|| round2(final_mcap / tvl));

    out.category = match categories.len() {
        1 => categories.into_iter().next(),
        _ => None,
    };

    let mut oracles: BTreeSet<String> = parent.oracles.iter().cloned().collect();
    let mut oracles_by_chain: BTreeMap<String, BTreeSet<String>> = parent
        .oracles_by_chain
        .iter()
        .map(|(chain, list)| (chain.clone(), list.iter().cloned().collect()))
        .collect();
    for child in &children {
        oracles.extend(child.oracles.iter().cloned());
        for (chain, list) in &child.oracles_by_chain {
            oracles_by_chain
                .entry(chain.clone())
                .or_default()
                .extend(list.iter().cloned());
        }
    }
    out.oracles = oracles.into_iter().collect();
    out.oracles_by_chain = oracles_by_chain
        .into_iter()
        .map(|(chain, set)| (chain, set.into_iter().collect()))
        .collect();

    if !no_sub_rows {
        out.sub_rows = children;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::ChainMetricSnapshot;

    fn base(name: &str, tvl: f64) -> ProtocolLite {
        ProtocolLite {
            name: name.to_string(),
            tvl: Some(tvl),
            tvl_prev_day: Some(tvl),
            ..ProtocolLite::default()
        }
    }

    fn dim(name: &str, total_24h: f64) -> DimensionProtocol {
        DimensionProtocol {
            name: name.to_string(),
            total_24h: Some(total_24h),
            ..DimensionProtocol::default()
        }
    }

    #[test]
    fn breakdown_keys_are_normalized() {
        let mut existing = ChainBreakdown::new();
        existing.insert(
            "ethereum".to_string(),
            ChainMetricSnapshot {
                chain: Some("Ethereum".to_string()),
                total_24h: Some(1.0),
                ..ChainMetricSnapshot::default()
            },
        );
        let mut incoming = ChainBreakdown::new();
        incoming.insert(
            "x".to_string(),
            ChainMetricSnapshot {
                chain: Some(" Ethereum ".to_string()),
                total_24h: Some(2.0),
                ..ChainMetricSnapshot::default()
            },
        );
        incoming.insert(
            "Base".to_string(),
            ChainMetricSnapshot {
                total_24h: Some(3.0),
                ..ChainMetricSnapshot::default()
            },
        );

        merge_chain_breakdown(&mut existing, Some(&incoming));
        assert_eq!(existing.len(), 2);
        assert_eq!(existing["ethereum"].total_24h, Some(2.0));
        assert_eq!(existing["base"].chain.as_deref(), Some("Base"));
    }

    #[test]
    fn dataset_only_protocols_get_synthetic_rows() {
        let mut fees_only = dim("newproto", 9.0);
        fees_only.display_name = Some("NewProto".to_string());
        let inputs = MergeInputs {
            protocols: vec![base("Aave", 100.0)],
            fees: Some(vec![fees_only]),
            ..MergeInputs::default()
        };
        let rows = format_protocols_list(&inputs, &ExtraTvlSettings::new(), false);
        let synthetic = rows.iter().find(|p| p.name == "NewProto").unwrap();
        assert_eq!(synthetic.fees_24h, Some(9.0));
        assert_eq!(synthetic.tvl, None);
    }

    #[test]
    fn enabled_extras_are_added_and_double_counting_strikes() {
        let mut protocol = base("Lido", 100.0);
        protocol.extra_tvl.insert(
            "staking".to_string(),
            ChainTvl {
                tvl: Some(50.0),
                ..ChainTvl::default()
            },
        );
        protocol.extra_tvl.insert(
            "doublecounted".to_string(),
            ChainTvl {
                tvl: Some(10.0),
                ..ChainTvl::default()
            },
        );

        let off = format_base(&protocol, &ExtraTvlSettings::new());
        assert_eq!(off.tvl, Some(100.0));
        assert!(off.strike_tvl);

        let on = format_base(
            &protocol,
            &ExtraTvlSettings::new()
                .with("staking", true)
                .with("doublecounted", true),
        );
        assert_eq!(on.tvl, Some(150.0));
        assert!(!on.strike_tvl);
    }

    #[test]
    fn removed_categories_strike_tvl() {
        let mut cex = base("Binance CEX", 1.0);
        cex.category = Some("CEX".to_string());
        assert!(format_base(&cex, &ExtraTvlSettings::new()).strike_tvl);
    }

    #[test]
    fn dominance_only_applies_to_nonzero_values() {
        let inputs = MergeInputs {
            volume: Some(vec![dim("A", 30.0), dim("B", 10.0), dim("C", 0.0)]),
            ..MergeInputs::default()
        };
        let rows = format_protocols_list(&inputs, &ExtraTvlSettings::new(), false);
        let share = |name: &str| rows.iter().find(|p| p.name == name).unwrap().volume_dominance_24h;
        assert_eq!(share("A"), Some(75.0));
        assert_eq!(share("B"), Some(25.0));
        assert_eq!(share("C"), None);
    }

    #[test]
    fn single_child_parents_are_not_grouped() {
        let mut child = base("Solo", 10.0);
        child.parent_protocol = Some("parent#solo".to_string());
        let inputs = MergeInputs {
            protocols: vec![child],
            parent_protocols: vec![ParentProtocol {
                id: "parent#solo".to_string(),
                name: "Solo Parent".to_string(),
                ..ParentProtocol::default()
            }],
            ..MergeInputs::default()
        };
        let rows = format_protocols_list(&inputs, &ExtraTvlSettings::new(), false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Solo");
    }

    #[test]
    fn parent_rollup_falls_back_to_parent_mcap_and_sorts_oracles() {
        let mut a = base("A v2", 100.0);
        a.parent_protocol = Some("p".to_string());
        a.category = Some("Dexs".to_string());
        a.oracles = vec!["Pyth".to_string()];
        let mut b = base("A v3", 300.0);
        b.parent_protocol = Some("p".to_string());
        b.category = Some("Dexs".to_string());
        b.oracles = vec!["Chainlink".to_string()];
        let mut fees = dim("A v2", 1.0);
        fees.total_30d = Some(50.0);
        let mut fees_b = dim("A v3", 1.0);
        fees_b.total_30d = Some(50.0);

        let inputs = MergeInputs {
            protocols: vec![a, b, base("Other", 200.0)],
            parent_protocols: vec![ParentProtocol {
                id: "p".to_string(),
                name: "A".to_string(),
                mcap: Some(1_200.0),
                ..ParentProtocol::default()
            }],
            fees: Some(vec![fees, fees_b]),
            ..MergeInputs::default()
        };
        let rows = format_protocols_list(&inputs, &ExtraTvlSettings::new(), false);
        assert_eq!(rows.len(), 2);
        let parent = &rows[0];
        assert_eq!(parent.name, "A");
        assert!(parent.is_parent_protocol);
        assert_eq!(parent.tvl, Some(400.0));
        assert_eq!(parent.mcap, Some(1_200.0));
        assert_eq!(parent.pf, Some(1.0));
        assert_eq!(parent.mcaptvl, Some(3.0));
        assert_eq!(parent.category.as_deref(), Some("Dexs"));
        assert_eq!(parent.oracles, vec!["Chainlink".to_string(), "Pyth".to_string()]);
        assert_eq!(parent.sub_rows.len(), 2);
        assert_eq!(parent.fees_24h, Some(2.0));
        assert_eq!(rows[1].name, "Other");
    }
}
