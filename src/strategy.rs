//! Row strategies: turn merged protocols or chain overviews into flat `NormalizedRow`s.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chains::{chain_key, display_chain_for_key, normalize_chain_name, normalize_id, split_chain_tvl_key};
use crate::datasets::{ChainBreakdown, ChainMetricSnapshot, ParentProtocol, ALL_CHAINS};
use crate::grouping::RowHeader;
use crate::merge::{ExtraTvlSettings, FormattedProtocol};
use crate::metrics::{compute_share, percent_change_opt, NumericMetrics};

pub const ALL_CHAINS_LABEL: &str = "All Chains";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    #[default]
    Protocols,
    Chains,
}

impl StrategyType {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyType::Protocols => "protocols",
            StrategyType::Chains => "chains",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub protocol_id: Option<String>,
    pub logo: Option<String>,
    pub category: Option<String>,
    pub chain: Option<String>,
    pub chains: Vec<String>,
    pub oracles: Vec<String>,
    pub parent_protocol_id: Option<String>,
    pub parent_protocol_name: Option<String>,
    pub parent_protocol_logo: Option<String>,
    pub strategy_type: StrategyType,
    pub metrics: NumericMetrics,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolsStrategyParams {
    pub chains: Vec<String>,
    pub extra_tvl: ExtraTvlSettings,
}

/// Lazily fetched per-chain metrics: chain key -> lowercased protocol name -> metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityChainData {
    chains: BTreeMap<String, (String, HashMap<String, NumericMetrics>)>,
}

impl PriorityChainData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain: &str, protocol: &str, metrics: NumericMetrics) {
        let (_, protocols) = self
            .chains
            .entry(chain_key(chain))
            .or_insert_with(|| (normalize_chain_name(chain.trim()), HashMap::new()));
        protocols.insert(protocol.to_lowercase(), metrics);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn entries_for<'a>(&'a self, protocol: &'a str) -> impl Iterator<Item = (&'a str, &'a NumericMetrics)> + 'a {
        let key = protocol.to_lowercase();
        self.chains.values().filter_map(move |(label, protocols)| {
            protocols.get(&key).map(|metrics| (label.as_str(), metrics))
        })
    }
}

/// Tracks which `(chain, metric)` cells are waiting on a fallback fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainLoadingState {
    pending: BTreeMap<String, BTreeSet<String>>,
}

impl ChainLoadingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_pending<'a>(&mut self, chain: &str, metrics: impl IntoIterator<Item = &'a str>) {
        let entry = self.pending.entry(chain_key(chain)).or_default();
        entry.extend(metrics.into_iter().map(str::to_string));
    }

    pub fn mark_loaded(&mut self, chain: &str, metric: &str) {
        let key = chain_key(chain);
        if let Some(metrics) = self.pending.get_mut(&key) {
            metrics.remove(metric);
            if metrics.is_empty() {
                self.pending.remove(&key);
            }
        }
    }

    pub fn mark_chain_loaded(&mut self, chain: &str) {
        self.pending.remove(&chain_key(chain));
    }

    pub fn is_loading(&self, chain: &str, metric: &str) -> bool {
        self.pending
            .get(&chain_key(chain))
            .is_some_and(|metrics| metrics.contains(metric))
    }

    pub fn pending_for_chain(&self, chain: &str) -> Vec<String> {
        self.pending
            .get(&chain_key(chain))
            .map(|metrics| metrics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Maps every merged protocol field onto its column id.
pub fn protocol_metrics(p: &FormattedProtocol) -> NumericMetrics {
    NumericMetrics {
        tvl: p.tvl,
        tvl_prev_day: p.tvl_prev_day,
        tvl_prev_week: p.tvl_prev_week,
        tvl_prev_month: p.tvl_prev_month,
        change_1d: p.change_1d,
        change_7d: p.change_7d,
        change_1m: p.change_1m,
        volume_24h: p.volume_24h,
        volume_7d: p.volume_7d,
        volume_30d: p.volume_30d,
        cumulative_volume: p.cumulative_volume,
        volume_change_1d: p.volume_change_1d,
        volume_change_7d: p.volume_change_7d,
        volume_change_1m: p.volume_change_1m,
        volume_dominance_24h: p.volume_dominance_24h,
        volume_market_share_7d: p.volume_market_share_7d,
        fees_24h: p.fees_24h,
        fees_7d: p.fees_7d,
        fees_30d: p.fees_30d,
        fees_1y: p.fees_1y,
        average_1y: p.average_1y,
        cumulative_fees: p.cumulative_fees,
        user_fees_24h: p.user_fees_24h,
        holder_revenue_24h: p.holder_revenue_24h,
        holder_revenue_7d: p.holder_revenue_7d,
        holders_revenue_30d: p.holders_revenue_30d,
        treasury_revenue_24h: p.treasury_revenue_24h,
        supply_side_revenue_24h: p.supply_side_revenue_24h,
        fees_change_1d: p.fees_change_1d,
        fees_change_7d: p.fees_change_7d,
        fees_change_1m: p.fees_change_1m,
        revenue_24h: p.revenue_24h,
        revenue_7d: p.revenue_7d,
        revenue_30d: p.revenue_30d,
        revenue_1y: p.revenue_1y,
        average_revenue_1y: p.average_revenue_1y,
        revenue_change_1d: p.revenue_change_1d,
        revenue_change_7d: p.revenue_change_7d,
        revenue_change_1m: p.revenue_change_1m,
        perps_volume_24h: p.perps_volume_24h,
        perps_volume_7d: p.perps_volume_7d,
        perps_volume_30d: p.perps_volume_30d,
        perps_volume_change_1d: p.perps_volume_change_1d,
        perps_volume_change_7d: p.perps_volume_change_7d,
        perps_volume_change_1m: p.perps_volume_change_1m,
        perps_volume_dominance_24h: p.perps_volume_dominance_24h,
        open_interest: p.open_interest,
        aggregators_volume_24h: p.aggregators_volume_24h,
        aggregators_volume_7d: p.aggregators_volume_7d,
        aggregators_volume_30d: p.aggregators_volume_30d,
        aggregators_volume_change_1d: p.aggregators_volume_change_1d,
        aggregators_volume_change_7d: p.aggregators_volume_change_7d,
        aggregators_volume_dominance_24h: p.aggregators_volume_dominance_24h,
        aggregators_volume_market_share_7d: p.aggregators_volume_market_share_7d,
        bridge_aggregators_volume_24h: p.bridge_aggregators_volume_24h,
        bridge_aggregators_volume_7d: p.bridge_aggregators_volume_7d,
        bridge_aggregators_volume_30d: p.bridge_aggregators_volume_30d,
        bridge_aggregators_volume_change_1d: p.bridge_aggregators_volume_change_1d,
        bridge_aggregators_volume_change_7d: p.bridge_aggregators_volume_change_7d,
        bridge_aggregators_volume_dominance_24h: p.bridge_aggregators_volume_dominance_24h,
        options_volume_24h: p.options_volume_24h,
        options_volume_7d: p.options_volume_7d,
        options_volume_30d: p.options_volume_30d,
        options_volume_change_1d: p.options_volume_change_1d,
        options_volume_change_7d: p.options_volume_change_7d,
        options_volume_dominance_24h: p.options_volume_dominance_24h,
        mcap: p.mcap,
        mcaptvl: p.mcaptvl,
        pf: p.pf,
        ps: p.ps,
        protocol_count: Some(1.0),
        ..NumericMetrics::default()
    }
}

/// One display chain of an exploded protocol and the raw keys that collapse onto it.
#[derive(Debug, Default)]
struct ChainSlot {
    label: String,
    aliases: BTreeSet<String>,
    tvl: Option<f64>,
    tvl_prev_day: Option<f64>,
    tvl_prev_week: Option<f64>,
    tvl_prev_month: Option<f64>,
}

impl ChainSlot {
    fn lookup<'a>(&self, breakdown: &'a ChainBreakdown) -> Option<&'a ChainMetricSnapshot> {
        self.aliases.iter().find_map(|alias| breakdown.get(alias))
    }
}

fn add_opt(target: &mut Option<f64>, value: Option<f64>) {
    if let Some(value) = value {
        *target = Some(target.unwrap_or(0.0) + value);
    }
}

fn chain_slots(protocol: &FormattedProtocol, extra_tvl: &ExtraTvlSettings) -> Vec<ChainSlot> {
    let mut slots: Vec<ChainSlot> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut slot_for = |label: String, alias: String, slots: &mut Vec<ChainSlot>| -> usize {
        let key = chain_key(&label);
        let position = *index.entry(key.clone()).or_insert_with(|| {
            slots.push(ChainSlot {
                label,
                ..ChainSlot::default()
            });
            slots.len() - 1
        });
        slots[position].aliases.insert(key);
        slots[position].aliases.insert(alias);
        position
    };

    for (raw, values) in &protocol.chain_tvls {
        let Some(label) = display_chain_for_key(raw) else {
            continue;
        };
        let (chain, suffix) = split_chain_tvl_key(raw);
        let position = slot_for(label, chain_key(chain), &mut slots);
        let slot = &mut slots[position];
        let counts = match suffix {
            None => true,
            Some(suffix) => {
                suffix != "doublecounted" && suffix != "liquidstaking" && extra_tvl.is_enabled(suffix)
            }
        };
        if counts && values.tvl.is_some() {
            add_opt(&mut slot.tvl, values.tvl);
            add_opt(&mut slot.tvl_prev_day, values.tvl_prev_day);
            add_opt(&mut slot.tvl_prev_week, values.tvl_prev_week);
            add_opt(&mut slot.tvl_prev_month, values.tvl_prev_month);
        }
    }

    for breakdown in protocol.breakdowns() {
        for (key, snapshot) in breakdown {
            let raw = snapshot.chain.as_deref().unwrap_or(key.as_str());
            let Some(label) = display_chain_for_key(raw.trim()) else {
                continue;
            };
            slot_for(label, key.clone(), &mut slots);
        }
    }

    slots
}

fn chain_row_metrics(protocol: &FormattedProtocol, slot: &ChainSlot) -> NumericMetrics {
    let volume = slot.lookup(&protocol.volume_by_chain);
    let fees = slot.lookup(&protocol.fees_by_chain);
    let revenue = slot.lookup(&protocol.revenue_by_chain).or(fees);
    let perps = slot.lookup(&protocol.perps_volume_by_chain);
    let open_interest = slot.lookup(&protocol.open_interest_by_chain);
    let aggregators = slot.lookup(&protocol.aggregators_volume_by_chain);
    let bridge = slot.lookup(&protocol.bridge_aggregators_volume_by_chain);
    let options = slot.lookup(&protocol.options_volume_by_chain);

    NumericMetrics {
        tvl: slot.tvl,
        tvl_prev_day: slot.tvl_prev_day,
        tvl_prev_week: slot.tvl_prev_week,
        tvl_prev_month: slot.tvl_prev_month,
        change_1d: percent_change_opt(slot.tvl, slot.tvl_prev_day),
        change_7d: percent_change_opt(slot.tvl, slot.tvl_prev_week),
        change_1m: percent_change_opt(slot.tvl, slot.tvl_prev_month),
        volume_24h: volume.and_then(|s| s.total_24h),
        volume_7d: volume.and_then(|s| s.total_7d),
        volume_30d: volume.and_then(|s| s.total_30d),
        volume_change_1d: volume.and_then(|s| s.change_1d),
        volume_change_7d: volume.and_then(|s| s.change_7d),
        volume_change_1m: volume.and_then(|s| s.change_1m),
        fees_24h: fees.and_then(|s| s.total_24h),
        fees_7d: fees.and_then(|s| s.total_7d),
        fees_30d: fees.and_then(|s| s.total_30d),
        revenue_24h: revenue.and_then(|s| s.revenue_24h),
        revenue_7d: revenue.and_then(|s| s.revenue_7d),
        revenue_30d: revenue.and_then(|s| s.revenue_30d),
        perps_volume_24h: perps.and_then(|s| s.total_24h),
        perps_volume_7d: perps.and_then(|s| s.total_7d),
        perps_volume_30d: perps.and_then(|s| s.total_30d),
        open_interest: open_interest.and_then(|s| s.total_24h),
        aggregators_volume_24h: aggregators.and_then(|s| s.total_24h),
        aggregators_volume_7d: aggregators.and_then(|s| s.total_7d),
        bridge_aggregators_volume_24h: bridge.and_then(|s| s.total_24h),
        options_volume_24h: options.and_then(|s| s.total_24h),
        mcap: protocol.mcap,
        protocol_count: Some(1.0),
        ..NumericMetrics::default()
    }
}

/// Lowercased chain filter with `All` removed; `None` when no filter is active.
fn chain_filter(chains: &[String]) -> Option<HashSet<String>> {
    let filter: HashSet<String> = chains
        .iter()
        .map(|chain| chain.trim())
        .filter(|chain| !chain.eq_ignore_ascii_case(ALL_CHAINS))
        .flat_map(|chain| [chain_key(chain), chain_key(&normalize_chain_name(chain))])
        .filter(|chain| !chain.is_empty())
        .collect();
    (!filter.is_empty()).then_some(filter)
}

#[derive(Debug, Clone)]
struct ParentInfo {
    id: String,
    name: Option<String>,
    logo: Option<String>,
}

fn protocol_key(protocol: &FormattedProtocol) -> String {
    protocol
        .defillama_id
        .clone()
        .or_else(|| protocol.slug.clone())
        .unwrap_or_else(|| normalize_id(&protocol.name))
}

struct RowEmitter<'a> {
    params: &'a ProtocolsStrategyParams,
    explode: bool,
    filter: Option<HashSet<String>>,
    priority: Option<&'a PriorityChainData>,
    parent_lookup: HashMap<&'a str, &'a ParentProtocol>,
    rows: Vec<NormalizedRow>,
    processed: HashSet<String>,
}

impl<'a> RowEmitter<'a> {
    fn includes(&self, slot_aliases: &BTreeSet<String>) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => slot_aliases.iter().any(|alias| filter.contains(alias)),
        }
    }

    fn base_row(&self, protocol: &FormattedProtocol, slug: &str, parent: Option<&ParentInfo>) -> NormalizedRow {
        let parent_id = parent
            .map(|info| info.id.clone())
            .or_else(|| protocol.parent_protocol.clone());
        let lookup = parent_id
            .as_deref()
            .and_then(|id| self.parent_lookup.get(id).copied());
        NormalizedRow {
            name: protocol.name.clone(),
            display_name: Some(protocol.name.clone()),
            protocol_id: Some(slug.to_string()),
            logo: protocol.logo.clone(),
            category: protocol.category.clone(),
            chains: protocol.chains.clone(),
            oracles: protocol.oracles.clone(),
            parent_protocol_name: parent
                .and_then(|info| info.name.clone())
                .or_else(|| lookup.map(|p| p.name.clone())),
            parent_protocol_logo: parent
                .and_then(|info| info.logo.clone())
                .or_else(|| lookup.and_then(|p| p.logo.clone())),
            parent_protocol_id: parent_id,
            strategy_type: StrategyType::Protocols,
            ..NormalizedRow::default()
        }
    }

    fn emit(&mut self, protocol: &FormattedProtocol, parent: Option<&ParentInfo>) {
        let slug = protocol_key(protocol);
        let base = self.base_row(protocol, &slug, parent);

        if self.explode {
            let slots = chain_slots(protocol, &self.params.extra_tvl);
            let mut covered: HashSet<String> = HashSet::new();
            for slot in &slots {
                if !self.includes(&slot.aliases) {
                    continue;
                }
                covered.extend(slot.aliases.iter().cloned());
                self.rows.push(NormalizedRow {
                    id: format!("protocol-{slug}-{}", normalize_id(&slot.label)),
                    chain: Some(slot.label.clone()),
                    metrics: chain_row_metrics(protocol, slot),
                    ..base.clone()
                });
            }

            if let Some(priority) = self.priority {
                for (label, metrics) in priority.entries_for(&protocol.name) {
                    let key = chain_key(label);
                    if covered.contains(&key) {
                        continue;
                    }
                    let aliases: BTreeSet<String> = [key.clone()].into_iter().collect();
                    if !self.includes(&aliases) {
                        continue;
                    }
                    covered.insert(key);
                    let mut metrics = metrics.clone();
                    metrics.protocol_count = Some(1.0);
                    self.rows.push(NormalizedRow {
                        id: format!("protocol-{slug}-{}", normalize_id(label)),
                        chain: Some(label.to_string()),
                        metrics,
                        ..base.clone()
                    });
                }
            }

            if !covered.is_empty() {
                self.processed.insert(slug);
                return;
            }
            if self.filter.is_some() {
                return;
            }
        }

        let (id, chain) = if self.explode {
            (format!("protocol-{slug}-aggregate"), Some(ALL_CHAINS_LABEL.to_string()))
        } else {
            (format!("protocol-{slug}"), None)
        };
        self.rows.push(NormalizedRow {
            id,
            chain,
            metrics: protocol_metrics(protocol),
            ..base
        });
        self.processed.insert(slug);
    }
}

/// Normalized protocol rows; exploded into one row per chain when `chain` is a row header.
pub fn build_protocol_rows(
    formatted: &[FormattedProtocol],
    parents: &[ParentProtocol],
    params: &ProtocolsStrategyParams,
    row_headers: &[RowHeader],
    priority: Option<&PriorityChainData>,
) -> Vec<NormalizedRow> {
    let mut emitter = RowEmitter {
        params,
        explode: row_headers.contains(&RowHeader::Chain),
        filter: chain_filter(&params.chains),
        priority,
        parent_lookup: parents.iter().map(|p| (p.id.as_str(), p)).collect(),
        rows: Vec::new(),
        processed: HashSet::new(),
    };

    for protocol in formatted {
        if protocol.is_parent_protocol && !protocol.sub_rows.is_empty() {
            let info = ParentInfo {
                id: protocol_key(protocol),
                name: Some(protocol.name.clone()),
                logo: protocol.logo.clone(),
            };
            for child in &protocol.sub_rows {
                let child_key = protocol_key(child);
                if emitter.processed.contains(&child_key) {
                    continue;
                }
                emitter.emit(child, Some(&info));
                emitter.processed.insert(child_key);
            }
            continue;
        }

        if emitter.processed.contains(&protocol_key(protocol)) {
            continue;
        }
        let info = protocol.parent_protocol.as_ref().map(|id| {
            let parent = emitter.parent_lookup.get(id.as_str());
            ParentInfo {
                id: id.clone(),
                name: parent.map(|p| p.name.clone()),
                logo: parent.and_then(|p| p.logo.clone()),
            }
        });
        emitter.emit(protocol, info.as_ref());
    }

    debug!(
        component = "strategy",
        event = "strategy.protocols.rows",
        protocol_count = formatted.len(),
        row_count = emitter.rows.len(),
        explode = emitter.explode,
        chain_filter = emitter.filter.is_some()
    );
    emitter.rows
}

/// Requested chains that no exploded row covers yet, candidates for a priority fetch.
pub fn uncovered_chains(rows: &[NormalizedRow], requested: &[String]) -> Vec<String> {
    let covered: HashSet<String> = rows
        .iter()
        .filter_map(|row| row.chain.as_deref())
        .flat_map(|chain| [chain_key(chain), chain_key(&normalize_chain_name(chain))])
        .collect();
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|chain| !chain.eq_ignore_ascii_case(ALL_CHAINS))
        .filter(|chain| {
            !covered.contains(&chain_key(chain))
                && !covered.contains(&chain_key(&normalize_chain_name(chain)))
        })
        .filter(|chain| seen.insert(chain_key(chain)))
        .cloned()
        .collect()
}

/// One chain of the chains overview dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOverview {
    pub name: String,
    pub logo: Option<String>,
    pub category: Option<String>,
    #[serde(flatten)]
    pub metrics: NumericMetrics,
}

/// Chain rows with TVL, stablecoin and volume shares computed over the supplied set.
pub fn build_chain_rows(chains: &[ChainOverview]) -> Vec<NormalizedRow> {
    let total = |value: fn(&NumericMetrics) -> Option<f64>| -> Option<f64> {
        let mut sum = None;
        for chain in chains {
            add_opt(&mut sum, value(&chain.metrics));
        }
        sum
    };
    let tvl_total = total(|m| m.tvl);
    let stables_total = total(|m| m.stables_mcap);
    let volume_total = total(|m| m.volume_24h);

    chains
        .iter()
        .filter(|chain| !chain.name.trim().is_empty())
        .map(|chain| {
            let mut metrics = chain.metrics.clone();
            metrics.tvl_share = compute_share(metrics.tvl, tvl_total);
            metrics.stables_share = compute_share(metrics.stables_mcap, stables_total);
            metrics.volume_24h_share = compute_share(metrics.volume_24h, volume_total);
            if metrics.change_1d.is_none() {
                metrics.change_1d = percent_change_opt(metrics.tvl, metrics.tvl_prev_day);
            }
            if metrics.change_7d.is_none() {
                metrics.change_7d = percent_change_opt(metrics.tvl, metrics.tvl_prev_week);
            }
            if metrics.change_1m.is_none() {
                metrics.change_1m = percent_change_opt(metrics.tvl, metrics.tvl_prev_month);
            }
            let name = normalize_chain_name(chain.name.trim());
            NormalizedRow {
                id: format!("chain-{}", normalize_id(&name)),
                display_name: Some(name.clone()),
                chain: Some(name.clone()),
                chains: vec![name.clone()],
                logo: chain.logo.clone(),
                category: chain.category.clone(),
                name,
                strategy_type: StrategyType::Chains,
                metrics,
                ..NormalizedRow::default()
            }
        })
        .collect()
}
