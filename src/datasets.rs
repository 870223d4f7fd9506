//! Upstream dataset shapes and the multi-chain aggregator.
//!
//! Each dimension dataset (volume, fees, perps, open interest) is fetched once per selected chain.
//! `aggregate_multi_chain` folds those per-chain payloads into one entry per protocol before the
//! cross-dataset merge sees them, so a protocol listed on two chains is summed exactly once here.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use crate::chains::{chain_key, normalize_chain_name, split_chain_tvl_key};
use crate::metrics::{annualized_ratio, WeightedAccumulator};

pub const ALL_CHAINS: &str = "All";

/// Categories dropped from the base protocol list.
pub const BRIDGE_CATEGORIES: [&str; 2] = ["Bridge", "Canonical Bridge"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainTvl {
    pub tvl: Option<f64>,
    #[serde(rename = "tvlPrevDay")]
    pub tvl_prev_day: Option<f64>,
    #[serde(rename = "tvlPrevWeek")]
    pub tvl_prev_week: Option<f64>,
    #[serde(rename = "tvlPrevMonth")]
    pub tvl_prev_month: Option<f64>,
}

/// Entry of the base protocol list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolLite {
    pub name: String,
    #[serde(rename = "defillamaId", deserialize_with = "de_opt_id")]
    pub defillama_id: Option<String>,
    pub slug: Option<String>,
    pub logo: Option<String>,
    pub url: Option<String>,
    pub symbol: Option<String>,
    pub category: Option<String>,
    pub chains: Vec<String>,
    #[serde(rename = "parentProtocol", deserialize_with = "de_opt_id")]
    pub parent_protocol: Option<String>,
    pub tvl: Option<f64>,
    #[serde(rename = "tvlPrevDay")]
    pub tvl_prev_day: Option<f64>,
    #[serde(rename = "tvlPrevWeek")]
    pub tvl_prev_week: Option<f64>,
    #[serde(rename = "tvlPrevMonth")]
    pub tvl_prev_month: Option<f64>,
    pub mcap: Option<f64>,
    #[serde(rename = "chainTvls")]
    pub chain_tvls: BTreeMap<String, ChainTvl>,
    #[serde(rename = "extraTvl")]
    pub extra_tvl: BTreeMap<String, ChainTvl>,
    pub oracles: Vec<String>,
    #[serde(rename = "oraclesByChain")]
    pub oracles_by_chain: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentProtocol {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub url: Option<String>,
    pub chains: Vec<String>,
    pub mcap: Option<f64>,
    pub oracles: Vec<String>,
    #[serde(rename = "oraclesByChain")]
    pub oracles_by_chain: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolsResponse {
    pub protocols: Vec<ProtocolLite>,
    #[serde(rename = "parentProtocols")]
    pub parent_protocols: Vec<ParentProtocol>,
}

/// One chain's slice of a dimension entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainMetricSnapshot {
    pub chain: Option<String>,
    #[serde(rename = "total24h")]
    pub total_24h: Option<f64>,
    #[serde(rename = "total7d")]
    pub total_7d: Option<f64>,
    #[serde(rename = "total30d")]
    pub total_30d: Option<f64>,
    #[serde(rename = "total1y")]
    pub total_1y: Option<f64>,
    #[serde(rename = "totalAllTime")]
    pub total_all_time: Option<f64>,
    #[serde(rename = "revenue24h")]
    pub revenue_24h: Option<f64>,
    #[serde(rename = "revenue7d")]
    pub revenue_7d: Option<f64>,
    #[serde(rename = "revenue30d")]
    pub revenue_30d: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_7d: Option<f64>,
    pub change_1m: Option<f64>,
}

pub type ChainBreakdown = BTreeMap<String, ChainMetricSnapshot>;

/// Entry of a dimension overview or dataset endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionProtocol {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "defillamaId", deserialize_with = "de_opt_id")]
    pub defillama_id: Option<String>,
    pub logo: Option<String>,
    pub category: Option<String>,
    pub chains: Vec<String>,
    #[serde(rename = "total24h")]
    pub total_24h: Option<f64>,
    #[serde(rename = "total7d")]
    pub total_7d: Option<f64>,
    #[serde(rename = "total30d")]
    pub total_30d: Option<f64>,
    #[serde(rename = "total1y")]
    pub total_1y: Option<f64>,
    #[serde(rename = "totalAllTime")]
    pub total_all_time: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_7d: Option<f64>,
    pub change_1m: Option<f64>,
    pub change_7dover7d: Option<f64>,
    #[serde(rename = "revenue24h")]
    pub revenue_24h: Option<f64>,
    #[serde(rename = "revenue7d")]
    pub revenue_7d: Option<f64>,
    #[serde(rename = "revenue30d")]
    pub revenue_30d: Option<f64>,
    #[serde(rename = "revenue1y")]
    pub revenue_1y: Option<f64>,
    #[serde(rename = "holdersRevenue24h")]
    pub holders_revenue_24h: Option<f64>,
    #[serde(rename = "holdersRevenue7d")]
    pub holders_revenue_7d: Option<f64>,
    #[serde(rename = "holdersRevenue30d")]
    pub holders_revenue_30d: Option<f64>,
    #[serde(rename = "feesChange_1d")]
    pub fees_change_1d: Option<f64>,
    #[serde(rename = "feesChange_7d")]
    pub fees_change_7d: Option<f64>,
    #[serde(rename = "feesChange_1m")]
    pub fees_change_1m: Option<f64>,
    #[serde(rename = "revenueChange_1d")]
    pub revenue_change_1d: Option<f64>,
    #[serde(rename = "revenueChange_7d")]
    pub revenue_change_7d: Option<f64>,
    #[serde(rename = "revenueChange_1m")]
    pub revenue_change_1m: Option<f64>,
    #[serde(rename = "monthlyAverage1y")]
    pub monthly_average_1y: Option<f64>,
    #[serde(rename = "averageRevenue1y")]
    pub average_revenue_1y: Option<f64>,
    #[serde(rename = "dailyProtocolRevenue")]
    pub daily_protocol_revenue: Option<f64>,
    #[serde(rename = "dailySupplySideRevenue")]
    pub daily_supply_side_revenue: Option<f64>,
    #[serde(rename = "dailyUserFees")]
    pub daily_user_fees: Option<f64>,
    pub mcap: Option<f64>,
    pub pf: Option<f64>,
    pub ps: Option<f64>,
    #[serde(rename = "chainBreakdown")]
    pub chain_breakdown: Option<ChainBreakdown>,
}

impl DimensionProtocol {
    fn snapshot_for_chain(&self, chain: &str) -> ChainMetricSnapshot {
        ChainMetricSnapshot {
            chain: Some(chain.to_string()),
            total_24h: self.total_24h,
            total_7d: self.total_7d,
            total_30d: self.total_30d,
            total_1y: self.total_1y,
            total_all_time: self.total_all_time,
            revenue_24h: self.revenue_24h,
            revenue_7d: self.revenue_7d,
            revenue_30d: self.revenue_30d,
            change_1d: self.change_1d,
            change_7d: self.change_7d.or(self.change_7dover7d),
            change_1m: self.change_1m,
        }
    }
}

/// One chain's response for a dimension dataset; `None` when the request failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPayload {
    pub chain: String,
    pub protocols: Option<Vec<DimensionProtocol>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetKind {
    Volume,
    Fees,
    Perps,
    OpenInterest,
    Earnings,
    Aggregators,
    BridgeAggregators,
    Options,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 8] = [
        DatasetKind::Volume,
        DatasetKind::Fees,
        DatasetKind::Perps,
        DatasetKind::OpenInterest,
        DatasetKind::Earnings,
        DatasetKind::Aggregators,
        DatasetKind::BridgeAggregators,
        DatasetKind::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Volume => "volume",
            DatasetKind::Fees => "fees",
            DatasetKind::Perps => "perps",
            DatasetKind::OpenInterest => "open-interest",
            DatasetKind::Earnings => "earnings",
            DatasetKind::Aggregators => "aggregators",
            DatasetKind::BridgeAggregators => "bridge-aggregators",
            DatasetKind::Options => "options",
        }
    }

    /// Fetched once per chain and folded by `aggregate_multi_chain`.
    pub fn is_per_chain(self) -> bool {
        matches!(
            self,
            DatasetKind::Volume | DatasetKind::Fees | DatasetKind::Perps | DatasetKind::OpenInterest
        )
    }

    /// Overview path segment for per-chain datasets.
    pub fn overview_path(self) -> Option<&'static str> {
        match self {
            DatasetKind::Volume => Some("dexs"),
            DatasetKind::Fees => Some("fees"),
            DatasetKind::Perps => Some("derivatives"),
            DatasetKind::OpenInterest => Some("open-interest"),
            _ => None,
        }
    }
}

pub fn is_all_chains(chains: &[String]) -> bool {
    chains.is_empty() || chains.iter().any(|chain| chain == ALL_CHAINS)
}

/// Chains actually requested: `["All"]` when no specific chain is selected.
pub fn chains_to_fetch(chains: &[String]) -> Vec<String> {
    if is_all_chains(chains) {
        vec![ALL_CHAINS.to_string()]
    } else {
        chains.to_vec()
    }
}

#[derive(Debug, Default)]
struct FoldedEntry {
    entry: DimensionProtocol,
    weights: BTreeMap<&'static str, WeightedAccumulator>,
}

impl FoldedEntry {
    fn weigh(&mut self, key: &'static str, weight: Option<f64>, change: Option<f64>) {
        self.weights.entry(key).or_default().add(weight, change);
    }

    fn finalize(mut self, compute_ratios: bool) -> DimensionProtocol {
        for (key, acc) in &self.weights {
            if acc.denominator > 0.0 {
                set_change(&mut self.entry, key, acc.value());
            }
        }
        if compute_ratios {
            if let Some(pf) = annualized_ratio(self.entry.mcap, self.entry.total_30d) {
                self.entry.pf = Some(pf);
            }
            if let Some(ps) = annualized_ratio(self.entry.mcap, self.entry.revenue_30d) {
                self.entry.ps = Some(ps);
            }
        }
        self.entry
    }
}

fn set_change(entry: &mut DimensionProtocol, key: &str, value: Option<f64>) {
    let slot = match key {
        "change_1d" => &mut entry.change_1d,
        "change_7d" => &mut entry.change_7d,
        "change_1m" => &mut entry.change_1m,
        "feesChange_1d" => &mut entry.fees_change_1d,
        "feesChange_7d" => &mut entry.fees_change_7d,
        "feesChange_1m" => &mut entry.fees_change_1m,
        "revenueChange_1d" => &mut entry.revenue_change_1d,
        "revenueChange_7d" => &mut entry.revenue_change_7d,
        "revenueChange_1m" => &mut entry.revenue_change_1m,
        _ => return,
    };
    *slot = value;
}

fn add_opt(current: Option<f64>, incoming: Option<f64>) -> Option<f64> {
    match (current, incoming) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

/// Folds per-chain payloads of one dataset into one entry per protocol.
///
/// Protocols are matched by lowercased name; the first spelling seen wins. Failed chains
/// (`protocols: None`) contribute nothing.
pub fn aggregate_multi_chain(
    kind: DatasetKind,
    chains: &[String],
    payloads: &[ChainPayload],
) -> Vec<DimensionProtocol> {
    if is_all_chains(chains) {
        return payloads
            .iter()
            .find(|payload| payload.chain == ALL_CHAINS)
            .or_else(|| payloads.first())
            .and_then(|payload| payload.protocols.clone())
            .unwrap_or_default();
    }

    let mut order: Vec<FoldedEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for payload in payloads {
        let Some(protocols) = payload.protocols.as_ref() else {
            continue;
        };
        let chain_name = payload.chain.as_str();
        let breakdown_key = chain_key(chain_name);

        for protocol in protocols {
            let key = protocol.name.to_lowercase();
            let snapshot = protocol.snapshot_for_chain(chain_name);

            let folded = match index.get(&key).copied() {
                Some(position) => {
                    let folded = &mut order[position];
                    fold_totals(kind, &mut folded.entry, protocol);
                    folded
                }
                None => {
                    let mut entry = protocol.clone();
                    entry.chains = Vec::new();
                    entry.chain_breakdown = None;
                    if matches!(kind, DatasetKind::Volume | DatasetKind::Perps) {
                        entry.change_7d = protocol.change_7d.or(protocol.change_7dover7d);
                    }
                    index.insert(key, order.len());
                    order.push(FoldedEntry {
                        entry,
                        weights: BTreeMap::new(),
                    });
                    let last = order.len() - 1;
                    &mut order[last]
                }
            };

            weigh_changes(kind, folded, protocol);

            if !chain_name.is_empty()
                && !folded.entry.chains.iter().any(|chain| chain == chain_name)
            {
                folded.entry.chains.push(chain_name.to_string());
            }
            if !breakdown_key.is_empty() {
                folded
                    .entry
                    .chain_breakdown
                    .get_or_insert_with(BTreeMap::new)
                    .insert(breakdown_key.clone(), snapshot);
            }
        }
    }

    let compute_ratios = kind == DatasetKind::Fees;
    order
        .into_iter()
        .map(|folded| folded.finalize(compute_ratios))
        .collect()
}

fn fold_totals(kind: DatasetKind, entry: &mut DimensionProtocol, incoming: &DimensionProtocol) {
    entry.total_24h = add_opt(entry.total_24h, incoming.total_24h);
    if kind == DatasetKind::OpenInterest {
        return;
    }
    entry.total_7d = add_opt(entry.total_7d, incoming.total_7d);
    entry.total_30d = add_opt(entry.total_30d, incoming.total_30d);
    entry.total_all_time = add_opt(entry.total_all_time, incoming.total_all_time);

    if kind == DatasetKind::Fees {
        entry.total_1y = add_opt(entry.total_1y, incoming.total_1y);
        entry.revenue_24h = add_opt(entry.revenue_24h, incoming.revenue_24h);
        entry.revenue_7d = add_opt(entry.revenue_7d, incoming.revenue_7d);
        entry.revenue_30d = add_opt(entry.revenue_30d, incoming.revenue_30d);
        entry.revenue_1y = add_opt(entry.revenue_1y, incoming.revenue_1y);
        entry.holders_revenue_24h = add_opt(entry.holders_revenue_24h, incoming.holders_revenue_24h);
        entry.holders_revenue_30d = add_opt(entry.holders_revenue_30d, incoming.holders_revenue_30d);
        entry.daily_user_fees = add_opt(entry.daily_user_fees, incoming.daily_user_fees);
        entry.daily_protocol_revenue =
            add_opt(entry.daily_protocol_revenue, incoming.daily_protocol_revenue);
        entry.daily_supply_side_revenue =
            add_opt(entry.daily_supply_side_revenue, incoming.daily_supply_side_revenue);
    }
}

fn weigh_changes(kind: DatasetKind, folded: &mut FoldedEntry, p: &DimensionProtocol) {
    match kind {
        DatasetKind::Volume | DatasetKind::Perps => {
            folded.weigh("change_1d", p.total_24h, p.change_1d);
            folded.weigh("change_7d", p.total_7d, p.change_7d.or(p.change_7dover7d));
            folded.weigh("change_1m", p.total_30d, p.change_1m);
        }
        DatasetKind::Fees => {
            folded.weigh("feesChange_1d", p.total_24h, p.fees_change_1d);
            folded.weigh("feesChange_7d", p.total_7d, p.fees_change_7d);
            folded.weigh("feesChange_1m", p.total_30d, p.fees_change_1m);
            folded.weigh("revenueChange_1d", p.revenue_24h, p.revenue_change_1d);
            folded.weigh("revenueChange_7d", p.revenue_7d, p.revenue_change_7d);
            folded.weigh("revenueChange_1m", p.revenue_30d, p.revenue_change_1m);
        }
        _ => {}
    }
}

/// Joins the fees overview with the revenue and holders-revenue overviews of the same chain.
pub fn combine_fees_and_revenue(
    fees: Vec<DimensionProtocol>,
    revenue: &[DimensionProtocol],
    holders_revenue: &[DimensionProtocol],
) -> Vec<DimensionProtocol> {
    let revenue_by_name: HashMap<String, &DimensionProtocol> = revenue
        .iter()
        .map(|entry| (entry.name.to_lowercase(), entry))
        .collect();
    let holders_by_name: HashMap<String, &DimensionProtocol> = holders_revenue
        .iter()
        .map(|entry| (entry.name.to_lowercase(), entry))
        .collect();

    fees.into_iter()
        .map(|mut entry| {
            let key = entry.name.to_lowercase();
            entry.fees_change_1d = entry.fees_change_1d.or(entry.change_1d);
            entry.fees_change_7d = entry.fees_change_7d.or(entry.change_7d);
            entry.fees_change_1m = entry.fees_change_1m.or(entry.change_1m);
            if let Some(rev) = revenue_by_name.get(&key) {
                entry.revenue_24h = rev.total_24h;
                entry.revenue_7d = rev.total_7d;
                entry.revenue_30d = rev.total_30d;
                entry.revenue_1y = rev.total_1y;
                entry.average_revenue_1y = rev.monthly_average_1y;
                entry.revenue_change_1d = rev.change_1d;
                entry.revenue_change_7d = rev.change_7d;
                entry.revenue_change_1m = rev.change_1m;
            }
            if let Some(holders) = holders_by_name.get(&key) {
                entry.holders_revenue_24h = holders.total_24h;
                entry.holders_revenue_7d = holders.total_7d;
                entry.holders_revenue_30d = holders.total_30d;
            }
            entry
        })
        .collect()
}

/// Projects the base protocol list onto the selected chains and merges it by name.
pub fn build_protocol_list(response: &ProtocolsResponse, chains: &[String]) -> Vec<ProtocolLite> {
    if is_all_chains(chains) {
        return response
            .protocols
            .iter()
            .filter(|protocol| !is_bridge(protocol))
            .cloned()
            .collect();
    }

    let mut merged: Vec<ProtocolLite> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for chain in chains {
        for protocol in &response.protocols {
            if is_bridge(protocol) {
                continue;
            }
            let Some(projected) = project_onto_chain(protocol, chain) else {
                continue;
            };
            match index.get(&projected.name) {
                Some(position) => merge_projected(&mut merged[*position], projected),
                None => {
                    index.insert(projected.name.clone(), merged.len());
                    merged.push(projected);
                }
            }
        }
    }

    merged
}

fn is_bridge(protocol: &ProtocolLite) -> bool {
    protocol
        .category
        .as_deref()
        .is_some_and(|category| BRIDGE_CATEGORIES.contains(&category))
}

fn project_onto_chain(protocol: &ProtocolLite, chain: &str) -> Option<ProtocolLite> {
    let wanted = normalize_chain_name(chain);
    let (chain_name, values) = protocol
        .chain_tvls
        .iter()
        .find(|(key, _)| normalize_chain_name(key) == wanted)?;

    let mut projected = protocol.clone();
    projected.tvl = values.tvl;
    projected.tvl_prev_day = values.tvl_prev_day;
    projected.tvl_prev_week = values.tvl_prev_week;
    projected.tvl_prev_month = values.tvl_prev_month;
    projected.chains = vec![chain_name.clone()];
    projected.chain_tvls = BTreeMap::from([(chain_name.clone(), *values)]);
    projected.extra_tvl = protocol
        .chain_tvls
        .iter()
        .filter_map(|(key, values)| {
            let (base, suffix) = split_chain_tvl_key(key);
            let suffix = suffix?;
            (!base.is_empty() && normalize_chain_name(base) == wanted)
                .then(|| (suffix.to_string(), *values))
        })
        .collect();
    projected.oracles = protocol
        .oracles_by_chain
        .get(chain_name)
        .cloned()
        .unwrap_or_else(|| protocol.oracles.clone());
    Some(projected)
}

fn merge_projected(existing: &mut ProtocolLite, incoming: ProtocolLite) {
    existing.tvl = Some(existing.tvl.unwrap_or(0.0) + incoming.tvl.unwrap_or(0.0));
    existing.tvl_prev_day =
        Some(existing.tvl_prev_day.unwrap_or(0.0) + incoming.tvl_prev_day.unwrap_or(0.0));
    existing.tvl_prev_week =
        Some(existing.tvl_prev_week.unwrap_or(0.0) + incoming.tvl_prev_week.unwrap_or(0.0));
    existing.tvl_prev_month =
        Some(existing.tvl_prev_month.unwrap_or(0.0) + incoming.tvl_prev_month.unwrap_or(0.0));

    for chain in incoming.chains {
        if !existing.chains.contains(&chain) {
            existing.chains.push(chain);
        }
    }
    for (chain, values) in incoming.chain_tvls {
        existing.chain_tvls.entry(chain).or_insert(values);
    }
    for oracle in incoming.oracles {
        if !existing.oracles.contains(&oracle) {
            existing.oracles.push(oracle);
        }
    }
    for (chain, oracles) in incoming.oracles_by_chain {
        let slot = existing.oracles_by_chain.entry(chain).or_default();
        for oracle in oracles {
            if !slot.contains(&oracle) {
                slot.push(oracle);
            }
        }
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) if !text.is_empty() => Some(text),
        Some(serde_json::Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_id(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, total_24h: f64) -> DimensionProtocol {
        DimensionProtocol {
            name: name.to_string(),
            total_24h: Some(total_24h),
            ..DimensionProtocol::default()
        }
    }

    fn payload(chain: &str, protocols: Vec<DimensionProtocol>) -> ChainPayload {
        ChainPayload {
            chain: chain.to_string(),
            protocols: Some(protocols),
        }
    }

    fn chains(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn all_chains_passes_payload_through() {
        let payloads = vec![payload("All", vec![entry("Aave", 10.0)])];
        let result = aggregate_multi_chain(DatasetKind::Fees, &[], &payloads);
        assert_eq!(result, vec![entry("Aave", 10.0)]);
    }

    #[test]
    fn same_protocol_on_two_chains_is_summed_case_insensitively() {
        let payloads = vec![
            payload("Ethereum", vec![entry("Aave", 100.0)]),
            payload("Arbitrum", vec![entry("AAVE", 50.0)]),
        ];
        let result =
            aggregate_multi_chain(DatasetKind::Fees, &chains(&["Ethereum", "Arbitrum"]), &payloads);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "Aave");
        assert_eq!(result[0].total_24h, Some(150.0));
        assert_eq!(result[0].chains, chains(&["Ethereum", "Arbitrum"]));
        let breakdown = result[0].chain_breakdown.as_ref().unwrap();
        assert_eq!(breakdown["ethereum"].total_24h, Some(100.0));
        assert_eq!(breakdown["arbitrum"].chain.as_deref(), Some("Arbitrum"));
    }

    #[test]
    fn failed_chains_contribute_nothing() {
        let payloads = vec![
            payload("Ethereum", vec![entry("Uniswap", 10.0)]),
            ChainPayload {
                chain: "Base".to_string(),
                protocols: None,
            },
        ];
        let result =
            aggregate_multi_chain(DatasetKind::Volume, &chains(&["Ethereum", "Base"]), &payloads);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chains, chains(&["Ethereum"]));
    }

    #[test]
    fn changes_are_volume_weighted_across_chains() {
        let mut a = entry("Uniswap", 0.0);
        a.total_7d = Some(100.0);
        a.change_7d = Some(10.0);
        let mut b = entry("Uniswap", 0.0);
        b.total_7d = Some(300.0);
        b.change_7dover7d = Some(20.0);

        let payloads = vec![payload("Ethereum", vec![a]), payload("Base", vec![b])];
        let result =
            aggregate_multi_chain(DatasetKind::Volume, &chains(&["Ethereum", "Base"]), &payloads);
        assert_eq!(result[0].change_7d, Some(17.5));
        assert_eq!(result[0].total_7d, Some(400.0));
    }

    #[test]
    fn fees_ratios_are_computed_from_summed_totals() {
        let mut a = entry("Lido", 0.0);
        a.total_30d = Some(50.0);
        a.revenue_30d = Some(10.0);
        a.mcap = Some(1_200.0);
        let mut b = entry("Lido", 0.0);
        b.total_30d = Some(50.0);
        b.revenue_30d = Some(10.0);

        let payloads = vec![payload("Ethereum", vec![a]), payload("Solana", vec![b])];
        let result =
            aggregate_multi_chain(DatasetKind::Fees, &chains(&["Ethereum", "Solana"]), &payloads);
        assert_eq!(result[0].pf, Some(1.0));
        assert_eq!(result[0].ps, Some(5.0));
    }

    #[test]
    fn open_interest_only_sums_daily_total() {
        let mut a = entry("Hyperliquid", 5.0);
        a.total_7d = Some(1.0);
        let mut b = entry("Hyperliquid", 7.0);
        b.total_7d = Some(1.0);
        let payloads = vec![payload("Ethereum", vec![a]), payload("Arbitrum", vec![b])];
        let result = aggregate_multi_chain(
            DatasetKind::OpenInterest,
            &chains(&["Ethereum", "Arbitrum"]),
            &payloads,
        );
        assert_eq!(result[0].total_24h, Some(12.0));
        assert_eq!(result[0].total_7d, Some(1.0));
    }

    #[test]
    fn revenue_is_joined_onto_fees_by_name() {
        let fees = vec![entry("Aave", 100.0)];
        let mut revenue = entry("AAVE", 40.0);
        revenue.total_30d = Some(900.0);
        revenue.change_1d = Some(-3.0);
        let holders = vec![entry("aave", 5.0)];

        let combined = combine_fees_and_revenue(fees, &[revenue], &holders);
        assert_eq!(combined[0].revenue_24h, Some(40.0));
        assert_eq!(combined[0].revenue_30d, Some(900.0));
        assert_eq!(combined[0].revenue_change_1d, Some(-3.0));
        assert_eq!(combined[0].holders_revenue_24h, Some(5.0));
    }

    fn lite(name: &str, chain_tvls: &[(&str, f64)]) -> ProtocolLite {
        ProtocolLite {
            name: name.to_string(),
            chain_tvls: chain_tvls
                .iter()
                .map(|(chain, tvl)| {
                    (
                        chain.to_string(),
                        ChainTvl {
                            tvl: Some(*tvl),
                            tvl_prev_day: Some(*tvl),
                            ..ChainTvl::default()
                        },
                    )
                })
                .collect(),
            ..ProtocolLite::default()
        }
    }

    #[test]
    fn protocol_list_is_projected_and_summed_per_chain() {
        let mut bridge = lite("Wormhole", &[("Ethereum", 5.0)]);
        bridge.category = Some("Bridge".to_string());
        let response = ProtocolsResponse {
            protocols: vec![
                lite("Aave", &[("Ethereum", 100.0), ("Arbitrum", 20.0), ("Ethereum-borrowed", 7.0)]),
                lite("Curve", &[("Ethereum", 30.0)]),
                bridge,
            ],
            parent_protocols: Vec::new(),
        };

        let list = build_protocol_list(&response, &chains(&["Ethereum", "Arbitrum"]));
        assert_eq!(list.len(), 2);
        let aave = list.iter().find(|p| p.name == "Aave").unwrap();
        assert_eq!(aave.tvl, Some(120.0));
        assert_eq!(aave.chains, chains(&["Ethereum", "Arbitrum"]));
        assert_eq!(aave.extra_tvl["borrowed"].tvl, Some(7.0));

        let all = build_protocol_list(&response, &chains(&["All"]));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn numeric_ids_deserialize_as_strings() {
        let parsed: ProtocolLite =
            serde_json::from_str(r#"{"name":"Aave","defillamaId":111,"parentProtocol":"parent#aave"}"#)
                .unwrap();
        assert_eq!(parsed.defillama_id.as_deref(), Some("111"));
        assert_eq!(parsed.parent_protocol.as_deref(), Some("parent#aave"));
    }
}
