//! Flat metric bag shared by every table row plus the arithmetic helpers used to derive
//! changes, shares and valuation ratios.

use serde::{Deserialize, Serialize};

macro_rules! numeric_metrics {
    ($($field:ident => $key:literal),* $(,)?) => {
        /// Optional numeric metrics for one row, keyed by column id on the wire.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct NumericMetrics {
            $(
                #[serde(rename = $key)]
                pub $field: Option<f64>,
            )*
        }

        impl NumericMetrics {
            pub const KEYS: &'static [&'static str] = &[$($key),*];

            pub fn get(&self, key: &str) -> Option<f64> {
                match key {
                    $($key => self.$field,)*
                    _ => None,
                }
            }

            /// Returns false when `key` is not a metric id.
            pub fn set(&mut self, key: &str, value: Option<f64>) -> bool {
                match key {
                    $($key => {
                        self.$field = value;
                        true
                    })*
                    _ => false,
                }
            }

            pub fn is_metric_key(key: &str) -> bool {
                Self::KEYS.contains(&key)
            }
        }
    };
}

numeric_metrics! {
    tvl => "tvl",
    tvl_prev_day => "tvlPrevDay",
    tvl_prev_week => "tvlPrevWeek",
    tvl_prev_month => "tvlPrevMonth",
    change_1d => "change1d",
    change_7d => "change7d",
    change_1m => "change1m",
    bridged_tvl => "bridgedTvl",
    stables_mcap => "stablesMcap",
    tvl_share => "tvlShare",
    stables_share => "stablesShare",
    volume_24h => "volume24h",
    volume_7d => "volume_7d",
    volume_30d => "volume_30d",
    cumulative_volume => "cumulativeVolume",
    volume_change_1d => "volumeChange_1d",
    volume_change_7d => "volumeChange_7d",
    volume_change_1m => "volumeChange_1m",
    volume_dominance_24h => "volumeDominance_24h",
    volume_market_share_7d => "volumeMarketShare7d",
    volume_24h_share => "volume24hShare",
    fees_24h => "fees24h",
    fees_7d => "fees_7d",
    fees_30d => "fees_30d",
    fees_1y => "fees_1y",
    average_1y => "average_1y",
    cumulative_fees => "cumulativeFees",
    user_fees_24h => "userFees_24h",
    holder_revenue_24h => "holderRevenue_24h",
    holder_revenue_7d => "holderRevenue_7d",
    holders_revenue_30d => "holdersRevenue30d",
    treasury_revenue_24h => "treasuryRevenue_24h",
    supply_side_revenue_24h => "supplySideRevenue_24h",
    fees_change_1d => "feesChange_1d",
    fees_change_7d => "feesChange_7d",
    fees_change_1m => "feesChange_1m",
    revenue_24h => "revenue24h",
    revenue_7d => "revenue_7d",
    revenue_30d => "revenue_30d",
    revenue_1y => "revenue_1y",
    average_revenue_1y => "average_revenue_1y",
    revenue_change_1d => "revenueChange_1d",
    revenue_change_7d => "revenueChange_7d",
    revenue_change_1m => "revenueChange_1m",
    perps_volume_24h => "perpsVolume24h",
    perps_volume_7d => "perps_volume_7d",
    perps_volume_30d => "perps_volume_30d",
    perps_volume_change_1d => "perps_volume_change_1d",
    perps_volume_change_7d => "perps_volume_change_7d",
    perps_volume_change_1m => "perps_volume_change_1m",
    perps_volume_dominance_24h => "perps_volume_dominance_24h",
    open_interest => "openInterest",
    aggregators_volume_24h => "aggregators_volume_24h",
    aggregators_volume_7d => "aggregators_volume_7d",
    aggregators_volume_30d => "aggregators_volume_30d",
    aggregators_volume_change_1d => "aggregators_volume_change_1d",
    aggregators_volume_change_7d => "aggregators_volume_change_7d",
    aggregators_volume_dominance_24h => "aggregators_volume_dominance_24h",
    aggregators_volume_market_share_7d => "aggregators_volume_marketShare7d",
    bridge_aggregators_volume_24h => "bridge_aggregators_volume_24h",
    bridge_aggregators_volume_7d => "bridge_aggregators_volume_7d",
    bridge_aggregators_volume_30d => "bridge_aggregators_volume_30d",
    bridge_aggregators_volume_change_1d => "bridge_aggregators_volume_change_1d",
    bridge_aggregators_volume_change_7d => "bridge_aggregators_volume_change_7d",
    bridge_aggregators_volume_dominance_24h => "bridge_aggregators_volume_dominance_24h",
    derivatives_aggregators_volume_24h => "derivatives_aggregators_volume_24h",
    derivatives_aggregators_volume_7d => "derivatives_aggregators_volume_7d",
    derivatives_aggregators_volume_30d => "derivatives_aggregators_volume_30d",
    derivatives_aggregators_volume_change_1d => "derivatives_aggregators_volume_change_1d",
    derivatives_aggregators_volume_change_7d => "derivatives_aggregators_volume_change_7d",
    derivatives_aggregators_volume_change_1m => "derivatives_aggregators_volume_change_1m",
    options_volume_24h => "options_volume_24h",
    options_volume_7d => "options_volume_7d",
    options_volume_30d => "options_volume_30d",
    options_volume_change_1d => "options_volume_change_1d",
    options_volume_change_7d => "options_volume_change_7d",
    options_volume_dominance_24h => "options_volume_dominance_24h",
    mcap => "mcap",
    fdv => "fdv",
    chain_mcap => "chainMcap",
    mcaptvl => "mcaptvl",
    pf => "pf",
    ps => "ps",
    protocol_count => "protocolCount",
}

/// How a metric combines when rows are rolled up into a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricAggregation {
    Sum,
    /// Percent change recomputed from the summed current and previous values.
    ChangeFromPrevious {
        current: &'static str,
        previous: &'static str,
    },
    /// Percent change averaged with the summed `weight` metric as the denominator.
    WeightedChange { weight: &'static str },
    Ratio(RatioKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioKind {
    McapTvl,
    PriceToFees,
    PriceToSales,
}

pub const TVL_CHANGE_PAIRS: [(&str, &str); 3] = [
    ("change1d", "tvlPrevDay"),
    ("change7d", "tvlPrevWeek"),
    ("change1m", "tvlPrevMonth"),
];

pub const WEIGHTED_CHANGE_PAIRS: [(&str, &str); 21] = [
    ("volumeChange_1d", "volume24h"),
    ("volumeChange_7d", "volume_7d"),
    ("volumeChange_1m", "volume_30d"),
    ("feesChange_1d", "fees24h"),
    ("feesChange_7d", "fees_7d"),
    ("feesChange_1m", "fees_30d"),
    ("revenueChange_1d", "revenue24h"),
    ("revenueChange_7d", "revenue_7d"),
    ("revenueChange_1m", "revenue_30d"),
    ("perps_volume_change_1d", "perpsVolume24h"),
    ("perps_volume_change_7d", "perps_volume_7d"),
    ("perps_volume_change_1m", "perps_volume_30d"),
    ("aggregators_volume_change_1d", "aggregators_volume_24h"),
    ("aggregators_volume_change_7d", "aggregators_volume_7d"),
    ("bridge_aggregators_volume_change_1d", "bridge_aggregators_volume_24h"),
    ("bridge_aggregators_volume_change_7d", "bridge_aggregators_volume_7d"),
    (
        "derivatives_aggregators_volume_change_1d",
        "derivatives_aggregators_volume_24h",
    ),
    (
        "derivatives_aggregators_volume_change_7d",
        "derivatives_aggregators_volume_7d",
    ),
    (
        "derivatives_aggregators_volume_change_1m",
        "derivatives_aggregators_volume_30d",
    ),
    ("options_volume_change_1d", "options_volume_24h"),
    ("options_volume_change_7d", "options_volume_7d"),
];

pub fn metric_aggregation(key: &str) -> MetricAggregation {
    if let Some((_, previous)) = TVL_CHANGE_PAIRS.iter().find(|(change, _)| *change == key) {
        return MetricAggregation::ChangeFromPrevious {
            current: "tvl",
            previous: *previous,
        };
    }
    if let Some((_, weight)) = WEIGHTED_CHANGE_PAIRS
        .iter()
        .find(|(change, _)| *change == key)
    {
        return MetricAggregation::WeightedChange { weight: *weight };
    }
    match key {
        "mcaptvl" => MetricAggregation::Ratio(RatioKind::McapTvl),
        "pf" => MetricAggregation::Ratio(RatioKind::PriceToFees),
        "ps" => MetricAggregation::Ratio(RatioKind::PriceToSales),
        _ => MetricAggregation::Sum,
    }
}

pub fn percent_change(now: f64, prev: f64) -> Option<f64> {
    let change = (now - prev) / prev * 100.0;
    change.is_finite().then_some(change)
}

pub fn percent_change_opt(now: Option<f64>, prev: Option<f64>) -> Option<f64> {
    match (now, prev) {
        (Some(now), Some(prev)) => percent_change(now, prev),
        _ => None,
    }
}

pub fn compute_share(value: Option<f64>, total: Option<f64>) -> Option<f64> {
    let value = value?;
    let total = total?;
    if total <= 0.0 || !value.is_finite() {
        return None;
    }
    Some(value / total * 100.0)
}

pub fn derive_prev_from_change(current: Option<f64>, change: Option<f64>) -> Option<f64> {
    let current = current?;
    let change = change?;
    let denominator = 1.0 + change / 100.0;
    if !denominator.is_finite() || denominator == 0.0 {
        return None;
    }
    Some(current / denominator)
}

pub fn annualized_ratio(mcap: Option<f64>, value_30d: Option<f64>) -> Option<f64> {
    let mcap = mcap?;
    let value_30d = value_30d?;
    if mcap <= 0.0 || value_30d <= 0.0 {
        return None;
    }
    finite(round2(mcap / (value_30d * 12.0)))
}

pub fn mcap_tvl_ratio(mcap: Option<f64>, tvl: Option<f64>) -> Option<f64> {
    let mcap = mcap?;
    let tvl = tvl?;
    if tvl <= 0.0 {
        return None;
    }
    finite(round2(mcap / tvl))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Running `sum(change * weight) / sum(weight)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedAccumulator {
    pub numerator: f64,
    pub denominator: f64,
}

impl WeightedAccumulator {
    /// Ignores non-finite inputs and non-positive weights.
    pub fn add(&mut self, weight: Option<f64>, change: Option<f64>) {
        let (Some(weight), Some(change)) = (weight, change) else {
            return;
        };
        if !weight.is_finite() || !change.is_finite() || weight <= 0.0 {
            return;
        }
        self.numerator += change * weight;
        self.denominator += weight;
    }

    pub fn value(&self) -> Option<f64> {
        if self.denominator > 0.0 {
            finite(self.numerator / self.denominator)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_bag_reads_and_writes_by_column_id() {
        let mut metrics = NumericMetrics::default();
        assert!(metrics.set("fees24h", Some(12.5)));
        assert!(metrics.set("aggregators_volume_marketShare7d", Some(3.0)));
        assert!(!metrics.set("notAMetric", Some(1.0)));

        assert_eq!(metrics.fees_24h, Some(12.5));
        assert_eq!(metrics.get("fees24h"), Some(12.5));
        assert_eq!(metrics.get("aggregators_volume_marketShare7d"), Some(3.0));
        assert_eq!(metrics.get("notAMetric"), None);
        assert!(NumericMetrics::is_metric_key("perpsVolume24h"));
    }

    #[test]
    fn metric_bag_serializes_under_column_ids() {
        let metrics = NumericMetrics {
            tvl: Some(1.0),
            volume_7d: Some(2.0),
            ..NumericMetrics::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["tvl"], 1.0);
        assert_eq!(json["volume_7d"], 2.0);
        assert!(json["fees24h"].is_null());

        let parsed: NumericMetrics = serde_json::from_str(r#"{"tvlPrevDay": 5}"#).unwrap();
        assert_eq!(parsed.tvl_prev_day, Some(5.0));
    }

    #[test]
    fn keys_are_unique() {
        let mut keys = NumericMetrics::KEYS.to_vec();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), NumericMetrics::KEYS.len());
    }

    #[test]
    fn percent_change_rejects_non_finite_results() {
        assert!((percent_change(110.0, 100.0).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(percent_change(10.0, 0.0), None);
        assert_eq!(percent_change(0.0, 0.0), None);
        assert_eq!(percent_change_opt(Some(1.0), None), None);
    }

    #[test]
    fn share_requires_positive_total() {
        assert_eq!(compute_share(Some(25.0), Some(100.0)), Some(25.0));
        assert_eq!(compute_share(Some(25.0), Some(0.0)), None);
        assert_eq!(compute_share(None, Some(100.0)), None);
    }

    #[test]
    fn previous_value_is_derived_from_change() {
        let prev = derive_prev_from_change(Some(110.0), Some(10.0)).unwrap();
        assert!((prev - 100.0).abs() < 1e-9);
        assert_eq!(derive_prev_from_change(Some(110.0), Some(-100.0)), None);
        assert_eq!(derive_prev_from_change(None, Some(10.0)), None);
    }

    #[test]
    fn ratios_round_to_two_decimals() {
        assert_eq!(annualized_ratio(Some(1_200.0), Some(10.0)), Some(10.0));
        assert_eq!(annualized_ratio(Some(1_000.0), Some(3.0)), Some(27.78));
        assert_eq!(annualized_ratio(Some(1_000.0), Some(0.0)), None);
        assert_eq!(mcap_tvl_ratio(Some(500.0), Some(300.0)), Some(1.67));
        assert_eq!(mcap_tvl_ratio(Some(500.0), Some(0.0)), None);
    }

    #[test]
    fn weighted_accumulator_skips_bad_weights() {
        let mut acc = WeightedAccumulator::default();
        acc.add(Some(100.0), Some(10.0));
        acc.add(Some(300.0), Some(20.0));
        acc.add(Some(0.0), Some(99.0));
        acc.add(Some(50.0), Some(f64::NAN));
        acc.add(None, Some(5.0));
        assert_eq!(acc.value(), Some(17.5));
        assert_eq!(WeightedAccumulator::default().value(), None);
    }

    #[test]
    fn aggregation_classification() {
        assert_eq!(
            metric_aggregation("change7d"),
            MetricAggregation::ChangeFromPrevious {
                current: "tvl",
                previous: "tvlPrevWeek"
            }
        );
        assert_eq!(
            metric_aggregation("volumeChange_7d"),
            MetricAggregation::WeightedChange {
                weight: "volume_7d"
            }
        );
        assert_eq!(
            metric_aggregation("pf"),
            MetricAggregation::Ratio(RatioKind::PriceToFees)
        );
        assert_eq!(metric_aggregation("volumeDominance_24h"), MetricAggregation::Sum);
        assert_eq!(metric_aggregation("holdersRevenue30d"), MetricAggregation::Sum);
    }
}
