//! User-defined expression columns.
//!
//! Evaluation is strict about missing data: if any referenced metric is absent for a row the
//! cell is `None` rather than a partial result.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::columns::{ColumnGroup, ColumnRegistry, ColumnRender};
use crate::expression::{ExpressionCache, ExpressionError};
use crate::grouping::{aggregate_metrics, UnifiedRowNode};
use crate::metrics::NumericMetrics;
use crate::strategy::NormalizedRow;

pub const CUSTOM_COLUMN_PREFIX: &str = "custom_";
const SAMPLE_VARIABLE_VALUE: f64 = 100.0;
const RATIO_VARIABLES: [&str; 3] = ["mcaptvl", "pf", "ps"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomAggregation {
    None,
    First,
    Sum,
    #[default]
    Recalculate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Usd,
    Percent,
    Ratio,
    #[default]
    Number,
}

impl ValueFormat {
    fn from_render(render: ColumnRender) -> Self {
        match render {
            ColumnRender::Usd => ValueFormat::Usd,
            ColumnRender::Percent => ValueFormat::Percent,
            ColumnRender::Ratio => ValueFormat::Ratio,
            _ => ValueFormat::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumnDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub aggregation: CustomAggregation,
    #[serde(default)]
    pub format: ValueFormat,
}

impl CustomColumnDefinition {
    /// New column with a fresh id and the aggregation suggested for `expression`.
    pub fn new(name: impl Into<String>, expression: impl Into<String>, format: ValueFormat) -> Self {
        let expression = expression.into();
        Self {
            id: generate_custom_column_id(),
            name: name.into(),
            aggregation: default_aggregation(&expression),
            expression,
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableVariable {
    pub key: &'static str,
    pub name: &'static str,
    pub group: ColumnGroup,
    pub format: ValueFormat,
}

/// Every non-meta dictionary column that maps onto a metric.
pub fn available_variables(registry: &ColumnRegistry) -> Vec<AvailableVariable> {
    registry
        .items()
        .iter()
        .filter(|item| item.group != ColumnGroup::Meta && NumericMetrics::is_metric_key(item.id))
        .map(|item| AvailableVariable {
            key: item.id,
            name: item.header,
            group: item.group,
            format: ValueFormat::from_render(item.render),
        })
        .collect()
}

pub fn available_variables_in_groups(
    registry: &ColumnRegistry,
    groups: &[ColumnGroup],
) -> Vec<AvailableVariable> {
    available_variables(registry)
        .into_iter()
        .filter(|variable| groups.contains(&variable.group))
        .collect()
}

/// Referenced variables, or nothing when the expression does not parse.
pub fn expression_variables(expression: &str) -> Vec<String> {
    ExpressionCache::shared()
        .parse(expression)
        .map(|expr| expr.variables())
        .unwrap_or_default()
}

pub fn validate_expression(expression: &str, registry: &ColumnRegistry) -> Result<(), ExpressionError> {
    if expression.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    let expr = ExpressionCache::shared().parse(expression)?;

    let available = available_variables(registry);
    let unknown: Vec<String> = expr
        .variables()
        .into_iter()
        .filter(|name| !available.iter().any(|variable| variable.key == name))
        .collect();
    if !unknown.is_empty() {
        return Err(ExpressionError::UnknownVariables(unknown));
    }

    let sample = |name: &str| {
        available
            .iter()
            .any(|variable| variable.key == name)
            .then_some(SAMPLE_VARIABLE_VALUE)
    };
    match expr.eval(&sample) {
        Some(value) if !value.is_nan() => Ok(()),
        _ => Err(ExpressionError::Evaluation),
    }
}

pub fn validate_custom_column(
    column: &CustomColumnDefinition,
    registry: &ColumnRegistry,
) -> Result<(), ExpressionError> {
    validate_expression(&column.expression, registry)
}

/// Keeps the columns whose expressions validate; the rest are logged and dropped.
pub fn valid_custom_columns(
    columns: &[CustomColumnDefinition],
    registry: &ColumnRegistry,
) -> Vec<CustomColumnDefinition> {
    columns
        .iter()
        .filter(|column| match validate_custom_column(column, registry) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    component = "custom_columns",
                    event = "custom_column.invalid",
                    column_id = %column.id,
                    error = %err
                );
                false
            }
        })
        .cloned()
        .collect()
}

/// `None` when the expression is invalid, a referenced metric is missing, or the result is
/// not finite.
pub fn evaluate_expression(expression: &str, metrics: &NumericMetrics) -> Option<f64> {
    let expr = ExpressionCache::shared().parse(expression).ok()?;
    expr.eval_finite(&|name| metrics.get(name))
}

pub fn aggregate_custom_value(
    column: &CustomColumnDefinition,
    leaves: &[&NormalizedRow],
    aggregated: &NumericMetrics,
) -> Option<f64> {
    if leaves.is_empty() {
        return None;
    }
    match column.aggregation {
        CustomAggregation::None => None,
        CustomAggregation::First => evaluate_expression(&column.expression, &leaves[0].metrics),
        CustomAggregation::Sum => leaves
            .iter()
            .filter_map(|row| evaluate_expression(&column.expression, &row.metrics))
            .fold(None, |acc, value| Some(acc.unwrap_or(0.0) + value)),
        CustomAggregation::Recalculate => evaluate_expression(&column.expression, aggregated),
    }
}

/// Cell value for a node: leaves evaluate their own metrics, groups aggregate.
pub fn custom_cell_value(column: &CustomColumnDefinition, node: &UnifiedRowNode) -> Option<f64> {
    match &node.original {
        Some(row) => evaluate_expression(&column.expression, &row.metrics),
        None => aggregate_custom_value(column, &node.leaves(), &node.metrics),
    }
}

/// Like `aggregate_custom_value` but rolls the leaf metrics up itself.
pub fn aggregate_custom_value_from_leaves(
    column: &CustomColumnDefinition,
    leaves: &[&NormalizedRow],
) -> Option<f64> {
    let aggregated = aggregate_metrics(leaves.iter().map(|row| &row.metrics));
    aggregate_custom_value(column, leaves, &aggregated)
}

/// `Recalculate` for ratio-like expressions, `Sum` otherwise.
pub fn default_aggregation(expression: &str) -> CustomAggregation {
    let has_ratio_var = expression_variables(expression)
        .iter()
        .any(|name| RATIO_VARIABLES.contains(&name.as_str()));
    if has_ratio_var || expression.contains('/') {
        CustomAggregation::Recalculate
    } else {
        CustomAggregation::Sum
    }
}

pub fn format_preview_number(value: Option<f64>, format: ValueFormat) -> String {
    let Some(value) = value else {
        return "-".to_string();
    };
    match format {
        ValueFormat::Percent => return format!("{value:.2}%"),
        ValueFormat::Ratio => return format!("{value:.2}x"),
        ValueFormat::Usd | ValueFormat::Number => {}
    }

    let prefix = if format == ValueFormat::Usd { "$" } else { "" };
    let abs = value.abs();
    if abs >= 1e9 {
        format!("{prefix}{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{prefix}{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{prefix}{:.2}K", value / 1e3)
    } else if abs < 1.0 && value != 0.0 {
        format!("{prefix}{value:.4}")
    } else {
        format!("{prefix}{value:.2}")
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `custom_{unix_millis}_{7 hex chars}`.
pub fn generate_custom_column_id() -> String {
    let now = chrono::Utc::now();
    let sequence = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{CUSTOM_COLUMN_PREFIX}{}_{}", now.timestamp_millis(), &digest[..7])
}

pub fn is_custom_column_id(id: &str) -> bool {
    id.starts_with(CUSTOM_COLUMN_PREFIX)
}

/// Custom ids in saved order, followed by custom columns the order does not mention yet.
pub fn ordered_custom_column_ids(order: &[String], columns: &[CustomColumnDefinition]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in order {
        if is_custom_column_id(id)
            && columns.iter().any(|column| &column.id == id)
            && !out.contains(id)
        {
            out.push(id.clone());
        }
    }
    for column in columns {
        if !out.contains(&column.id) {
            out.push(column.id.clone());
        }
    }
    out
}

/// Representative metrics for previewing an expression before saving it.
pub fn sample_metrics() -> NumericMetrics {
    NumericMetrics {
        tvl: Some(1_500_000_000.0),
        change_1d: Some(1.35),
        change_7d: Some(7.14),
        change_1m: Some(25.0),
        bridged_tvl: Some(800_000_000.0),
        stables_mcap: Some(500_000_000.0),
        tvl_share: Some(12.5),
        stables_share: Some(8.2),
        volume_24h: Some(50_000_000.0),
        volume_7d: Some(350_000_000.0),
        volume_30d: Some(1_500_000_000.0),
        cumulative_volume: Some(50_000_000_000.0),
        volume_change_1d: Some(5.2),
        volume_change_7d: Some(12.8),
        volume_change_1m: Some(-3.5),
        volume_dominance_24h: Some(8.5),
        volume_market_share_7d: Some(7.2),
        volume_24h_share: Some(15.3),
        fees_24h: Some(250_000.0),
        fees_7d: Some(1_750_000.0),
        fees_30d: Some(7_500_000.0),
        fees_1y: Some(90_000_000.0),
        average_1y: Some(7_500_000.0),
        cumulative_fees: Some(500_000_000.0),
        user_fees_24h: Some(200_000.0),
        holder_revenue_24h: Some(50_000.0),
        holder_revenue_7d: Some(350_000.0),
        holders_revenue_30d: Some(1_500_000.0),
        treasury_revenue_24h: Some(25_000.0),
        fees_change_1d: Some(3.2),
        fees_change_7d: Some(8.5),
        fees_change_1m: Some(15.0),
        revenue_24h: Some(150_000.0),
        revenue_7d: Some(1_050_000.0),
        revenue_30d: Some(4_500_000.0),
        revenue_1y: Some(54_000_000.0),
        average_revenue_1y: Some(4_500_000.0),
        revenue_change_1d: Some(2.8),
        revenue_change_7d: Some(6.3),
        revenue_change_1m: Some(12.0),
        perps_volume_24h: Some(20_000_000.0),
        perps_volume_7d: Some(140_000_000.0),
        perps_volume_30d: Some(600_000_000.0),
        perps_volume_change_1d: Some(4.5),
        perps_volume_change_7d: Some(10.2),
        perps_volume_change_1m: Some(-2.1),
        perps_volume_dominance_24h: Some(5.8),
        open_interest: Some(100_000_000.0),
        aggregators_volume_24h: Some(15_000_000.0),
        aggregators_volume_7d: Some(105_000_000.0),
        aggregators_volume_30d: Some(450_000_000.0),
        aggregators_volume_change_1d: Some(6.1),
        aggregators_volume_change_7d: Some(14.3),
        aggregators_volume_dominance_24h: Some(3.2),
        aggregators_volume_market_share_7d: Some(2.8),
        derivatives_aggregators_volume_24h: Some(8_000_000.0),
        derivatives_aggregators_volume_7d: Some(56_000_000.0),
        derivatives_aggregators_volume_30d: Some(240_000_000.0),
        derivatives_aggregators_volume_change_1d: Some(7.2),
        derivatives_aggregators_volume_change_7d: Some(11.5),
        derivatives_aggregators_volume_change_1m: Some(18.0),
        options_volume_24h: Some(5_000_000.0),
        options_volume_7d: Some(35_000_000.0),
        options_volume_30d: Some(150_000_000.0),
        options_volume_change_1d: Some(8.3),
        options_volume_change_7d: Some(15.7),
        options_volume_dominance_24h: Some(2.1),
        mcap: Some(2_000_000_000.0),
        fdv: Some(3_000_000_000.0),
        mcaptvl: Some(1.33),
        pf: Some(22.0),
        ps: Some(36.5),
        ..NumericMetrics::default()
    }
}

/// Validates first, then evaluates against `sample_metrics`.
pub fn evaluate_with_sample_data(
    expression: &str,
    registry: &ColumnRegistry,
) -> Result<Option<f64>, ExpressionError> {
    validate_expression(expression, registry)?;
    Ok(evaluate_expression(expression, &sample_metrics()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, metrics: NumericMetrics) -> NormalizedRow {
        NormalizedRow {
            id: id.to_string(),
            name: id.to_string(),
            metrics,
            ..NormalizedRow::default()
        }
    }

    fn column(expression: &str, aggregation: CustomAggregation) -> CustomColumnDefinition {
        CustomColumnDefinition {
            id: "custom_1_abc".to_string(),
            name: "Test".to_string(),
            expression: expression.to_string(),
            aggregation,
            format: ValueFormat::Number,
        }
    }

    #[test]
    fn strict_null_evaluation() {
        let metrics = NumericMetrics {
            revenue_24h: Some(50.0),
            mcap: None,
            ..NumericMetrics::default()
        };
        assert_eq!(evaluate_expression("revenue24h / mcap", &metrics), None);
        assert_eq!(evaluate_expression("revenue24h * 2", &metrics), Some(100.0));

        let zero = NumericMetrics {
            revenue_24h: Some(50.0),
            mcap: Some(0.0),
            ..NumericMetrics::default()
        };
        assert_eq!(evaluate_expression("revenue24h / mcap", &zero), None);
        assert_eq!(evaluate_expression("revenue24h +", &zero), None);
    }

    #[test]
    fn validation_reports_each_failure_kind() {
        let registry = ColumnRegistry::new();
        assert_eq!(validate_expression("  ", &registry), Err(ExpressionError::Empty));
        assert!(matches!(
            validate_expression("tvl * (", &registry),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert_eq!(
            validate_expression("tvl / foo + bar", &registry),
            Err(ExpressionError::UnknownVariables(vec!["foo".into(), "bar".into()]))
        );
        assert_eq!(
            validate_expression("(tvl - mcap) / (tvl - mcap)", &registry),
            Err(ExpressionError::Evaluation)
        );
        assert_eq!(validate_expression("fees24h / tvl * 100", &registry), Ok(()));
        let nested = format!("{}tvl{}", "(".repeat(400), ")".repeat(400));
        assert!(matches!(
            validate_expression(&nested, &registry),
            Err(ExpressionError::TooDeep { .. })
        ));
    }

    #[test]
    fn meta_columns_are_not_variables() {
        let registry = ColumnRegistry::new();
        let keys: Vec<&str> = available_variables(&registry).iter().map(|v| v.key).collect();
        assert!(keys.contains(&"tvl"));
        assert!(keys.contains(&"pf"));
        assert!(!keys.contains(&"protocolCount"));
        assert!(!keys.contains(&"category"));

        let ratios = available_variables_in_groups(&registry, &[ColumnGroup::Ratios]);
        assert!(ratios.iter().all(|v| v.group == ColumnGroup::Ratios));
        assert!(ratios.iter().any(|v| v.key == "mcaptvl" && v.format == ValueFormat::Ratio));
    }

    #[test]
    fn aggregation_modes() {
        let a = row("a", NumericMetrics { fees_24h: Some(10.0), tvl: Some(100.0), ..NumericMetrics::default() });
        let b = row("b", NumericMetrics { fees_24h: Some(30.0), tvl: Some(100.0), ..NumericMetrics::default() });
        let c = row("c", NumericMetrics { fees_24h: None, tvl: Some(200.0), ..NumericMetrics::default() });
        let leaves = vec![&a, &b, &c];

        let ratio = "fees24h / tvl";
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::None), &leaves),
            None
        );
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::First), &leaves),
            Some(0.1)
        );
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::Sum), &leaves),
            Some(0.4)
        );
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::Recalculate), &leaves),
            Some(0.1)
        );
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::Sum), &[&c]),
            None
        );
        assert_eq!(
            aggregate_custom_value_from_leaves(&column(ratio, CustomAggregation::Sum), &[]),
            None
        );
    }

    #[test]
    fn default_aggregation_prefers_recalculate_for_ratios() {
        assert_eq!(default_aggregation("fees24h + revenue24h"), CustomAggregation::Sum);
        assert_eq!(default_aggregation("fees24h / tvl"), CustomAggregation::Recalculate);
        assert_eq!(default_aggregation("pf * 2"), CustomAggregation::Recalculate);
    }

    #[test]
    fn preview_formatting() {
        assert_eq!(format_preview_number(None, ValueFormat::Usd), "-");
        assert_eq!(format_preview_number(Some(12.345), ValueFormat::Percent), "12.35%");
        assert_eq!(format_preview_number(Some(3.0), ValueFormat::Ratio), "3.00x");
        assert_eq!(format_preview_number(Some(1_500_000_000.0), ValueFormat::Usd), "$1.50B");
        assert_eq!(format_preview_number(Some(-2_500_000.0), ValueFormat::Number), "-2.50M");
        assert_eq!(format_preview_number(Some(1_250.0), ValueFormat::Usd), "$1.25K");
        assert_eq!(format_preview_number(Some(0.12345), ValueFormat::Number), "0.1235");
        assert_eq!(format_preview_number(Some(0.0), ValueFormat::Number), "0.00");
        assert_eq!(format_preview_number(Some(42.0), ValueFormat::Usd), "$42.00");
    }

    #[test]
    fn ordered_ids_follow_saved_order_then_append() {
        let columns: Vec<CustomColumnDefinition> = ["custom_1_a", "custom_2_b", "custom_3_c"]
            .iter()
            .map(|id| CustomColumnDefinition { id: id.to_string(), ..column("tvl", CustomAggregation::Sum) })
            .collect();
        let order: Vec<String> = ["tvl", "custom_3_c", "custom_9_gone", "custom_1_a"]
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(
            ordered_custom_column_ids(&order, &columns),
            vec!["custom_3_c", "custom_1_a", "custom_2_b"]
        );
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let first = generate_custom_column_id();
        let second = generate_custom_column_id();
        assert!(is_custom_column_id(&first));
        assert_ne!(first, second);
        assert!(!is_custom_column_id("tvl"));
    }

    #[test]
    fn invalid_columns_are_filtered() {
        let registry = ColumnRegistry::new();
        let good = column("fees24h * 365", CustomAggregation::Sum);
        let bad = CustomColumnDefinition {
            id: "custom_2_bad".into(),
            ..column("nope * 2", CustomAggregation::Sum)
        };
        let missing = CustomColumnDefinition {
            id: "custom_3_missing".into(),
            ..column("", CustomAggregation::Sum)
        };
        let kept = valid_custom_columns(&[good.clone(), bad, missing], &registry);
        assert_eq!(kept, vec![good]);
    }

    #[test]
    fn sample_preview_uses_sample_metrics() {
        let registry = ColumnRegistry::new();
        assert_eq!(evaluate_with_sample_data("mcap / tvl", &registry).map(|v| v.map(|x| (x * 100.0).round())), Ok(Some(133.0)));
        assert!(evaluate_with_sample_data("unknown", &registry).is_err());
    }
}
