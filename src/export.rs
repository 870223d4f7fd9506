//! CSV export of table rows, either flat leaves or one line per group.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::columns::{ColumnRegistry, NAME_COLUMN_ID};
use crate::custom_columns::{
    custom_cell_value, evaluate_expression, is_custom_column_id, CustomColumnDefinition, ValueFormat,
};
use crate::grouping::{nodes_at_level, UnifiedRowNode};
use crate::metrics::NumericMetrics;
use crate::strategy::NormalizedRow;

const CHAIN_HEADER: &str = "Chain";
const CHAIN_COLUMN_ID: &str = "chain";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv output was not utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

fn column_header(
    column_id: &str,
    registry: &ColumnRegistry,
    custom_columns: &[CustomColumnDefinition],
) -> String {
    if column_id == NAME_COLUMN_ID {
        return "Name".to_string();
    }
    if column_id == CHAIN_COLUMN_ID {
        return CHAIN_HEADER.to_string();
    }
    if let Some(custom) = custom_columns.iter().find(|column| column.id == column_id) {
        return custom.name.clone();
    }
    registry
        .get(column_id)
        .map(|item| item.header.to_string())
        .unwrap_or_else(|| column_id.to_string())
}

fn metric_cell(column_id: &str, metrics: &NumericMetrics, registry: &ColumnRegistry) -> String {
    match metrics.get(column_id) {
        Some(value) if registry.is_percent(column_id) => format!("{value:.2}"),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

fn custom_cell(column: &CustomColumnDefinition, value: Option<f64>) -> String {
    match value {
        Some(value) if column.format == ValueFormat::Percent => format!("{value:.2}"),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

fn leaf_cell(
    column_id: &str,
    row: &NormalizedRow,
    registry: &ColumnRegistry,
    custom_columns: &[CustomColumnDefinition],
) -> String {
    match column_id {
        NAME_COLUMN_ID => row.name.clone(),
        CHAIN_COLUMN_ID => row.chain.clone().unwrap_or_default(),
        "category" => row.category.clone().unwrap_or_default(),
        id if is_custom_column_id(id) => custom_columns
            .iter()
            .find(|column| column.id == id)
            .map(|column| custom_cell(column, evaluate_expression(&column.expression, &row.metrics)))
            .unwrap_or_default(),
        id => metric_cell(id, &row.metrics, registry),
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// One line per leaf row. A `Chain` column is inserted right after `Name` (or first when
/// `Name` is hidden) unless the chain is already one of the columns.
pub fn export_leaf_csv(
    rows: &[NormalizedRow],
    columns: &[String],
    custom_columns: &[CustomColumnDefinition],
    registry: &ColumnRegistry,
) -> Result<String, ExportError> {
    let insert_at = if columns.iter().any(|id| id == CHAIN_COLUMN_ID) {
        None
    } else {
        Some(
            columns
                .iter()
                .position(|id| id == NAME_COLUMN_ID)
                .map_or(0, |index| index + 1),
        )
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut headers: Vec<String> = columns
        .iter()
        .map(|id| column_header(id, registry, custom_columns))
        .collect();
    if let Some(at) = insert_at {
        headers.insert(at, CHAIN_HEADER.to_string());
    }
    writer.write_record(&headers)?;

    for row in rows {
        let mut record: Vec<String> = columns
            .iter()
            .map(|id| leaf_cell(id, row, registry, custom_columns))
            .collect();
        if let Some(at) = insert_at {
            record.insert(at, row.chain.clone().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    debug!(
        component = "export",
        event = "export.csv.leaf",
        row_count = rows.len(),
        column_count = columns.len()
    );
    finish(writer)
}

/// One line per node at grouping `level`: the group label, its leaf count, then aggregated
/// column values. Falls back to the leaf export when the level is empty.
pub fn export_grouped_csv(
    nodes: &[UnifiedRowNode],
    level: usize,
    columns: &[String],
    custom_columns: &[CustomColumnDefinition],
    registry: &ColumnRegistry,
) -> Result<String, ExportError> {
    let at_level = nodes_at_level(nodes, level);
    if at_level.is_empty() {
        let leaves: Vec<NormalizedRow> = nodes
            .iter()
            .flat_map(|node| node.leaves())
            .cloned()
            .collect();
        return export_leaf_csv(&leaves, columns, custom_columns, registry);
    }

    let value_columns: Vec<&String> = columns.iter().filter(|id| *id != NAME_COLUMN_ID).collect();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut headers = vec![at_level[0].header.label().to_string(), "Rows".to_string()];
    headers.extend(
        value_columns
            .iter()
            .map(|id| column_header(id, registry, custom_columns)),
    );
    writer.write_record(&headers)?;

    for node in &at_level {
        let mut record = vec![node.label.clone(), node.row_count.to_string()];
        record.extend(value_columns.iter().map(|id| {
            match custom_columns.iter().find(|column| &column.id == *id) {
                Some(column) => custom_cell(column, custom_cell_value(column, node)),
                None => metric_cell(id, &node.metrics, registry),
            }
        }));
        writer.write_record(&record)?;
    }

    debug!(
        component = "export",
        event = "export.csv.grouped",
        group_level = level,
        group_count = at_level.len()
    );
    finish(writer)
}

pub fn write_csv_file(path: impl AsRef<Path>, csv: &str) -> Result<(), ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, csv)?;
    debug!(
        component = "export",
        event = "export.csv.written",
        path = %path.display(),
        bytes = csv.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyType;

    fn row(name: &str, chain: &str, tvl: f64, change: Option<f64>) -> NormalizedRow {
        let mut metrics = NumericMetrics::default();
        metrics.tvl = Some(tvl);
        metrics.change_1d = change;
        NormalizedRow {
            id: name.to_lowercase(),
            name: name.to_string(),
            display_name: None,
            protocol_id: Some(name.to_lowercase()),
            logo: None,
            category: Some("Dexs".into()),
            chain: Some(chain.to_string()),
            chains: vec![chain.to_string()],
            oracles: Vec::new(),
            parent_protocol_id: None,
            parent_protocol_name: None,
            parent_protocol_logo: None,
            strategy_type: StrategyType::Protocols,
            metrics,
        }
    }

    #[test]
    fn leaf_export_inserts_chain_after_name() {
        let registry = ColumnRegistry::new();
        let columns = vec!["name".to_string(), "tvl".to_string(), "change1d".to_string()];
        let csv = export_leaf_csv(
            &[row("Uniswap", "Ethereum", 100.0, Some(1.23456)), row("Curve", "Arbitrum", 50.0, None)],
            &columns,
            &[],
            &registry,
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,Chain,TVL,1d Change");
        assert_eq!(lines[1], "Uniswap,Ethereum,100,1.23");
        assert_eq!(lines[2], "Curve,Arbitrum,50,");
    }

    #[test]
    fn leaf_export_keeps_a_single_chain_column() {
        let registry = ColumnRegistry::new();
        let columns = vec!["name".to_string(), "tvl".to_string(), "chain".to_string()];
        let csv = export_leaf_csv(&[row("Uniswap", "Ethereum", 100.0, None)], &columns, &[], &registry)
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,TVL,Chain");
        assert_eq!(lines[1], "Uniswap,100,Ethereum");
    }

    #[test]
    fn custom_percent_columns_use_two_decimals() {
        let registry = ColumnRegistry::new();
        let custom = CustomColumnDefinition {
            id: "custom_1_abcdef0".into(),
            ..CustomColumnDefinition::new("Third", "tvl / 3", ValueFormat::Percent)
        };
        let columns = vec!["name".to_string(), custom.id.clone()];
        let csv = export_leaf_csv(&[row("A", "Ethereum", 10.0, None)], &columns, &[custom], &registry).unwrap();
        assert_eq!(csv.lines().nth(1), Some("A,Ethereum,3.33"));
    }
}
