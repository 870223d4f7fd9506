use std::sync::Arc;

use prodash_table::{
    build_hierarchy, custom_cell_value, export_grouped_csv, export_leaf_csv, nodes_at_level,
    valid_custom_columns, write_csv_file, ColumnRegistry, CustomAggregation,
    CustomColumnDefinition, InMemoryTableSource, RowHeader, TablePipeline, ValueFormat,
};
use regex::Regex;

fn pipeline() -> TablePipeline {
    TablePipeline::new(Arc::new(InMemoryTableSource::demo()))
}

fn annual_fees_column() -> CustomColumnDefinition {
    CustomColumnDefinition::new("Annual fees", "fees24h * 365", ValueFormat::Usd)
}

#[test]
fn custom_column_ids_have_stable_shape() {
    let pattern = Regex::new(r"^custom_\d+_[0-9a-f]{7}$").unwrap();
    let first = annual_fees_column();
    let second = annual_fees_column();

    assert!(pattern.is_match(&first.id), "unexpected id {}", first.id);
    assert!(pattern.is_match(&second.id), "unexpected id {}", second.id);
    assert_ne!(first.id, second.id);
    assert_eq!(first.aggregation, CustomAggregation::Sum);
}

#[test]
fn group_custom_values_sum_leaves_that_evaluate() {
    let pipeline = pipeline();
    let headers = [RowHeader::ParentProtocol, RowHeader::Protocol];
    let rows = pipeline.rows(&["All".to_string()], &headers, None);
    let nodes = build_hierarchy(&rows, &headers);

    let column = annual_fees_column();
    let aave = nodes.iter().find(|node| node.label == "Aave").unwrap();
    // Aave V2 has no fees, so only Aave V3 contributes.
    assert_eq!(custom_cell_value(&column, aave), Some(2.1e6 * 365.0));

    let lido = nodes_at_level(&nodes, 0)
        .into_iter()
        .find(|node| node.label == "Lido")
        .unwrap();
    assert_eq!(custom_cell_value(&column, lido), Some(2.4e6 * 365.0));
}

#[test]
fn invalid_custom_columns_are_not_exported() {
    let registry = ColumnRegistry::new();
    let columns = vec![
        annual_fees_column(),
        CustomColumnDefinition::new("Broken", "fees24h +", ValueFormat::Number),
        CustomColumnDefinition::new("Unknown", "notAMetric * 2", ValueFormat::Number),
    ];
    let valid = valid_custom_columns(&columns, &registry);
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].name, "Annual fees");
}

#[test]
fn leaf_and_grouped_exports_write_to_disk() {
    let pipeline = pipeline();
    let registry = pipeline.registry();
    let headers = [RowHeader::ParentProtocol, RowHeader::Protocol];
    let rows = pipeline.rows(&["All".to_string()], &headers, None);
    let nodes = build_hierarchy(&rows, &headers);

    let custom = vec![annual_fees_column()];
    let columns = vec!["name".to_string(), "tvl".to_string(), custom[0].id.clone()];

    let leaf_csv = export_leaf_csv(&rows, &columns, &custom, registry).unwrap();
    let mut lines = leaf_csv.lines();
    assert_eq!(lines.next(), Some("Name,Chain,TVL,Annual fees"));
    assert_eq!(leaf_csv.lines().count(), rows.len() + 1);
    let lido_line = leaf_csv
        .lines()
        .find(|line| line.starts_with("Lido,"))
        .unwrap();
    assert!(lido_line.ends_with(",876000000"), "{lido_line}");

    let grouped_csv = export_grouped_csv(&nodes, 0, &columns, &custom, registry).unwrap();
    assert_eq!(grouped_csv.lines().next(), Some("Protocol,Rows,TVL,Annual fees"));
    assert!(grouped_csv.lines().any(|line| line.starts_with("Aave,2,")));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exports").join("protocols.csv");
    write_csv_file(&path, &grouped_csv).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), grouped_csv);
}
