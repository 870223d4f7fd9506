//! Headless unified protocols table.
//!
//! Dataset fetching and merging, row strategies, filters, the grouping engine, the column
//! registry with custom expression columns, dashboard item configs with the add/edit modal
//! state machine, CSV export and a small HTTP snapshot server.

mod chains;
mod columns;
mod custom_columns;
mod dashboard;
mod datasets;
mod export;
mod expression;
mod fetch;
mod filters;
mod grouping;
mod item_config;
mod merge;
mod metrics;
mod modal;
mod observability;
mod strategy;

pub use chains::{
    chain_key, display_chain_for_key, is_adjustment_suffix, is_same_chain, normalize_chain_name,
    normalize_id, split_chain_tvl_key, to_chain_slug, to_dimensions_slug, TVL_ADJUSTMENT_SUFFIXES,
};
pub use columns::{
    sanitize_config_columns, visible_columns, ColumnConfigState, ColumnDictionaryItem,
    ColumnGroup, ColumnRegistry, ColumnRender, ColumnSort, PresetRegistry, UnifiedTablePreset,
    NAME_COLUMN_ID,
};
pub use custom_columns::{
    aggregate_custom_value, aggregate_custom_value_from_leaves, available_variables,
    available_variables_in_groups, custom_cell_value, default_aggregation, evaluate_expression,
    evaluate_with_sample_data, expression_variables, format_preview_number,
    generate_custom_column_id, is_custom_column_id, ordered_custom_column_ids, sample_metrics,
    valid_custom_columns, validate_custom_column, validate_expression, AvailableVariable,
    CustomAggregation, CustomColumnDefinition, ValueFormat, CUSTOM_COLUMN_PREFIX,
};
pub use dashboard::{
    demo_merge_inputs, table_router, ColumnsResponse, InMemoryTableSource, LiveTableSource,
    SnapshotColumn, SnapshotQuery, TablePipeline, TableSnapshot, TableSnapshotSource,
    COLUMNS_ROUTE, EXPORT_ROUTE, SNAPSHOT_ROUTE, TABLE_ROUTES,
};
pub use datasets::{
    aggregate_multi_chain, build_protocol_list, chains_to_fetch, combine_fees_and_revenue,
    is_all_chains, ChainBreakdown, ChainMetricSnapshot, ChainPayload, ChainTvl, DatasetKind,
    DimensionProtocol, ParentProtocol, ProtocolLite, ProtocolsResponse, ALL_CHAINS,
    BRIDGE_CATEGORIES,
};
pub use export::{export_grouped_csv, export_leaf_csv, write_csv_file, ExportError};
pub use expression::{
    parse_expression, BinaryOp, Expr, ExpressionCache, ExpressionError, EXPRESSION_CACHE_CAPACITY,
    MAX_EXPRESSION_DEPTH, MAX_EXPRESSION_TOKENS,
};
pub use fetch::{
    dataset_url, decode_protocols, fetch_chain_payloads, fetch_config_from_env, fetch_dataset,
    fetch_protocols, load_merge_inputs, overview_url, protocols_url, DatasetFetcher, FetchConfig,
    FetchError, ReqwestDatasetFetcher, DEFAULT_API_BASE, DEFAULT_DATASETS_BASE,
};
pub use filters::{
    apply_filters, filter_config, filters_by_category, filters_for_strategy, format_filter_value,
    row_matches, sanitize_filters, FilterCategory, FilterConfig, FilterFormat, FilterKind,
    FilterValue, TableFilters, ARRAY_FILTER_KEYS, FILTER_CONFIGS,
};
pub use grouping::{
    aggregate_metrics, build_hierarchy, grouping_fingerprint, grouping_option,
    grouping_option_for_headers, nodes_at_level, row_header_labels, sanitize_row_headers,
    sort_nodes, sort_nodes_by, GroupingCache, GroupingOption, NodeKind, RowHeader, UnifiedRowNode,
    DEFAULT_GROUPING_CACHE_CAPACITY, DEFAULT_ROW_HEADERS, PROTOCOL_GROUPING_OPTIONS,
    UNCATEGORIZED_LABEL, UNKNOWN_CHAIN_LABEL,
};
pub use item_config::{
    is_groupable_chart_type, BuilderMode, ChartBuilderConfig, ChartBuilderItem, ChartConfig,
    ChartGrouping, DashboardItemConfig, FilterMode, ItemMeta, MetricAggregator, MetricCompare,
    MetricConfig, MetricSubject, MetricSubjectType, MetricWindow, MultiChartConfig,
    ProtocolChartConfig, ProtocolsTableConfig, StablecoinAssetConfig, StablecoinsConfig,
    TableType, TextConfig, UnifiedTableConfig, UnifiedTableParams, YieldsConfig,
    GECKO_CHAIN_CHART_TYPES, GROUPABLE_CHART_TYPES,
};
pub use merge::{
    apply_dominance, format_protocols_list, format_protocols_list_in_order, group_protocols,
    merge_chain_breakdown, ExtraTvlSettings, FormattedProtocol, MergeInputs,
    LIQUID_STAKING_CATEGORY, MERGE_ORDER, REMOVED_CATEGORIES_FROM_CHAIN_TVL,
};
pub use metrics::{
    annualized_ratio, compute_share, derive_prev_from_change, finite, mcap_tvl_ratio,
    metric_aggregation, percent_change, percent_change_opt, round2, MetricAggregation,
    NumericMetrics, RatioKind, WeightedAccumulator, TVL_CHANGE_PAIRS, WEIGHTED_CHANGE_PAIRS,
};
pub use modal::{
    add_to_composer, build_submission, chain_change, chart_tab_change, default_metric_aggregator,
    initialize_from_edit_item, is_submit_disabled, main_tab_change, modal_reducer,
    protocol_change, remove_from_composer, tokens_change, CatalogChain, CatalogProtocol,
    ChartCreationMode, ChartMode, ChartTab, CombinedTableType, MainTab, ModalAction,
    ModalCatalog, ModalState, ProtocolOption, StablecoinMode, Submission, YieldPoolSelection,
    CUMULATIVE_METRIC_TYPES, MAX_SELECTED_TOKENS,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_source_selected, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError, SourceSelection, LOG_FORMAT_ENV, LOG_LEVEL_ENV,
    LOG_TARGET_ENV,
};
pub use strategy::{
    build_chain_rows, build_protocol_rows, protocol_metrics, uncovered_chains, ChainLoadingState,
    ChainOverview, NormalizedRow, PriorityChainData, ProtocolsStrategyParams, StrategyType,
    ALL_CHAINS_LABEL,
};
