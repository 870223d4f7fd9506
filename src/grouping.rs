//! Hierarchical grouping of normalized rows by ordered row headers.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chains::normalize_id;
use crate::columns::ColumnSort;
use crate::metrics::{
    annualized_ratio, finite, mcap_tvl_ratio, metric_aggregation, percent_change_opt,
    MetricAggregation, NumericMetrics, RatioKind, WeightedAccumulator,
};
use crate::strategy::{NormalizedRow, StrategyType};

pub const UNKNOWN_CHAIN_LABEL: &str = "Unknown";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";
pub const DEFAULT_GROUPING_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowHeader {
    ParentProtocol,
    Protocol,
    Chain,
    Category,
}

impl RowHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            RowHeader::ParentProtocol => "parent-protocol",
            RowHeader::Protocol => "protocol",
            RowHeader::Chain => "chain",
            RowHeader::Category => "category",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "parent-protocol" => Some(RowHeader::ParentProtocol),
            "protocol" => Some(RowHeader::Protocol),
            "chain" => Some(RowHeader::Chain),
            "category" => Some(RowHeader::Category),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RowHeader::Chain => "Chain",
            RowHeader::Category => "Category",
            RowHeader::ParentProtocol | RowHeader::Protocol => "Protocol",
        }
    }

    /// Label inside a joined hierarchy, where both protocol levels can appear.
    pub fn hierarchy_label(self) -> &'static str {
        match self {
            RowHeader::ParentProtocol => "Protocol Group",
            other => other.label(),
        }
    }
}

pub const DEFAULT_ROW_HEADERS: [RowHeader; 2] = [RowHeader::ParentProtocol, RowHeader::Protocol];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingOption {
    pub id: &'static str,
    pub label: &'static str,
    pub headers: &'static [RowHeader],
}

pub const PROTOCOL_GROUPING_OPTIONS: [GroupingOption; 5] = [
    GroupingOption {
        id: "parent-protocol",
        label: "Protocol Group › Protocol",
        headers: &[RowHeader::ParentProtocol, RowHeader::Protocol],
    },
    GroupingOption {
        id: "protocol-only",
        label: "Protocol only",
        headers: &[RowHeader::Protocol],
    },
    GroupingOption {
        id: "category-protocol",
        label: "Category › Protocol",
        headers: &[
            RowHeader::Category,
            RowHeader::ParentProtocol,
            RowHeader::Protocol,
        ],
    },
    GroupingOption {
        id: "chain-protocol",
        label: "Chain › Protocol",
        headers: &[
            RowHeader::Chain,
            RowHeader::ParentProtocol,
            RowHeader::Protocol,
        ],
    },
    GroupingOption {
        id: "chain-category-protocol",
        label: "Chain › Category › Protocol",
        headers: &[
            RowHeader::Chain,
            RowHeader::Category,
            RowHeader::ParentProtocol,
            RowHeader::Protocol,
        ],
    },
];

pub fn grouping_option(id: &str) -> Option<&'static GroupingOption> {
    PROTOCOL_GROUPING_OPTIONS.iter().find(|option| option.id == id)
}

pub fn grouping_option_for_headers(headers: &[RowHeader]) -> Option<&'static GroupingOption> {
    PROTOCOL_GROUPING_OPTIONS
        .iter()
        .find(|option| option.headers == headers)
}

/// Header labels joined for display, e.g. `Chain › Protocol Group › Protocol`.
pub fn row_header_labels(headers: &[RowHeader]) -> String {
    headers
        .iter()
        .map(|header| header.hierarchy_label())
        .collect::<Vec<_>>()
        .join(" › ")
}

/// Parses, dedupes and orders row headers for a strategy.
///
/// Protocol tables always end in `protocol`; chain tables only group by `chain`.
pub fn sanitize_row_headers<S: AsRef<str>>(raw: &[S], strategy: StrategyType) -> Vec<RowHeader> {
    let mut headers: Vec<RowHeader> = Vec::new();
    for value in raw {
        match RowHeader::parse(value.as_ref()) {
            Some(header) if !headers.contains(&header) => headers.push(header),
            Some(_) => {}
            None => debug!(
                component = "grouping",
                event = "grouping.row_header.dropped",
                header = value.as_ref()
            ),
        }
    }

    match strategy {
        StrategyType::Chains => vec![RowHeader::Chain],
        StrategyType::Protocols if headers.is_empty() => DEFAULT_ROW_HEADERS.to_vec(),
        StrategyType::Protocols => {
            headers.retain(|header| *header != RowHeader::Protocol);
            headers.push(RowHeader::Protocol);
            headers
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRowNode {
    pub id: String,
    pub label: String,
    pub depth: usize,
    pub kind: NodeKind,
    pub header: RowHeader,
    pub icon_url: Option<String>,
    pub row_count: usize,
    pub metrics: NumericMetrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UnifiedRowNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<NormalizedRow>,
}

impl UnifiedRowNode {
    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }

    /// Leaf rows of this subtree in display order.
    pub fn leaves(&self) -> Vec<&NormalizedRow> {
        let mut out = Vec::new();
        collect_leaves(std::slice::from_ref(self), &mut out);
        out
    }
}

fn collect_leaves<'a>(nodes: &'a [UnifiedRowNode], out: &mut Vec<&'a NormalizedRow>) {
    for node in nodes {
        match &node.original {
            Some(row) => out.push(row),
            None => collect_leaves(&node.children, out),
        }
    }
}

/// Rolls up a set of metric bags.
///
/// Additive metrics ignore missing values and stay `None` only when nothing contributed. TVL
/// changes come from the summed current and previous TVL. Other changes are weighted by their
/// volume metric. Valuation ratios are recomputed from the summed components.
pub fn aggregate_metrics<'a, I>(metrics: I) -> NumericMetrics
where
    I: IntoIterator<Item = &'a NumericMetrics>,
{
    let items: Vec<&NumericMetrics> = metrics.into_iter().collect();
    let sum = |key: &str| -> Option<f64> {
        let mut acc = None;
        for item in &items {
            if let Some(value) = item.get(key).and_then(finite) {
                acc = Some(acc.unwrap_or(0.0) + value);
            }
        }
        acc
    };

    let mut out = NumericMetrics::default();
    for key in NumericMetrics::KEYS {
        let value = match metric_aggregation(key) {
            MetricAggregation::Sum => sum(key),
            MetricAggregation::ChangeFromPrevious { current, previous } => {
                percent_change_opt(sum(current), sum(previous))
            }
            MetricAggregation::WeightedChange { weight } => {
                let mut acc = WeightedAccumulator::default();
                for item in &items {
                    acc.add(item.get(weight), item.get(key));
                }
                acc.value()
            }
            MetricAggregation::Ratio(RatioKind::McapTvl) => mcap_tvl_ratio(sum("mcap"), sum("tvl")),
            MetricAggregation::Ratio(RatioKind::PriceToFees) => {
                annualized_ratio(sum("mcap"), sum("fees_30d"))
            }
            MetricAggregation::Ratio(RatioKind::PriceToSales) => {
                annualized_ratio(sum("mcap"), sum("revenue_30d"))
            }
        };
        out.set(key, value);
    }
    out
}

fn compare_optional_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// TVL descending, ties by label, applied recursively.
pub fn sort_nodes(nodes: &mut [UnifiedRowNode]) {
    nodes.sort_by(|a, b| {
        compare_optional_desc(a.metrics.tvl, b.metrics.tvl)
            .then_with(|| compare_labels(&a.label, &b.label))
    });
    for node in nodes.iter_mut() {
        sort_nodes(&mut node.children);
    }
}

/// Sorts siblings by a column; `name` sorts by label, unknown ids keep the default order.
pub fn sort_nodes_by(nodes: &mut [UnifiedRowNode], sort: &ColumnSort) {
    let by_label = sort.id == "name";
    if !by_label && !NumericMetrics::is_metric_key(&sort.id) {
        sort_nodes(nodes);
        return;
    }
    nodes.sort_by(|a, b| {
        let primary = if by_label {
            compare_labels(&a.label, &b.label)
        } else {
            let (x, y) = (a.metrics.get(&sort.id), b.metrics.get(&sort.id));
            match (x, y) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            }
        };
        let primary = if sort.desc { primary.reverse() } else { primary };
        primary.then_with(|| compare_labels(&a.label, &b.label))
    });
    for node in nodes.iter_mut() {
        sort_nodes_by(&mut node.children, sort);
    }
}

fn leaf(row: &NormalizedRow, depth: usize, prefix: &str) -> UnifiedRowNode {
    UnifiedRowNode {
        id: format!("{prefix}{}", row.id),
        label: row.display_name.clone().unwrap_or_else(|| row.name.clone()),
        depth,
        kind: NodeKind::Leaf,
        header: RowHeader::Protocol,
        icon_url: row.logo.clone(),
        row_count: 1,
        metrics: row.metrics.clone(),
        children: Vec::new(),
        original: Some(row.clone()),
    }
}

struct Partition<'a> {
    key: String,
    label: String,
    icon_url: Option<String>,
    rows: Vec<&'a NormalizedRow>,
}

fn partition<'a>(
    rows: &[&'a NormalizedRow],
    key_of: impl Fn(&NormalizedRow) -> (String, String, Option<String>),
) -> Vec<Partition<'a>> {
    let mut parts: Vec<Partition<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows.iter().copied() {
        let (key, label, icon_url) = key_of(row);
        match index.get(&key) {
            Some(position) => parts[*position].rows.push(row),
            None => {
                index.insert(key.clone(), parts.len());
                parts.push(Partition {
                    key,
                    label,
                    icon_url,
                    rows: vec![row],
                });
            }
        }
    }
    parts
}

fn group_node(
    part: Partition<'_>,
    header: RowHeader,
    rest: &[RowHeader],
    depth: usize,
    prefix: &str,
) -> UnifiedRowNode {
    let id = format!("{prefix}{}:{}", header.as_str(), part.key);
    let children = build_level(&part.rows, rest, depth + 1, &format!("{id}/"));
    UnifiedRowNode {
        metrics: aggregate_metrics(part.rows.iter().map(|row| &row.metrics)),
        row_count: part.rows.len(),
        id,
        label: part.label,
        depth,
        kind: NodeKind::Group,
        header,
        icon_url: part.icon_url,
        children,
        original: None,
    }
}

fn build_level(
    rows: &[&NormalizedRow],
    headers: &[RowHeader],
    depth: usize,
    prefix: &str,
) -> Vec<UnifiedRowNode> {
    let Some((header, rest)) = headers.split_first() else {
        return rows.iter().map(|row| leaf(row, depth, prefix)).collect();
    };

    match header {
        RowHeader::Protocol => rows.iter().map(|row| leaf(row, depth, prefix)).collect(),
        RowHeader::Chain => partition(rows, |row| {
            let label = row
                .chain
                .clone()
                .unwrap_or_else(|| UNKNOWN_CHAIN_LABEL.to_string());
            (normalize_id(&label), label, None)
        })
        .into_iter()
        .map(|part| group_node(part, *header, rest, depth, prefix))
        .collect(),
        RowHeader::Category => partition(rows, |row| {
            let label = row
                .category
                .clone()
                .filter(|category| !category.trim().is_empty())
                .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string());
            (normalize_id(&label), label, None)
        })
        .into_iter()
        .map(|part| group_node(part, *header, rest, depth, prefix))
        .collect(),
        RowHeader::ParentProtocol => {
            let (with_parent, orphans): (Vec<&NormalizedRow>, Vec<&NormalizedRow>) = rows
                .iter()
                .copied()
                .partition(|row| row.parent_protocol_id.is_some());

            let mut nodes = Vec::new();
            let mut pass_through = orphans;
            let parts = partition(&with_parent, |row| {
                let id = row.parent_protocol_id.clone().unwrap_or_default();
                let label = row.parent_protocol_name.clone().unwrap_or_else(|| id.clone());
                (id, label, row.parent_protocol_logo.clone())
            });
            for part in parts {
                if part.rows.len() < 2 {
                    pass_through.extend(part.rows);
                    continue;
                }
                nodes.push(group_node(part, *header, rest, depth, prefix));
            }
            nodes.extend(build_level(&pass_through, rest, depth, prefix));
            nodes
        }
    }
}

/// Builds the sorted row tree for `headers`.
pub fn build_hierarchy(rows: &[NormalizedRow], headers: &[RowHeader]) -> Vec<UnifiedRowNode> {
    let refs: Vec<&NormalizedRow> = rows.iter().collect();
    let mut nodes = build_level(&refs, headers, 0, "");
    sort_nodes(&mut nodes);
    debug!(
        component = "grouping",
        event = "grouping.hierarchy.built",
        row_count = rows.len(),
        top_level_count = nodes.len(),
        headers = %row_header_labels(headers)
    );
    nodes
}

/// Every node at `level` (0 = top), used for grouped exports.
pub fn nodes_at_level(nodes: &[UnifiedRowNode], level: usize) -> Vec<&UnifiedRowNode> {
    let mut out = Vec::new();
    collect_level(nodes, level, &mut out);
    out
}

fn collect_level<'a>(nodes: &'a [UnifiedRowNode], level: usize, out: &mut Vec<&'a UnifiedRowNode>) {
    for node in nodes {
        if node.depth == level {
            out.push(node);
        } else if node.depth < level {
            collect_level(&node.children, level, out);
        }
    }
}

/// Stable content fingerprint of a row set and its grouping. Covers every field a node can
/// carry, including the cloned leaf row.
pub fn grouping_fingerprint(rows: &[NormalizedRow], headers: &[RowHeader]) -> String {
    let mut hasher = Sha256::new();
    hasher.update("headers:");
    for header in headers {
        hasher.update(header.as_str());
        hasher.update(",");
    }
    hasher.update(";rows:");
    for row in rows {
        hash_str(&mut hasher, &row.id);
        hash_str(&mut hasher, &row.name);
        for field in [
            &row.display_name,
            &row.protocol_id,
            &row.logo,
            &row.category,
            &row.chain,
            &row.parent_protocol_id,
            &row.parent_protocol_name,
            &row.parent_protocol_logo,
        ] {
            match field {
                Some(value) => hash_str(&mut hasher, value),
                None => hasher.update("-"),
            }
        }
        for list in [&row.chains, &row.oracles] {
            hasher.update((list.len() as u64).to_le_bytes());
            for item in list {
                hash_str(&mut hasher, item);
            }
        }
        hasher.update(row.strategy_type.as_str());
        for key in NumericMetrics::KEYS {
            match row.metrics.get(key) {
                Some(value) => hasher.update(value.to_bits().to_le_bytes()),
                None => hasher.update("-"),
            }
        }
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn hash_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Bounded memo of built hierarchies keyed by `grouping_fingerprint`.
#[derive(Debug)]
pub struct GroupingCache {
    capacity: usize,
    entries: HashMap<String, Vec<UnifiedRowNode>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Default for GroupingCache {
    fn default() -> Self {
        Self::new(DEFAULT_GROUPING_CACHE_CAPACITY)
    }
}

impl GroupingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get_or_build(&mut self, rows: &[NormalizedRow], headers: &[RowHeader]) -> Vec<UnifiedRowNode> {
        let key = grouping_fingerprint(rows, headers);
        if let Some(nodes) = self.entries.get(&key) {
            self.hits += 1;
            return nodes.clone();
        }

        self.misses += 1;
        let nodes = build_hierarchy(rows, headers);
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, nodes.clone());
        nodes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
