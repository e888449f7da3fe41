//! Transaction records to an account-centred entity graph.
//!
//! Accounts, devices, IP addresses and merchants all share one node
//! namespace: a raw value seen in two different roles is the same node.
//! Edges only ever join the account of a record to the device, IP and
//! merchant of that same record.

use std::collections::HashMap;

use ndarray::Array2;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::config::FeatureColumns;
use crate::csv_reader::TransactionRecord;
use crate::error::{DetectionError, Result};

/// Bijection between raw identifiers and dense node indices in `[0, N)`.
///
/// Indices are handed out in first-seen order and never reassigned.
#[derive(Debug, Clone, Default)]
pub struct NodeIndexMap {
    index: HashMap<String, usize>,
    identifiers: Vec<String>,
}

impl NodeIndexMap {
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn index_of(&self, identifier: &str) -> Option<usize> {
        self.index.get(identifier).copied()
    }

    /// Reverse lookup. An index outside the map is an invariant violation.
    pub fn identifier(&self, index: usize) -> Result<&str> {
        self.identifiers
            .get(index)
            .map(String::as_str)
            .ok_or(DetectionError::UnknownNode(index))
    }

    /// Identifiers in index order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    fn get_or_insert(&mut self, identifier: &str) -> (usize, bool) {
        if let Some(&idx) = self.index.get(identifier) {
            return (idx, false);
        }
        let idx = self.identifiers.len();
        self.index.insert(identifier.to_string(), idx);
        self.identifiers.push(identifier.to_string());
        (idx, true)
    }
}

/// Output of graph construction; read-only from here on.
#[derive(Debug, Clone)]
pub struct TransactionGraph {
    pub nodes: NodeIndexMap,
    pub graph: UnGraph<(), ()>,
    /// Shape `(N, K)`; rows of nodes never seen as an account are zero.
    pub features: Array2<f64>,
    /// `true` for nodes whose identifier appeared as an AccountID
    pub is_account: Vec<bool>,
}

impl TransactionGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn feature_width(&self) -> usize {
        self.features.ncols()
    }

    /// Distinct undirected edges as `(a, b)` node index pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (a.index(), b.index()))
            .collect()
    }
}

pub struct GraphBuilder {
    columns: FeatureColumns,
    nodes: NodeIndexMap,
    graph: UnGraph<(), ()>,
    // Most recent attribute vector per account node
    latest_features: HashMap<usize, Vec<f64>>,
    records_seen: usize,
}

impl GraphBuilder {
    pub fn new(columns: FeatureColumns) -> Self {
        Self {
            columns,
            nodes: NodeIndexMap::default(),
            graph: UnGraph::default(),
            latest_features: HashMap::new(),
            records_seen: 0,
        }
    }

    /// Index for `identifier`, assigning the next free one on first sight.
    /// Calling it again with the same identifier returns the same index.
    pub fn get_or_create_index(&mut self, identifier: &str) -> usize {
        let (idx, created) = self.nodes.get_or_insert(identifier);
        if created {
            let node = self.graph.add_node(());
            debug_assert_eq!(node.index(), idx);
        }
        idx
    }

    pub fn add_record(&mut self, record: &TransactionRecord) -> Result<()> {
        if record.attributes.len() != self.columns.len() {
            return Err(DetectionError::FeatureWidth {
                expected: self.columns.len(),
                actual: record.attributes.len(),
            });
        }

        let ids = &record.ids;
        let account = self.get_or_create_index(&ids.account_id);
        let device = self.get_or_create_index(&ids.device_id);
        let ip = self.get_or_create_index(&ids.ip_address);
        let merchant = self.get_or_create_index(&ids.merchant_id);

        for other in [device, ip, merchant] {
            // update_edge keeps the graph simple
            self.graph
                .update_edge(NodeIndex::new(account), NodeIndex::new(other), ());
        }

        // Last write wins: the most recent transaction represents the account.
        self.latest_features
            .insert(account, record.to_feature_vector());
        self.records_seen += 1;
        Ok(())
    }

    pub fn add_records<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        for record in records {
            self.add_record(record)?;
        }
        Ok(())
    }

    pub fn build(self) -> Result<TransactionGraph> {
        if self.records_seen == 0 {
            return Err(DetectionError::EmptyRecords);
        }
        let n = self.nodes.len();
        if n < 2 {
            return Err(DetectionError::TooFewNodes { nodes: n });
        }

        let mut features = Array2::<f64>::zeros((n, self.columns.len()));
        let mut is_account = vec![false; n];
        for (&idx, values) in &self.latest_features {
            for (j, &value) in values.iter().enumerate() {
                features[[idx, j]] = value;
            }
            is_account[idx] = true;
        }

        log::info!(
            "built transaction graph: {} nodes, {} edges, {} accounts",
            n,
            self.graph.edge_count(),
            self.latest_features.len()
        );

        Ok(TransactionGraph {
            nodes: self.nodes,
            graph: self.graph,
            features,
            is_account,
        })
    }
}

pub fn build_graph(
    records: &[TransactionRecord],
    columns: &FeatureColumns,
) -> Result<TransactionGraph> {
    let mut builder = GraphBuilder::new(columns.clone());
    builder.add_records(records)?;
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn amount(account: &str, device: &str, ip: &str, merchant: &str, value: f64) -> TransactionRecord {
        TransactionRecord::new(account, device, ip, merchant, vec![Some(value)])
    }

    fn amount_columns() -> FeatureColumns {
        FeatureColumns::new(["TransactionAmount"])
    }

    fn example_records() -> Vec<TransactionRecord> {
        vec![
            amount("A1", "D1", "I1", "M1", 100.0),
            amount("A1", "D2", "I1", "M2", 500.0),
            amount("A2", "D1", "I2", "M1", 10.0),
        ]
    }

    fn edge_set(graph: &TransactionGraph) -> HashSet<(usize, usize)> {
        graph
            .edges()
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect()
    }

    #[test]
    fn test_example_graph() {
        let graph = build_graph(&example_records(), &amount_columns()).unwrap();
        let ids: Vec<&str> = graph.nodes.identifiers().iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["A1", "D1", "I1", "M1", "D2", "M2", "A2", "I2"]);
        assert_eq!(graph.node_count(), 8);
        assert_eq!(graph.graph.edge_count(), 8, "duplicate A1-I1 collapses");

        let idx = |id: &str| graph.nodes.index_of(id).unwrap();
        let expected: HashSet<(usize, usize)> = [
            ("A1", "D1"),
            ("A1", "I1"),
            ("A1", "M1"),
            ("A1", "D2"),
            ("A1", "M2"),
            ("A2", "D1"),
            ("A2", "I2"),
            ("A2", "M1"),
        ]
        .iter()
        .map(|(a, b)| (idx(a).min(idx(b)), idx(a).max(idx(b))))
        .collect();
        assert_eq!(edge_set(&graph), expected);

        assert_eq!(graph.features[[idx("A1"), 0]], 500.0, "last write wins");
        assert_eq!(graph.features[[idx("A2"), 0]], 10.0);
    }

    #[test]
    fn test_index_map_is_bijection() {
        let graph = build_graph(&example_records(), &amount_columns()).unwrap();
        for (i, id) in graph.nodes.identifiers().iter().enumerate() {
            assert_eq!(graph.nodes.index_of(id), Some(i));
            assert_eq!(graph.nodes.identifier(i).unwrap(), id);
        }
        assert_eq!(graph.graph.node_count(), graph.nodes.len());
    }

    #[test]
    fn test_non_account_rows_are_zero() {
        let graph = build_graph(&example_records(), &amount_columns()).unwrap();
        for (i, id) in graph.nodes.identifiers().iter().enumerate() {
            if !id.starts_with('A') {
                assert!(!graph.is_account[i]);
                assert!(graph.features.row(i).iter().all(|&v| v == 0.0), "row of {id}");
            }
        }
    }

    #[test]
    fn test_edges_touch_an_account() {
        let records = example_records();
        let graph = build_graph(&records, &amount_columns()).unwrap();
        for (a, b) in graph.edges() {
            let (a_id, b_id) = (
                graph.nodes.identifier(a).unwrap(),
                graph.nodes.identifier(b).unwrap(),
            );
            let found = records.iter().any(|r| {
                let others = [&r.ids.device_id, &r.ids.ip_address, &r.ids.merchant_id];
                (r.ids.account_id == a_id && others.iter().any(|o| *o == b_id))
                    || (r.ids.account_id == b_id && others.iter().any(|o| *o == a_id))
            });
            assert!(found, "edge {a_id}-{b_id} not derived from a single record");
        }
    }

    #[test]
    fn test_shared_value_across_roles_is_one_node() {
        let records = vec![
            amount("A1", "X", "I1", "M1", 1.0),
            amount("A2", "D2", "I2", "X", 2.0),
        ];
        let graph = build_graph(&records, &amount_columns()).unwrap();
        assert_eq!(graph.node_count(), 7);
        let x = graph.nodes.index_of("X").unwrap();
        assert_eq!(graph.graph.neighbors(NodeIndex::new(x)).count(), 2);
    }

    #[test]
    fn test_self_loop_when_roles_share_value() {
        let records = vec![amount("S", "S", "I1", "M1", 1.0)];
        let graph = build_graph(&records, &amount_columns()).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert!(graph.edges().contains(&(0, 0)));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut builder = GraphBuilder::new(amount_columns());
        assert_eq!(builder.get_or_create_index("a"), 0);
        assert_eq!(builder.get_or_create_index("b"), 1);
        assert_eq!(builder.get_or_create_index("a"), 0);
    }

    #[test]
    fn test_missing_attributes_become_zero() {
        let records = vec![
            TransactionRecord::new("A1", "D1", "I1", "M1", vec![None]),
            TransactionRecord::new("A2", "D1", "I1", "M1", vec![Some(f64::NAN)]),
        ];
        let graph = build_graph(&records, &amount_columns()).unwrap();
        assert!(graph.features.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reverse_lookup_out_of_range() {
        let graph = build_graph(&example_records(), &amount_columns()).unwrap();
        assert!(matches!(
            graph.nodes.identifier(8),
            Err(DetectionError::UnknownNode(8))
        ));
    }

    #[test]
    fn test_empty_records_fail() {
        let err = build_graph(&[], &amount_columns()).unwrap_err();
        assert!(matches!(err, DetectionError::EmptyRecords));
    }

    #[test]
    fn test_single_node_fails() {
        let records = vec![amount("Z", "Z", "Z", "Z", 1.0)];
        let err = build_graph(&records, &amount_columns()).unwrap_err();
        assert!(matches!(err, DetectionError::TooFewNodes { nodes: 1 }));
    }

    #[test]
    fn test_attribute_width_mismatch() {
        let mut builder = GraphBuilder::new(FeatureColumns::default());
        let err = builder
            .add_record(&amount("A", "D", "I", "M", 1.0))
            .unwrap_err();
        assert!(matches!(err, DetectionError::FeatureWidth { expected: 5, actual: 1 }));
    }
}
