//! Plot-ready view of the graph: positions, edges and a colour class per
//! node. Nothing here feeds back into scoring.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::Serialize;

use crate::config::LayoutConfig;
use crate::error::{DetectionError, Result};
use crate::graph_builder::TransactionGraph;
use crate::scorer::Anomaly;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeClass {
    Anomalous,
    Normal,
}

impl NodeClass {
    pub fn color(&self) -> &'static str {
        match self {
            NodeClass::Anomalous => "red",
            NodeClass::Normal => "green",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderNode {
    pub index: usize,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub class: NodeClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphRender {
    pub title: String,
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<(usize, usize)>,
}

impl GraphRender {
    pub fn anomalous_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.class == NodeClass::Anomalous)
            .count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(DetectionError::from)
    }
}

/// Fruchterman-Reingold force-directed layout, rescaled so the positions
/// are centred on the origin and fit in `[-1, 1]`.
pub fn spring_layout(
    num_nodes: usize,
    edges: &[(usize, usize)],
    config: &LayoutConfig,
) -> Vec<(f64, f64)> {
    let mut rng = Pcg64Mcg::seed_from_u64(config.seed);
    let mut pos: Vec<(f64, f64)> = (0..num_nodes)
        .map(|_| (rng.gen::<f64>(), rng.gen::<f64>()))
        .collect();
    if num_nodes < 2 {
        return pos.into_iter().map(|_| (0.0, 0.0)).collect();
    }

    let mut adjacent = vec![vec![false; num_nodes]; num_nodes];
    for &(a, b) in edges {
        adjacent[a][b] = true;
        adjacent[b][a] = true;
    }

    // Optimal distance between nodes
    let k = (1.0 / num_nodes as f64).sqrt();
    let mut temperature = span(pos.iter().map(|p| p.0)).max(span(pos.iter().map(|p| p.1))) * 0.1;
    let cooling = temperature / (config.iterations + 1) as f64;

    for _ in 0..config.iterations {
        let mut displacement = vec![(0.0, 0.0); num_nodes];
        for i in 0..num_nodes {
            for j in 0..num_nodes {
                if i == j {
                    continue;
                }
                let dx = pos[i].0 - pos[j].0;
                let dy = pos[i].1 - pos[j].1;
                let distance = (dx * dx + dy * dy).sqrt().max(0.01);
                let attraction = if adjacent[i][j] { distance / k } else { 0.0 };
                let force = k * k / (distance * distance) - attraction;
                displacement[i].0 += dx * force;
                displacement[i].1 += dy * force;
            }
        }
        for (p, d) in pos.iter_mut().zip(&displacement) {
            let length = (d.0 * d.0 + d.1 * d.1).sqrt().max(0.01);
            p.0 += d.0 * temperature / length;
            p.1 += d.1 * temperature / length;
        }
        temperature -= cooling;
    }

    rescale(pos)
}

fn span(values: impl Iterator<Item = f64>) -> f64 {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    hi - lo
}

fn rescale(pos: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let n = pos.len() as f64;
    let (cx, cy) = pos
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.0, sy + p.1));
    let (cx, cy) = (cx / n, cy / n);
    let limit = pos
        .iter()
        .map(|p| (p.0 - cx).abs().max((p.1 - cy).abs()))
        .fold(0.0, f64::max);
    let limit = if limit > 0.0 { limit } else { 1.0 };
    pos.into_iter()
        .map(|p| ((p.0 - cx) / limit, (p.1 - cy) / limit))
        .collect()
}

pub fn render_graph(
    graph: &TransactionGraph,
    anomalies: &[Anomaly],
    config: &LayoutConfig,
) -> Result<GraphRender> {
    let edges = graph.edges();
    let positions = spring_layout(graph.node_count(), &edges, config);
    let flagged: HashSet<&str> = anomalies.iter().map(|a| a.identifier.as_str()).collect();

    let nodes = positions
        .into_iter()
        .enumerate()
        .map(|(index, (x, y))| {
            let label = graph.nodes.identifier(index)?.to_string();
            let class = if flagged.contains(label.as_str()) {
                NodeClass::Anomalous
            } else {
                NodeClass::Normal
            };
            Ok(RenderNode {
                index,
                label,
                x,
                y,
                class,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(GraphRender {
        title: "Interactive Graph with Anomaly Highlighting".to_string(),
        nodes,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureColumns;
    use crate::csv_reader::TransactionRecord;
    use crate::graph_builder::build_graph;

    fn graph() -> TransactionGraph {
        let records = vec![
            TransactionRecord::new("A1", "D1", "I1", "M1", vec![Some(1.0)]),
            TransactionRecord::new("A2", "D1", "I2", "M2", vec![Some(2.0)]),
        ];
        build_graph(&records, &FeatureColumns::new(["a"])).unwrap()
    }

    #[test]
    fn test_layout_is_seeded_and_bounded() {
        let edges = [(0, 1), (0, 2), (3, 1)];
        let config = LayoutConfig::default();
        let first = spring_layout(4, &edges, &config);
        let second = spring_layout(4, &edges, &config);
        assert_eq!(first, second);
        for (x, y) in &first {
            assert!(x.abs() <= 1.0 + 1e-12 && y.abs() <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_render_marks_flagged_nodes() {
        let graph = graph();
        let anomalies = vec![Anomaly {
            index: 0,
            identifier: "A1".to_string(),
            score: 2.5,
        }];
        let render = render_graph(&graph, &anomalies, &LayoutConfig::default()).unwrap();

        assert_eq!(render.nodes.len(), graph.node_count());
        assert_eq!(render.edges.len(), 6);
        assert_eq!(render.anomalous_count(), 1);
        assert_eq!(render.nodes[0].class, NodeClass::Anomalous);
        assert_eq!(render.nodes[0].class.color(), "red");
        assert_eq!(render.nodes[1].class.color(), "green");
    }

    #[test]
    fn test_render_json() {
        let render = render_graph(&graph(), &[], &LayoutConfig::default()).unwrap();
        let json = render.to_json().unwrap();
        assert!(json.contains("\"class\": \"normal\""));
        assert!(!json.contains("anomalous"));
    }
}
