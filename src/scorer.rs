use ndarray::Array1;

use crate::attention::Neighborhoods;
use crate::autoencoder::{row_mse, Autoencoder};
use crate::error::Result;
use crate::graph_builder::TransactionGraph;
use crate::trainer::check_width;

/// A node whose reconstruction error exceeded the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub index: usize,
    pub identifier: String,
    pub score: f64,
}

/// Per-node mean squared reconstruction error from a single frozen forward
/// pass.
pub fn anomaly_scores(model: &Autoencoder, graph: &TransactionGraph) -> Result<Array1<f64>> {
    check_width(model, graph)?;
    let nbrs = Neighborhoods::from_graph(graph);
    let out = model.forward(&graph.features, &nbrs);
    Ok(row_mse(&graph.features, &out.reconstructed))
}

/// Indices with `score > threshold`, ascending. Scores equal to the threshold
/// are not flagged.
pub fn flag_indices(scores: &Array1<f64>, threshold: f64) -> Vec<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > threshold)
        .map(|(i, _)| i)
        .collect()
}

pub fn select_anomalies(
    graph: &TransactionGraph,
    scores: &Array1<f64>,
    threshold: f64,
) -> Result<Vec<Anomaly>> {
    flag_indices(scores, threshold)
        .into_iter()
        .map(|index| {
            Ok(Anomaly {
                index,
                identifier: graph.nodes.identifier(index)?.to_string(),
                score: scores[index],
            })
        })
        .collect()
}

pub fn detect_anomalies(
    model: &Autoencoder,
    graph: &TransactionGraph,
    threshold: f64,
) -> Result<Vec<Anomaly>> {
    let scores = anomaly_scores(model, graph)?;
    let anomalies = select_anomalies(graph, &scores, threshold)?;

    log::info!("{} of {} nodes scored above {threshold}", anomalies.len(), scores.len());
    for (rank, anomaly) in anomalies.iter().enumerate() {
        log::debug!(
            "{}. Account {} (score: {:.4})",
            rank + 1,
            anomaly.identifier,
            anomaly.score
        );
    }
    Ok(anomalies)
}
