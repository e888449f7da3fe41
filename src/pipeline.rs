//! End-to-end wiring: normalize, build the graph, train, score, render.

use ndarray::Array1;

use crate::autoencoder::Autoencoder;
use crate::config::PipelineConfig;
use crate::csv_reader::TransactionRecord;
use crate::error::Result;
use crate::graph_builder::{build_graph, TransactionGraph};
use crate::normalizer::standardize;
use crate::scorer::{anomaly_scores, select_anomalies, Anomaly};
use crate::trainer::{Trainer, TrainingReport};
use crate::visualize::{render_graph, GraphRender};

pub struct PipelineReport {
    pub graph: TransactionGraph,
    pub model: Autoencoder,
    pub training: TrainingReport,
    pub scores: Array1<f64>,
    pub anomalies: Vec<Anomaly>,
    pub render: GraphRender,
}

impl PipelineReport {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

pub fn run_pipeline(
    mut records: Vec<TransactionRecord>,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    standardize(&mut records);
    let graph = build_graph(&records, &config.numeric_columns)?;

    let mut model = Autoencoder::new(graph.feature_width(), &config.model);
    let training = Trainer::new(config.training.clone()).train(&mut model, &graph)?;

    let scores = anomaly_scores(&model, &graph)?;
    let anomalies = select_anomalies(&graph, &scores, config.threshold)?;
    log::info!(
        "{} of {} nodes flagged at threshold {}",
        anomalies.len(),
        graph.node_count(),
        config.threshold
    );

    let render = render_graph(&graph, &anomalies, &config.layout)?;

    Ok(PipelineReport {
        graph,
        model,
        training,
        scores,
        anomalies,
        render,
    })
}
