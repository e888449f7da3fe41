// Entry point for graph-based fraud detection. Loads transactions, trains the
// graph autoencoder and prints the accounts it cannot reconstruct.
use std::env;

use anyhow::{Context, Result};
use fraud_graph::csv_reader::read_transactions;
use fraud_graph::scorer::Anomaly;
use fraud_graph::trainer::TrainingReport;
use fraud_graph::{run_pipeline, PipelineConfig};

const CSV_FILE_PATH: &str = "bank_transactions_data_2.csv";

// Picks the CSV path (first positional argument) and an optional
// `--config <file>` from the command line
fn parse_args(args: &[String]) -> (String, Option<String>) {
    let mut csv_path = None;
    let mut config_path = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config_path = iter.next().cloned();
        } else if csv_path.is_none() {
            csv_path = Some(arg.clone());
        } else {
            log::warn!("Ignoring extra argument: {arg}");
        }
    }
    (csv_path.unwrap_or_else(|| CSV_FILE_PATH.to_string()), config_path)
}

fn print_loss_trace(report: &TrainingReport) {
    for observation in &report.observations {
        println!("Epoch {}, Loss: {:.4}", observation.epoch, observation.loss);
    }
}

fn print_anomalies(anomalies: &[Anomaly], threshold: f64) {
    println!("\nAnomalous Accounts Detected (score > {threshold}):");
    for (i, anomaly) in anomalies.iter().enumerate() {
        println!("{}. Account {} (score: {:.4})", i + 1, anomaly.identifier, anomaly.score);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let (csv_path, config_path) = parse_args(&args);

    let config = match config_path {
        Some(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => PipelineConfig::default(),
    };

    let records = read_transactions(&csv_path, &config.numeric_columns)
        .with_context(|| format!("failed to read transactions from {csv_path}"))?;
    let threshold = config.threshold;
    let report = run_pipeline(records, &config).context("detection pipeline failed")?;

    println!("Total distinct nodes: {}", report.node_count());
    print_loss_trace(&report.training);
    print_anomalies(&report.anomalies, threshold);

    log::info!(
        "render ready: {} nodes, {} edges, {} highlighted",
        report.render.nodes.len(),
        report.render.edges.len(),
        report.render.anomalous_count()
    );
    log::trace!("{}", report.render.to_json()?);

    Ok(())
}
