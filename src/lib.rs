//! Unsupervised detection of anomalous accounts in a transaction graph.
//!
//! Transactions are projected onto an entity graph (accounts linked to the
//! devices, IP addresses and merchants they use), a graph attention
//! autoencoder learns to reconstruct each node's attributes, and nodes whose
//! reconstruction error exceeds a threshold are reported.

pub mod attention;
pub mod autoencoder;
pub mod config;
pub mod csv_reader;
pub mod error;
pub mod graph_builder;
pub mod normalizer;
pub mod optimizer;
pub mod pipeline;
pub mod scorer;
pub mod trainer;
pub mod visualize;

#[cfg(test)]
mod tests;

pub use config::{FeatureColumns, PipelineConfig};
pub use error::{DetectionError, Result};
pub use pipeline::{run_pipeline, PipelineReport};
