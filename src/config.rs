//! Pipeline configuration.
//!
//! Every option has a default, so an empty JSON object (or no file at all)
//! yields the stock pipeline.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_NUMERIC_COLUMNS: [&str; 5] = [
    "TransactionAmount",
    "CustomerAge",
    "TransactionDuration",
    "LoginAttempts",
    "AccountBalance",
];

/// Ordered list of numeric attribute columns.
///
/// Fixed once the pipeline is constructed; the reader, the normalizer and the
/// graph builder all index attribute vectors by position in this list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FeatureColumns(Vec<String>);

impl FeatureColumns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for FeatureColumns {
    fn default() -> Self {
        Self::new(DEFAULT_NUMERIC_COLUMNS)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of each attention head in the first encoder layer
    pub hidden_channels: usize,
    pub embedding_dim: usize,
    pub heads: usize,
    /// Seed for parameter initialization
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_channels: 16,
            embedding_dim: 8,
            heads: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Emit an (epoch, loss) observation whenever `epoch % log_every == 0`
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.005,
            log_every: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub iterations: usize,
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub numeric_columns: FeatureColumns,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    /// Nodes scoring strictly above this are flagged
    pub threshold: f64,
    pub layout: LayoutConfig,
}

impl PipelineConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Load a JSON config file; absent keys fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            numeric_columns: FeatureColumns::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            threshold: 1.0,
            layout: LayoutConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.model.hidden_channels, 16);
        assert_eq!(config.model.embedding_dim, 8);
        assert_eq!(config.model.heads, 2);
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.training.learning_rate, 0.005);
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.numeric_columns.len(), 5);
        assert_eq!(config.numeric_columns.names()[0], "TransactionAmount");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "threshold": 0.5, "training": { "epochs": 20 }, "numeric_columns": ["Amount"] }"#,
        )
        .unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.learning_rate, 0.005);
        assert_eq!(config.model.heads, 2);
        assert_eq!(config.numeric_columns, FeatureColumns::new(["Amount"]));
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.layout.seed, 42);
    }
}
