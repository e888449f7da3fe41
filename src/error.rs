use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Required column '{name}' not found in input header")]
    MissingColumn { name: String },

    #[error("No transaction records to build a graph from")]
    EmptyRecords,

    #[error("Graph has {nodes} distinct node(s), at least 2 are required")]
    TooFewNodes { nodes: usize },

    #[error("Node index {0} has no identifier in the node index map")]
    UnknownNode(usize),

    #[error("Feature matrix has {actual} columns, model expects {expected}")]
    FeatureWidth { expected: usize, actual: usize },

    #[error("Training diverged: loss became {loss} at epoch {epoch}")]
    Diverged { epoch: usize, loss: f64 },
}

pub type Result<T> = std::result::Result<T, DetectionError>;
