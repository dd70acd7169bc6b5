//! Error types for the analysis pipeline.
//!
//! Ingestion and configuration problems are fatal for the input that caused
//! them and surface as `Err`. Anomalies inside the abstract interpreter never
//! do; they degrade to wildcard values at the point of occurrence.

use std::path::PathBuf;

/// Failure while turning a node/edge record table into a graph.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("duplicate node id {0} in node table")]
    DuplicateNodeId(u32),
    #[error("edge references unknown node id {0}")]
    UnknownNodeId(u32),
    #[error("unknown node label `{0}`")]
    UnknownLabel(String),
    #[error("unknown edge type `{0}`")]
    UnknownEdgeType(String),
    #[error("node {id} is missing required field `{field}`")]
    MissingField { id: u32, field: &'static str },
    #[error("malformed table json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while parsing JavaScript source into the record table.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Crate-level error, one variant per failure family.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
