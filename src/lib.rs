use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogRagError>;

#[derive(Error, Debug)]
pub enum LogRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Failures of the embedding and vector index layer
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Index IO error: {0}")]
    IndexIo(String),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod parsers;
pub mod retrieval;
pub mod summary;
