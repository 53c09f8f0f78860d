//! Crate-wide error type.
//!
//! Structural and I/O problems are fatal and surface through [`Error`];
//! per-example problems during training (unknown labels, multi-label rows fed
//! to a single-label model) are skip-and-log and never reach this type.

use thiserror::Error;

use crate::tree::TreeError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors raised by training, inference, and model persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Feature matrix and label matrix disagree on the number of rows.
    #[error("feature rows ({rows}) do not match label rows ({label_rows})")]
    ShapeMismatch { rows: usize, label_rows: usize },

    /// The tree exposes fewer leaves than the dataset references labels.
    #[error("tree has {leaves} leaves but the dataset references {labels} labels")]
    LeafCount { leaves: usize, labels: usize },

    /// Invalid or inconsistent configuration (e.g. an offline tree type
    /// handed to the online trainer).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A model file exists but its contents are malformed.
    #[error("malformed model file: {0}")]
    Format(String),

    /// Structural validation of a loaded tree failed.
    #[error("invalid tree structure: {0}")]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `args.bin` payload could not be encoded or decoded.
    #[error("config payload error: {0}")]
    Encoding(#[from] postcard::Error),
}
