//! xmlc: extreme multi-label classification via hierarchical label
//! decomposition.
//!
//! Instead of one binary classifier per label (infeasible at 10^5+ labels),
//! the label space is organized into a tree or layered graph whose internal
//! decision points each carry a probabilistic binary classifier; a label's
//! probability is the product of classifier outputs along its path, and
//! best-first search makes top-K inference logarithmic in the label count.
//!
//! # Key Types
//!
//! - [`Model`] / [`TrainConfig`] - High-level entry points for every variant
//! - [`PltModel`] / [`HsmModel`] / [`BrModel`] / [`PlgModel`] - Batch models
//! - [`OnlinePlt`] - Incremental variant that grows the tree as labels arrive
//! - [`LabelTree`] / [`LayerGraph`] - The label-space decompositions
//! - [`BaseLearner`] / [`LinearBase`] - The per-node classifier contract
//! - [`SparseDataset`] / [`SparseVector`] - Data handling
//!
//! # Training
//!
//! Configure with [`TrainConfig`], then `Model::train(&dataset, &cfg, dir)`;
//! the model directory holds `tree.bin`, `weights.bin`, `args.bin` (and
//! `graph.bin` for the label graph). `Model::load(dir)` re-materializes the
//! variant recorded in `args.bin`.

pub use approx;

pub mod base;
pub mod data;
pub mod error;
pub mod graph;
pub mod inference;
pub mod io;
pub mod model;
pub mod training;
pub mod tree;
pub mod utils;

// High-level model types
pub use model::{Model, ModelType, TrainConfig, TreeType};
pub use model::{BrModel, HsmModel, OnlinePlt, PlgModel, PltModel};

// Structures
pub use graph::LayerGraph;
pub use tree::LabelTree;

// Base classifiers
pub use base::{BaseConfig, BaseLearner, LinearBase, Loss, Optimizer};

// Data types
pub use data::{SparseDataset, SparseVector};

// Predictions and errors
pub use error::{Error, Result};
pub use inference::Prediction;

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
