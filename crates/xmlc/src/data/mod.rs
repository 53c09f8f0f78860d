//! Sparse data containers.
//!
//! Training data is a sequence of rows, each pairing a sorted sparse feature
//! vector with a set of label ids. Feature vectors are borrowed by every
//! downstream component (node assignment, base training, centroid
//! construction) and are never copied.

mod dataset;
mod sparse;

pub use dataset::SparseDataset;
pub use sparse::SparseVector;
