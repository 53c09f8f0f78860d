//! The training dataset: rows of `(labels, sparse features)`.

use crate::data::SparseVector;
use crate::error::{Error, Result};

/// An in-memory multi-label dataset.
///
/// `num_labels` and `dim` are upper bounds derived from the data at
/// construction time; they can be widened explicitly when the label or
/// feature space is known to be larger than what the sample references.
#[derive(Debug, Clone, Default)]
pub struct SparseDataset {
    labels: Vec<Vec<u32>>,
    features: Vec<SparseVector>,
    dim: usize,
    num_labels: usize,
}

impl SparseDataset {
    /// Build a dataset from parallel label and feature rows.
    pub fn new(labels: Vec<Vec<u32>>, features: Vec<SparseVector>) -> Result<Self> {
        if labels.len() != features.len() {
            return Err(Error::ShapeMismatch {
                rows: features.len(),
                label_rows: labels.len(),
            });
        }
        let dim = features.iter().map(SparseVector::dim).max().unwrap_or(0);
        let num_labels = labels
            .iter()
            .flat_map(|row| row.iter())
            .map(|&l| l as usize + 1)
            .max()
            .unwrap_or(0);
        Ok(Self {
            labels,
            features,
            dim,
            num_labels,
        })
    }

    /// Append one row.
    pub fn push(&mut self, labels: Vec<u32>, features: SparseVector) {
        self.dim = self.dim.max(features.dim());
        for &l in &labels {
            self.num_labels = self.num_labels.max(l as usize + 1);
        }
        self.labels.push(labels);
        self.features.push(features);
    }

    /// Widen the feature space beyond what the rows reference.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = self.dim.max(dim);
        self
    }

    /// Widen the label space beyond what the rows reference.
    pub fn with_num_labels(mut self, num_labels: usize) -> Self {
        self.num_labels = self.num_labels.max(num_labels);
        self
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.features.len()
    }

    /// Feature space size.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Label space size.
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn labels(&self, row: usize) -> &[u32] {
        &self.labels[row]
    }

    #[inline]
    pub fn features(&self, row: usize) -> &SparseVector {
        &self.features[row]
    }
}
