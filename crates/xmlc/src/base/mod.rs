//! Binary base classifiers attached to tree and graph nodes.
//!
//! Every internal decision point of a model owns one probabilistic binary
//! classifier. The structured models only see the [`BaseLearner`] contract;
//! [`LinearBase`] is the bundled implementation (sparse logistic regression
//! or squared-hinge SVM trained with SGD or AdaGrad).

mod linear;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::data::SparseVector;
use crate::error::Result;

pub use linear::LinearBase;

/// Loss driving the gradient of a base classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Loss {
    Logistic,
    SquaredHinge,
}

/// Online optimizer for base classifier updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Optimizer {
    Sgd,
    AdaGrad,
}

/// Hyperparameters shared by every base classifier of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    pub loss: Loss,
    pub optimizer: Optimizer,
    /// Base learning rate.
    pub eta: f32,
    /// Denominator floor for AdaGrad step sizes.
    pub adagrad_eps: f32,
    /// Passes over a node's training set during batch training.
    pub epochs: usize,
    /// Weights with absolute value below this are dropped after training.
    pub weights_threshold: f32,
    /// Optional cap on the number of updates a base accepts.
    pub tmax: Option<u64>,
    /// Weight the minority class by `1 + ln(majority/minority)` on very
    /// unbalanced nodes.
    pub unbalanced_weighting: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            loss: Loss::Logistic,
            optimizer: Optimizer::AdaGrad,
            eta: 1.0,
            adagrad_eps: 1e-3,
            epochs: 1,
            weights_threshold: 0.1,
            tmax: None,
            unbalanced_weighting: false,
        }
    }
}

/// Contract between the structured models and the binary classifiers they
/// orchestrate.
///
/// Implementations must be cheap to clone: online tree expansion seeds fresh
/// nodes from copies (and sign-inverted copies) of a parent's temporary
/// classifier.
pub trait BaseLearner: Clone + Send + Sync {
    /// A classifier ready for online updates, with no training history.
    fn fresh(cfg: &BaseConfig) -> Self;

    /// Fit the classifier to one node's binary sub-problem.
    ///
    /// `labels[i]` is the 0.0/1.0 target for `examples[i]`; `weights`, when
    /// present, is a per-example multiplier aligned with `labels`.
    fn train(
        &mut self,
        dim: usize,
        labels: &[f32],
        examples: &[&SparseVector],
        weights: Option<&[f32]>,
        cfg: &BaseConfig,
    );

    /// One online gradient step toward `target` (0.0 or 1.0).
    fn update(&mut self, target: f32, features: &SparseVector, cfg: &BaseConfig);

    /// Raw decision value (margin).
    fn predict_value(&self, features: &SparseVector) -> f64;

    /// Probability in `[0, 1]` derived from the decision value.
    fn predict_probability(&self, features: &SparseVector) -> f64;

    /// A copy with every weight negated; the probabilistic complement of
    /// `self` under a symmetric link function.
    fn inverted(&self) -> Self;

    /// Drop weights with absolute value below `threshold`.
    fn prune(&mut self, threshold: f32);

    fn save<W: Write>(&self, out: &mut W) -> std::io::Result<()>;

    fn load<R: Read>(input: &mut R) -> Result<Self>;
}
