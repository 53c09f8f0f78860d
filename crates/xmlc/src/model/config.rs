//! Training configuration shared by every model variant.

use serde::{Deserialize, Serialize};

use crate::base::BaseConfig;

/// Which structured predictor to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    /// Probabilistic label tree (multi-label).
    Plt,
    /// Hierarchical softmax (single-label).
    Hsm,
    /// Binary relevance: one flat classifier per label.
    Br,
    /// One-vs-rest: binary relevance restricted to single-label rows.
    Ovr,
    /// Incrementally grown probabilistic label tree.
    OnlinePlt,
    /// Probabilistic label graph: a hash-routed layered DAG.
    Plg,
}

/// Label-tree construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeType {
    Complete,
    Balanced,
    Huffman,
    HierarchicalKMeans,
    KMeansWithProjection,
    TopDown,
    OnlineBalanced,
    OnlineComplete,
    OnlineRandom,
    OnlineKMeans,
    OnlineBestScore,
}

impl TreeType {
    /// Tree types that grow during `update` instead of being built offline.
    pub fn is_online(self) -> bool {
        matches!(
            self,
            TreeType::OnlineBalanced
                | TreeType::OnlineComplete
                | TreeType::OnlineRandom
                | TreeType::OnlineKMeans
                | TreeType::OnlineBestScore
        )
    }
}

/// All knobs for training and inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub model_type: ModelType,
    pub tree_type: TreeType,
    /// Children per internal node.
    pub arity: usize,
    /// Cap on direct leaf children (k-means partitions and online groups).
    pub max_leaves: usize,
    /// Ranked labels returned per query; 0 means unlimited.
    pub top_k: usize,
    /// Minimum path probability kept during inference.
    pub threshold: f64,
    /// Worker threads; 0 picks the available parallelism.
    pub threads: usize,
    pub seed: u64,
    /// Shuffle the label-to-leaf assignment of complete/balanced trees.
    pub randomize_tree: bool,
    /// Convergence threshold of the k-means partitioner.
    pub kmeans_eps: f64,
    /// Balance k-means clusters to `ceil(n / arity)` labels each.
    pub kmeans_balanced: bool,
    /// Hash feature indices before online centroid accumulation.
    pub kmeans_hash: bool,
    /// Hashed feature space size for `kmeans_hash`.
    pub hash: usize,
    /// Balance-vs-probability mix of the online best-score descent.
    pub online_tree_alfa: f64,
    /// Target dimensionality of the random projection.
    pub project_dim: usize,
    /// Let multi-label rows contribute fractionally to the HSM model.
    pub hsm_pick_one_label_weighting: bool,
    /// Number of label-graph layers.
    pub plg_layers: usize,
    /// Nodes per label-graph layer.
    pub plg_layer_size: usize,
    pub base: BaseConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::Plt,
            tree_type: TreeType::Complete,
            arity: 2,
            max_leaves: 100,
            top_k: 5,
            threshold: 0.0,
            threads: 0,
            seed: 1,
            randomize_tree: false,
            kmeans_eps: 1e-4,
            kmeans_balanced: true,
            kmeans_hash: false,
            hash: 0,
            online_tree_alfa: 0.5,
            project_dim: 100,
            hsm_pick_one_label_weighting: false,
            plg_layers: 3,
            plg_layer_size: 64,
            base: BaseConfig::default(),
        }
    }
}
