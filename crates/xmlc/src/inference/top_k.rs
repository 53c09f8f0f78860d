//! Best-first top-K traversal over a label tree.
//!
//! A max-heap keyed by path probability pops the most promising partial path;
//! leaves are emitted in non-increasing probability order because extending a
//! path can only shrink its probability.

use std::collections::BinaryHeap;

use crate::base::BaseLearner;
use crate::data::SparseVector;
use crate::inference::Prediction;
use crate::tree::{LabelTree, NodeId};

/// Heap entry: a partially explored node with its path probability.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NodeScore {
    node: NodeId,
    value: f64,
}

impl Eq for NodeScore {}

impl Ord for NodeScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for NodeScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn add_to_queue(queue: &mut BinaryHeap<NodeScore>, node: NodeId, value: f64, threshold: f64) {
    if value > threshold || (threshold <= 0.0 && value >= 0.0) {
        queue.push(NodeScore { node, value });
    }
}

/// PLT traversal with node probabilities supplied by `prob`.
///
/// Both the batch model (immutable classifier array) and the online model
/// (classifiers behind per-node locks) drive the same traversal through this
/// entry point.
pub fn predict_plt_with<F>(
    tree: &LabelTree,
    prob: F,
    top_k: usize,
    threshold: f64,
) -> Vec<Prediction>
where
    F: Fn(NodeId) -> f64,
{
    let mut predictions = Vec::new();
    let root = match tree.root() {
        Some(root) => root,
        None => return predictions,
    };

    let mut queue = BinaryHeap::new();
    add_to_queue(&mut queue, root, prob(root), threshold);

    while top_k == 0 || predictions.len() < top_k {
        match next_leaf_plt(tree, &prob, &mut queue, threshold) {
            Some(prediction) => predictions.push(prediction),
            None => break,
        }
    }
    predictions
}

fn next_leaf_plt<F>(
    tree: &LabelTree,
    prob: &F,
    queue: &mut BinaryHeap<NodeScore>,
    threshold: f64,
) -> Option<Prediction>
where
    F: Fn(NodeId) -> f64,
{
    while let Some(NodeScore { node, value }) = queue.pop() {
        let entry = tree.node(node);
        for &child in &entry.children {
            add_to_queue(queue, child, value * prob(child), threshold);
        }
        if let Some(label) = entry.label {
            return Some(Prediction { label, value });
        }
    }
    None
}

/// PLT traversal over a plain classifier array.
pub fn predict_plt<B: BaseLearner>(
    tree: &LabelTree,
    bases: &[B],
    features: &SparseVector,
    top_k: usize,
    threshold: f64,
) -> Vec<Prediction> {
    predict_plt_with(
        tree,
        |node| bases[node as usize].predict_probability(features),
        top_k,
        threshold,
    )
}

/// Path probability of one label: the product of node probabilities on the
/// leaf-to-root path.
pub fn plt_label_probability_with<F>(tree: &LabelTree, label: u32, prob: F) -> f64
where
    F: Fn(NodeId) -> f64,
{
    match tree.leaf(label) {
        Some(leaf) => tree
            .path_to_root(leaf)
            .into_iter()
            .map(prob)
            .product(),
        None => 0.0,
    }
}

/// HSM traversal: at binary parents a single estimator (at child 0) decides
/// the branch split; wider parents softmax-normalize the children's raw
/// scores.
pub fn predict_hsm<B: BaseLearner>(
    tree: &LabelTree,
    bases: &[B],
    features: &SparseVector,
    top_k: usize,
    threshold: f64,
) -> Vec<Prediction> {
    let mut predictions = Vec::new();
    let root = match tree.root() {
        Some(root) => root,
        None => return predictions,
    };

    let mut queue = BinaryHeap::new();
    let root_value = bases[root as usize].predict_probability(features);
    add_to_queue(&mut queue, root, root_value, threshold);

    'outer: while top_k == 0 || predictions.len() < top_k {
        while let Some(NodeScore { node, value }) = queue.pop() {
            let entry = tree.node(node);
            if entry.children.len() == 2 {
                let p = bases[entry.children[0] as usize].predict_probability(features);
                add_to_queue(&mut queue, entry.children[0], value * p, threshold);
                add_to_queue(&mut queue, entry.children[1], value * (1.0 - p), threshold);
            } else if !entry.children.is_empty() {
                let scores: Vec<f64> = entry
                    .children
                    .iter()
                    .map(|&c| bases[c as usize].predict_value(features).exp())
                    .collect();
                let sum: f64 = scores.iter().sum();
                for (&child, score) in entry.children.iter().zip(scores) {
                    add_to_queue(&mut queue, child, value * score / sum, threshold);
                }
            }
            if let Some(label) = entry.label {
                predictions.push(Prediction { label, value });
                continue 'outer;
            }
        }
        break;
    }
    predictions
}

/// Conditional path probability of one label under the HSM factorization.
pub fn hsm_label_probability<B: BaseLearner>(
    tree: &LabelTree,
    bases: &[B],
    label: u32,
    features: &SparseVector,
) -> f64 {
    let leaf = match tree.leaf(label) {
        Some(leaf) => leaf,
        None => return 0.0,
    };

    let mut value = 1.0;
    let mut node = leaf;
    while let Some(parent) = tree.node(node).parent {
        let siblings = &tree.node(parent).children;
        let factor = if siblings.len() == 2 {
            let p = bases[siblings[0] as usize].predict_probability(features);
            if siblings[0] == node {
                p
            } else {
                1.0 - p
            }
        } else if siblings.len() == 1 {
            1.0
        } else {
            let sum: f64 = siblings
                .iter()
                .map(|&c| bases[c as usize].predict_value(features).exp())
                .sum();
            bases[node as usize].predict_value(features).exp() / sum
        };
        value *= factor;
        node = parent;
    }
    value
}
