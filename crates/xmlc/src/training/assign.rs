//! Deriving each node's binary sub-problem from the dataset.
//!
//! For every node the assigner accumulates aligned lists of 0/1 targets and
//! dataset row indices (plus optional per-entry weights). Rows are borrowed
//! by index; the feature vectors themselves are resolved at training time.

use std::collections::HashSet;

use log::warn;

use crate::data::SparseDataset;
use crate::tree::{LabelTree, NodeId};

/// Per-node training sets, aligned by position within each node's lists.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// 0.0 / 1.0 targets per node.
    pub labels: Vec<Vec<f32>>,
    /// Dataset row index per entry.
    pub rows: Vec<Vec<usize>>,
    /// Optional per-entry weights (fractional multi-label contribution).
    pub weights: Option<Vec<Vec<f32>>>,
}

impl Assignment {
    pub fn with_nodes(nodes: usize, weighted: bool) -> Self {
        Self {
            labels: vec![Vec::new(); nodes],
            rows: vec![Vec::new(); nodes],
            weights: weighted.then(|| vec![Vec::new(); nodes]),
        }
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.labels.len()
    }

    fn push(&mut self, node: NodeId, target: f32, row: usize, weight: Option<f32>) {
        let idx = node as usize;
        self.labels[idx].push(target);
        self.rows[idx].push(row);
        if let (Some(weights), Some(w)) = (self.weights.as_mut(), weight) {
            weights[idx].push(w);
        }
    }
}

/// Counters reported after assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainStats {
    pub rows: usize,
    pub skipped: usize,
    /// Total (node, example) entries produced.
    pub node_entries: u64,
    /// Total labels seen across accepted rows.
    pub label_entries: u64,
}

impl TrainStats {
    /// Mean number of node entries per accepted row.
    pub fn nodes_per_row(&self) -> f64 {
        let accepted = self.rows - self.skipped;
        if accepted == 0 {
            0.0
        } else {
            self.node_entries as f64 / accepted as f64
        }
    }
}

/// Positive and negative nodes for one example under the PLT rule.
///
/// Positives are the union of root paths of the labels' leaves; the BFS from
/// the root marks every non-positive child of a positive node negative. An
/// empty label set yields the root as the single negative. Returns the first
/// unknown label instead, leaving the caller to skip and log.
pub(crate) fn plt_nodes_for_example(
    tree: &LabelTree,
    labels: &[u32],
) -> Result<(Vec<NodeId>, Vec<NodeId>), u32> {
    let root = match tree.root() {
        Some(root) => root,
        None => return Ok((Vec::new(), Vec::new())),
    };

    let mut positive: HashSet<NodeId> = HashSet::new();
    for &label in labels {
        let leaf = tree.leaf(label).ok_or(label)?;
        for node in tree.path_to_root(leaf) {
            positive.insert(node);
        }
    }

    if positive.is_empty() {
        return Ok((Vec::new(), vec![root]));
    }

    let mut negative = Vec::new();
    let mut queue = vec![root];
    while let Some(node) = queue.pop() {
        for &child in &tree.node(node).children {
            if positive.contains(&child) {
                queue.push(child);
            } else {
                negative.push(child);
            }
        }
    }

    let mut positive: Vec<NodeId> = positive.into_iter().collect();
    positive.sort_unstable();
    negative.sort_unstable();
    Ok((positive, negative))
}

/// PLT assignment: every node on a positive path trains toward 1.0, every
/// sibling hanging off a positive path toward 0.0.
pub fn assign_plt(tree: &LabelTree, dataset: &SparseDataset) -> (Assignment, TrainStats) {
    let mut assignment = Assignment::with_nodes(tree.len(), false);
    let mut stats = TrainStats {
        rows: dataset.rows(),
        ..TrainStats::default()
    };

    for row in 0..dataset.rows() {
        let labels = dataset.labels(row);
        let (positive, negative) = match plt_nodes_for_example(tree, labels) {
            Ok(sets) => sets,
            Err(label) => {
                warn!("row {row}: label {label} not present in the tree, skipping example");
                stats.skipped += 1;
                continue;
            }
        };

        stats.node_entries += (positive.len() + negative.len()) as u64;
        stats.label_entries += labels.len() as u64;

        for node in positive {
            assignment.push(node, 1.0, row, None);
        }
        for node in negative {
            assignment.push(node, 0.0, row, None);
        }
    }

    (assignment, stats)
}

/// Nodes updated by one label under the hierarchical-softmax rule.
fn hsm_nodes_for_label(
    tree: &LabelTree,
    leaf: NodeId,
    positive: &mut Vec<NodeId>,
    negative: &mut Vec<NodeId>,
) {
    for node in tree.path_to_root(leaf) {
        match tree.node(node).parent {
            // The root (or a degenerate single-child chain) contributes a
            // plain positive.
            None => positive.push(node),
            Some(parent) => {
                let siblings = &tree.node(parent).children;
                match siblings.len() {
                    1 => positive.push(node),
                    2 => {
                        // One estimator per binary parent: the base at
                        // child 0 learns the branch choice, child 1 only
                        // ever contributes negatives.
                        if siblings[0] == node {
                            positive.push(siblings[0]);
                        } else {
                            negative.push(siblings[0]);
                        }
                        negative.push(siblings[1]);
                    }
                    _ => {
                        for &sibling in siblings {
                            if sibling == node {
                                positive.push(sibling);
                            } else {
                                negative.push(sibling);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// HSM assignment.
///
/// Without `pick_one_label_weighting` every example must carry exactly one
/// label; with it, multi-label examples contribute each of their labels at
/// weight `1 / |labels|`.
pub fn assign_hsm(
    tree: &LabelTree,
    dataset: &SparseDataset,
    pick_one_label_weighting: bool,
) -> (Assignment, TrainStats) {
    let mut assignment = Assignment::with_nodes(tree.len(), pick_one_label_weighting);
    let mut stats = TrainStats {
        rows: dataset.rows(),
        ..TrainStats::default()
    };

    'rows: for row in 0..dataset.rows() {
        let labels = dataset.labels(row);
        if !pick_one_label_weighting && labels.len() != 1 {
            warn!(
                "row {row}: {} labels in a single-label model, skipping example",
                labels.len()
            );
            stats.skipped += 1;
            continue;
        }

        let mut entries: Vec<(NodeId, f32)> = Vec::new();
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for &label in labels {
            let leaf = match tree.leaf(label) {
                Some(leaf) => leaf,
                None => {
                    warn!("row {row}: label {label} not present in the tree, skipping example");
                    stats.skipped += 1;
                    continue 'rows;
                }
            };
            positive.clear();
            negative.clear();
            hsm_nodes_for_label(tree, leaf, &mut positive, &mut negative);
            entries.extend(positive.iter().map(|&n| (n, 1.0)));
            entries.extend(negative.iter().map(|&n| (n, 0.0)));
        }

        let weight =
            pick_one_label_weighting.then(|| 1.0 / labels.len().max(1) as f32);
        stats.node_entries += entries.len() as u64;
        stats.label_entries += labels.len() as u64;
        for (node, target) in entries {
            assignment.push(node, target, row, weight);
        }
    }

    (assignment, stats)
}

/// Binary-relevance assignment for the label window `[start, stop)`.
///
/// Node `l - start` receives one entry per accepted row, positive iff the
/// row carries label `l`. With `exactly_one_label` (one-vs-rest) rows whose
/// label count differs from one are skipped.
pub fn assign_br(
    dataset: &SparseDataset,
    start: u32,
    stop: u32,
    exactly_one_label: bool,
) -> (Assignment, TrainStats) {
    let width = (stop - start) as usize;
    let mut assignment = Assignment::with_nodes(width, false);
    let mut stats = TrainStats {
        rows: dataset.rows(),
        ..TrainStats::default()
    };

    for row in 0..dataset.rows() {
        let labels = dataset.labels(row);
        if exactly_one_label && labels.len() != 1 {
            warn!(
                "row {row}: {} labels in a one-vs-rest model, skipping example",
                labels.len()
            );
            stats.skipped += 1;
            continue;
        }

        for node in 0..width {
            assignment.push(node as NodeId, 0.0, row, None);
        }
        for &label in labels {
            if label >= start && label < stop {
                let idx = (label - start) as usize;
                *assignment.labels[idx].last_mut().expect("entry just pushed") = 1.0;
            }
        }
        stats.node_entries += width as u64;
        stats.label_entries += labels.len() as u64;
    }

    (assignment, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SparseVector;
    use crate::tree::build::complete_tree;

    fn s1_tree() -> LabelTree {
        complete_tree(4, 2, (0..4).collect())
    }

    fn dataset(rows: Vec<Vec<u32>>) -> SparseDataset {
        let features = rows
            .iter()
            .map(|_| SparseVector::from_sorted(vec![(0, 1.0)]))
            .collect();
        SparseDataset::new(rows, features).unwrap()
    }

    #[test]
    fn plt_positive_paths_and_sibling_negatives() {
        // Example with labels {0, 2} on the complete arity-2 tree over 4
        // labels: positives are both root paths, negatives their siblings.
        let tree = s1_tree();
        let (positive, negative) = plt_nodes_for_example(&tree, &[0, 2]).unwrap();
        assert_eq!(positive, vec![0, 1, 2, 3, 5]);
        assert_eq!(negative, vec![4, 6]);
    }

    #[test]
    fn plt_empty_label_set_marks_root_negative() {
        let tree = s1_tree();
        let (positive, negative) = plt_nodes_for_example(&tree, &[]).unwrap();
        assert!(positive.is_empty());
        assert_eq!(negative, vec![0]);
    }

    #[test]
    fn plt_unknown_label_skips_row() {
        let tree = s1_tree();
        let ds = dataset(vec![vec![0], vec![9], vec![1]]);
        let (assignment, stats) = assign_plt(&tree, &ds);
        assert_eq!(stats.skipped, 1);
        // Root saw the two accepted rows only.
        assert_eq!(assignment.labels[0], vec![1.0, 1.0]);
        assert_eq!(assignment.rows[0], vec![0, 2]);
    }

    #[test]
    fn plt_union_is_bfs_closure() {
        let tree = s1_tree();
        let (positive, negative) = plt_nodes_for_example(&tree, &[1]).unwrap();
        let mut closure: Vec<_> = positive.iter().chain(negative.iter()).copied().collect();
        closure.sort_unstable();
        // Positive path {0,1,4} plus its immediate siblings {2,3}.
        assert_eq!(closure, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn hsm_binary_parent_rule() {
        // Single label 0: path is leaf 3 <- node 1 <- root. Root is plain
        // positive; at each binary parent only child 0 gets the positive and
        // child 1 a negative.
        let tree = s1_tree();
        let ds = dataset(vec![vec![0]]);
        let (assignment, stats) = assign_hsm(&tree, &ds, false);
        assert_eq!(stats.skipped, 0);

        assert_eq!(assignment.labels[0], vec![1.0]); // root
        assert_eq!(assignment.labels[1], vec![1.0]); // child 0 of root
        assert_eq!(assignment.labels[2], vec![0.0]); // child 1 of root
        assert_eq!(assignment.labels[3], vec![1.0]); // child 0 of node 1
        assert_eq!(assignment.labels[4], vec![0.0]); // child 1 of node 1
        assert!(assignment.labels[5].is_empty());
        assert!(assignment.labels[6].is_empty());
    }

    #[test]
    fn hsm_multi_label_row_skipped_without_weighting() {
        let tree = s1_tree();
        let ds = dataset(vec![vec![0, 1], vec![2]]);
        let (assignment, stats) = assign_hsm(&tree, &ds, false);
        assert_eq!(stats.skipped, 1);
        assert_eq!(assignment.rows[0], vec![1]);
    }

    #[test]
    fn hsm_pick_one_label_weighting_splits_mass() {
        let tree = s1_tree();
        let ds = dataset(vec![vec![0, 2]]);
        let (assignment, stats) = assign_hsm(&tree, &ds, true);
        assert_eq!(stats.skipped, 0);

        let weights = assignment.weights.as_ref().unwrap();
        // Root contributes once per label, each at weight 1/2.
        assert_eq!(assignment.labels[0], vec![1.0, 1.0]);
        assert_eq!(weights[0], vec![0.5, 0.5]);
    }

    #[test]
    fn br_window_targets() {
        let ds = dataset(vec![vec![0, 2], vec![1]]);
        let (assignment, stats) = assign_br(&ds, 0, 3, false);
        assert_eq!(stats.skipped, 0);
        assert_eq!(assignment.labels[0], vec![1.0, 0.0]);
        assert_eq!(assignment.labels[1], vec![0.0, 1.0]);
        assert_eq!(assignment.labels[2], vec![1.0, 0.0]);
    }

    #[test]
    fn br_window_offsets_apply() {
        let ds = dataset(vec![vec![0, 2]]);
        let (assignment, _) = assign_br(&ds, 2, 3, false);
        assert_eq!(assignment.nodes(), 1);
        assert_eq!(assignment.labels[0], vec![1.0]);
    }

    #[test]
    fn ovr_rejects_multi_label_rows() {
        let ds = dataset(vec![vec![0, 1], vec![0]]);
        let (assignment, stats) = assign_br(&ds, 0, 2, true);
        assert_eq!(stats.skipped, 1);
        assert_eq!(assignment.labels[0], vec![1.0]);
        assert_eq!(assignment.rows[0], vec![1]);
    }
}
