//! Offline tree construction strategies.
//!
//! Every builder yields a [`LabelTree`] whose leaves cover the label space
//! `[0, k)` and whose node indices are contiguous in creation order. The
//! top-down strategy is absent here: it trains classifiers while it builds
//! and therefore lives with the models.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use log::info;
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::data::{SparseDataset, SparseVector};
use crate::error::{Error, Result};
use crate::model::{TrainConfig, TreeType};
use crate::tree::kmeans::{BalancedKMeans, KMeansPartitioner};
use crate::tree::LabelTree;

/// Build the tree structure selected by `cfg.tree_type`.
///
/// Online tree types grow during updates and are rejected here.
pub fn build_tree(dataset: &SparseDataset, cfg: &TrainConfig) -> Result<LabelTree> {
    if cfg.arity < 2 {
        return Err(Error::Config(format!("arity must be >= 2, got {}", cfg.arity)));
    }
    let k = dataset.num_labels();
    if k == 0 {
        return Err(Error::Config("dataset references no labels".into()));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let tree = match cfg.tree_type {
        TreeType::Complete => {
            complete_tree(k, cfg.arity, label_order(k, cfg.randomize_tree, &mut rng))
        }
        TreeType::Balanced => {
            balanced_tree(cfg.arity, label_order(k, cfg.randomize_tree, &mut rng))
        }
        TreeType::Huffman => huffman_tree(&label_frequencies(dataset, k), cfg.arity),
        TreeType::HierarchicalKMeans => {
            let centroids = label_centroids(dataset, k);
            let partitioner = BalancedKMeans::new(cfg.kmeans_eps, cfg.kmeans_balanced);
            kmeans_tree(&centroids, cfg.arity, cfg.max_leaves.max(1), &partitioner, &mut rng)
        }
        TreeType::KMeansWithProjection => {
            let centroids = projected_centroids(dataset, k, cfg.project_dim.max(1), &mut rng);
            let partitioner = BalancedKMeans::new(cfg.kmeans_eps, cfg.kmeans_balanced);
            kmeans_tree(&centroids, cfg.arity, cfg.max_leaves.max(1), &partitioner, &mut rng)
        }
        other => {
            return Err(Error::Config(format!(
                "tree type {other:?} does not build an offline structure"
            )))
        }
    };

    tree.validate()?;
    info!(
        "built {:?} tree: {} nodes, {} leaves, arity {}",
        cfg.tree_type,
        tree.len(),
        tree.num_leaves(),
        cfg.arity
    );
    Ok(tree)
}

fn label_order(k: usize, randomize: bool, rng: &mut StdRng) -> Vec<u32> {
    let mut order: Vec<u32> = (0..k as u32).collect();
    if randomize {
        order.shuffle(rng);
    }
    order
}

fn label_frequencies(dataset: &SparseDataset, k: usize) -> Vec<u64> {
    let mut freq = vec![0u64; k];
    for row in 0..dataset.rows() {
        for &label in dataset.labels(row) {
            freq[label as usize] += 1;
        }
    }
    freq
}

/// Complete `arity`-ary tree: node `i`'s parent is `(i - 1) / arity`, the
/// last `k` indices are the leaves.
pub fn complete_tree(k: usize, arity: usize, order: Vec<u32>) -> LabelTree {
    let t = (arity * k - 1).div_ceil(arity - 1);
    let internal = t - k;

    let mut tree = LabelTree::new();
    tree.add_node(None, if internal == 0 { Some(order[0]) } else { None });
    for i in 1..t {
        let parent = ((i - 1) / arity) as u32;
        let label = (i >= internal).then(|| order[i - internal]);
        tree.add_node(Some(parent), label);
    }
    tree
}

/// Balanced tree: the label list is recursively cut into `arity` blocks of
/// `ceil(n / arity)` labels; singleton blocks become leaves.
pub fn balanced_tree(arity: usize, order: Vec<u32>) -> LabelTree {
    let mut tree = LabelTree::new();
    let mut queue: VecDeque<(usize, usize, Option<u32>)> = VecDeque::new();
    queue.push_back((0, order.len(), None));

    while let Some((begin, end, parent)) = queue.pop_front() {
        if begin + 1 == end {
            tree.add_node(parent, Some(order[begin]));
        } else {
            let node = tree.add_node(parent, None);
            let part = (end - begin).div_ceil(arity);
            let mut start = begin;
            while start < end {
                queue.push_back((start, (start + part).min(end), Some(node)));
                start += part;
            }
        }
    }
    tree
}

/// Huffman tree over label frequencies: frequent labels end up shallow.
pub fn huffman_tree(freq: &[u64], arity: usize) -> LabelTree {
    let mut tree = LabelTree::new();
    // Leaves first, so labels occupy indices [0, k).
    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = BinaryHeap::new();
    for (label, &f) in freq.iter().enumerate() {
        let node = tree.add_node(None, Some(label as u32));
        heap.push(Reverse((f, node)));
    }

    loop {
        let mut merged = Vec::with_capacity(arity);
        for _ in 0..arity {
            match heap.pop() {
                Some(Reverse(entry)) => merged.push(entry),
                None => break,
            }
        }

        let parent = tree.add_node(None, None);
        let mut aggregate = 0u64;
        for (f, node) in merged {
            tree.attach(node, parent);
            aggregate += f;
        }

        if heap.is_empty() {
            tree.set_root(parent);
            break;
        }
        heap.push(Reverse((aggregate, parent)));
    }

    // Merging pops children in frequency order; serialization recovers them
    // in index order. Normalize now so training and a reloaded model agree
    // on sibling positions.
    for id in 0..tree.len() as u32 {
        tree.node_mut(id).children.sort_unstable();
    }
    tree
}

/// Per-label centroids: the unit-normalized sum of the feature vectors of
/// every example carrying the label.
pub fn label_centroids(dataset: &SparseDataset, k: usize) -> Vec<SparseVector> {
    let mut sums: Vec<HashMap<u32, f32>> = vec![HashMap::new(); k];
    for row in 0..dataset.rows() {
        for &label in dataset.labels(row) {
            let sum = &mut sums[label as usize];
            for (i, v) in dataset.features(row).iter() {
                *sum.entry(i).or_insert(0.0) += v;
            }
        }
    }

    sums.into_iter()
        .map(|sum| {
            let mut centroid = SparseVector::from_pairs(sum.into_iter().collect());
            centroid.unit_norm();
            centroid
        })
        .collect()
}

/// Hierarchical balanced k-means over label centroids.
///
/// Partitions no larger than `max_leaves` become direct leaf children;
/// k-means seeds are drawn from the master RNG in queue order, so the tree is
/// deterministic for a fixed seed. Empty clusters are skipped; a split that
/// fails to separate the partition falls back to even chunking so that
/// recursion always makes progress.
pub fn kmeans_tree(
    centroids: &[SparseVector],
    arity: usize,
    max_leaves: usize,
    partitioner: &dyn KMeansPartitioner,
    rng: &mut StdRng,
) -> LabelTree {
    let mut tree = LabelTree::new();
    let root = tree.add_node(None, None);

    let mut queue: VecDeque<(u32, Vec<u32>)> = VecDeque::new();
    queue.push_back((root, (0..centroids.len() as u32).collect()));

    while let Some((node, partition)) = queue.pop_front() {
        if partition.len() <= max_leaves {
            for label in partition {
                tree.add_node(Some(node), Some(label));
            }
            continue;
        }

        let k = arity.min(partition.len());
        let seed = rng.random::<u64>();
        let assignment = partitioner.partition(&partition, centroids, k, seed);

        let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); k];
        for (pos, &label) in partition.iter().enumerate() {
            buckets[assignment[pos] as usize].push(label);
        }
        buckets.retain(|b| !b.is_empty());

        if buckets.len() <= 1 {
            // The partitioner failed to separate anything; chunk evenly.
            let chunk = partition.len().div_ceil(k);
            buckets = partition.chunks(chunk).map(<[u32]>::to_vec).collect();
        }

        for bucket in buckets {
            let child = tree.add_node(Some(node), None);
            queue.push_back((child, bucket));
        }
    }
    tree
}

/// Label centroids in a random lower-dimensional space: a Gaussian matrix
/// scaled by `1/sqrt(d)` projects each example, and a label's centroid is the
/// mean projection over its examples. Labels with no examples get pure noise
/// so they cluster arbitrarily instead of collapsing to zero.
pub fn projected_centroids(
    dataset: &SparseDataset,
    k: usize,
    project_dim: usize,
    rng: &mut StdRng,
) -> Vec<SparseVector> {
    let dim = dataset.dim().max(1);
    let scale = 1.0 / (dim as f64).sqrt();
    let normal = Normal::new(0.0, scale).expect("projection scale is positive");

    let projection =
        Array2::from_shape_fn((project_dim, dim), |_| normal.sample(rng) as f32);

    let mut label_rows: Vec<Vec<usize>> = vec![Vec::new(); k];
    for row in 0..dataset.rows() {
        for &label in dataset.labels(row) {
            label_rows[label as usize].push(row);
        }
    }

    label_rows
        .into_iter()
        .map(|rows| {
            let mut dense = vec![0.0f32; project_dim];
            if rows.is_empty() {
                for slot in &mut dense {
                    *slot = normal.sample(rng) as f32;
                }
            } else {
                for &row in &rows {
                    for (i, v) in dataset.features(row).iter() {
                        for (p, slot) in dense.iter_mut().enumerate() {
                            *slot += v * projection[[p, i as usize]];
                        }
                    }
                }
                let count = rows.len() as f32;
                dense.iter_mut().for_each(|v| *v /= count);
            }
            SparseVector::from_sorted(
                dense
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i as u32, v))
                    .collect(),
            )
        })
        .collect()
}
