//! Incrementally trained probabilistic label tree.
//!
//! `update` may be called from many threads. Tree shape (nodes, children,
//! leaf map, the lengths of both classifier tables) lives behind a
//! reader-writer lock: updates run under the shared lock, only tree
//! expansion takes it exclusively. Classifiers sit at stable indices in
//! grow-only tables and serialize their own updates through per-node locks,
//! so concurrent shared-lock holders never contend on shape. Centroids for
//! the online k-means routing heuristic are guarded by their own mutex,
//! always acquired after the tree lock.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use log::{info, warn};
use rand::prelude::*;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::{Error, Result};
use crate::inference::{plt_label_probability_with, predict_plt_with, Prediction};
use crate::io::{self, WeightsWriter};
use crate::model::{save_model_dir, TrainConfig, TreeType};
use crate::training::plt_nodes_for_example;
use crate::tree::{build, LabelTree, NodeId};

struct OnlineState<B> {
    tree: LabelTree,
    bases: Vec<Mutex<B>>,
    /// Temporary "split" classifiers; `None` once a node saturates (or for
    /// nodes that never expand: the root and leaves).
    tmp_bases: Vec<Option<Mutex<B>>>,
    rng: StdRng,
}

#[derive(Default)]
struct CentroidTable {
    centroids: Vec<HashMap<u32, f32>>,
    norms: Vec<f32>,
}

/// A probabilistic label tree that grows as labels arrive.
pub struct OnlinePlt<B: BaseLearner = LinearBase> {
    cfg: TrainConfig,
    online_tree: bool,
    state: RwLock<OnlineState<B>>,
    centroids: Mutex<CentroidTable>,
}

impl<B: BaseLearner> OnlinePlt<B> {
    /// Create an online model.
    ///
    /// Online tree types start empty and grow on demand. The offline
    /// complete/balanced structures can also be trained online when the
    /// label count is known up front.
    pub fn new(cfg: &TrainConfig, num_labels: usize) -> Result<Self> {
        if cfg.arity < 2 {
            return Err(Error::Config(format!("arity must be >= 2, got {}", cfg.arity)));
        }
        let online_tree = cfg.tree_type.is_online();

        let mut state = OnlineState {
            tree: LabelTree::new(),
            bases: Vec::new(),
            tmp_bases: Vec::new(),
            rng: StdRng::seed_from_u64(cfg.seed),
        };

        if !online_tree {
            if num_labels == 0 {
                return Err(Error::Config(
                    "an offline tree structure needs the label count up front".into(),
                ));
            }
            let order: Vec<u32> = (0..num_labels as u32).collect();
            state.tree = match cfg.tree_type {
                TreeType::Complete => build::complete_tree(num_labels, cfg.arity, order),
                TreeType::Balanced => build::balanced_tree(cfg.arity, order),
                other => {
                    return Err(Error::Config(format!(
                        "tree type {other:?} cannot be trained online"
                    )))
                }
            };
            state.tree.validate()?;
            for _ in 0..state.tree.len() {
                state.bases.push(Mutex::new(B::fresh(&cfg.base)));
                state.tmp_bases.push(None);
            }
        }

        Ok(Self {
            cfg: cfg.clone(),
            online_tree,
            state: RwLock::new(state),
            centroids: Mutex::new(CentroidTable::default()),
        })
    }

    /// Labels currently covered by the tree.
    pub fn num_labels(&self) -> usize {
        self.state.read().expect("poisoned tree lock").tree.num_leaves()
    }

    pub fn num_nodes(&self) -> usize {
        self.state.read().expect("poisoned tree lock").tree.len()
    }

    /// Absorb one example: grow the tree for unseen labels, then push the
    /// example through every positive and negative node's classifier.
    pub fn update(&self, labels: &[u32], features: &SparseVector) {
        if self.online_tree {
            let missing: Vec<u32> = {
                let state = self.state.read().expect("poisoned tree lock");
                labels
                    .iter()
                    .copied()
                    .filter(|&l| state.tree.leaf(l).is_none())
                    .collect()
            };
            if !missing.is_empty() {
                let mut state = self.state.write().expect("poisoned tree lock");
                // Another writer may have raced us here.
                let missing: Vec<u32> = missing
                    .into_iter()
                    .filter(|&l| state.tree.leaf(l).is_none())
                    .collect();
                if !missing.is_empty() {
                    self.expand_tree(&mut state, &missing, features);
                }
            }
        }

        let mut centroid_targets: Vec<(usize, bool)> = Vec::new();
        {
            let state = self.state.read().expect("poisoned tree lock");
            let (positive, negative) = match plt_nodes_for_example(&state.tree, labels) {
                Ok(sets) => sets,
                Err(label) => {
                    warn!("update: label {label} not present in the tree, skipping example");
                    return;
                }
            };

            for &node in &positive {
                self.lock_base(&state.bases[node as usize])
                    .update(1.0, features, &self.cfg.base);
            }
            for &node in &negative {
                self.lock_base(&state.bases[node as usize])
                    .update(0.0, features, &self.cfg.base);
            }

            if self.online_tree {
                // Temp classifiers learn the "time to split" signal from the
                // node's positives only.
                for &node in &positive {
                    if let Some(tmp) = &state.tmp_bases[node as usize] {
                        self.lock_base(tmp).update(0.0, features, &self.cfg.base);
                    }
                }
            }

            if self.cfg.tree_type == TreeType::OnlineKMeans {
                centroid_targets = positive
                    .iter()
                    .map(|&n| (n as usize, state.tree.node(n).is_leaf()))
                    .collect();
            }
        }

        if self.cfg.tree_type == TreeType::OnlineKMeans && !centroid_targets.is_empty() {
            let mut table = self.centroids.lock().expect("poisoned centroid lock");
            for (node, is_leaf) in centroid_targets {
                // The root-as-leaf corner carries no routing signal.
                if is_leaf && node == 0 {
                    continue;
                }
                self.add_to_centroid(&mut table, node, features);
            }
        }
    }

    /// Ranked top-K labels; safe to call concurrently with `update`.
    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        let state = self.state.read().expect("poisoned tree lock");
        predict_plt_with(
            &state.tree,
            |node| {
                self.lock_base(&state.bases[node as usize])
                    .predict_probability(features)
            },
            top_k,
            threshold,
        )
    }

    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        let state = self.state.read().expect("poisoned tree lock");
        plt_label_probability_with(&state.tree, label, |node| {
            self.lock_base(&state.bases[node as usize])
                .predict_probability(features)
        })
    }

    /// Persist as a regular PLT model directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut state = self.state.write().expect("poisoned tree lock");

        let out = File::create(dir.join(io::WEIGHTS_FILE))?;
        let mut writer = WeightsWriter::new(BufWriter::new(out), state.bases.len() as u32)?;
        let threshold = self.cfg.base.weights_threshold;
        for base in &mut state.bases {
            let base = base.get_mut().expect("poisoned base lock");
            base.prune(threshold);
            writer.write_base(base)?;
        }
        writer.finish()?;

        save_model_dir(&state.tree, &self.cfg, dir)
    }

    pub fn print_info(&self) {
        let state = self.state.read().expect("poisoned tree lock");
        let live_tmp = state.tmp_bases.iter().filter(|t| t.is_some()).count();
        info!(
            "online PLT: {} nodes, {} labels, {} expandable nodes",
            state.tree.len(),
            state.tree.num_leaves(),
            live_tmp
        );
    }

    fn lock_base<'a>(&self, base: &'a Mutex<B>) -> std::sync::MutexGuard<'a, B> {
        base.lock().expect("poisoned base lock")
    }

    /// Create a node with its classifier (and optional temp classifier),
    /// keeping all three tables aligned.
    fn push_node(
        &self,
        state: &mut OnlineState<B>,
        parent: Option<NodeId>,
        label: Option<u32>,
        base: B,
        tmp: Option<B>,
    ) -> NodeId {
        let node = state.tree.add_node(parent, label);
        state.bases.push(Mutex::new(base));
        state.tmp_bases.push(tmp.map(Mutex::new));
        node
    }

    /// Grow the tree for a batch of unseen labels (exclusive lock held).
    fn expand_tree(&self, state: &mut OnlineState<B>, new_labels: &[u32], features: &SparseVector) {
        let base_cfg = self.cfg.base.clone();
        let arity = self.cfg.arity.max(2);
        let max_leaves = self.cfg.max_leaves.max(1);

        if state.tree.is_empty() {
            // The root never splits itself, so it carries no temp classifier.
            self.push_node(state, None, None, B::fresh(&base_cfg), None);
        }
        let root = state.tree.root().expect("root exists after seeding");

        if state.tree.node(root).children.len() < arity {
            let group = self.push_node(
                state,
                Some(root),
                None,
                B::fresh(&base_cfg),
                Some(B::fresh(&base_cfg)),
            );
            for &label in new_labels {
                let leaf = self.push_node(state, Some(group), Some(label), B::fresh(&base_cfg), None);
                state.tree.bump_subtree_leaves(leaf, 1);
            }
            return;
        }

        let mut to_expand = root;
        while state.tmp_bases[to_expand as usize].is_none() {
            to_expand = self.descend(state, to_expand, features);
        }

        for &label in new_labels {
            let node = state.tree.node(to_expand);
            if node.children.len() < max_leaves {
                let seed = self.clone_tmp(state, to_expand);
                let leaf = self.push_node(state, Some(to_expand), Some(label), seed, None);
                state.tree.bump_subtree_leaves(leaf, 1);
                continue;
            }

            // Full: look for a sibling group with spare capacity first.
            let parent = state.tree.node(to_expand).parent;
            let spare = parent.and_then(|p| {
                state.tree.node(p).children.iter().copied().find(|&s| {
                    s != to_expand
                        && state.tmp_bases[s as usize].is_some()
                        && state.tree.node(s).children.len() < max_leaves
                })
            });
            if let Some(sibling) = spare {
                let seed = self.clone_tmp(state, sibling);
                let leaf = self.push_node(state, Some(sibling), Some(label), seed, None);
                state.tree.bump_subtree_leaves(leaf, 1);
                continue;
            }

            // Bottom-expand: an intermediate node seeded with the inverted
            // temp classifier adopts the current children; a fresh branch
            // takes the new leaf.
            let tmp = self.clone_tmp(state, to_expand);
            let inter = self.push_node(state, None, None, tmp.inverted(), Some(tmp.clone()));
            let moved = state.tree.take_children(to_expand);
            for child in moved {
                state.tree.attach(child, inter);
            }
            state.tree.node_mut(inter).subtree_leaves = state.tree.node(to_expand).subtree_leaves;
            state.tree.attach(inter, to_expand);

            let branch = self.push_node(
                state,
                Some(to_expand),
                None,
                tmp.clone(),
                Some(B::fresh(&base_cfg)),
            );
            let leaf = self.push_node(state, Some(branch), Some(label), tmp, None);
            state.tree.bump_subtree_leaves(leaf, 1);

            if state.tree.node(to_expand).children.len() >= arity {
                state.tmp_bases[to_expand as usize] = None;
            }

            // Remaining labels of this batch land in the fresh branch.
            to_expand = branch;
        }
    }

    fn clone_tmp(&self, state: &OnlineState<B>, node: NodeId) -> B {
        state.tmp_bases[node as usize]
            .as_ref()
            .map(|tmp| self.lock_base(tmp).clone())
            .expect("expandable node owns a temp classifier")
    }

    /// One descent step toward the first expandable node.
    fn descend(&self, state: &mut OnlineState<B>, from: NodeId, features: &SparseVector) -> NodeId {
        // Leaves cannot be descended into; every non-expandable internal
        // node keeps at least one non-leaf child by construction.
        let candidates: Vec<NodeId> = {
            let children = &state.tree.node(from).children;
            let non_leaf: Vec<NodeId> = children
                .iter()
                .copied()
                .filter(|&c| {
                    !state.tree.node(c).is_leaf() || state.tmp_bases[c as usize].is_some()
                })
                .collect();
            if non_leaf.is_empty() {
                children.clone()
            } else {
                non_leaf
            }
        };

        let alfa = self.cfg.online_tree_alfa;
        let parent_leaves = state.tree.node(from).subtree_leaves.max(1) as f64;
        let share = parent_leaves / candidates.len() as f64;
        let balance = |state: &OnlineState<B>, child: NodeId| {
            (share / state.tree.node(child).subtree_leaves.max(1) as f64).ln()
        };

        match self.cfg.tree_type {
            TreeType::OnlineRandom => candidates[state.rng.random_range(0..candidates.len())],
            TreeType::OnlineBestScore => best_by(&candidates, |&child| {
                let prob = self
                    .lock_base(&state.bases[child as usize])
                    .predict_probability(features);
                (1.0 - alfa) * prob + alfa * balance(state, child)
            }),
            TreeType::OnlineKMeans => {
                let table = self.centroids.lock().expect("poisoned centroid lock");
                best_by(&candidates, |&child| {
                    let score = self.centroid_similarity(&table, child as usize, features);
                    (1.0 - alfa) * (1.0 / (1.0 + score.exp())) + alfa * balance(state, child)
                })
            }
            // Creation order keeps the complete variant filling left to
            // right; the balanced variant chases the lightest subtree.
            TreeType::OnlineComplete => candidates[0],
            TreeType::OnlineBalanced => best_by(&candidates, |&child| {
                -(state.tree.node(child).subtree_leaves as f64)
            }),
            _ => candidates[0],
        }
    }

    /// Cosine between the example and a node centroid; 0 for a centroid
    /// that has absorbed nothing yet, so routing falls back to the
    /// `1/(1+e^0) = 0.5` baseline.
    fn centroid_similarity(
        &self,
        table: &CentroidTable,
        node: usize,
        features: &SparseVector,
    ) -> f64 {
        let Some(map) = table.centroids.get(node) else {
            return 0.0;
        };
        let norm = table.norms.get(node).copied().unwrap_or(0.0);
        if map.is_empty() || norm <= 0.0 {
            return 0.0;
        }

        features
            .iter()
            .map(|(index, value)| {
                let index = self.route_index(index);
                map.get(&index)
                    .map_or(0.0, |&w| f64::from(w / norm) * f64::from(value))
            })
            .sum()
    }

    fn add_to_centroid(&self, table: &mut CentroidTable, node: usize, features: &SparseVector) {
        if table.centroids.len() <= node {
            table.centroids.resize_with(node + 1, HashMap::new);
            table.norms.resize(node + 1, 0.0);
        }

        let map = &mut table.centroids[node];
        for (index, value) in features.iter() {
            *map.entry(self.route_index(index)).or_insert(0.0) += value;
        }
        table.norms[node] = map.values().map(|w| w * w).sum::<f32>().sqrt();
    }

    #[inline]
    fn route_index(&self, index: u32) -> u32 {
        if self.cfg.kmeans_hash && self.cfg.hash > 0 {
            (hash_index(index) % self.cfg.hash as u64) as u32
        } else {
            index
        }
    }
}

fn best_by<F: FnMut(&NodeId) -> f64>(candidates: &[NodeId], mut score: F) -> NodeId {
    let mut best = candidates[0];
    let mut best_score = f64::MIN;
    for child in candidates {
        let s = score(child);
        if s > best_score {
            best_score = s;
            best = *child;
        }
    }
    best
}

/// Cheap avalanche hash for feature-index folding.
fn hash_index(index: u32) -> u64 {
    let mut h = u64::from(index).wrapping_add(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h
}

/// Train an online model over a full dataset (a sequential replay of
/// `update`) and persist it.
pub fn train_online<B: BaseLearner>(
    dataset: &SparseDataset,
    cfg: &TrainConfig,
    dir: &Path,
) -> Result<()> {
    let model: OnlinePlt<B> = OnlinePlt::new(cfg, dataset.num_labels())?;
    for row in 0..dataset.rows() {
        model.update(dataset.labels(row), dataset.features(row));
    }
    model.print_info();
    model.save(dir)
}
