//! Probabilistic label tree: the multi-label workhorse.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::{Error, Result};
use crate::inference::{plt_label_probability_with, predict_plt, Prediction};
use crate::io::{self, load_bases, WeightsWriter};
use crate::model::{save_model_dir, topdown, TrainConfig, TreeType};
use crate::training::{assign_plt, BaseTrainerPool};
use crate::tree::{build::build_tree, LabelTree};

/// A trained probabilistic label tree.
///
/// Every node's classifier estimates the probability that the example's
/// label set intersects the node's subtree; a label's probability is the
/// product along its root path.
pub struct PltModel<B: BaseLearner = LinearBase> {
    tree: LabelTree,
    bases: Vec<B>,
}

impl<B: BaseLearner> PltModel<B> {
    /// Train to a model directory.
    pub fn train(dataset: &SparseDataset, cfg: &TrainConfig, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        if cfg.tree_type == TreeType::TopDown {
            let tree = topdown::train_top_down::<B>(dataset, cfg, dir)?;
            save_model_dir(&tree, cfg, dir)?;
            return Ok(());
        }

        let tree = build_tree(dataset, cfg)?;
        if tree.num_leaves() < dataset.num_labels() {
            return Err(Error::LeafCount {
                leaves: tree.num_leaves(),
                labels: dataset.num_labels(),
            });
        }

        let (assignment, stats) = assign_plt(&tree, dataset);
        info!(
            "assigned {} rows ({} skipped), {:.2} nodes per row",
            stats.rows,
            stats.skipped,
            stats.nodes_per_row()
        );

        let out = File::create(dir.join(io::WEIGHTS_FILE))?;
        let mut writer = WeightsWriter::new(BufWriter::new(out), tree.len() as u32)?;
        BaseTrainerPool::new(cfg.threads).train_streaming::<B, _>(
            dataset.dim(),
            &assignment,
            dataset,
            &cfg.base,
            &mut writer,
        )?;
        writer.finish()?;

        save_model_dir(&tree, cfg, dir)
    }

    /// Load a trained model.
    pub fn load(dir: &Path) -> Result<Self> {
        let tree = io::load_tree(&mut BufReader::new(File::open(dir.join(io::TREE_FILE))?))?;
        let bases: Vec<B> =
            load_bases(&mut BufReader::new(File::open(dir.join(io::WEIGHTS_FILE))?))?;
        if bases.len() != tree.len() {
            return Err(Error::Format(format!(
                "{} classifiers for {} tree nodes",
                bases.len(),
                tree.len()
            )));
        }
        Ok(Self { tree, bases })
    }

    pub fn from_parts(tree: LabelTree, bases: Vec<B>) -> Self {
        debug_assert_eq!(tree.len(), bases.len());
        Self { tree, bases }
    }

    /// Number of labels the model can predict.
    pub fn num_labels(&self) -> usize {
        self.tree.num_leaves()
    }

    pub fn tree(&self) -> &LabelTree {
        &self.tree
    }

    /// Ranked top-K labels for one example.
    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        predict_plt(&self.tree, &self.bases, features, top_k, threshold)
    }

    /// Path probability of a single label.
    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        plt_label_probability_with(&self.tree, label, |node| {
            self.bases[node as usize].predict_probability(features)
        })
    }

    pub fn print_info(&self) {
        info!(
            "PLT model: {} nodes, {} labels",
            self.tree.len(),
            self.num_labels()
        );
    }
}
