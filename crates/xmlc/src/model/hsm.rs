//! Hierarchical softmax: the single-label sibling of the label tree.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::{Error, Result};
use crate::inference::{hsm_label_probability, predict_hsm, Prediction};
use crate::io::{self, load_bases, WeightsWriter};
use crate::model::{save_model_dir, TrainConfig, TreeType};
use crate::training::{assign_hsm, BaseTrainerPool};
use crate::tree::{build::build_tree, LabelTree};

/// A trained hierarchical-softmax model.
///
/// Path probabilities are products of conditional child selections: binary
/// parents spend one estimator, wider parents a softmax across siblings.
pub struct HsmModel<B: BaseLearner = LinearBase> {
    tree: LabelTree,
    bases: Vec<B>,
}

impl<B: BaseLearner> HsmModel<B> {
    pub fn train(dataset: &SparseDataset, cfg: &TrainConfig, dir: &Path) -> Result<()> {
        if cfg.tree_type == TreeType::TopDown {
            return Err(Error::Config(
                "top-down partitioning trains a PLT, not an HSM".into(),
            ));
        }
        std::fs::create_dir_all(dir)?;

        let tree = build_tree(dataset, cfg)?;
        if tree.num_leaves() < dataset.num_labels() {
            return Err(Error::LeafCount {
                leaves: tree.num_leaves(),
                labels: dataset.num_labels(),
            });
        }

        let (assignment, stats) = assign_hsm(&tree, dataset, cfg.hsm_pick_one_label_weighting);
        info!(
            "assigned {} rows ({} skipped), {:.2} estimators per row",
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

    pub fn num_labels(&self) -> usize {
        self.tree.num_leaves()
    }

    pub fn tree(&self) -> &LabelTree {
        &self.tree
    }

    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        predict_hsm(&self.tree, &self.bases, features, top_k, threshold)
    }

    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        hsm_label_probability(&self.tree, &self.bases, label, features)
    }

    pub fn print_info(&self) {
        info!(
            "HSM model: {} nodes, {} labels",
            self.tree.len(),
            self.num_labels()
        );
    }
}
