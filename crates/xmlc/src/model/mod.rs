//! Model variants and the shared entry points.
//!
//! The variants form a closed sum type: probabilistic label tree (PLT),
//! hierarchical softmax (HSM), binary relevance (BR) and its one-vs-rest
//! restriction (OVR), the online PLT, and the probabilistic label graph
//! (PLG). All share the capability set `train` / `predict` /
//! `predict_for_label` / `save` / `load` / `print_info`.

mod br;
mod config;
mod hsm;
mod online;
mod plg;
mod plt;
pub(crate) mod topdown;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;

use log::info;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::Result;
use crate::inference::Prediction;
use crate::io;
use crate::tree::LabelTree;
use crate::utils::run_with_threads;

pub use br::BrModel;
pub use config::{ModelType, TrainConfig, TreeType};
pub use hsm::HsmModel;
pub use online::{train_online, OnlinePlt};
pub use plg::PlgModel;
pub use plt::PltModel;

/// Write the tree files and configuration of a tree-backed model directory.
pub(crate) fn save_model_dir(tree: &LabelTree, cfg: &TrainConfig, dir: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(dir.join(io::TREE_FILE))?);
    io::save_tree(tree, &mut out)?;
    let mut txt = BufWriter::new(File::create(dir.join(io::TREE_TXT_FILE))?);
    io::save_tree_txt(tree, &mut txt)?;
    let mut args = File::create(dir.join(io::ARGS_FILE))?;
    io::save_config(cfg, &mut args)?;
    Ok(())
}

/// A loaded model of any variant.
pub enum Model<B: BaseLearner = LinearBase> {
    Plt(PltModel<B>),
    Hsm(HsmModel<B>),
    Br(BrModel<B>),
    Ovr(BrModel<B>),
    Online(OnlinePlt<B>),
    Plg(PlgModel<B>),
}

impl<B: BaseLearner> From<OnlinePlt<B>> for Model<B> {
    /// Wrap a live online model for variant-agnostic inference.
    fn from(model: OnlinePlt<B>) -> Self {
        Model::Online(model)
    }
}

impl<B: BaseLearner> Model<B> {
    /// Train the model selected by `cfg.model_type` into `dir`.
    pub fn train(dataset: &SparseDataset, cfg: &TrainConfig, dir: &Path) -> Result<()> {
        match cfg.model_type {
            ModelType::Plt => PltModel::<B>::train(dataset, cfg, dir),
            ModelType::Hsm => HsmModel::<B>::train(dataset, cfg, dir),
            ModelType::Br => BrModel::<B>::train(dataset, cfg, dir, false),
            ModelType::Ovr => BrModel::<B>::train(dataset, cfg, dir, true),
            ModelType::OnlinePlt => online::train_online::<B>(dataset, cfg, dir),
            ModelType::Plg => PlgModel::<B>::train(dataset, cfg, dir),
        }
    }

    /// Load a model directory; the variant comes from its `args.bin`.
    ///
    /// A persisted online PLT is structurally a PLT and loads as one.
    pub fn load(dir: &Path) -> Result<Self> {
        let cfg = io::load_config(&mut File::open(dir.join(io::ARGS_FILE))?)?;
        Ok(match cfg.model_type {
            ModelType::Plt | ModelType::OnlinePlt => Model::Plt(PltModel::load(dir)?),
            ModelType::Hsm => Model::Hsm(HsmModel::load(dir)?),
            ModelType::Br => Model::Br(BrModel::load(dir, false)?),
            ModelType::Ovr => Model::Ovr(BrModel::load(dir, true)?),
            ModelType::Plg => Model::Plg(PlgModel::load(dir)?),
        })
    }

    /// Ranked top-K labels for one example.
    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        match self {
            Model::Plt(m) => m.predict(features, top_k, threshold),
            Model::Hsm(m) => m.predict(features, top_k, threshold),
            Model::Br(m) | Model::Ovr(m) => m.predict(features, top_k, threshold),
            Model::Online(m) => m.predict(features, top_k, threshold),
            Model::Plg(m) => m.predict(features, top_k, threshold),
        }
    }

    /// Probability of a single label for one example.
    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        match self {
            Model::Plt(m) => m.predict_for_label(label, features),
            Model::Hsm(m) => m.predict_for_label(label, features),
            Model::Br(m) | Model::Ovr(m) => m.predict_for_label(label, features),
            Model::Online(m) => m.predict_for_label(label, features),
            Model::Plg(m) => m.predict_for_label(label, features),
        }
    }

    pub fn num_labels(&self) -> usize {
        match self {
            Model::Plt(m) => m.num_labels(),
            Model::Hsm(m) => m.num_labels(),
            Model::Br(m) | Model::Ovr(m) => m.num_labels(),
            Model::Online(m) => m.num_labels(),
            Model::Plg(m) => m.num_labels(),
        }
    }

    pub fn print_info(&self) {
        match self {
            Model::Plt(m) => m.print_info(),
            Model::Hsm(m) => m.print_info(),
            Model::Br(m) | Model::Ovr(m) => m.print_info(),
            Model::Online(m) => m.print_info(),
            Model::Plg(m) => m.print_info(),
        }
    }

    /// Predict every row of a dataset on the worker pool. Results line up
    /// with the dataset rows regardless of thread count.
    pub fn predict_batch(
        &self,
        dataset: &SparseDataset,
        threads: usize,
        top_k: usize,
        threshold: f64,
    ) -> Vec<Vec<Prediction>> {
        run_with_threads(threads, |parallelism| {
            parallelism.maybe_par_map(0..dataset.rows(), |row| {
                self.predict(dataset.features(row), top_k, threshold)
            })
        })
    }

    /// Precision at 1..=top_k over a labeled dataset.
    ///
    /// Per-example ranking runs on the pool; the shared hit counters sit
    /// behind one mutex with an O(top_k) critical section.
    pub fn precision_at(&self, dataset: &SparseDataset, threads: usize, top_k: usize) -> Vec<f64> {
        let correct_at = Mutex::new(vec![0u64; top_k]);

        run_with_threads(threads, |parallelism| {
            parallelism.maybe_par_for_each(0..dataset.rows(), |row| {
                let predictions = self.predict(dataset.features(row), top_k, 0.0);
                let labels = dataset.labels(row);
                let mut local = vec![0u64; top_k];
                for (rank, prediction) in predictions.iter().enumerate() {
                    if labels.contains(&prediction.label) {
                        local[rank] += 1;
                    }
                }

                let mut shared = correct_at.lock().expect("poisoned counter lock");
                for (total, hit) in shared.iter_mut().zip(local) {
                    *total += hit;
                }
            });
        });

        let rows = dataset.rows().max(1) as f64;
        let correct = correct_at.into_inner().expect("poisoned counter lock");
        let mut precision = Vec::with_capacity(top_k);
        let mut cumulative = 0u64;
        for (i, &hits) in correct.iter().enumerate() {
            cumulative += hits;
            precision.push(cumulative as f64 / (rows * (i + 1) as f64));
        }
        info!(
            "precision@1..{top_k}: {:?}",
            precision.iter().map(|p| (p * 1e4).round() / 1e4).collect::<Vec<_>>()
        );
        precision
    }
}
