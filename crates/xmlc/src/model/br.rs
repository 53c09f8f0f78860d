//! Binary relevance and one-vs-rest: one flat classifier per label.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::Result;
use crate::inference::{truncate_ranked, Prediction};
use crate::io::{self, load_bases, WeightsWriter};
use crate::model::TrainConfig;
use crate::training::{assign_br, BaseTrainerPool};

/// A flat model with one classifier per label, in label-index order.
pub struct BrModel<B: BaseLearner = LinearBase> {
    bases: Vec<B>,
    /// One-vs-rest: training rejects rows without exactly one label.
    exactly_one_label: bool,
}

impl<B: BaseLearner> BrModel<B> {
    pub fn train(
        dataset: &SparseDataset,
        cfg: &TrainConfig,
        dir: &Path,
        exactly_one_label: bool,
    ) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let k = dataset.num_labels();

        // The label range can be windowed when per-part memory matters;
        // a single part covers the whole range by default.
        let parts = 1u32;
        let range = (k as u32) / parts + 1;

        let out = File::create(dir.join(io::WEIGHTS_FILE))?;
        let mut writer = WeightsWriter::new(BufWriter::new(out), k as u32)?;
        let pool = BaseTrainerPool::new(cfg.threads);

        for part in 0..parts {
            let start = part * range;
            let stop = ((part + 1) * range).min(k as u32);
            if start >= stop {
                break;
            }

            let (assignment, stats) = assign_br(dataset, start, stop, exactly_one_label);
            info!(
                "labels [{start}, {stop}): {} rows ({} skipped)",
                stats.rows, stats.skipped
            );
            pool.train_streaming::<B, _>(
                dataset.dim(),
                &assignment,
                dataset,
                &cfg.base,
                &mut writer,
            )?;
        }
        writer.finish()?;

        let mut args = File::create(dir.join(io::ARGS_FILE))?;
        io::save_config(cfg, &mut args)?;
        Ok(())
    }

    pub fn load(dir: &Path, exactly_one_label: bool) -> Result<Self> {
        let bases: Vec<B> =
            load_bases(&mut BufReader::new(File::open(dir.join(io::WEIGHTS_FILE))?))?;
        Ok(Self {
            bases,
            exactly_one_label,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.bases.len()
    }

    /// Evaluate every classifier and rank the labels.
    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        let mut predictions: Vec<Prediction> = self
            .bases
            .iter()
            .enumerate()
            .map(|(label, base)| Prediction {
                label: label as u32,
                value: base.predict_probability(features),
            })
            .collect();
        predictions
            .sort_by(|a, b| b.value.total_cmp(&a.value).then(a.label.cmp(&b.label)));
        truncate_ranked(&mut predictions, top_k, threshold);
        predictions
    }

    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        self.bases
            .get(label as usize)
            .map_or(0.0, |base| base.predict_probability(features))
    }

    pub fn print_info(&self) {
        let name = if self.exactly_one_label { "OVR" } else { "BR" };
        info!("{name} model: {} labels", self.num_labels());
    }
}
