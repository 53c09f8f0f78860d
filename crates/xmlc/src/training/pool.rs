//! Pooled training of per-node base classifiers.

use std::io::Write;

use log::info;

use crate::base::{BaseConfig, BaseLearner};
use crate::data::{SparseDataset, SparseVector};
use crate::error::Result;
use crate::io::WeightsWriter;
use crate::training::Assignment;
use crate::utils::run_with_threads;

/// Trains one base classifier per node and streams the results, in
/// node-index order, into a single weights file.
///
/// Jobs are independent: each reads only its node's targets and borrowed
/// feature rows. Nodes are processed in fixed-size chunks so that at most
/// one chunk of trained classifiers is in memory; rayon's order-preserving
/// `map` keeps the stream index-sorted without any reordering buffer.
#[derive(Debug, Clone)]
pub struct BaseTrainerPool {
    threads: usize,
    chunk_size: usize,
}

impl BaseTrainerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            chunk_size: 512,
        }
    }

    /// Bound the number of classifiers held in memory at once.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Train every node of `assignment` and append the classifiers to
    /// `writer` in node-index order.
    pub fn train_streaming<B, W>(
        &self,
        dim: usize,
        assignment: &Assignment,
        dataset: &SparseDataset,
        cfg: &BaseConfig,
        writer: &mut WeightsWriter<W>,
    ) -> Result<()>
    where
        B: BaseLearner,
        W: Write + Send,
    {
        let nodes = assignment.nodes();
        info!("training {nodes} base classifiers in {} threads", self.threads);

        run_with_threads(self.threads, |parallelism| -> Result<()> {
            let mut start = 0;
            while start < nodes {
                let stop = (start + self.chunk_size).min(nodes);
                let trained: Vec<B> = parallelism.maybe_par_map(start..stop, |node| {
                    self.train_node(dim, assignment, dataset, cfg, node)
                });
                start = stop;
                for base in &trained {
                    writer.write_base(base)?;
                }
            }
            Ok(())
        })
    }

    /// Train every node and collect the classifiers in node-index order.
    pub fn train_collect<B>(
        &self,
        dim: usize,
        assignment: &Assignment,
        dataset: &SparseDataset,
        cfg: &BaseConfig,
    ) -> Vec<B>
    where
        B: BaseLearner,
    {
        run_with_threads(self.threads, |parallelism| {
            parallelism.maybe_par_map(0..assignment.nodes(), |node| {
                self.train_node(dim, assignment, dataset, cfg, node)
            })
        })
    }

    fn train_node<B: BaseLearner>(
        &self,
        dim: usize,
        assignment: &Assignment,
        dataset: &SparseDataset,
        cfg: &BaseConfig,
        node: usize,
    ) -> B {
        let examples: Vec<&SparseVector> = assignment.rows[node]
            .iter()
            .map(|&row| dataset.features(row))
            .collect();
        let weights = assignment.weights.as_ref().map(|w| w[node].as_slice());

        let mut base = B::fresh(cfg);
        base.train(dim, &assignment.labels[node], &examples, weights, cfg);
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::LinearBase;
    use crate::data::SparseVector;
    use crate::io::load_bases;
    use crate::tree::build::complete_tree;
    use crate::training::assign_plt;

    fn toy_dataset() -> SparseDataset {
        let rows = vec![vec![0], vec![1], vec![0], vec![1]];
        let features = vec![
            SparseVector::from_sorted(vec![(0, 1.0)]),
            SparseVector::from_sorted(vec![(1, 1.0)]),
            SparseVector::from_sorted(vec![(0, 0.9)]),
            SparseVector::from_sorted(vec![(1, 0.8)]),
        ];
        SparseDataset::new(rows, features).unwrap()
    }

    #[test]
    fn streamed_bases_match_node_order() {
        let dataset = toy_dataset();
        let tree = complete_tree(2, 2, vec![0, 1]);
        let (assignment, _) = assign_plt(&tree, &dataset);

        let cfg = BaseConfig {
            epochs: 10,
            weights_threshold: 0.0,
            ..BaseConfig::default()
        };
        let pool = BaseTrainerPool::new(2).with_chunk_size(2);

        let mut buf = Vec::new();
        let mut writer = WeightsWriter::new(&mut buf, tree.len() as u32).unwrap();
        pool.train_streaming::<LinearBase, _>(dataset.dim(), &assignment, &dataset, &cfg, &mut writer)
            .unwrap();
        writer.finish().unwrap();

        let loaded: Vec<LinearBase> = load_bases(&mut buf.as_slice()).unwrap();
        let collected: Vec<LinearBase> =
            pool.train_collect(dataset.dim(), &assignment, &dataset, &cfg);
        assert_eq!(loaded.len(), collected.len());

        let x = SparseVector::from_sorted(vec![(0, 1.0)]);
        for (a, b) in loaded.iter().zip(collected.iter()) {
            assert!((a.predict_probability(&x) - b.predict_probability(&x)).abs() < 1e-6);
        }
    }
}
