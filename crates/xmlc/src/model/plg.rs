//! Probabilistic label graph: a fixed-width, hash-routed layered graph in
//! place of the tree.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use rand::prelude::*;

use crate::base::{BaseLearner, LinearBase};
use crate::data::{SparseDataset, SparseVector};
use crate::error::{Error, Result};
use crate::graph::LayerGraph;
use crate::inference::{truncate_ranked, Prediction};
use crate::io::{self, load_bases, WeightsWriter};
use crate::model::TrainConfig;
use crate::training::{Assignment, BaseTrainerPool};

/// A trained label graph: one classifier per directed edge.
pub struct PlgModel<B: BaseLearner = LinearBase> {
    graph: LayerGraph,
    bases: Vec<B>,
    /// Inverse routing map used by brute-force prediction.
    base_to_labels: Vec<Vec<u32>>,
}

impl<B: BaseLearner> PlgModel<B> {
    pub fn train(dataset: &SparseDataset, cfg: &TrainConfig, dir: &Path) -> Result<()> {
        if cfg.plg_layers == 0 || cfg.plg_layer_size == 0 {
            return Err(Error::Config(
                "label graph needs at least one layer and one node per layer".into(),
            ));
        }
        std::fs::create_dir_all(dir)?;

        let k = dataset.num_labels();
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let graph = LayerGraph::generate(k, cfg.plg_layers, cfg.plg_layer_size, &mut rng);
        info!(
            "label graph: {} layers of {} nodes, {} edges",
            graph.layers(),
            graph.layer_size(),
            graph.edge_count()
        );

        let mut out = File::create(dir.join(io::GRAPH_FILE))?;
        io::save_graph(&graph, &mut out)?;

        let assignment = assign_edges(&graph, dataset);

        let out = File::create(dir.join(io::WEIGHTS_FILE))?;
        let mut writer = WeightsWriter::new(BufWriter::new(out), graph.edge_count() as u32)?;
        BaseTrainerPool::new(cfg.threads).train_streaming::<B, _>(
            dataset.dim(),
            &assignment,
            dataset,
            &cfg.base,
            &mut writer,
        )?;
        writer.finish()?;

        let mut args = File::create(dir.join(io::ARGS_FILE))?;
        io::save_config(cfg, &mut args)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let graph = io::load_graph(&mut BufReader::new(File::open(dir.join(io::GRAPH_FILE))?))?;
        let bases: Vec<B> =
            load_bases(&mut BufReader::new(File::open(dir.join(io::WEIGHTS_FILE))?))?;
        if bases.len() != graph.edge_count() {
            return Err(Error::Format(format!(
                "{} classifiers for {} graph edges",
                bases.len(),
                graph.edge_count()
            )));
        }
        let base_to_labels = graph.base_to_labels();
        Ok(Self {
            graph,
            bases,
            base_to_labels,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.graph.num_labels()
    }

    pub fn graph(&self) -> &LayerGraph {
        &self.graph
    }

    /// Brute-force ranking: every label's score is the product of its path
    /// edges' probabilities; the inverse map lets each edge be evaluated
    /// once.
    pub fn predict(&self, features: &SparseVector, top_k: usize, threshold: f64) -> Vec<Prediction> {
        let m = self.num_labels();
        let mut scores = vec![1.0f64; m];
        for (base, labels) in self.bases.iter().zip(&self.base_to_labels) {
            if labels.is_empty() {
                continue;
            }
            let value = base.predict_probability(features);
            for &label in labels {
                scores[label as usize] *= value;
            }
        }

        let mut predictions: Vec<Prediction> = scores
            .into_iter()
            .enumerate()
            .map(|(label, value)| Prediction {
                label: label as u32,
                value,
            })
            .collect();

        // Partial sort: place the top-K prefix, then order it.
        if top_k > 0 && top_k < predictions.len() {
            predictions.select_nth_unstable_by(top_k - 1, |a, b| {
                b.value.total_cmp(&a.value).then(a.label.cmp(&b.label))
            });
            predictions.truncate(top_k);
        }
        predictions.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.label.cmp(&b.label)));
        truncate_ranked(&mut predictions, top_k, threshold);
        predictions
    }

    pub fn predict_for_label(&self, label: u32, features: &SparseVector) -> f64 {
        if (label as usize) >= self.num_labels() {
            return 0.0;
        }
        self.graph
            .path_edges(label)
            .into_iter()
            .map(|edge| self.bases[edge].predict_probability(features))
            .product()
    }

    pub fn print_info(&self) {
        info!(
            "PLG model: {} labels, {} layers x {} nodes, {} edge classifiers",
            self.num_labels(),
            self.graph.layers(),
            self.graph.layer_size(),
            self.bases.len()
        );
    }
}

/// Per-edge training sets: every edge on a label's path is a positive;
/// every other edge leaving a node on a positive path is a negative.
fn assign_edges(graph: &LayerGraph, dataset: &SparseDataset) -> Assignment {
    let mut assignment = Assignment::with_nodes(graph.edge_count(), false);
    let layer_size = graph.layer_size();

    for row in 0..dataset.rows() {
        let mut positive_edges: HashSet<usize> = HashSet::new();
        let mut positive_nodes: HashSet<usize> = HashSet::new();

        for &label in dataset.labels(row) {
            let mut prev = 0usize;
            for layer in 0..graph.layers() {
                positive_nodes.insert(prev);
                let next = graph.node_for_label(label, layer);
                positive_edges.insert(prev * layer_size + next);
                prev = 1 + layer * layer_size + next;
            }
        }

        let mut edges: Vec<usize> = positive_edges.iter().copied().collect();
        edges.sort_unstable();
        for edge in edges {
            assignment.labels[edge].push(1.0);
            assignment.rows[edge].push(row);
        }

        let mut nodes: Vec<usize> = positive_nodes.into_iter().collect();
        nodes.sort_unstable();
        for node in nodes {
            for edge in node * layer_size..(node + 1) * layer_size {
                if !positive_edges.contains(&edge) {
                    assignment.labels[edge].push(0.0);
                    assignment.rows[edge].push(row);
                }
            }
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_graph() -> LayerGraph {
        let mut rng = StdRng::seed_from_u64(5);
        LayerGraph::generate(6, 2, 3, &mut rng)
    }

    #[test]
    fn positive_edges_follow_label_paths() {
        let graph = toy_graph();
        let dataset = SparseDataset::new(
            vec![vec![0, 3]],
            vec![SparseVector::from_sorted(vec![(0, 1.0)])],
        )
        .unwrap()
        .with_num_labels(6);

        let assignment = assign_edges(&graph, &dataset);
        for label in [0u32, 3u32] {
            for edge in graph.path_edges(label) {
                assert!(
                    assignment.labels[edge].contains(&1.0),
                    "edge {edge} missing positive"
                );
            }
        }
    }

    #[test]
    fn negatives_only_leave_positive_nodes() {
        let graph = toy_graph();
        let dataset = SparseDataset::new(
            vec![vec![1]],
            vec![SparseVector::from_sorted(vec![(0, 1.0)])],
        )
        .unwrap()
        .with_num_labels(6);

        let assignment = assign_edges(&graph, &dataset);
        // One positive per layer, layer_size - 1 negatives per positive node.
        let positives: usize = assignment
            .labels
            .iter()
            .map(|l| l.iter().filter(|&&t| t == 1.0).count())
            .sum();
        let negatives: usize = assignment
            .labels
            .iter()
            .map(|l| l.iter().filter(|&&t| t == 0.0).count())
            .sum();
        assert_eq!(positives, graph.layers());
        assert_eq!(negatives, graph.layers() * (graph.layer_size() - 1));
    }
}
