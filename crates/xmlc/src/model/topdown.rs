//! Top-down partitioning: the tree is carved out of the label range while
//! classifiers train on the positives each split attracts.
//!
//! The recursive label splitting alone fixes the structure (it is the
//! balanced tree over the sorted label range), so the tree is materialized
//! first and training walks it level by level: each level's jobs run on the
//! pool, and the resulting classifiers stream out in node-index order before
//! the next level starts. Every node trains exactly once per level pass.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::info;

use crate::base::{BaseConfig, BaseLearner};
use crate::data::{SparseDataset, SparseVector};
use crate::error::Result;
use crate::io::{self, WeightsWriter};
use crate::model::TrainConfig;
use crate::tree::{build::balanced_tree, LabelTree, NodeId};
use crate::utils::run_with_threads;

/// Train a PLT top-down, writing `weights.bin`; returns the tree for the
/// caller to persist alongside.
pub fn train_top_down<B: BaseLearner>(
    dataset: &SparseDataset,
    cfg: &TrainConfig,
    dir: &Path,
) -> Result<LabelTree> {
    let k = dataset.num_labels();
    if k == 0 {
        return Err(crate::error::Error::Config(
            "dataset references no labels".into(),
        ));
    }
    let tree = balanced_tree(cfg.arity, (0..k as u32).collect());
    tree.validate()?;
    let ranges = subtree_ranges(&tree);

    info!(
        "top-down training over {} nodes ({} labels) in {} threads",
        tree.len(),
        k,
        cfg.threads
    );

    let out = File::create(dir.join(io::WEIGHTS_FILE))?;
    let mut writer = WeightsWriter::new(BufWriter::new(out), tree.len() as u32)?;

    run_with_threads(cfg.threads, |parallelism| -> Result<()> {
        let root = tree.root().expect("balanced tree always has a root");

        // The root's sub-problem: does the row carry any label at all?
        let all_rows: Vec<usize> = (0..dataset.rows()).collect();
        let (root_base, root_positives) = train_node::<B>(
            dataset,
            &cfg.base,
            &all_rows,
            ranges[root as usize],
        );
        writer.write_base(&root_base)?;

        let mut jobs: Vec<(NodeId, Vec<usize>)> = if tree.node(root).children.is_empty() {
            Vec::new()
        } else {
            vec![(root, root_positives)]
        };

        while !jobs.is_empty() {
            // One result set per job, each covering the job's children in
            // order; jobs are in index order, so the flattened stream is too.
            let results: Vec<Vec<(NodeId, B, Vec<usize>)>> =
                parallelism.maybe_par_map(&jobs, |(node, rows)| {
                    tree.node(*node)
                        .children
                        .iter()
                        .map(|&child| {
                            let (base, positives) = train_node::<B>(
                                dataset,
                                &cfg.base,
                                rows,
                                ranges[child as usize],
                            );
                            (child, base, positives)
                        })
                        .collect()
                });

            let mut next_jobs = Vec::new();
            for child_results in results {
                for (child, base, positives) in child_results {
                    writer.write_base(&base)?;
                    if !tree.node(child).children.is_empty() {
                        next_jobs.push((child, positives));
                    }
                }
            }
            jobs = next_jobs;
        }
        Ok(())
    })?;

    writer.finish()?;
    Ok(tree)
}

/// Train one node's classifier on its parent's positive rows; the target is
/// whether the row's labels intersect the node's label range. Returns the
/// rows the node attracted, which become its children's training set.
fn train_node<B: BaseLearner>(
    dataset: &SparseDataset,
    cfg: &BaseConfig,
    rows: &[usize],
    (lo, hi): (u32, u32),
) -> (B, Vec<usize>) {
    let mut labels = Vec::with_capacity(rows.len());
    let mut examples: Vec<&SparseVector> = Vec::with_capacity(rows.len());
    let mut positives = Vec::new();

    for &row in rows {
        let hit = dataset.labels(row).iter().any(|&l| l >= lo && l < hi);
        labels.push(if hit { 1.0 } else { 0.0 });
        examples.push(dataset.features(row));
        if hit {
            positives.push(row);
        }
    }

    let mut base = B::fresh(cfg);
    base.train(dataset.dim(), &labels, &examples, None, cfg);
    (base, positives)
}

/// `[lo, hi)` label range of every node's subtree. Children carry larger
/// indices than their parents, so one reverse pass suffices.
fn subtree_ranges(tree: &LabelTree) -> Vec<(u32, u32)> {
    let mut ranges = vec![(u32::MAX, 0u32); tree.len()];
    for node in tree.nodes().iter().rev() {
        if let Some(label) = node.label {
            ranges[node.index as usize] = (label, label + 1);
        } else {
            for &child in &node.children {
                let (clo, chi) = ranges[child as usize];
                let slot = &mut ranges[node.index as usize];
                slot.0 = slot.0.min(clo);
                slot.1 = slot.1.max(chi);
            }
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_ranges_cover_contiguous_blocks() {
        let tree = balanced_tree(2, (0..6).collect());
        let ranges = subtree_ranges(&tree);
        let root = tree.root().unwrap();
        assert_eq!(ranges[root as usize], (0, 6));

        for node in tree.nodes() {
            let (lo, hi) = ranges[node.index as usize];
            assert!(lo < hi);
            if let Some(label) = node.label {
                assert_eq!((lo, hi), (label, label + 1));
            }
            // A child's range nests inside its parent's.
            if let Some(parent) = node.parent {
                let (plo, phi) = ranges[parent as usize];
                assert!(plo <= lo && hi <= phi);
            }
        }
    }
}
