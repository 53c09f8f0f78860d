//! Structural invariants of every tree builder, and the S1 shape.

use xmlc::model::{TrainConfig, TreeType};
use xmlc::tree::build::build_tree;
use xmlc::{LabelTree, SparseDataset, SparseVector};

fn synthetic_dataset(k: usize, rows_per_label: usize) -> SparseDataset {
    let mut dataset = SparseDataset::default();
    for label in 0..k as u32 {
        for r in 0..rows_per_label {
            let features = SparseVector::from_pairs(vec![
                (label, 1.0),
                (k as u32 + (r as u32 % 3), 0.25),
            ]);
            dataset.push(vec![label], features);
        }
    }
    dataset
}

fn check_invariants(tree: &LabelTree, k: usize) {
    tree.validate().expect("structural invariants");
    assert_eq!(tree.num_leaves(), k);

    let t = tree.len();
    for (i, node) in tree.nodes().iter().enumerate() {
        assert_eq!(node.index as usize, i, "indices are contiguous");
        match node.label {
            Some(label) => {
                assert!((label as usize) < k);
                assert!(node.children.is_empty());
            }
            None => assert!(!node.children.is_empty() || t == 1),
        }
    }

    // Every node reaches the root in at most t steps.
    let root = tree.root().unwrap();
    for node in tree.nodes() {
        let path = tree.path_to_root(node.index);
        assert!(path.len() <= t);
        assert_eq!(*path.last().unwrap(), root);
    }

    for label in 0..k as u32 {
        let leaf = tree.leaf(label).expect("every label resolves");
        assert_eq!(tree.node(leaf).label, Some(label));
    }
}

fn config(tree_type: TreeType) -> TrainConfig {
    TrainConfig {
        tree_type,
        arity: 2,
        max_leaves: 3,
        project_dim: 6,
        seed: 17,
        ..TrainConfig::default()
    }
}

#[test]
fn complete_tree_invariants_and_s1_shape() {
    let dataset = synthetic_dataset(4, 2);
    let tree = build_tree(&dataset, &config(TreeType::Complete)).unwrap();
    check_invariants(&tree, 4);

    // k=4, arity=2: seven nodes, root 0, internal {1,2}, leaves 3..=6.
    assert_eq!(tree.len(), 7);
    assert_eq!(tree.root(), Some(0));
    assert_eq!(tree.node(0).children, vec![1, 2]);
    assert_eq!(tree.node(1).children, vec![3, 4]);
    assert_eq!(tree.node(2).children, vec![5, 6]);
    for (leaf, label) in (3..7).zip(0..4) {
        assert_eq!(tree.node(leaf).label, Some(label));
    }
}

#[test]
fn balanced_tree_invariants() {
    let dataset = synthetic_dataset(9, 2);
    let tree = build_tree(&dataset, &config(TreeType::Balanced)).unwrap();
    check_invariants(&tree, 9);
}

#[test]
fn balanced_tree_arity_three() {
    let dataset = synthetic_dataset(10, 1);
    let mut cfg = config(TreeType::Balanced);
    cfg.arity = 3;
    let tree = build_tree(&dataset, &cfg).unwrap();
    check_invariants(&tree, 10);
    for node in tree.nodes() {
        assert!(node.children.len() <= 3);
    }
}

#[test]
fn huffman_tree_invariants() {
    let mut dataset = synthetic_dataset(6, 1);
    // Skew the frequencies hard toward label 0.
    for _ in 0..40 {
        dataset.push(vec![0], SparseVector::from_sorted(vec![(0, 1.0)]));
    }
    let tree = build_tree(&dataset, &config(TreeType::Huffman)).unwrap();
    check_invariants(&tree, 6);

    let depth = |l: u32| tree.path_to_root(tree.leaf(l).unwrap()).len();
    let max_depth = (1..6).map(depth).max().unwrap();
    assert!(depth(0) <= max_depth);
}

#[test]
fn hierarchical_kmeans_tree_invariants() {
    let dataset = synthetic_dataset(12, 3);
    let tree = build_tree(&dataset, &config(TreeType::HierarchicalKMeans)).unwrap();
    check_invariants(&tree, 12);
}

#[test]
fn projected_kmeans_tree_invariants() {
    let dataset = synthetic_dataset(12, 3);
    let tree = build_tree(&dataset, &config(TreeType::KMeansWithProjection)).unwrap();
    check_invariants(&tree, 12);
}

#[test]
fn kmeans_tree_is_deterministic_per_seed() {
    let dataset = synthetic_dataset(10, 2);
    let cfg = config(TreeType::HierarchicalKMeans);
    let a = build_tree(&dataset, &cfg).unwrap();
    let b = build_tree(&dataset, &cfg).unwrap();
    assert_eq!(a.len(), b.len());
    for label in 0..10 {
        assert_eq!(a.leaf(label), b.leaf(label));
    }
}

#[test]
fn shuffled_complete_tree_permutes_leaves() {
    let dataset = synthetic_dataset(8, 1);
    let mut cfg = config(TreeType::Complete);
    cfg.randomize_tree = true;
    let tree = build_tree(&dataset, &cfg).unwrap();
    check_invariants(&tree, 8);
}

#[test]
fn online_tree_types_are_rejected_offline() {
    let dataset = synthetic_dataset(4, 1);
    let err = build_tree(&dataset, &config(TreeType::OnlineKMeans)).unwrap_err();
    assert!(matches!(err, xmlc::Error::Config(_)));
}
