//! Train, persist, reload, and rank: every model variant over a small
//! separable dataset.

use tempfile::TempDir;
use xmlc::base::BaseConfig;
use xmlc::model::{Model, ModelType, TrainConfig, TreeType};
use xmlc::{SparseDataset, SparseVector};

/// One-hot-ish dataset: label `l` fires feature `l` strongly plus a weak
/// shared feature, so every node sub-problem is linearly separable.
fn single_label_dataset(k: usize, rows_per_label: usize) -> SparseDataset {
    let mut dataset = SparseDataset::default();
    for r in 0..rows_per_label {
        for label in 0..k as u32 {
            let features = SparseVector::from_pairs(vec![
                (label, 1.0),
                (k as u32, 0.1 + 0.01 * (r % 2) as f32),
            ]);
            dataset.push(vec![label], features);
        }
    }
    dataset
}

fn multi_label_dataset(k: usize, rows_per_label: usize) -> SparseDataset {
    let mut dataset = SparseDataset::default();
    for r in 0..rows_per_label {
        for label in 0..k as u32 {
            let partner = (label + 1) % k as u32;
            let features = SparseVector::from_pairs(vec![
                (label, 1.0),
                (partner, 0.4),
                (k as u32, 0.1 * (r % 3) as f32),
            ]);
            dataset.push(vec![label, partner], features);
        }
    }
    dataset
}

fn config(model_type: ModelType, tree_type: TreeType) -> TrainConfig {
    TrainConfig {
        model_type,
        tree_type,
        arity: 2,
        threads: 2,
        seed: 7,
        base: BaseConfig {
            epochs: 40,
            weights_threshold: 0.0,
            ..BaseConfig::default()
        },
        ..TrainConfig::default()
    }
}

fn top1_accuracy(model: &Model, dataset: &SparseDataset) -> f64 {
    let mut hits = 0usize;
    for row in 0..dataset.rows() {
        let predictions = model.predict(dataset.features(row), 1, 0.0);
        if let Some(best) = predictions.first() {
            if dataset.labels(row).contains(&best.label) {
                hits += 1;
            }
        }
    }
    hits as f64 / dataset.rows() as f64
}

#[test]
fn plt_complete_tree_end_to_end() {
    let dataset = multi_label_dataset(8, 6);
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Plt, TreeType::Complete);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Plt(_)));
    assert_eq!(model.num_labels(), 8);

    assert!(top1_accuracy(&model, &dataset) > 0.8);

    // Ranked output is descending and the ranking agrees with the
    // per-label probabilities.
    let x = dataset.features(0);
    let predictions = model.predict(x, 4, 0.0);
    assert!(predictions.len() <= 4);
    for pair in predictions.windows(2) {
        assert!(pair[0].value >= pair[1].value);
    }
    for p in &predictions {
        let direct = model.predict_for_label(p.label, x);
        assert!((direct - p.value).abs() < 1e-9);
    }
}

#[test]
fn plt_kmeans_tree_end_to_end() {
    let dataset = multi_label_dataset(10, 5);
    let dir = TempDir::new().unwrap();
    let mut cfg = config(ModelType::Plt, TreeType::HierarchicalKMeans);
    cfg.max_leaves = 3;

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert_eq!(model.num_labels(), 10);
    assert!(top1_accuracy(&model, &dataset) > 0.7);
}

#[test]
fn plt_top_down_end_to_end() {
    let dataset = multi_label_dataset(9, 5);
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Plt, TreeType::TopDown);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert_eq!(model.num_labels(), 9);
    assert!(top1_accuracy(&model, &dataset) > 0.7);
}

#[test]
fn hsm_end_to_end() {
    let dataset = single_label_dataset(6, 8);
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Hsm, TreeType::Balanced);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Hsm(_)));
    assert!(top1_accuracy(&model, &dataset) > 0.8);

    // HSM path probabilities are a proper conditional distribution over a
    // full binary split, so the top prediction agrees with the per-label
    // probability ranking.
    let x = dataset.features(0);
    let ranked = model.predict(x, 1, 0.0);
    let best = &ranked[0];
    for label in 0..6 {
        assert!(model.predict_for_label(label, x) <= model.predict_for_label(best.label, x) + 1e-9);
    }
}

#[test]
fn hsm_huffman_with_pick_one_weighting() {
    let dataset = multi_label_dataset(6, 6);
    let dir = TempDir::new().unwrap();
    let mut cfg = config(ModelType::Hsm, TreeType::Huffman);
    cfg.hsm_pick_one_label_weighting = true;

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert_eq!(model.num_labels(), 6);
    assert!(top1_accuracy(&model, &dataset) > 0.5);
}

#[test]
fn br_end_to_end_with_threshold() {
    let dataset = multi_label_dataset(5, 8);
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Br, TreeType::Complete);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Br(_)));
    assert_eq!(model.num_labels(), 5);
    assert!(top1_accuracy(&model, &dataset) > 0.8);

    // Threshold-only prediction returns every label above the bar.
    let predictions = model.predict(dataset.features(0), 0, 0.5);
    assert!(predictions.iter().all(|p| p.value > 0.5));
}

#[test]
fn ovr_skips_multi_label_rows_but_trains() {
    let mut dataset = single_label_dataset(4, 8);
    dataset.push(
        vec![0, 1],
        SparseVector::from_sorted(vec![(0, 1.0), (1, 1.0)]),
    );
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Ovr, TreeType::Complete);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Ovr(_)));
    assert!(top1_accuracy(&model, &single_label_dataset(4, 1)) > 0.7);
}

#[test]
fn plg_end_to_end() {
    let dataset = single_label_dataset(6, 8);
    let dir = TempDir::new().unwrap();
    let mut cfg = config(ModelType::Plg, TreeType::Complete);
    cfg.plg_layers = 2;
    cfg.plg_layer_size = 4;

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Plg(_)));
    assert_eq!(model.num_labels(), 6);

    // The ranking agrees with the per-label edge products.
    let x = dataset.features(2);
    let predictions = model.predict(x, 3, 0.0);
    assert_eq!(predictions.len(), 3);
    for p in &predictions {
        let direct = model.predict_for_label(p.label, x);
        assert!((direct - p.value).abs() < 1e-9);
    }
    for pair in predictions.windows(2) {
        assert!(pair[0].value >= pair[1].value);
    }
}

#[test]
fn online_plt_end_to_end() {
    let dataset = single_label_dataset(7, 10);
    let dir = TempDir::new().unwrap();
    let mut cfg = config(ModelType::OnlinePlt, TreeType::OnlineBestScore);
    cfg.max_leaves = 2;

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    // An online model at rest is a PLT.
    let model: Model = Model::load(dir.path()).unwrap();
    assert!(matches!(model, Model::Plt(_)));
    assert_eq!(model.num_labels(), 7);
    assert!(top1_accuracy(&model, &dataset) > 0.6);
}

#[test]
fn batch_prediction_matches_sequential() {
    let dataset = multi_label_dataset(8, 4);
    let dir = TempDir::new().unwrap();
    let cfg = config(ModelType::Plt, TreeType::Balanced);

    Model::<xmlc::LinearBase>::train(&dataset, &cfg, dir.path()).unwrap();
    let model: Model = Model::load(dir.path()).unwrap();

    let parallel = model.predict_batch(&dataset, 4, 3, 0.0);
    let sequential = model.predict_batch(&dataset, 1, 3, 0.0);
    assert_eq!(parallel.len(), dataset.rows());
    for (p, s) in parallel.iter().zip(sequential.iter()) {
        assert_eq!(p.len(), s.len());
        for (a, b) in p.iter().zip(s.iter()) {
            assert_eq!(a.label, b.label);
            assert!((a.value - b.value).abs() < 1e-12);
        }
    }

    let precision = model.precision_at(&dataset, 2, 2);
    assert_eq!(precision.len(), 2);
    assert!(precision[0] > 0.7);
}
