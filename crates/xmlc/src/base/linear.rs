//! Sparse linear base classifier.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::base::{BaseConfig, BaseLearner, Loss, Optimizer};
use crate::data::SparseVector;
use crate::error::{Error, Result};
use crate::io::{read_f32, read_i32, read_u8, write_f32, write_i32, write_u8};

/// Weight storage: dense during batch training, a sparse map while a tree
/// grows online and the feature space is open-ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightVector {
    Dense(Vec<f32>),
    Sparse(HashMap<u32, f32>),
}

impl WeightVector {
    fn dense(dim: usize) -> Self {
        WeightVector::Dense(vec![0.0; dim])
    }

    fn sparse() -> Self {
        WeightVector::Sparse(HashMap::new())
    }

    #[inline]
    fn get(&self, index: u32) -> f32 {
        match self {
            WeightVector::Dense(w) => w.get(index as usize).copied().unwrap_or(0.0),
            WeightVector::Sparse(w) => w.get(&index).copied().unwrap_or(0.0),
        }
    }

    #[inline]
    fn add(&mut self, index: u32, delta: f32) {
        match self {
            WeightVector::Dense(w) => {
                if let Some(slot) = w.get_mut(index as usize) {
                    *slot += delta;
                }
            }
            WeightVector::Sparse(w) => {
                *w.entry(index).or_insert(0.0) += delta;
            }
        }
    }

    fn dot(&self, x: &SparseVector) -> f64 {
        match self {
            WeightVector::Dense(w) => x
                .iter()
                .map(|(i, v)| f64::from(w.get(i as usize).copied().unwrap_or(0.0)) * f64::from(v))
                .sum(),
            WeightVector::Sparse(w) => x
                .iter()
                .map(|(i, v)| f64::from(w.get(&i).copied().unwrap_or(0.0)) * f64::from(v))
                .sum(),
        }
    }

    fn invert(&mut self) {
        match self {
            WeightVector::Dense(w) => w.iter_mut().for_each(|v| *v = -*v),
            WeightVector::Sparse(w) => w.values_mut().for_each(|v| *v = -*v),
        }
    }

    fn nnz(&self) -> usize {
        match self {
            WeightVector::Dense(w) => w.iter().filter(|&&v| v != 0.0).count(),
            WeightVector::Sparse(w) => w.values().filter(|&&v| v != 0.0).count(),
        }
    }

    fn prune(&mut self, threshold: f32) {
        match self {
            WeightVector::Dense(w) => {
                for v in w.iter_mut() {
                    if v.abs() < threshold {
                        *v = 0.0;
                    }
                }
            }
            WeightVector::Sparse(w) => {
                w.retain(|_, v| v.abs() >= threshold && *v != 0.0);
            }
        }
    }

    /// Non-zero entries in index order.
    fn sorted_entries(&self) -> Vec<(u32, f32)> {
        match self {
            WeightVector::Dense(w) => w
                .iter()
                .enumerate()
                .filter(|(_, &v)| v != 0.0)
                .map(|(i, &v)| (i as u32, v))
                .collect(),
            WeightVector::Sparse(w) => {
                let mut entries: Vec<_> =
                    w.iter().filter(|(_, &v)| v != 0.0).map(|(&i, &v)| (i, v)).collect();
                entries.sort_unstable_by_key(|&(i, _)| i);
                entries
            }
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
fn logistic_grad(label: f32, pred: f64) -> f64 {
    sigmoid(pred) - f64::from(label)
}

#[inline]
fn squared_hinge_grad(label: f32, pred: f64) -> f64 {
    let y = f64::from(2.0 * label - 1.0);
    let v = y * pred;
    if v > 1.0 {
        0.0
    } else {
        -2.0 * (1.0 - v).max(0.0) * y
    }
}

/// A probabilistic binary classifier with sparse linear weights.
///
/// Nodes whose training set contains a single class degenerate into constant
/// classifiers: no weights are kept and the decision value is pinned to
/// `+/-10`, far into the saturated region of both link functions.
#[derive(Debug, Clone)]
pub struct LinearBase {
    class_count: u32,
    first_class: u32,
    hinge_loss: bool,
    /// Number of updates absorbed so far; drives the SGD step-size decay.
    t: u64,
    weights: WeightVector,
    grads: Option<WeightVector>,
}

impl LinearBase {
    fn constant(positive: bool) -> Self {
        Self {
            class_count: 1,
            first_class: u32::from(positive),
            hinge_loss: false,
            t: 0,
            weights: WeightVector::sparse(),
            grads: None,
        }
    }

    fn grad(&self, cfg: &BaseConfig, label: f32, pred: f64) -> f64 {
        match cfg.loss {
            Loss::Logistic => logistic_grad(label, pred),
            Loss::SquaredHinge => squared_hinge_grad(label, pred),
        }
    }

    fn step(&mut self, cfg: &BaseConfig, features: &SparseVector, grad: f64) {
        match cfg.optimizer {
            Optimizer::Sgd => {
                let lr = f64::from(cfg.eta) * (1.0 / self.t as f64).sqrt();
                for (i, v) in features.iter() {
                    self.weights.add(i, -(lr * grad * f64::from(v)) as f32);
                }
            }
            Optimizer::AdaGrad => {
                if self.grads.is_none() {
                    self.grads = Some(WeightVector::sparse());
                }
                let Self { weights, grads, .. } = self;
                let grads = grads.as_mut().expect("accumulator just seeded");
                for (i, v) in features.iter() {
                    let g = f64::from(v) * grad;
                    grads.add(i, (g * g) as f32);
                    let lr = f64::from(cfg.eta)
                        / (f64::from(cfg.adagrad_eps) + f64::from(grads.get(i))).sqrt();
                    weights.add(i, -(lr * grad * f64::from(v)) as f32);
                }
            }
        }
    }

    /// Number of non-zero weights.
    pub fn nnz(&self) -> usize {
        self.weights.nnz()
    }

    /// True when the node degenerated to a constant classifier.
    pub fn is_constant(&self) -> bool {
        self.class_count < 2
    }
}

impl BaseLearner for LinearBase {
    fn fresh(cfg: &BaseConfig) -> Self {
        Self {
            class_count: 2,
            first_class: 1,
            hinge_loss: cfg.loss == Loss::SquaredHinge,
            t: 0,
            weights: WeightVector::sparse(),
            grads: matches!(cfg.optimizer, Optimizer::AdaGrad).then(WeightVector::sparse),
        }
    }

    fn train(
        &mut self,
        dim: usize,
        labels: &[f32],
        examples: &[&SparseVector],
        weights: Option<&[f32]>,
        cfg: &BaseConfig,
    ) {
        debug_assert_eq!(labels.len(), examples.len());

        if labels.is_empty() {
            *self = Self::constant(false);
            self.class_count = 0;
            return;
        }

        let positives = labels.iter().filter(|&&l| l == 1.0).count();
        if positives == 0 || positives == labels.len() {
            *self = Self::constant(labels[0] == 1.0);
            return;
        }

        let negatives = labels.len() - positives;
        let (pos_weight, neg_weight) = if cfg.unbalanced_weighting {
            if negatives > positives {
                (1.0 + (negatives as f64 / positives as f64).ln(), 1.0)
            } else {
                (1.0, 1.0 + (positives as f64 / negatives as f64).ln())
            }
        } else {
            (1.0, 1.0)
        };

        self.class_count = 2;
        self.first_class = 1;
        self.hinge_loss = cfg.loss == Loss::SquaredHinge;
        self.t = 0;
        self.weights = WeightVector::dense(dim);
        self.grads =
            matches!(cfg.optimizer, Optimizer::AdaGrad).then(|| WeightVector::dense(dim));

        'epochs: for _ in 0..cfg.epochs {
            for (r, (&label, &features)) in labels.iter().zip(examples.iter()).enumerate() {
                if cfg.tmax.is_some_and(|tmax| self.t >= tmax) {
                    break 'epochs;
                }
                self.t += 1;

                let pred = self.weights.dot(features);
                let class_weight = if label == 1.0 { pos_weight } else { neg_weight };
                let instance_weight = weights.map_or(1.0, |w| f64::from(w[r]));
                let grad = self.grad(cfg, label, pred) * class_weight * instance_weight;
                self.step(cfg, features, grad);
            }
        }

        self.prune(cfg.weights_threshold);
    }

    fn update(&mut self, target: f32, features: &SparseVector, cfg: &BaseConfig) {
        if cfg.tmax.is_some_and(|tmax| self.t >= tmax) {
            return;
        }
        self.t += 1;

        let pred = self.predict_value(features);
        let grad = self.grad(cfg, target, pred);
        self.step(cfg, features, grad);
    }

    fn predict_value(&self, features: &SparseVector) -> f64 {
        if self.class_count < 2 {
            return if self.first_class == 1 { 10.0 } else { -10.0 };
        }
        let mut val = self.weights.dot(features);
        if self.first_class == 0 {
            val = -val;
        }
        val
    }

    fn predict_probability(&self, features: &SparseVector) -> f64 {
        let val = self.predict_value(features);
        if self.hinge_loss {
            (-(1.0 - val).max(0.0).powi(2)).exp()
        } else {
            sigmoid(val)
        }
    }

    fn inverted(&self) -> Self {
        // The AdaGrad accumulator is a sum of squares; it stays as-is.
        let mut copy = self.clone();
        copy.weights.invert();
        if copy.class_count < 2 {
            copy.first_class = 1 - copy.first_class;
        }
        copy
    }

    fn prune(&mut self, threshold: f32) {
        self.weights.prune(threshold);
    }

    fn save<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write_i32(out, self.class_count as i32)?;
        write_i32(out, self.first_class as i32)?;
        if self.class_count > 1 {
            write_u8(out, u8::from(self.hinge_loss))?;
            let sparse = matches!(self.weights, WeightVector::Sparse(_));
            write_u8(out, u8::from(sparse))?;
            let dim = match &self.weights {
                WeightVector::Dense(w) => w.len(),
                WeightVector::Sparse(_) => 0,
            };
            write_i32(out, dim as i32)?;
            let entries = self.weights.sorted_entries();
            write_i32(out, entries.len() as i32)?;
            for (i, v) in entries {
                write_i32(out, i as i32)?;
                write_f32(out, v)?;
            }
        }
        Ok(())
    }

    fn load<R: Read>(input: &mut R) -> Result<Self> {
        let class_count = read_i32(input)?;
        let first_class = read_i32(input)?;
        if class_count < 0 || first_class < 0 {
            return Err(Error::Format("negative base classifier header".into()));
        }

        let mut base = Self {
            class_count: class_count as u32,
            first_class: first_class as u32,
            hinge_loss: false,
            t: 0,
            weights: WeightVector::sparse(),
            grads: None,
        };

        if class_count > 1 {
            base.hinge_loss = read_u8(input)? != 0;
            let sparse = read_u8(input)? != 0;
            let dim = read_i32(input)?;
            let nnz = read_i32(input)?;
            if dim < 0 || nnz < 0 {
                return Err(Error::Format("negative weight vector size".into()));
            }

            if sparse {
                let mut map = HashMap::with_capacity(nnz as usize);
                for _ in 0..nnz {
                    let i = read_i32(input)?;
                    let v = read_f32(input)?;
                    map.insert(i as u32, v);
                }
                base.weights = WeightVector::Sparse(map);
            } else {
                let mut dense = vec![0.0f32; dim as usize];
                for _ in 0..nnz {
                    let i = read_i32(input)? as usize;
                    let v = read_f32(input)?;
                    let slot = dense.get_mut(i).ok_or_else(|| {
                        Error::Format(format!("weight index {i} out of bounds for dim {dim}"))
                    })?;
                    *slot = v;
                }
                base.weights = WeightVector::Dense(dense);
            }
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector::from_sorted(pairs.to_vec())
    }

    fn cfg() -> BaseConfig {
        BaseConfig {
            epochs: 20,
            weights_threshold: 0.0,
            ..BaseConfig::default()
        }
    }

    #[test]
    fn batch_training_separates_classes() {
        let cfg = cfg();
        let pos = x(&[(0, 1.0)]);
        let neg = x(&[(1, 1.0)]);
        let labels = [1.0f32, 0.0, 1.0, 0.0];
        let examples = [&pos, &neg, &pos, &neg];

        let mut base = LinearBase::fresh(&cfg);
        base.train(2, &labels, &examples, None, &cfg);

        assert!(base.predict_probability(&pos) > 0.6);
        assert!(base.predict_probability(&neg) < 0.4);
    }

    #[test]
    fn single_class_node_degenerates_to_constant() {
        let cfg = cfg();
        let v = x(&[(0, 1.0)]);

        let mut all_pos = LinearBase::fresh(&cfg);
        all_pos.train(1, &[1.0, 1.0], &[&v, &v], None, &cfg);
        assert!(all_pos.is_constant());
        assert!(all_pos.predict_probability(&v) > 0.99);

        let mut all_neg = LinearBase::fresh(&cfg);
        all_neg.train(1, &[0.0, 0.0], &[&v, &v], None, &cfg);
        assert!(all_neg.predict_probability(&v) < 0.01);
    }

    #[test]
    fn online_updates_move_toward_target() {
        let cfg = cfg();
        let v = x(&[(0, 1.0), (3, 0.5)]);
        let mut base = LinearBase::fresh(&cfg);
        let before = base.predict_probability(&v);
        for _ in 0..10 {
            base.update(1.0, &v, &cfg);
        }
        assert!(base.predict_probability(&v) > before);
    }

    #[test]
    fn inverted_negates_decision_value() {
        let cfg = cfg();
        let v = x(&[(0, 1.0)]);
        let mut base = LinearBase::fresh(&cfg);
        for _ in 0..5 {
            base.update(1.0, &v, &cfg);
        }
        let inv = base.inverted();
        assert_relative_eq!(
            base.predict_value(&v),
            -inv.predict_value(&v),
            epsilon = 1e-9
        );
    }

    #[test]
    fn tmax_caps_updates() {
        let cfg = BaseConfig {
            tmax: Some(3),
            ..cfg()
        };
        let v = x(&[(0, 1.0)]);
        let mut base = LinearBase::fresh(&cfg);
        for _ in 0..10 {
            base.update(1.0, &v, &cfg);
        }
        let frozen = base.predict_value(&v);
        base.update(1.0, &v, &cfg);
        assert_relative_eq!(base.predict_value(&v), frozen, epsilon = 1e-12);
    }

    #[test]
    fn save_load_round_trip() {
        let cfg = cfg();
        let pos = x(&[(0, 1.0), (2, 2.0)]);
        let neg = x(&[(1, 1.0)]);
        let mut base = LinearBase::fresh(&cfg);
        base.train(3, &[1.0, 0.0], &[&pos, &neg], None, &cfg);

        let mut buf = Vec::new();
        base.save(&mut buf).unwrap();
        let loaded = LinearBase::load(&mut buf.as_slice()).unwrap();

        assert_relative_eq!(
            base.predict_probability(&pos),
            loaded.predict_probability(&pos),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            base.predict_probability(&neg),
            loaded.predict_probability(&neg),
            epsilon = 1e-6
        );
    }

    #[test]
    fn constant_save_load_round_trip() {
        let mut base = LinearBase::constant(true);
        let mut buf = Vec::new();
        base.save(&mut buf).unwrap();
        base.prune(0.1);
        let loaded = LinearBase::load(&mut buf.as_slice()).unwrap();
        assert!(loaded.is_constant());
        assert!(loaded.predict_probability(&x(&[(0, 1.0)])) > 0.99);
    }
}
