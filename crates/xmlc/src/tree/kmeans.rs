//! Balanced spherical k-means over sparse label centroids.
//!
//! The hierarchical tree builder consumes clustering through the
//! [`KMeansPartitioner`] seam; [`BalancedKMeans`] is the bundled
//! implementation. Label centroids are unit-normalized, so similarity is
//! cosine and cluster centers live in dense space.

use rand::prelude::*;

use crate::data::SparseVector;

/// Splits a set of label centroids into `k` clusters.
///
/// `items` are indices into `centroids`; the result assigns each item a
/// cluster id in `[0, k)`, aligned by position.
pub trait KMeansPartitioner: Send + Sync {
    fn partition(&self, items: &[u32], centroids: &[SparseVector], k: usize, seed: u64)
        -> Vec<u32>;
}

/// Lloyd-style spherical k-means with an optional balance constraint.
///
/// With balancing on, every cluster accepts at most `ceil(n / k)` items:
/// items are assigned greedily in order of how much they prefer their best
/// cluster over their runner-up, falling back to the next-closest cluster
/// with spare capacity.
#[derive(Debug, Clone)]
pub struct BalancedKMeans {
    pub eps: f64,
    pub balanced: bool,
    pub max_iter: usize,
}

impl BalancedKMeans {
    pub fn new(eps: f64, balanced: bool) -> Self {
        Self {
            eps,
            balanced,
            max_iter: 50,
        }
    }
}

fn add_into(dense: &mut [f32], sparse: &SparseVector) {
    for (i, v) in sparse.iter() {
        dense[i as usize] += v;
    }
}

fn normalize(dense: &mut [f32]) {
    let norm = dense.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        dense.iter_mut().for_each(|v| *v /= norm);
    }
}

fn cosine(dense: &[f32], sparse: &SparseVector) -> f64 {
    sparse
        .iter()
        .map(|(i, v)| f64::from(dense[i as usize]) * f64::from(v))
        .sum()
}

impl KMeansPartitioner for BalancedKMeans {
    fn partition(
        &self,
        items: &[u32],
        centroids: &[SparseVector],
        k: usize,
        seed: u64,
    ) -> Vec<u32> {
        let n = items.len();
        if n == 0 || k == 0 {
            return Vec::new();
        }
        if k == 1 || n <= k {
            // Degenerate splits need no iteration.
            return (0..n).map(|i| (i % k) as u32).collect();
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let dim = items
            .iter()
            .map(|&l| centroids[l as usize].dim())
            .max()
            .unwrap_or(0);

        // k-means++-style seeding under cosine distance.
        let mut centers: Vec<Vec<f32>> = Vec::with_capacity(k);
        let first = items[rng.random_range(0..n)];
        let mut center = vec![0.0f32; dim];
        add_into(&mut center, &centroids[first as usize]);
        normalize(&mut center);
        centers.push(center);

        while centers.len() < k {
            let distances: Vec<f64> = items
                .iter()
                .map(|&l| {
                    let best = centers
                        .iter()
                        .map(|c| cosine(c, &centroids[l as usize]))
                        .fold(f64::MIN, f64::max);
                    (1.0 - best).max(0.0)
                })
                .collect();
            let total: f64 = distances.iter().sum();
            let pick = if total <= 0.0 {
                rng.random_range(0..n)
            } else {
                let threshold = rng.random::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (i, &d) in distances.iter().enumerate() {
                    cumsum += d;
                    if cumsum >= threshold {
                        selected = i;
                        break;
                    }
                }
                selected
            };
            let mut center = vec![0.0f32; dim];
            add_into(&mut center, &centroids[items[pick] as usize]);
            normalize(&mut center);
            centers.push(center);
        }

        let capacity = n.div_ceil(k);
        let mut assignment = vec![0u32; n];

        for _ in 0..self.max_iter {
            // Similarity of every item to every center.
            let sims: Vec<Vec<f64>> = items
                .iter()
                .map(|&l| {
                    centers
                        .iter()
                        .map(|c| cosine(c, &centroids[l as usize]))
                        .collect()
                })
                .collect();

            if self.balanced {
                // Items that strongly prefer one cluster claim their slot
                // first; the rest spill to the closest cluster with room.
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| {
                    let margin = |s: &Vec<f64>| {
                        let mut sorted: Vec<f64> = s.clone();
                        sorted.sort_by(|x, y| y.total_cmp(x));
                        sorted[0] - sorted.get(1).copied().unwrap_or(f64::MIN)
                    };
                    margin(&sims[b]).total_cmp(&margin(&sims[a])).then(a.cmp(&b))
                });

                let mut counts = vec![0usize; k];
                for &i in &order {
                    let mut ranked: Vec<usize> = (0..k).collect();
                    ranked.sort_by(|&a, &b| sims[i][b].total_cmp(&sims[i][a]));
                    let cluster = ranked
                        .into_iter()
                        .find(|&c| counts[c] < capacity)
                        .unwrap_or(0);
                    assignment[i] = cluster as u32;
                    counts[cluster] += 1;
                }
            } else {
                for i in 0..n {
                    let best = (0..k)
                        .max_by(|&a, &b| sims[i][a].total_cmp(&sims[i][b]))
                        .unwrap_or(0);
                    assignment[i] = best as u32;
                }
            }

            // Recompute centers and measure the total cosine shift.
            let mut new_centers = vec![vec![0.0f32; dim]; k];
            for (pos, &l) in items.iter().enumerate() {
                add_into(
                    &mut new_centers[assignment[pos] as usize],
                    &centroids[l as usize],
                );
            }
            for c in &mut new_centers {
                normalize(c);
            }

            let shift: f64 = centers
                .iter()
                .zip(new_centers.iter())
                .map(|(old, new)| {
                    let sim: f64 = old
                        .iter()
                        .zip(new.iter())
                        .map(|(&a, &b)| f64::from(a) * f64::from(b))
                        .sum();
                    (1.0 - sim).max(0.0)
                })
                .sum();

            centers = new_centers;
            if shift < self.eps {
                break;
            }
        }

        assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(pairs: &[(u32, f32)]) -> SparseVector {
        let mut v = SparseVector::from_sorted(pairs.to_vec());
        v.unit_norm();
        v
    }

    fn toy_centroids() -> Vec<SparseVector> {
        vec![
            unit(&[(0, 1.0), (1, 0.1)]),
            unit(&[(0, 0.9), (1, 0.2)]),
            unit(&[(5, 1.0), (6, 0.1)]),
            unit(&[(5, 0.8), (6, 0.3)]),
        ]
    }

    #[test]
    fn separates_disjoint_support() {
        let centroids = toy_centroids();
        let km = BalancedKMeans::new(1e-4, true);
        let assignment = km.partition(&[0, 1, 2, 3], &centroids, 2, 7);
        assert_eq!(assignment.len(), 4);
        assert_eq!(assignment[0], assignment[1]);
        assert_eq!(assignment[2], assignment[3]);
        assert_ne!(assignment[0], assignment[2]);
    }

    #[test]
    fn balanced_split_respects_capacity() {
        let centroids: Vec<SparseVector> =
            (0..8).map(|i| unit(&[(0, 1.0), (i + 1, 0.01)])).collect();
        let items: Vec<u32> = (0..8).collect();
        let km = BalancedKMeans::new(1e-4, true);
        let assignment = km.partition(&items, &centroids, 2, 3);

        let ones = assignment.iter().filter(|&&c| c == 1).count();
        assert_eq!(ones, 4, "near-identical items must still split evenly");
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let centroids = toy_centroids();
        let km = BalancedKMeans::new(1e-4, true);
        let a = km.partition(&[0, 1, 2, 3], &centroids, 2, 42);
        let b = km.partition(&[0, 1, 2, 3], &centroids, 2, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_partitions_skip_iteration() {
        let centroids = toy_centroids();
        let km = BalancedKMeans::new(1e-4, true);
        assert_eq!(km.partition(&[2, 3], &centroids, 2, 1), vec![0, 1]);
        assert!(km.partition(&[], &centroids, 2, 1).is_empty());
    }
}
