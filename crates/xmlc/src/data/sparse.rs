//! Sparse feature vectors.

/// A sparse vector of `(feature index, value)` pairs, sorted by index.
///
/// Entries with a zero value are permitted but pointless; constructors do not
/// filter them so that round-trips preserve the input exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from unsorted pairs. Duplicate indices are summed.
    pub fn from_pairs(mut entries: Vec<(u32, f32)>) -> Self {
        entries.sort_unstable_by_key(|&(i, _)| i);
        entries.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1 += b.1;
                true
            } else {
                false
            }
        });
        Self { entries }
    }

    /// Build from pairs already sorted by strictly increasing index.
    pub fn from_sorted(entries: Vec<(u32, f32)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.entries.iter().copied()
    }

    /// Largest feature index plus one, or 0 for an empty vector.
    pub fn dim(&self) -> usize {
        self.entries.last().map_or(0, |&(i, _)| i as usize + 1)
    }

    pub fn l2_norm(&self) -> f32 {
        self.entries
            .iter()
            .map(|&(_, v)| v * v)
            .sum::<f32>()
            .sqrt()
    }

    /// Scale the vector to unit L2 norm. A zero vector is left unchanged.
    pub fn unit_norm(&mut self) {
        let norm = self.l2_norm();
        if norm > 0.0 {
            for (_, v) in &mut self.entries {
                *v /= norm;
            }
        }
    }

    /// Dot product with another sparse vector (merge walk over indices).
    pub fn dot_sparse(&self, other: &SparseVector) -> f64 {
        let mut sum = 0.0f64;
        let (mut a, mut b) = (0, 0);
        while a < self.entries.len() && b < other.entries.len() {
            let (ia, va) = self.entries[a];
            let (ib, vb) = other.entries[b];
            match ia.cmp(&ib) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    sum += f64::from(va) * f64::from(vb);
                    a += 1;
                    b += 1;
                }
            }
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn from_pairs_sorts_and_merges() {
        let v = SparseVector::from_pairs(vec![(3, 1.0), (1, 2.0), (3, 0.5)]);
        let entries: Vec<_> = v.iter().collect();
        assert_eq!(entries, vec![(1, 2.0), (3, 1.5)]);
        assert_eq!(v.dim(), 4);
    }

    #[test]
    fn unit_norm_scales_to_one() {
        let mut v = SparseVector::from_sorted(vec![(0, 3.0), (4, 4.0)]);
        v.unit_norm();
        assert_relative_eq!(v.l2_norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn unit_norm_leaves_zero_vector() {
        let mut v = SparseVector::empty();
        v.unit_norm();
        assert!(v.is_empty());
    }

    #[test]
    fn dot_sparse_merge_walk() {
        let a = SparseVector::from_sorted(vec![(0, 1.0), (2, 2.0), (5, 3.0)]);
        let b = SparseVector::from_sorted(vec![(2, 4.0), (5, 1.0), (7, 9.0)]);
        assert_relative_eq!(a.dot_sparse(&b), 11.0, epsilon = 1e-9);
    }
}
