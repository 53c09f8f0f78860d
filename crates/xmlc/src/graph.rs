//! Hash-routed layered label graph (the tree replacement used by the
//! probabilistic label graph model).
//!
//! Layer `j` holds `layer_size` positions; a universal hash `h_j(l) =
//! ((a*l + b) mod p) mod layer_size` routes label `l` to one position per
//! layer. Global node ids: the virtual root is 0 and position `v` of layer
//! `j` is `1 + j*layer_size + v`. A directed edge from previous node `p` to
//! position `v` has index `p*layer_size + v`, which packs all edges into
//! `layer_size + layer_size^2 * (layers - 1)` consecutive slots, one base
//! classifier each.

use rand::prelude::*;

/// The layered graph: hash parameters plus dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerGraph {
    m: usize,
    layer_size: usize,
    hashes: Vec<(u32, u32, u32)>,
}

impl LayerGraph {
    /// Generate `layers` universal hashes for a label space of size `m`.
    ///
    /// Every modulus `p` is a prime strictly greater than `layer_size`.
    pub fn generate(m: usize, layers: usize, layer_size: usize, rng: &mut StdRng) -> Self {
        let mut hashes = Vec::with_capacity(layers);
        for _ in 0..layers {
            let a = next_prime(rng.random_range(1..=layer_size as u64));
            let b = next_prime(rng.random_range(1..=layer_size as u64));
            let p = next_prime(layer_size as u64 + rng.random_range(1..=layer_size as u64));
            hashes.push((a as u32, b as u32, p as u32));
        }
        Self {
            m,
            layer_size,
            hashes,
        }
    }

    /// Rebuild from persisted parameters.
    pub fn from_parts(m: usize, layer_size: usize, hashes: Vec<(u32, u32, u32)>) -> Self {
        Self {
            m,
            layer_size,
            hashes,
        }
    }

    /// Number of labels.
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn layer_size(&self) -> usize {
        self.layer_size
    }

    #[inline]
    pub fn layers(&self) -> usize {
        self.hashes.len()
    }

    #[inline]
    pub fn hashes(&self) -> &[(u32, u32, u32)] {
        &self.hashes
    }

    /// Total number of directed edges (= base classifiers).
    pub fn edge_count(&self) -> usize {
        let ls = self.layer_size;
        ls + ls * ls * (self.layers() - 1)
    }

    /// Position of `label` within layer `layer`; deterministic, in
    /// `[0, layer_size)`.
    #[inline]
    pub fn node_for_label(&self, label: u32, layer: usize) -> usize {
        let (a, b, p) = self.hashes[layer];
        let hashed = (u64::from(a) * u64::from(label) + u64::from(b)) % u64::from(p);
        (hashed % self.layer_size as u64) as usize
    }

    /// Edge indices along `label`'s root-to-final-layer path, one per layer.
    pub fn path_edges(&self, label: u32) -> Vec<usize> {
        let mut edges = Vec::with_capacity(self.layers());
        let mut prev = 0usize;
        for layer in 0..self.layers() {
            let next = self.node_for_label(label, layer);
            edges.push(prev * self.layer_size + next);
            prev = 1 + layer * self.layer_size + next;
        }
        edges
    }

    /// Inverse map: for every edge, the labels whose path crosses it.
    pub fn base_to_labels(&self) -> Vec<Vec<u32>> {
        let mut map = vec![Vec::new(); self.edge_count()];
        for label in 0..self.m as u32 {
            for edge in self.path_edges(label) {
                map[edge].push(label);
            }
        }
        map
    }
}

/// Smallest prime strictly greater than `n` (trial division; the inputs stay
/// near `layer_size`, so this is cheap).
fn next_prime(n: u64) -> u64 {
    let mut candidate = n + 1;
    loop {
        if is_prime(candidate) {
            return candidate;
        }
        candidate += 1;
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> LayerGraph {
        let mut rng = StdRng::seed_from_u64(11);
        LayerGraph::generate(20, 3, 4, &mut rng)
    }

    #[test]
    fn next_prime_is_strictly_greater() {
        assert_eq!(next_prime(1), 2);
        assert_eq!(next_prime(2), 3);
        assert_eq!(next_prime(7), 11);
        assert_eq!(next_prime(8), 11);
    }

    #[test]
    fn moduli_exceed_layer_size() {
        let g = graph();
        for &(_, _, p) in g.hashes() {
            assert!(is_prime(u64::from(p)));
            assert!(p as usize > g.layer_size());
        }
    }

    #[test]
    fn node_for_label_deterministic_and_bounded() {
        let g = graph();
        for label in 0..20 {
            for layer in 0..g.layers() {
                let node = g.node_for_label(label, layer);
                assert!(node < g.layer_size());
                assert_eq!(node, g.node_for_label(label, layer));
            }
        }
    }

    #[test]
    fn path_edges_fit_edge_count() {
        let g = graph();
        assert_eq!(g.edge_count(), 4 + 16 * 2);
        for label in 0..20 {
            let path = g.path_edges(label);
            assert_eq!(path.len(), 3);
            for edge in path {
                assert!(edge < g.edge_count());
            }
        }
    }

    #[test]
    fn base_to_labels_inverts_paths() {
        let g = graph();
        let map = g.base_to_labels();
        for label in 0..20u32 {
            for edge in g.path_edges(label) {
                assert!(map[edge].contains(&label));
            }
        }
        let total: usize = map.iter().map(Vec::len).sum();
        assert_eq!(total, 20 * g.layers());
    }
}
