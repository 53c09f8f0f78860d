//! `graph.bin`: label-graph dimensions plus the universal hash parameters.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::graph::LayerGraph;
use crate::io::{read_i32, read_u32, write_i32, write_u32};

pub fn save_graph<W: Write>(graph: &LayerGraph, out: &mut W) -> Result<()> {
    write_i32(out, graph.num_labels() as i32)?;
    write_i32(out, graph.layers() as i32)?;
    write_i32(out, graph.layer_size() as i32)?;
    for &(a, b, p) in graph.hashes() {
        write_u32(out, a)?;
        write_u32(out, b)?;
        write_u32(out, p)?;
    }
    Ok(())
}

pub fn load_graph<R: Read>(input: &mut R) -> Result<LayerGraph> {
    let m = read_i32(input)?;
    let layers = read_i32(input)?;
    let layer_size = read_i32(input)?;
    if m < 0 || layers <= 0 || layer_size <= 0 {
        return Err(Error::Format(format!(
            "bad graph header: m={m}, layers={layers}, layer_size={layer_size}"
        )));
    }

    let mut hashes = Vec::with_capacity(layers as usize);
    for _ in 0..layers {
        let a = read_u32(input)?;
        let b = read_u32(input)?;
        let p = read_u32(input)?;
        if p as i64 <= layer_size as i64 {
            return Err(Error::Format(format!(
                "hash modulus {p} not greater than layer size {layer_size}"
            )));
        }
        hashes.push((a, b, p));
    }
    Ok(LayerGraph::from_parts(m as usize, layer_size as usize, hashes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let graph = LayerGraph::generate(50, 4, 8, &mut rng);

        let mut buf = Vec::new();
        save_graph(&graph, &mut buf).unwrap();
        let loaded = load_graph(&mut buf.as_slice()).unwrap();

        assert_eq!(graph, loaded);
        for label in 0..50 {
            assert_eq!(graph.path_edges(label), loaded.path_edges(label));
        }
    }

    #[test]
    fn rejects_small_modulus() {
        let graph = LayerGraph::from_parts(10, 8, vec![(3, 5, 7)]);
        let mut buf = Vec::new();
        save_graph(&graph, &mut buf).unwrap();
        assert!(load_graph(&mut buf.as_slice()).is_err());
    }
}
