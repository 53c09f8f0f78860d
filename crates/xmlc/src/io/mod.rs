//! Model persistence.
//!
//! A model directory holds `tree.bin` (and a human-readable `tree.txt`),
//! `weights.bin`, `args.bin`, and for the label-graph variant `graph.bin`.
//! All fixed-width fields are little-endian.

mod args_file;
mod graph_file;
mod tree_file;
mod weights;

use std::io::{Read, Write};

pub use args_file::{load_config, save_config};
pub use graph_file::{load_graph, save_graph};
pub use tree_file::{load_tree, load_tree_txt, save_tree, save_tree_txt};
pub use weights::{load_bases, WeightsWriter};

/// File names inside a model directory.
pub const TREE_FILE: &str = "tree.bin";
pub const TREE_TXT_FILE: &str = "tree.txt";
pub const WEIGHTS_FILE: &str = "weights.bin";
pub const ARGS_FILE: &str = "args.bin";
pub const GRAPH_FILE: &str = "graph.bin";

pub(crate) fn write_i32<W: Write>(out: &mut W, value: i32) -> std::io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub(crate) fn write_u32<W: Write>(out: &mut W, value: u32) -> std::io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub(crate) fn write_f32<W: Write>(out: &mut W, value: f32) -> std::io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub(crate) fn write_u8<W: Write>(out: &mut W, value: u8) -> std::io::Result<()> {
    out.write_all(&[value])
}

pub(crate) fn read_i32<R: Read>(input: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(input: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_f32<R: Read>(input: &mut R) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

pub(crate) fn read_u8<R: Read>(input: &mut R) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}
