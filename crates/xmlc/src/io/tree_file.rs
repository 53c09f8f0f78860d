//! `tree.bin` and `tree.txt` codecs.
//!
//! Binary layout: `i32 k`, `i32 t`, `t x (i32 index, i32 label)`,
//! `i32 root`, `t x i32 parent` (−1 for the root). Children are recovered by
//! stable insertion while scanning the parent table in node order, so a
//! loaded tree holds every parent's children sorted by node index.

use std::io::{BufRead, Read, Write};

use crate::error::{Error, Result};
use crate::io::{read_i32, write_i32};
use crate::tree::{LabelTree, NodeId};

pub fn save_tree<W: Write>(tree: &LabelTree, out: &mut W) -> Result<()> {
    let root = tree
        .root()
        .ok_or_else(|| Error::Format("cannot save a tree without a root".into()))?;

    write_i32(out, tree.num_leaves() as i32)?;
    write_i32(out, tree.len() as i32)?;
    for node in tree.nodes() {
        write_i32(out, node.index as i32)?;
        write_i32(out, node.label.map_or(-1, |l| l as i32))?;
    }
    write_i32(out, root as i32)?;
    for node in tree.nodes() {
        write_i32(out, node.parent.map_or(-1, |p| p as i32))?;
    }
    Ok(())
}

pub fn load_tree<R: Read>(input: &mut R) -> Result<LabelTree> {
    let k = read_i32(input)?;
    let t = read_i32(input)?;
    if k < 0 || t <= 0 {
        return Err(Error::Format(format!("bad tree header: k={k}, t={t}")));
    }

    let mut labels = Vec::with_capacity(t as usize);
    for expected in 0..t {
        let index = read_i32(input)?;
        let label = read_i32(input)?;
        if index != expected {
            return Err(Error::Format(format!(
                "node record {expected} carries index {index}"
            )));
        }
        labels.push((label >= 0).then_some(label as u32));
    }

    let root = read_i32(input)?;
    if root < 0 || root >= t {
        return Err(Error::Format(format!("root index {root} out of range")));
    }

    let mut tree = LabelTree::new();
    // Two passes: materialize every node, then wire parents in node order.
    for &label in &labels {
        tree.add_node(None, label);
    }
    for index in 0..t {
        let parent = read_i32(input)?;
        if parent >= 0 {
            if parent >= t {
                return Err(Error::Format(format!(
                    "node {index} references out-of-range parent {parent}"
                )));
            }
            tree.attach(index as NodeId, parent as NodeId);
        }
    }
    tree.set_root(root as NodeId);

    tree.validate()?;
    if tree.num_leaves() != k as usize {
        return Err(Error::Format(format!(
            "tree declares {k} leaves but exposes {}",
            tree.num_leaves()
        )));
    }
    Ok(tree)
}

/// Human-readable structure: a `k t` header, then one `parent child label`
/// line per edge.
pub fn save_tree_txt<W: Write>(tree: &LabelTree, out: &mut W) -> Result<()> {
    writeln!(out, "{} {}", tree.num_leaves(), tree.len())?;
    if let Some(root) = tree.root() {
        writeln!(out, "-1 {root} -1")?;
    }
    for node in tree.nodes() {
        if let Some(parent) = node.parent {
            let label = node.label.map_or(-1, |l| l as i32);
            writeln!(out, "{} {} {}", parent, node.index, label)?;
        }
    }
    Ok(())
}

pub fn load_tree_txt<R: BufRead>(input: &mut R) -> Result<LabelTree> {
    let mut header = String::new();
    input.read_line(&mut header)?;
    let mut parts = header.split_whitespace();
    let k: usize = parse_field(parts.next(), "k")?;
    let t: usize = parse_field(parts.next(), "t")?;
    if t == 0 {
        return Err(Error::Format("tree.txt declares zero nodes".into()));
    }

    let mut tree = LabelTree::new();
    for _ in 0..t {
        tree.add_node(None, None);
    }

    let mut root: NodeId = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let parent: i64 = parse_field(parts.next(), "parent")?;
        let child: usize = parse_field(parts.next(), "child")?;
        if child >= t {
            return Err(Error::Format(format!("child index {child} out of range")));
        }

        // A `-1 child` line only names the root.
        if parent < 0 {
            root = child as NodeId;
            continue;
        }
        let label: i64 = parse_field(parts.next(), "label")?;

        let parent = parent as usize;
        if parent >= t {
            return Err(Error::Format(format!("parent index {parent} out of range")));
        }
        tree.attach(child as NodeId, parent as NodeId);
        if label >= 0 {
            tree.node_mut(child as NodeId).label = Some(label as u32);
        }
    }

    // Labels were patched directly on the nodes; re-derive the leaf map.
    tree.rebuild_leaf_map();
    tree.set_root(root);
    tree.validate()?;
    if tree.num_leaves() != k {
        return Err(Error::Format(format!(
            "tree.txt declares {k} leaves but exposes {}",
            tree.num_leaves()
        )));
    }
    Ok(tree)
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str) -> Result<T> {
    field
        .ok_or_else(|| Error::Format(format!("missing {name} field")))?
        .parse()
        .map_err(|_| Error::Format(format!("unparsable {name} field")))
}
