//! `args.bin`: the postcard-encoded training configuration.

use std::io::{Read, Write};

use crate::error::Result;
use crate::model::TrainConfig;

pub fn save_config<W: Write>(cfg: &TrainConfig, out: &mut W) -> Result<()> {
    let bytes = postcard::to_allocvec(cfg)?;
    out.write_all(&bytes)?;
    Ok(())
}

pub fn load_config<R: Read>(input: &mut R) -> Result<TrainConfig> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    Ok(postcard::from_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelType, TreeType};

    #[test]
    fn round_trip() {
        let cfg = TrainConfig {
            model_type: ModelType::Hsm,
            tree_type: TreeType::Huffman,
            arity: 4,
            top_k: 3,
            threshold: 0.25,
            seed: 99,
            ..TrainConfig::default()
        };

        let mut buf = Vec::new();
        save_config(&cfg, &mut buf).unwrap();
        let loaded = load_config(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.model_type, ModelType::Hsm);
        assert_eq!(loaded.tree_type, TreeType::Huffman);
        assert_eq!(loaded.arity, 4);
        assert_eq!(loaded.top_k, 3);
        assert_eq!(loaded.seed, 99);
    }
}
