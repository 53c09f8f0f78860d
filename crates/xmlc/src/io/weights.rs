//! `weights.bin`: a count header followed by serialized base classifiers in
//! node-index order (label-index order for flat models).

use std::io::{Read, Write};

use crate::base::BaseLearner;
use crate::error::{Error, Result};
use crate::io::{read_i32, write_i32};

/// Streaming writer for `weights.bin`.
///
/// The classifier count is written up front; [`finish`](Self::finish)
/// verifies that exactly that many classifiers were streamed.
#[derive(Debug)]
pub struct WeightsWriter<W: Write> {
    out: W,
    expected: u32,
    written: u32,
}

impl<W: Write> WeightsWriter<W> {
    pub fn new(mut out: W, expected: u32) -> std::io::Result<Self> {
        write_i32(&mut out, expected as i32)?;
        Ok(Self {
            out,
            expected,
            written: 0,
        })
    }

    pub fn write_base<B: BaseLearner>(&mut self, base: &B) -> std::io::Result<()> {
        base.save(&mut self.out)?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        if self.written != self.expected {
            return Err(Error::Format(format!(
                "weights stream wrote {} classifiers but declared {}",
                self.written, self.expected
            )));
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Read the full classifier array back into memory.
pub fn load_bases<B: BaseLearner, R: Read>(input: &mut R) -> Result<Vec<B>> {
    let size = read_i32(input)?;
    if size < 0 {
        return Err(Error::Format(format!("negative classifier count {size}")));
    }
    let mut bases = Vec::with_capacity(size as usize);
    for _ in 0..size {
        bases.push(B::load(input)?);
    }
    Ok(bases)
}
