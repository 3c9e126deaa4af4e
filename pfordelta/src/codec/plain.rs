//! Uncompressed frames: the block's words, as is.

use super::check_block_size;
use super::BlockCodec;
use super::FrameError;
use crate::Error;

/// Stores every block verbatim. Useful as a baseline when comparing frame
/// sizes, and for streams whose values are too random to pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainCodec {
    block_size: usize,
}

impl PlainCodec {
    /// Creates a codec for blocks of `block_size` values.
    pub fn new(block_size: usize) -> Result<Self, Error> {
        let block_size = check_block_size(block_size as u64)?;
        Ok(Self { block_size })
    }
}

impl BlockCodec for PlainCodec {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn compress(
        &self,
        block: &mut [u32],
        valid_count: usize,
        frame: &mut Vec<u32>,
    ) -> Result<(), Error> {
        if block.len() != self.block_size {
            return Err(FrameError::BlockLength {
                expected: self.block_size,
                actual: block.len(),
            }
            .into());
        }
        if valid_count > self.block_size {
            return Err(Error::ValidCountOutOfRange {
                valid_count,
                block_size: self.block_size,
            });
        }

        block[valid_count..].fill(0);
        frame.extend_from_slice(block);
        Ok(())
    }

    fn decompress(&self, frame: &[u32], out: &mut [u32]) -> Result<(), Error> {
        if frame.len() != self.block_size || out.len() != self.block_size {
            return Err(FrameError::WordCount {
                expected: self.block_size,
                actual: frame.len(),
            }
            .into());
        }
        out.copy_from_slice(frame);
        Ok(())
    }
}
