//! # PForDelta Block Frames
//!
//! A block of `block_size` values is stored at a single bit width `b`. Values
//! wider than `b` bits are *exceptions*: their slot in the packed area keeps
//! only the low `b` bits and the full value is stored next to its position
//! after the packed words. Decoding bulk-unpacks the packed area and then
//! patches every exception back in.
//!
//! ## Frame Layout
//!
//! All fields are 32-bit words:
//!
//! ```text
//! [b][packed word; block_size * b / 32][E][position, value; E]
//! ```
//!
//! Exception positions are strictly increasing and every exception value is
//! wider than `b` bits; a frame that breaks either rule is rejected.
//!
//! ## Width Selection
//!
//! See [`WidthPolicy`]. The default searches every supported width for the
//! smallest frame, which is what PForDelta is about: a handful of large
//! values should cost two words each, not widen the whole block.

use std::fmt;
use std::str::FromStr;

use super::bitpack;
use super::check_block_size;
use super::BitWidth;
use super::BlockCodec;
use super::FrameError;
use crate::Error;

/// Words in a frame besides the packed area and exception pairs: the width
/// word and the exception count.
const FRAME_OVERHEAD_WORDS: usize = 2;

/// Words per exception.
const EXCEPTION_WORDS: usize = 2;

/// A value that did not fit in the frame's bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exception {
    /// Index of the value inside the block
    pub position: u32,
    /// The full value
    pub value: u32,
}

/// How a block's bit width is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidthPolicy {
    /// The supported width with the smallest frame; ties go to the narrower
    /// width.
    #[default]
    Optimal,
    /// The narrowest supported width holding the block maximum, so the
    /// block never has exceptions.
    Covering,
    /// Always this width.
    Fixed(BitWidth),
}

impl WidthPolicy {
    /// Picks the width for `block`.
    pub fn select(&self, block: &[u32]) -> BitWidth {
        match self {
            WidthPolicy::Fixed(width) => *width,
            WidthPolicy::Covering => {
                let max = block.iter().copied().max().unwrap_or(0);
                BitWidth::covering(max)
            }
            WidthPolicy::Optimal => optimal_width(block),
        }
    }
}

/// Searches every supported width using a histogram of value bit lengths,
/// so the block is scanned once.
fn optimal_width(block: &[u32]) -> BitWidth {
    let mut histogram = [0usize; 33];
    for &value in block {
        histogram[(u32::BITS - value.leading_zeros()) as usize] += 1;
    }

    let mut best = BitWidth::MAX;
    let mut best_words = usize::MAX;
    for width in BitWidth::all() {
        let bits = width.bits() as usize;
        let exceptions: usize = histogram[bits + 1..].iter().sum();
        let words = width.packed_words(block.len()) + EXCEPTION_WORDS * exceptions;
        if words < best_words {
            best = width;
            best_words = words;
        }
    }
    best
}

impl fmt::Display for WidthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidthPolicy::Optimal => write!(f, "optimal"),
            WidthPolicy::Covering => write!(f, "covering"),
            WidthPolicy::Fixed(width) => write!(f, "fixed:{width}"),
        }
    }
}

impl FromStr for WidthPolicy {
    type Err = Error;

    /// Parses `optimal`, `covering` or `fixed:<bits>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "optimal" => Ok(WidthPolicy::Optimal),
            "covering" => Ok(WidthPolicy::Covering),
            other => {
                let bits = other
                    .strip_prefix("fixed:")
                    .and_then(|bits| bits.parse::<u32>().ok())
                    .ok_or_else(|| invalid_policy(other))?;
                Ok(WidthPolicy::Fixed(BitWidth::new(bits)?))
            }
        }
    }
}

fn invalid_policy(s: &str) -> Error {
    Error::InvalidWidthPolicy(s.to_string())
}

/// A compressed block: bit width, packed values and exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    width: BitWidth,
    packed: Vec<u32>,
    exceptions: Vec<Exception>,
}

impl CompressedBlock {
    /// Bit width of the packed area.
    pub fn width(&self) -> BitWidth {
        self.width
    }

    /// Packed words.
    pub fn packed(&self) -> &[u32] {
        &self.packed
    }

    /// Exceptions in increasing position order.
    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    /// Length of the serialized frame in words.
    pub fn frame_len(&self) -> usize {
        FRAME_OVERHEAD_WORDS + self.packed.len() + EXCEPTION_WORDS * self.exceptions.len()
    }

    /// Appends the serialized frame to `frame`.
    pub fn write_words(&self, frame: &mut Vec<u32>) {
        frame.reserve(self.frame_len());
        frame.push(self.width.bits());
        frame.extend_from_slice(&self.packed);
        frame.push(self.exceptions.len() as u32);
        for exception in &self.exceptions {
            frame.push(exception.position);
            frame.push(exception.value);
        }
    }

    /// Serializes the frame.
    pub fn to_words(&self) -> Vec<u32> {
        let mut frame = Vec::new();
        self.write_words(&mut frame);
        frame
    }

    /// Parses and validates a frame for blocks of `block_size` values.
    pub fn from_words(frame: &[u32], block_size: usize) -> Result<Self, Error> {
        let view = FrameView::parse(frame, block_size)?;
        Ok(Self {
            width: view.width,
            packed: view.packed.to_vec(),
            exceptions: view.exceptions().collect(),
        })
    }
}

/// Borrowed, validated view of a serialized frame.
struct FrameView<'a> {
    width: BitWidth,
    packed: &'a [u32],
    pairs: &'a [u32],
}

impl<'a> FrameView<'a> {
    fn parse(frame: &'a [u32], block_size: usize) -> Result<Self, Error> {
        if frame.len() < FRAME_OVERHEAD_WORDS {
            return Err(FrameError::Truncated {
                expected: FRAME_OVERHEAD_WORDS,
                actual: frame.len(),
            }
            .into());
        }

        let width = BitWidth::new(frame[0]).map_err(|_| FrameError::Width { bits: frame[0] })?;
        let packed_words = width.packed_words(block_size);
        let header_words = FRAME_OVERHEAD_WORDS + packed_words;
        if frame.len() < header_words {
            return Err(FrameError::Truncated {
                expected: header_words,
                actual: frame.len(),
            }
            .into());
        }

        let count = frame[1 + packed_words] as usize;
        if count > block_size {
            return Err(FrameError::ExceptionCount { count, block_size }.into());
        }

        let expected = header_words + EXCEPTION_WORDS * count;
        if frame.len() != expected {
            return Err(FrameError::WordCount {
                expected,
                actual: frame.len(),
            }
            .into());
        }

        let view = Self {
            width,
            packed: &frame[1..1 + packed_words],
            pairs: &frame[header_words..],
        };

        let mut previous: Option<u32> = None;
        for exception in view.exceptions() {
            let Exception { position, value } = exception;
            let out_of_order = previous.is_some_and(|previous| position <= previous);
            if position as usize >= block_size || out_of_order {
                return Err(FrameError::ExceptionPosition { position, block_size }.into());
            }
            if width.fits(value) {
                return Err(FrameError::ExceptionValue {
                    position,
                    value,
                    bits: width.bits(),
                }
                .into());
            }
            previous = Some(position);
        }

        Ok(view)
    }

    fn exceptions(&self) -> impl Iterator<Item = Exception> + 'a {
        self.pairs.chunks_exact(EXCEPTION_WORDS).map(|pair| Exception {
            position: pair[0],
            value: pair[1],
        })
    }
}

/// The PForDelta block codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PForDelta {
    block_size: usize,
    policy: WidthPolicy,
}

impl PForDelta {
    /// Creates a codec for blocks of `block_size` values.
    pub fn new(block_size: usize, policy: WidthPolicy) -> Result<Self, Error> {
        let block_size = check_block_size(block_size as u64)?;
        Ok(Self { block_size, policy })
    }

    /// Number of values per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The width selection policy.
    pub fn policy(&self) -> WidthPolicy {
        self.policy
    }

    /// Compresses `block`. Entries from `valid_count` on are zeroed first.
    pub fn compress_block(
        &self,
        block: &mut [u32],
        valid_count: usize,
    ) -> Result<CompressedBlock, Error> {
        self.check_len(block.len())?;
        if valid_count > self.block_size {
            return Err(Error::ValidCountOutOfRange {
                valid_count,
                block_size: self.block_size,
            });
        }
        block[valid_count..].fill(0);

        let width = self.policy.select(block);
        let packed = bitpack::pack(block, width)?;
        let exceptions = block
            .iter()
            .enumerate()
            .filter(|&(_, &value)| !width.fits(value))
            .map(|(position, &value)| Exception {
                position: position as u32,
                value,
            })
            .collect();

        Ok(CompressedBlock { width, packed, exceptions })
    }

    /// Decompresses `block` into `out`, which must be `block_size` long.
    pub fn decompress_block(&self, block: &CompressedBlock, out: &mut [u32]) -> Result<(), Error> {
        self.check_len(out.len())?;
        for exception in &block.exceptions {
            if exception.position as usize >= out.len() {
                return Err(FrameError::ExceptionPosition {
                    position: exception.position,
                    block_size: self.block_size,
                }
                .into());
            }
        }

        bitpack::unpack(&block.packed, block.width, out)?;
        for exception in &block.exceptions {
            out[exception.position as usize] = exception.value;
        }
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<(), Error> {
        if len != self.block_size {
            return Err(FrameError::BlockLength {
                expected: self.block_size,
                actual: len,
            }
            .into());
        }
        Ok(())
    }
}

impl BlockCodec for PForDelta {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn compress(
        &self,
        block: &mut [u32],
        valid_count: usize,
        frame: &mut Vec<u32>,
    ) -> Result<(), Error> {
        let compressed = self.compress_block(block, valid_count)?;
        tracing::trace!(
            width = compressed.width.bits(),
            exceptions = compressed.exceptions.len(),
            "compressed block"
        );
        compressed.write_words(frame);
        Ok(())
    }

    fn decompress(&self, frame: &[u32], out: &mut [u32]) -> Result<(), Error> {
        self.check_len(out.len())?;
        let view = FrameView::parse(frame, self.block_size)?;

        bitpack::unpack(view.packed, view.width, out)?;
        for Exception { position, value } in view.exceptions() {
            out[position as usize] = value;
        }
        Ok(())
    }
}
