//! Block compression primitives.
//!
//! * [`bitpack`]: fixed bit width packing with one unpack routine per
//!   supported width.
//! * [`pfor`]: the PForDelta frame, built on top of `bitpack`.
//! * [`plain`]: a verbatim frame, mostly useful as a reference codec.
//!
//! Block writers and readers only see the [`BlockCodec`] trait, so any frame
//! format can be plugged into them.

pub mod bitpack;
pub mod pfor;
pub mod plain;

use std::fmt;

use crate::Error;

pub use pfor::CompressedBlock;
pub use pfor::Exception;
pub use pfor::PForDelta;
pub use pfor::WidthPolicy;
pub use plain::PlainCodec;

/// `MASKS[b]` keeps the low `b` bits of a word.
#[rustfmt::skip]
pub const MASKS: [u32; 33] = [
    0x0000_0000,
    0x0000_0001, 0x0000_0003, 0x0000_0007, 0x0000_000f,
    0x0000_001f, 0x0000_003f, 0x0000_007f, 0x0000_00ff,
    0x0000_01ff, 0x0000_03ff, 0x0000_07ff, 0x0000_0fff,
    0x0000_1fff, 0x0000_3fff, 0x0000_7fff, 0x0000_ffff,
    0x0001_ffff, 0x0003_ffff, 0x0007_ffff, 0x000f_ffff,
    0x001f_ffff, 0x003f_ffff, 0x007f_ffff, 0x00ff_ffff,
    0x01ff_ffff, 0x03ff_ffff, 0x07ff_ffff, 0x0fff_ffff,
    0x1fff_ffff, 0x3fff_ffff, 0x7fff_ffff, 0xffff_ffff,
];

/// Bit widths with a specialized unpack routine, in increasing order.
pub const SUPPORTED_WIDTHS: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16, 20, 32];

/// Number of values in one packing group. A group of 32 values at width `b`
/// fills exactly `b` words.
pub const GROUP_SIZE: usize = 32;

/// Validates a block size: a non-zero multiple of [`GROUP_SIZE`] no larger
/// than [`crate::MAX_BLOCK_SIZE`].
pub fn check_block_size(block_size: u64) -> Result<usize, Error> {
    let valid = block_size != 0
        && block_size % GROUP_SIZE as u64 == 0
        && block_size <= crate::MAX_BLOCK_SIZE as u64;
    if !valid {
        return Err(Error::InvalidBlockSize(block_size));
    }
    Ok(block_size as usize)
}

/// A bit width from [`SUPPORTED_WIDTHS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitWidth(u8);

impl BitWidth {
    /// The narrowest supported width.
    pub const MIN: BitWidth = BitWidth(1);

    /// The widest supported width, which holds any `u32`.
    pub const MAX: BitWidth = BitWidth(32);

    /// Validates `bits` against [`SUPPORTED_WIDTHS`].
    pub fn new(bits: u32) -> Result<Self, Error> {
        match u8::try_from(bits) {
            Ok(bits) if SUPPORTED_WIDTHS.contains(&bits) => Ok(BitWidth(bits)),
            _ => Err(Error::UnsupportedBitWidth(bits)),
        }
    }

    /// The smallest supported width that can hold `value`.
    pub fn covering(value: u32) -> Self {
        let needed = (u32::BITS - value.leading_zeros()) as u8;
        SUPPORTED_WIDTHS
            .iter()
            .find(|&&bits| bits >= needed)
            .map(|&bits| BitWidth(bits))
            .unwrap_or(BitWidth::MAX)
    }

    /// Iterates over every supported width, narrowest first.
    pub fn all() -> impl Iterator<Item = BitWidth> {
        SUPPORTED_WIDTHS.iter().map(|&bits| BitWidth(bits))
    }

    /// Number of bits.
    pub fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Mask keeping the low `bits()` bits.
    pub fn mask(self) -> u32 {
        MASKS[self.0 as usize]
    }

    /// Whether `value` can be stored without an exception.
    pub fn fits(self, value: u32) -> bool {
        value <= self.mask()
    }

    /// Number of packed words for `len` values, `len` being a multiple of
    /// [`GROUP_SIZE`].
    pub fn packed_words(self, len: usize) -> usize {
        len / GROUP_SIZE * self.0 as usize
    }
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural problems found while parsing a compressed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than its fixed fields.
    #[error("frame truncated: expected at least {expected} words, got {actual}")]
    Truncated {
        /// Minimum number of words needed
        expected: usize,
        /// Words available
        actual: usize,
    },

    /// The frame length disagrees with the counts recorded inside it.
    #[error("frame word count mismatch: expected {expected}, got {actual}")]
    WordCount {
        /// Words implied by the frame header and exception count
        expected: usize,
        /// Words actually present
        actual: usize,
    },

    /// A packed word slice does not match `len * b / 32`.
    #[error("packed length mismatch for {len} values at width {bits}: expected {expected} words, got {actual}")]
    PackedLength {
        /// Number of values being (un)packed
        len: usize,
        /// Bit width
        bits: u32,
        /// Expected number of words
        expected: usize,
        /// Actual number of words
        actual: usize,
    },

    /// More exceptions than the block has slots.
    #[error("exception count {count} exceeds the block size {block_size}")]
    ExceptionCount {
        /// Recorded exception count
        count: usize,
        /// Block size
        block_size: usize,
    },

    /// An exception points outside the block or out of order.
    #[error("exception position {position} is out of order or outside the block of {block_size}")]
    ExceptionPosition {
        /// Offending position
        position: u32,
        /// Block size
        block_size: usize,
    },

    /// An exception value would have fit in the packed width.
    #[error("exception value {value} at position {position} fits in {bits} bits")]
    ExceptionValue {
        /// Position of the exception
        position: u32,
        /// The recorded value
        value: u32,
        /// Frame bit width
        bits: u32,
    },

    /// The width word of a stored frame is not a supported width.
    #[error("frame declares unsupported bit width {bits}")]
    Width {
        /// The recorded width
        bits: u32,
    },

    /// Fewer than four bytes are left where a frame length word should be.
    #[error("frame length word needs 4 bytes but only {remaining} remain")]
    LengthWord {
        /// Bytes left in the stream
        remaining: u64,
    },

    /// A frame length read from a stream runs past the end of the stream.
    #[error("frame of {words} words needs {needed} bytes but only {remaining} remain")]
    PastEndOfStream {
        /// Declared number of words
        words: u64,
        /// Bytes needed for them
        needed: u64,
        /// Bytes left in the stream
        remaining: u64,
    },

    /// The block-size slice handed to a codec has the wrong length.
    #[error("block length mismatch: expected {expected}, got {actual}")]
    BlockLength {
        /// Block size the codec was built for
        expected: usize,
        /// Length of the slice
        actual: usize,
    },
}

/// Narrow compress/decompress capability used by block writers and readers.
///
/// Frames are sequences of 32-bit words; the writer prefixes each frame with
/// its length, so a codec never has to frame itself on the stream.
pub trait BlockCodec {
    /// Number of values in every block this codec handles.
    fn block_size(&self) -> usize;

    /// Compresses `block`, whose first `valid_count` entries are meaningful,
    /// appending the frame words to `frame`. Entries at and after
    /// `valid_count` may be overwritten with padding.
    fn compress(
        &self,
        block: &mut [u32],
        valid_count: usize,
        frame: &mut Vec<u32>,
    ) -> Result<(), Error>;

    /// Decodes `frame` into `out`, whose length is the block size.
    ///
    /// On error `out` must be left as it was.
    fn decompress(&self, frame: &[u32], out: &mut [u32]) -> Result<(), Error>;
}

impl<C: BlockCodec + ?Sized> BlockCodec for &C {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn compress(
        &self,
        block: &mut [u32],
        valid_count: usize,
        frame: &mut Vec<u32>,
    ) -> Result<(), Error> {
        (**self).compress(block, valid_count, frame)
    }

    fn decompress(&self, frame: &[u32], out: &mut [u32]) -> Result<(), Error> {
        (**self).decompress(frame, out)
    }
}
