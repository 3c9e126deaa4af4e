//! Top-level error type for the pfordelta library

use crate::codec::FrameError;
use crate::index::IndexMark;

/// Errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bit width is not one of the widths the packer is specialized for.
    #[error("unsupported bit width: {0}")]
    UnsupportedBitWidth(u32),

    /// The block size must be a non-zero multiple of 32 no larger than
    /// [`crate::MAX_BLOCK_SIZE`].
    #[error("invalid block size: {0}")]
    InvalidBlockSize(u64),

    /// A width policy string was not `optimal`, `covering` or
    /// `fixed:<bits>`.
    #[error("unknown width policy '{0}', expected optimal, covering or fixed:<bits>")]
    InvalidWidthPolicy(String),

    /// A stream's header records a different block size than the codec
    /// reading it was built for.
    #[error("stream block size {stream} does not match the codec block size {codec}")]
    BlockSizeMismatch {
        /// Block size from the stream header
        stream: usize,
        /// Block size of the codec
        codec: usize,
    },

    /// More valid elements were claimed than the block holds.
    #[error("valid element count {valid_count} exceeds the block size {block_size}")]
    ValidCountOutOfRange {
        /// The claimed number of valid elements
        valid_count: usize,
        /// The block size of the stream
        block_size: usize,
    },

    /// A compressed frame did not match its own header or the stream around
    /// it.
    #[error("malformed block frame{}: {source}", fmt_offset(.offset))]
    MalformedFrame {
        /// Byte offset of the block in the stream, when known
        offset: Option<u64>,
        /// What was inconsistent
        #[source]
        source: FrameError,
    },

    /// A skip index mark went backwards relative to the previous mark.
    #[error("index mark {current} precedes the previous mark {previous}")]
    IndexOrderViolation {
        /// The rolling state before the offending mark
        previous: IndexMark,
        /// The offending mark
        current: IndexMark,
    },

    /// A decoded index entry does not fit the mark's integer fields.
    #[error("index entry overflows the mark fields: {0}")]
    IndexOverflow(&'static str),

    /// Attempted to write to a sink after it was closed.
    #[error("attempted to write to a closed sink")]
    SinkClosed,

    /// Error decoding a LEB128 value
    #[error("error decoding LEB128 value: {0}")]
    Leb128(#[from] crate::leb128::Error),

    /// I/O error from the underlying sink or source
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attaches the stream offset of the block being decoded to a frame
    /// error that was raised without one.
    pub fn at_offset(self, block_offset: u64) -> Self {
        match self {
            Error::MalformedFrame { offset: None, source } => Error::MalformedFrame {
                offset: Some(block_offset),
                source,
            },
            other => other,
        }
    }
}

impl From<FrameError> for Error {
    fn from(source: FrameError) -> Self {
        Error::MalformedFrame { offset: None, source }
    }
}

fn fmt_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(offset) => format!(" at offset {offset}"),
        None => String::new(),
    }
}
