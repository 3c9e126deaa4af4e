//! Block streams: a header followed by length-prefixed frames.
//!
//! ```text
//! header:  block_size                  LEB128
//! block*:  frame_len                   fixed32
//!          frame[0..frame_len)         fixed32 each
//! ```
//!
//! The frame contents belong to the [`BlockCodec`](crate::codec::BlockCodec)
//! the stream was written with; the block size in the header applies to
//! every block. The last block may be partially filled; slots after the
//! last written value decode as padding and carry no meaning.

mod reader;
mod writer;

pub use reader::BlockReader;
pub use writer::BlockWriter;
