#![deny(missing_docs)]

//! # PForDelta Block Codec
//!
//! Compresses sequences of non-negative 32-bit integers, such as posting
//! lists, in fixed-size blocks. Every block is packed at one bit width and
//! the few values that do not fit are stored as exceptions. A skip index of
//! [`IndexMark`]s lets readers jump to any element without decoding the
//! blocks before it.
//!
//! ```
//! use std::io::Cursor;
//!
//! use pfordelta::BlockReader;
//! use pfordelta::BlockWriter;
//! use pfordelta::PForDelta;
//! use pfordelta::StreamSink;
//! use pfordelta::StreamSource;
//! use pfordelta::WidthPolicy;
//!
//! # fn main() -> Result<(), pfordelta::Error> {
//! let codec = PForDelta::new(128, WidthPolicy::Optimal)?;
//! let mut writer = BlockWriter::new(StreamSink::new(Vec::new()), codec)?;
//!
//! let mut mark = None;
//! for value in 0..1000u32 {
//!     if value == 700 {
//!         mark = Some(writer.mark());
//!     }
//!     writer.write(value % 50)?;
//! }
//! let bytes = writer.close()?.into_inner();
//!
//! let mut reader = BlockReader::open(StreamSource::new(Cursor::new(bytes))?, codec)?;
//! reader.seek(mark.unwrap_or_default())?;
//! assert_eq!(reader.next_value()?, 700 % 50);
//! # Ok(())
//! # }
//! ```
//!
//! The crate also ships the `pfordelta` binary, which encodes whitespace
//! separated integers into a block stream plus an index file.

pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod leb128;
pub mod logging;


pub use block::BlockReader;
pub use block::BlockWriter;
pub use codec::BitWidth;
pub use codec::BlockCodec;
pub use codec::CompressedBlock;
pub use codec::Exception;
pub use codec::PForDelta;
pub use codec::PlainCodec;
pub use codec::WidthPolicy;
pub use error::Error;
pub use index::IndexMark;
pub use index::SkipIndexReader;
pub use index::SkipIndexWriter;
pub use io::BlockSink;
pub use io::BlockSource;
pub use io::StreamSink;
pub use io::StreamSource;

/// Largest supported number of values per block.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;
