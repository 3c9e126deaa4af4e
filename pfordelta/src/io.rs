//! Byte sinks and sources the block streams are written to and read from.
//!
//! The codec needs very little from storage: fixed 32-bit integers,
//! LEB128 integers, the current byte offset, and (for readers) seeking.
//! [`BlockSink`] and [`BlockSource`] capture exactly that, so hosts can
//! back them with whatever file or buffer abstraction they already have.
//! [`StreamSink`] and [`StreamSource`] adapt any `std::io` writer or
//! seekable reader.
//!
//! Fixed 32-bit integers are big-endian.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

use crate::leb128::ReadLeb128;
use crate::leb128::WriteLeb128;
use crate::Error;

/// Output side of a block or index stream.
pub trait BlockSink {
    /// Writes a fixed-width 32-bit integer.
    fn write_fixed32(&mut self, value: u32) -> Result<(), Error>;

    /// Writes a LEB128 integer.
    fn write_var_uint(&mut self, value: u64) -> Result<(), Error>;

    /// Number of bytes written so far.
    fn offset(&self) -> u64;

    /// Flushes and releases the sink. Called exactly once by its owner.
    fn close(&mut self) -> Result<(), Error>;
}

/// Input side of a block or index stream.
pub trait BlockSource {
    /// Reads a fixed-width 32-bit integer.
    fn read_fixed32(&mut self) -> Result<u32, Error>;

    /// Reads a LEB128 integer.
    fn read_var_uint(&mut self) -> Result<u64, Error>;

    /// Moves the read position to `offset`.
    fn seek(&mut self, offset: u64) -> Result<(), Error>;

    /// Current read position.
    fn offset(&self) -> u64;

    /// Total length of the stream in bytes.
    fn stream_len(&self) -> u64;

    /// Bytes between the read position and the end of the stream.
    fn remaining(&self) -> u64 {
        self.stream_len().saturating_sub(self.offset())
    }
}

impl<S: BlockSink + ?Sized> BlockSink for &mut S {
    fn write_fixed32(&mut self, value: u32) -> Result<(), Error> {
        (**self).write_fixed32(value)
    }

    fn write_var_uint(&mut self, value: u64) -> Result<(), Error> {
        (**self).write_var_uint(value)
    }

    fn offset(&self) -> u64 {
        (**self).offset()
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
}

/// A [`BlockSink`] over any writer, counting bytes as they go out.
#[derive(Debug)]
pub struct StreamSink<W> {
    writer: W,
    offset: u64,
    closed: bool,
}

impl<W: Write> StreamSink<W> {
    /// Wraps `writer`; offsets start at zero.
    pub fn new(writer: W) -> Self {
        Self { writer, offset: 0, closed: false }
    }

    /// Whether [`BlockSink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::SinkClosed);
        }
        Ok(())
    }
}

impl<W: Write> BlockSink for StreamSink<W> {
    fn write_fixed32(&mut self, value: u32) -> Result<(), Error> {
        self.ensure_open()?;
        self.writer.write_all(&value.to_be_bytes())?;
        self.offset += 4;
        Ok(())
    }

    fn write_var_uint(&mut self, value: u64) -> Result<(), Error> {
        self.ensure_open()?;
        let written = self.writer.write_leb128(value)?;
        self.offset += written as u64;
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn close(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// A [`BlockSource`] over any seekable reader.
///
/// Offsets are positions in the underlying reader. After a failed read the
/// position is unspecified until the next [`BlockSource::seek`].
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    offset: u64,
    len: u64,
}

impl<R: Read + Seek> StreamSource<R> {
    /// Wraps `reader`, keeping its current position.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        let offset = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(offset))?;
        Ok(Self { reader, offset, len })
    }

    /// Unwraps the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> BlockSource for StreamSource<R> {
    fn read_fixed32(&mut self) -> Result<u32, Error> {
        let mut bytes = [0u8; 4];
        self.reader.read_exact(&mut bytes)?;
        self.offset += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_var_uint(&mut self) -> Result<u64, Error> {
        let (value, consumed) = self.reader.read_leb128()?;
        self.offset += consumed as u64;
        Ok(value)
    }

    fn seek(&mut self, offset: u64) -> Result<(), Error> {
        self.offset = self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn stream_len(&self) -> u64 {
        self.len
    }
}
