//! # Skip Index
//!
//! A skip index is a side stream of [`IndexMark`]s, each naming the block
//! that holds some element and the element's slot inside that block. A
//! reader seeks straight to the block, decodes it, and skips `upto` slots.
//!
//! Marks are written relative to the previous one whenever possible:
//!
//! | case                          | first field          | second field          |
//! |-------------------------------|----------------------|-----------------------|
//! | absolute                      | `file_pointer`       | `upto`                |
//! | same block as previous mark   | `0`                  | `upto - previous.upto`|
//! | later block                   | `file_pointer` delta | `upto`                |
//!
//! `upto` is a slot inside its block, so it starts over with every block and
//! is written whole on a block transition. Both fields are LEB128. A zero
//! first field is unambiguous because a later block always has a larger
//! file pointer.

use std::fmt;

use crate::io::BlockSink;
use crate::io::BlockSource;
use crate::Error;

/// A checkpoint in a block stream: the byte offset of a block and a slot in
/// it.
///
/// Marks order by file pointer first, then slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexMark {
    /// Byte offset of the block in the block stream
    pub file_pointer: u64,
    /// Slot of the element inside that block
    pub upto: u32,
}

impl IndexMark {
    /// Creates a mark.
    pub fn new(file_pointer: u64, upto: u32) -> Self {
        Self { file_pointer, upto }
    }
}

impl fmt::Display for IndexMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(fp={}, upto={})", self.file_pointer, self.upto)
    }
}

/// Writes marks, delta-encoding each against the one before.
///
/// Holds the rolling `(last file pointer, last upto)` state, so a writer
/// belongs to one index stream.
#[derive(Debug, Clone, Default)]
pub struct SkipIndexWriter {
    last: IndexMark,
}

impl SkipIndexWriter {
    /// Creates a writer whose previous mark is `(0, 0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `mark` the base for the next relative entry without writing
    /// anything.
    pub fn set(&mut self, mark: IndexMark) {
        self.last = mark;
    }

    /// The mark the next relative entry is encoded against.
    pub fn last(&self) -> IndexMark {
        self.last
    }

    /// Writes one entry for `mark` and makes it the new base.
    ///
    /// Relative entries require `mark` not to precede the previous mark;
    /// absolute entries may go anywhere.
    pub fn write<S: BlockSink + ?Sized>(
        &mut self,
        sink: &mut S,
        mark: IndexMark,
        absolute: bool,
    ) -> Result<(), Error> {
        let previous = self.last;
        let (first, second) = if absolute {
            (mark.file_pointer, mark.upto as u64)
        } else if mark < previous {
            return Err(Error::IndexOrderViolation { previous, current: mark });
        } else if mark.file_pointer == previous.file_pointer {
            (0, (mark.upto - previous.upto) as u64)
        } else {
            (mark.file_pointer - previous.file_pointer, mark.upto as u64)
        };

        sink.write_var_uint(first)?;
        sink.write_var_uint(second)?;
        self.last = mark;
        Ok(())
    }
}

/// Reads marks written by a [`SkipIndexWriter`].
#[derive(Debug, Clone, Default)]
pub struct SkipIndexReader {
    last: IndexMark,
}

impl SkipIndexReader {
    /// Creates a reader whose previous mark is `(0, 0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `mark` the base for the next relative entry.
    pub fn set(&mut self, mark: IndexMark) {
        self.last = mark;
    }

    /// The most recently decoded (or set) mark.
    pub fn last(&self) -> IndexMark {
        self.last
    }

    /// Reads the next entry. `absolute` must match how it was written.
    pub fn read<S: BlockSource + ?Sized>(
        &mut self,
        source: &mut S,
        absolute: bool,
    ) -> Result<IndexMark, Error> {
        let first = source.read_var_uint()?;
        let second = source.read_var_uint()?;

        let mark = if absolute {
            IndexMark::new(first, narrow_upto(second)?)
        } else if first == 0 {
            let upto = narrow_upto(second)?
                .checked_add(self.last.upto)
                .ok_or(Error::IndexOverflow("upto"))?;
            IndexMark::new(self.last.file_pointer, upto)
        } else {
            let file_pointer = self
                .last
                .file_pointer
                .checked_add(first)
                .ok_or(Error::IndexOverflow("file pointer"))?;
            IndexMark::new(file_pointer, narrow_upto(second)?)
        };

        self.last = mark;
        Ok(mark)
    }
}

fn narrow_upto(value: u64) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::IndexOverflow("upto"))
}
