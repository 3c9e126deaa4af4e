use crate::codec::check_block_size;
use crate::codec::BlockCodec;
use crate::codec::FrameError;
use crate::io::BlockSource;
use crate::Error;
use crate::IndexMark;

/// Reads blocks from a stream written by a
/// [`BlockWriter`](super::BlockWriter).
///
/// Besides whole-block access the reader keeps an element cursor: after
/// [`seek`](BlockReader::seek) to an [`IndexMark`],
/// [`next_value`](BlockReader::next_value) walks the stream one element at a
/// time, decoding each block as it is reached.
#[derive(Debug)]
pub struct BlockReader<S, C> {
    source: S,
    codec: C,
    frame: Vec<u32>,
    block: Vec<u32>,
    /// Stream offset of the block held in `block`
    block_offset: Option<u64>,
    /// Stream offset of the block after it
    next_offset: u64,
    pos: usize,
}

impl<S: BlockSource, C: BlockCodec> BlockReader<S, C> {
    /// Reads and validates the stream header. The first block is expected
    /// right after it.
    ///
    /// The header's block size must be the codec's.
    pub fn open(mut source: S, codec: C) -> Result<Self, Error> {
        let block_size = check_block_size(source.read_var_uint()?)?;
        if block_size != codec.block_size() {
            return Err(Error::BlockSizeMismatch {
                stream: block_size,
                codec: codec.block_size(),
            });
        }
        let next_offset = source.offset();

        Ok(Self {
            source,
            codec,
            frame: Vec::new(),
            block: vec![0; block_size],
            block_offset: None,
            next_offset,
            pos: block_size,
        })
    }

    /// Number of values per block, as recorded in the stream header.
    pub fn block_size(&self) -> usize {
        self.block.len()
    }

    /// Reads the raw frame of the block at `offset` without decoding it.
    pub fn read_frame_at(&mut self, offset: u64) -> Result<&[u32], Error> {
        self.load_frame(offset)
            .map_err(|error| error.at_offset(offset))?;
        Ok(&self.frame)
    }

    /// Decodes the block at `offset`.
    pub fn read_block_at(&mut self, offset: u64) -> Result<&[u32], Error> {
        self.load_block(offset)?;
        Ok(&self.block)
    }

    /// Decodes the block following the last one read, or returns `None` at
    /// the end of the stream.
    ///
    /// The returned block counts as consumed by the element cursor.
    pub fn read_next_block(&mut self) -> Result<Option<&[u32]>, Error> {
        if self.next_offset >= self.source.stream_len() {
            return Ok(None);
        }
        self.load_block(self.next_offset)?;
        self.pos = self.block.len();
        Ok(Some(&self.block))
    }

    /// Positions the element cursor at `mark`, decoding its block unless it
    /// is already loaded.
    pub fn seek(&mut self, mark: IndexMark) -> Result<(), Error> {
        let upto = mark.upto as usize;
        if upto > self.block.len() {
            return Err(Error::IndexOverflow("upto"));
        }
        if self.block_offset != Some(mark.file_pointer) {
            self.load_block(mark.file_pointer)?;
        }
        self.pos = upto;
        Ok(())
    }

    /// Returns the element under the cursor and advances it.
    pub fn next_value(&mut self) -> Result<u32, Error> {
        if self.pos == self.block.len() {
            self.load_block(self.next_offset)?;
        }
        let value = self.block[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Unwraps the source.
    pub fn into_inner(self) -> S {
        self.source
    }

    fn load_block(&mut self, offset: u64) -> Result<(), Error> {
        self.load_frame(offset)
            .and_then(|()| self.codec.decompress(&self.frame, &mut self.block))
            .map_err(|error| error.at_offset(offset))?;

        self.block_offset = Some(offset);
        self.next_offset = self.source.offset();
        self.pos = 0;

        tracing::trace!(offset, frame_words = self.frame.len(), "decoded block");
        Ok(())
    }

    fn load_frame(&mut self, offset: u64) -> Result<(), Error> {
        self.source.seek(offset)?;
        let remaining = self.source.remaining();
        if remaining < 4 {
            return Err(FrameError::LengthWord { remaining }.into());
        }
        let words = u64::from(self.source.read_fixed32()?);
        let needed = words * 4;
        let remaining = self.source.remaining();
        if needed > remaining {
            return Err(FrameError::PastEndOfStream { words, needed, remaining }.into());
        }

        self.frame.clear();
        self.frame.reserve(words as usize);
        for _ in 0..words {
            self.frame.push(self.source.read_fixed32()?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockWriter;
    use crate::codec::PForDelta;
    use crate::codec::WidthPolicy;
    use crate::io::StreamSink;
    use crate::io::StreamSource;
    use std::io::Cursor;

    fn codec() -> PForDelta {
        PForDelta::new(32, WidthPolicy::Optimal).unwrap()
    }

    fn stream(values: &[u32]) -> Vec<u8> {
        let mut writer = BlockWriter::new(StreamSink::new(Vec::new()), codec()).unwrap();
        for &value in values {
            writer.write(value).unwrap();
        }
        writer.close().unwrap().into_inner()
    }

    fn open(bytes: Vec<u8>) -> BlockReader<StreamSource<Cursor<Vec<u8>>>, PForDelta> {
        BlockReader::open(StreamSource::new(Cursor::new(bytes)).unwrap(), codec()).unwrap()
    }

    #[test]
    fn header_block_size_is_validated() {
        let source = StreamSource::new(Cursor::new(vec![33u8])).unwrap();
        assert!(matches!(
            BlockReader::open(source, codec()),
            Err(Error::InvalidBlockSize(33))
        ));
    }

    #[test]
    fn reads_blocks_by_offset() {
        let values: Vec<u32> = (0..64).map(|i| i * 1000).collect();
        let bytes = stream(&values);

        let mut reader = open(bytes);
        assert_eq!(reader.block_size(), 32);
        let first = reader.read_next_block().unwrap().unwrap().to_vec();
        let second_offset = reader.next_offset;
        let second = reader.read_next_block().unwrap().unwrap().to_vec();
        assert!(reader.read_next_block().unwrap().is_none());

        assert_eq!(first, &values[..32]);
        assert_eq!(second, &values[32..]);
        assert_eq!(reader.read_block_at(1).unwrap(), &values[..32]);
        assert_eq!(reader.read_block_at(second_offset).unwrap(), &values[32..]);
    }

    #[test]
    fn raw_frames_are_available_for_inspection() {
        let bytes = stream(&[3; 32]);
        let mut reader = open(bytes);
        // width 2, two packed words, no exceptions
        assert_eq!(
            reader.read_frame_at(1).unwrap(),
            &[2, 0xffff_ffff, 0xffff_ffff, 0]
        );
    }

    #[test]
    fn frame_longer_than_the_stream_is_malformed() {
        let mut bytes = stream(&[1; 32]);
        bytes[1..5].copy_from_slice(&1000u32.to_be_bytes());

        let mut reader = open(bytes);
        match reader.read_next_block() {
            Err(Error::MalformedFrame {
                offset: Some(1),
                source: FrameError::PastEndOfStream { words: 1000, needed: 4000, .. },
            }) => {}
            other => panic!("expected PastEndOfStream, got {other:?}"),
        }
    }

    #[test]
    fn frame_content_errors_carry_the_block_offset() {
        let mut bytes = stream(&[1; 32]);
        // Claim one exception with no pair words behind it.
        let count_at = bytes.len() - 4;
        bytes[count_at..].copy_from_slice(&1u32.to_be_bytes());

        let mut reader = open(bytes);
        match reader.read_next_block() {
            Err(Error::MalformedFrame { offset: Some(1), .. }) => {}
            other => panic!("expected MalformedFrame at offset 1, got {other:?}"),
        }
    }

    #[test]
    fn failed_decode_keeps_the_loaded_block() {
        let values: Vec<u32> = (0..32).collect();
        let mut bytes = stream(&values);
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 14, 0, 0, 0, 0]);
        // header, length word, width 5 with five packed words and no exceptions
        assert_eq!(bytes.len(), 1 + 4 + 7 * 4 + 12);

        let mut reader = open(bytes);
        reader.seek(IndexMark::new(1, 30)).unwrap();
        assert_eq!(reader.next_value().unwrap(), 30);
        assert_eq!(reader.next_value().unwrap(), 31);
        match reader.next_value() {
            Err(Error::MalformedFrame {
                offset: Some(offset),
                source: FrameError::Width { bits: 14 },
            }) => assert_eq!(offset, 33),
            other => panic!("expected a malformed width, got {other:?}"),
        }

        reader.seek(IndexMark::new(1, 5)).unwrap();
        assert_eq!(reader.next_value().unwrap(), 5);
    }

    #[test]
    fn seeking_past_the_block_is_an_overflow() {
        let mut reader = open(stream(&[0; 32]));
        assert!(matches!(
            reader.seek(IndexMark::new(1, 33)),
            Err(Error::IndexOverflow("upto"))
        ));
    }

    #[test]
    fn reading_past_the_end_is_malformed() {
        let mut reader = open(stream(&[7; 32]));
        reader.seek(IndexMark::new(1, 31)).unwrap();
        assert_eq!(reader.next_value().unwrap(), 7);
        match reader.next_value() {
            Err(Error::MalformedFrame {
                offset: Some(offset),
                source: FrameError::LengthWord { remaining: 0 },
            }) => assert_eq!(offset, reader.source.stream_len()),
            other => panic!("expected a missing length word, got {other:?}"),
        }
    }

    #[test]
    fn truncated_length_word_carries_the_block_offset() {
        let mut bytes = stream(&[7; 32]);
        let tail = bytes.len() as u64;
        bytes.extend_from_slice(&[0, 0]);

        let mut reader = open(bytes);
        assert!(reader.read_next_block().unwrap().is_some());
        match reader.read_next_block() {
            Err(Error::MalformedFrame {
                offset: Some(offset),
                source: FrameError::LengthWord { remaining: 2 },
            }) => assert_eq!(offset, tail),
            other => panic!("expected a truncated length word, got {other:?}"),
        }
    }

    #[test]
    fn codec_must_match_the_header_block_size() {
        let wide_codec = PForDelta::new(64, WidthPolicy::Optimal).unwrap();
        let mut writer = BlockWriter::new(StreamSink::new(Vec::new()), wide_codec).unwrap();
        writer.write(1).unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let source = StreamSource::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            BlockReader::open(source, codec()),
            Err(Error::BlockSizeMismatch { stream: 64, codec: 32 })
        ));
    }
}
