use crate::codec::check_block_size;
use crate::codec::BlockCodec;
use crate::io::BlockSink;
use crate::Error;
use crate::IndexMark;

/// Buffers values into fixed-size blocks and writes each full block through
/// a [`BlockCodec`].
///
/// A writer owns its sink and is single-writer by construction: every
/// mutating call takes `&mut self`. After any error the stream should be
/// considered unusable; the block being flushed when the error happened is
/// not retried.
///
/// [`close`](BlockWriter::close) is the only way to finish a stream. A writer
/// dropped without it, for example when an error is propagated with `?`,
/// loses its partially filled block and never calls [`BlockSink::close`];
/// the sink itself is dropped without being flushed through the trait. Call
/// `close` on every exit path that should keep the data.
#[derive(Debug)]
pub struct BlockWriter<S, C> {
    sink: S,
    codec: C,
    buffer: Vec<u32>,
    frame: Vec<u32>,
    upto: usize,
    blocks_written: u64,
}

impl<S: BlockSink, C: BlockCodec> BlockWriter<S, C> {
    /// Starts a stream on `sink` with the codec's block size, writing the
    /// stream header.
    pub fn new(mut sink: S, codec: C) -> Result<Self, Error> {
        let block_size = check_block_size(codec.block_size() as u64)?;
        sink.write_var_uint(block_size as u64)?;

        Ok(Self {
            sink,
            codec,
            buffer: vec![0; block_size],
            frame: Vec::new(),
            upto: 0,
            blocks_written: 0,
        })
    }

    /// Number of values per block.
    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    /// Byte offset at which the block currently being filled will be
    /// written.
    pub fn offset(&self) -> u64 {
        self.sink.offset()
    }

    /// Number of values in the block currently being filled.
    pub fn upto(&self) -> usize {
        self.upto
    }

    /// Number of blocks flushed so far.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// The position the next written value will land at.
    pub fn mark(&self) -> IndexMark {
        IndexMark::new(self.sink.offset(), self.upto as u32)
    }

    /// Appends `value`, flushing the block once it is full.
    pub fn write(&mut self, value: u32) -> Result<(), Error> {
        self.buffer[self.upto] = value;
        self.upto += 1;
        if self.upto == self.buffer.len() {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Flushes a partially filled last block, then closes the sink.
    ///
    /// The sink is closed even when the flush fails. In that case the flush
    /// error is returned and a close error, if any, is only logged.
    pub fn close(mut self) -> Result<S, Error> {
        let flushed = if self.upto > 0 {
            self.flush_block()
        } else {
            Ok(())
        };
        let closed = self.sink.close();

        match (flushed, closed) {
            (Ok(()), Ok(())) => Ok(self.sink),
            (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
            (Err(flush_error), Err(close_error)) => {
                tracing::warn!(
                    error = %close_error,
                    "failed to close the block sink after a failed flush"
                );
                Err(flush_error)
            }
        }
    }

    fn flush_block(&mut self) -> Result<(), Error> {
        let valid_count = std::mem::take(&mut self.upto);
        let offset = self.sink.offset();

        self.frame.clear();
        self.codec
            .compress(&mut self.buffer, valid_count, &mut self.frame)?;

        self.sink.write_fixed32(self.frame.len() as u32)?;
        for &word in &self.frame {
            self.sink.write_fixed32(word)?;
        }
        self.blocks_written += 1;

        tracing::debug!(
            offset,
            valid_count,
            frame_words = self.frame.len(),
            "flushed block"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PForDelta;
    use crate::codec::WidthPolicy;
    use crate::io::StreamSink;
    use test_case::test_case;

    /// Sink that fails every write after `budget` successful ones and
    /// records whether it was closed.
    #[derive(Debug, Default)]
    struct FailingSink {
        budget: usize,
        offset: u64,
        fail_close: bool,
        closed: bool,
    }

    impl BlockSink for FailingSink {
        fn write_fixed32(&mut self, _: u32) -> Result<(), Error> {
            self.spend(4)
        }

        fn write_var_uint(&mut self, _: u64) -> Result<(), Error> {
            self.spend(1)
        }

        fn offset(&self) -> u64 {
            self.offset
        }

        fn close(&mut self) -> Result<(), Error> {
            self.closed = true;
            if self.fail_close {
                return Err(std::io::Error::other("close failed").into());
            }
            Ok(())
        }
    }

    impl FailingSink {
        fn spend(&mut self, bytes: u64) -> Result<(), Error> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full").into());
            }
            self.budget -= 1;
            self.offset += bytes;
            Ok(())
        }
    }

    fn codec() -> PForDelta {
        PForDelta::new(32, WidthPolicy::Optimal).unwrap()
    }

    #[test]
    fn header_and_full_block_layout() {
        let mut writer = BlockWriter::new(StreamSink::new(Vec::new()), codec()).unwrap();
        assert_eq!(writer.offset(), 1);

        for i in 0..32 {
            writer.write(i % 16).unwrap();
        }
        assert_eq!(writer.blocks_written(), 1);
        assert_eq!(writer.upto(), 0);

        let bytes = writer.close().unwrap().into_inner();
        // header, frame length 6, width 4, four packed words, no exceptions
        assert_eq!(bytes[0], 32);
        assert_eq!(&bytes[1..5], &6u32.to_be_bytes());
        assert_eq!(&bytes[5..9], &4u32.to_be_bytes());
        assert_eq!(&bytes[9..13], &0x7654_3210u32.to_be_bytes());
        assert_eq!(&bytes[25..29], &0u32.to_be_bytes());
        assert_eq!(bytes.len(), 29);
    }

    #[test]
    fn marks_follow_the_block_being_filled() {
        let mut writer = BlockWriter::new(StreamSink::new(Vec::new()), codec()).unwrap();
        assert_eq!(writer.mark(), IndexMark::new(1, 0));

        for _ in 0..5 {
            writer.write(1).unwrap();
        }
        assert_eq!(writer.mark(), IndexMark::new(1, 5));

        for _ in 5..32 {
            writer.write(1).unwrap();
        }
        // width 1, one packed word: 4 + (1 + 1 + 1) * 4 bytes
        assert_eq!(writer.mark(), IndexMark::new(1 + 16, 0));
    }

    #[test]
    fn empty_stream_is_just_the_header() {
        let writer = BlockWriter::new(StreamSink::new(Vec::new()), codec_128()).unwrap();
        let sink = writer.close().unwrap();
        assert!(sink.is_closed());
        assert_eq!(sink.into_inner(), vec![0x80, 0x01]);
    }

    fn codec_128() -> PForDelta {
        PForDelta::new(128, WidthPolicy::Optimal).unwrap()
    }

    /// Codec that claims an arbitrary block size and never produces frames.
    #[derive(Debug)]
    struct ClaimedSize(usize);

    impl BlockCodec for ClaimedSize {
        fn block_size(&self) -> usize {
            self.0
        }

        fn compress(&self, _: &mut [u32], _: usize, _: &mut Vec<u32>) -> Result<(), Error> {
            Ok(())
        }

        fn decompress(&self, _: &[u32], _: &mut [u32]) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test_case(0 ; "zero")]
    #[test_case(31 ; "not a group multiple")]
    #[test_case(100 ; "ragged")]
    #[test_case(crate::MAX_BLOCK_SIZE + 32 ; "over the limit")]
    fn rejects_bad_codec_block_sizes(block_size: usize) {
        let mut sink = StreamSink::new(Vec::new());
        match BlockWriter::new(&mut sink, ClaimedSize(block_size)) {
            Err(Error::InvalidBlockSize(size)) => assert_eq!(size, block_size as u64),
            other => panic!("expected InvalidBlockSize, got {other:?}"),
        }
        assert_eq!(sink.offset(), 0, "no header may be written");
    }

    #[test]
    fn header_records_the_codec_block_size() {
        let codec = PForDelta::new(64, WidthPolicy::Optimal).unwrap();
        let writer = BlockWriter::new(StreamSink::new(Vec::new()), codec).unwrap();
        assert_eq!(writer.block_size(), 64);
        assert_eq!(writer.close().unwrap().into_inner(), vec![64]);
    }

    #[test_log::test]
    fn failed_flush_still_closes_the_sink() {
        let mut sink = FailingSink { budget: 3, ..Default::default() };
        let mut writer = BlockWriter::new(&mut sink, codec()).unwrap();
        writer.write(1).unwrap();

        let error = writer.close().unwrap_err();
        assert!(matches!(error, Error::Io(ref err) if err.to_string() == "disk full"));
        assert!(sink.closed);
    }

    #[test_log::test]
    fn flush_error_wins_over_close_error() {
        let mut sink = FailingSink {
            budget: 1,
            fail_close: true,
            ..Default::default()
        };
        let mut writer = BlockWriter::new(&mut sink, codec()).unwrap();
        writer.write(1).unwrap();

        let error = writer.close().unwrap_err();
        assert!(matches!(error, Error::Io(ref err) if err.to_string() == "disk full"));
        assert!(sink.closed);
    }

    #[test]
    fn close_error_is_reported_when_flush_succeeds() {
        let mut sink = FailingSink {
            budget: 100,
            fail_close: true,
            ..Default::default()
        };
        let writer = BlockWriter::new(&mut sink, codec()).unwrap();

        let error = writer.close().unwrap_err();
        assert!(matches!(error, Error::Io(ref err) if err.to_string() == "close failed"));
        assert!(sink.closed);
    }
}
