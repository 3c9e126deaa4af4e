//! # LEB128 Variable-Length Unsigned Integers
//!
//! The block stream header and every skip index entry are written as LEB128
//! integers: seven value bits per byte, least significant group first, with
//! the high bit (`0x80`) set on every byte except the last.
//!
//! Index entries are dominated by small deltas (`0` for a mark that stays in
//! the same block, a handful of bytes for block transitions), so most of them
//! take a single byte per field.
//!
//! For example, decimal 300 encodes as `[0xAC, 0x02]`.

use std::io;
use std::io::Read;
use std::io::Write;

/// Maximum number of bytes of a LEB128 encoded u64.
pub const MAX_BYTES: usize = 10;

/// Number of value bits carried by each byte.
const BITS_PER_BYTE: u32 = 7;

/// Mask of the value bits of a byte.
const LOWER_BITS_MASK: u8 = 0x7F;

/// Set on every byte that is followed by another byte of the same value.
const CONTINUATION_FLAG: u8 = 0x80;

/// Errors from decoding a LEB128 byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input ended while the continuation bit was still set.
    #[error("incomplete LEB128 sequence")]
    IncompleteSequence,

    /// The tenth byte had its continuation bit set.
    #[error("invalid LEB128 continuation pattern")]
    InvalidContinuation,

    /// The encoded value does not fit in 64 bits.
    #[error("attempted to decode a value exceeding {} bits", u64::BITS)]
    ValueOutOfBounds,
}

/// Stateless LEB128 encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct Leb128;

impl Leb128 {
    /// Encodes `value` into the front of `bytes` and returns the number of
    /// bytes used.
    pub fn encode(mut value: u64, bytes: &mut [u8; MAX_BYTES]) -> usize {
        let mut len = 0;
        loop {
            let mut byte = (value & LOWER_BITS_MASK as u64) as u8;
            value >>= BITS_PER_BYTE;
            if value != 0 {
                byte |= CONTINUATION_FLAG;
            }
            bytes[len] = byte;
            len += 1;
            if value == 0 {
                return len;
            }
        }
    }

    /// Number of bytes `value` occupies once encoded.
    pub fn encoded_len(value: u64) -> usize {
        let significant = u64::BITS - value.leading_zeros();
        (significant.max(1)).div_ceil(BITS_PER_BYTE) as usize
    }
}

/// Incremental decoder, fed one byte at a time.
#[derive(Debug, Default)]
struct Decoder {
    value: u64,
    position: usize,
}

impl Decoder {
    /// Consumes the next byte. Returns the value once its final byte has
    /// been seen.
    fn push(&mut self, byte: u8) -> Result<Option<u64>, Error> {
        let bits = (byte & LOWER_BITS_MASK) as u64;

        // The tenth byte may only contribute the 64th bit.
        if self.position == MAX_BYTES - 1 {
            if bits > 0x01 {
                return Err(Error::ValueOutOfBounds);
            }
            if byte & CONTINUATION_FLAG != 0 {
                return Err(Error::InvalidContinuation);
            }
        }

        self.value |= bits << (self.position as u32 * BITS_PER_BYTE);
        self.position += 1;

        if byte & CONTINUATION_FLAG == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}

/// Writes LEB128 values to a byte writer.
pub trait WriteLeb128 {
    /// Writes `value` and returns the number of bytes written.
    fn write_leb128(&mut self, value: u64) -> io::Result<usize>;
}

impl<W: Write + ?Sized> WriteLeb128 for W {
    fn write_leb128(&mut self, value: u64) -> io::Result<usize> {
        let mut bytes = [0u8; MAX_BYTES];
        let len = Leb128::encode(value, &mut bytes);
        self.write_all(&bytes[..len])?;
        Ok(len)
    }
}

/// Reads LEB128 values from a byte reader.
pub trait ReadLeb128 {
    /// Reads one value, returning it with the number of bytes consumed.
    ///
    /// End of input before the first byte is reported as an
    /// [`io::ErrorKind::UnexpectedEof`] error; end of input inside a value
    /// is [`Error::IncompleteSequence`].
    fn read_leb128(&mut self) -> Result<(u64, usize), crate::Error>;
}

impl<R: Read + ?Sized> ReadLeb128 for R {
    fn read_leb128(&mut self) -> Result<(u64, usize), crate::Error> {
        let mut decoder = Decoder::default();
        let mut byte = [0u8; 1];
        let mut consumed = 0;

        loop {
            match self.read_exact(&mut byte) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && consumed > 0 => {
                    return Err(Error::IncompleteSequence.into());
                }
                Err(err) => return Err(err.into()),
            }
            consumed += 1;

            if let Some(value) = decoder.push(byte[0])? {
                return Ok((value, consumed));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    #[test_case(0, &[0x00] ; "zero")]
    #[test_case(127, &[0x7F] ; "largest single byte")]
    #[test_case(128, &[0x80, 0x01] ; "smallest two bytes")]
    #[test_case(300, &[0xAC, 0x02] ; "medium value")]
    #[test_case(u32::MAX as u64, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F] ; "u32 max")]
    #[test_case(u64::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01] ; "u64 max")]
    fn encodes_expected_bytes(value: u64, expected: &[u8]) {
        let mut bytes = [0u8; MAX_BYTES];
        let len = Leb128::encode(value, &mut bytes);
        assert_eq!(&bytes[..len], expected);
        assert_eq!(Leb128::encoded_len(value), expected.len());
    }

    #[test_case(&[0xAC, 0x02] => Ok((300, 2)) ; "medium value")]
    #[test_case(&[0x7F, 0x00] => Ok((127, 1)) ; "trailing bytes are left alone")]
    #[test_case(&[0x80, 0x80, 0x01] => Ok((16384, 3)) ; "three byte value")]
    #[test_case(&[0x80] => Err(Error::IncompleteSequence) ; "dangling continuation")]
    #[test_case(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02] => Err(Error::ValueOutOfBounds) ; "bit 65 set")]
    #[test_case(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x81] => Err(Error::InvalidContinuation) ; "continuation at tenth byte")]
    fn decodes(bytes: &[u8]) -> Result<(u64, usize), Error> {
        match Cursor::new(bytes).read_leb128() {
            Ok(decoded) => Ok(decoded),
            Err(crate::Error::Leb128(error)) => Err(error),
            Err(error) => panic!("unexpected error: {error}"),
        }
    }

    #[test]
    fn reader_round_trip_tracks_position() {
        let mut buffer = Vec::new();
        for value in [1u64, 128, 255, 0, 1 << 40] {
            buffer.write_leb128(value).unwrap();
        }

        let mut cursor = Cursor::new(buffer.as_slice());
        assert_eq!(cursor.read_leb128().unwrap(), (1, 1));
        assert_eq!(cursor.read_leb128().unwrap(), (128, 2));
        assert_eq!(cursor.read_leb128().unwrap(), (255, 2));
        assert_eq!(cursor.read_leb128().unwrap(), (0, 1));
        assert_eq!(cursor.read_leb128().unwrap(), (1 << 40, 6));
        assert_eq!(cursor.position(), buffer.len() as u64);
    }

    #[test]
    fn reader_distinguishes_eof_from_truncation() {
        let mut empty = Cursor::new(&[][..]);
        match empty.read_leb128() {
            Err(crate::Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected an io error, got {other:?}"),
        }

        let mut truncated = Cursor::new(&[0x80, 0x80][..]);
        match truncated.read_leb128() {
            Err(crate::Error::Leb128(Error::IncompleteSequence)) => {}
            other => panic!("expected IncompleteSequence, got {other:?}"),
        }
    }
}
