//! # Fixed-Width Bit Packing
//!
//! Values are laid out back to back at `b` bits each: value `i` occupies bits
//! `[i * b, (i + 1) * b)` of the packed stream, where bit `k` of the stream is
//! bit `k % 32` of word `k / 32`. A run of 32 values at width `b` fills
//! exactly `b` words, so packing always works on whole groups of 32.
//!
//! ## Unpacking
//!
//! Unpacking sits on the query path, so there is one routine per supported
//! width instead of a generic bit reader. Each routine is `unpack_width::<B>`
//! with the 32 lanes of a group written out by a macro: for a literal lane
//! `i` and a const `B`, the word index `(i * B) >> 5`, the shift
//! `(i * B) & 31` and whether the lane straddles two words are all constants,
//! so the per-lane code is a load, one or two shifts, an OR and a mask.
//!
//! Routines are looked up through a table indexed by bit width; widths
//! outside [`SUPPORTED_WIDTHS`](super::SUPPORTED_WIDTHS) have no entry and
//! are reported as [`Error::UnsupportedBitWidth`].

use super::BitWidth;
use super::FrameError;
use super::GROUP_SIZE;
use super::MASKS;
use crate::Error;

/// Signature of a width-specialized unpack routine. `packed` holds exactly
/// `out.len() / 32 * b` words.
pub type UnpackFn = fn(packed: &[u32], out: &mut [u32]);

/// Extracts lane `i` of a group packed at width `B`.
#[inline(always)]
fn lane<const B: usize>(group: &[u32], i: usize) -> u32 {
    let bit = i * B;
    let word = bit >> 5;
    let skip = bit & 31;

    let low = group[word] >> skip;
    if skip + B > 32 {
        (low | (group[word + 1] << (32 - skip))) & MASKS[B]
    } else {
        low & MASKS[B]
    }
}

macro_rules! unpack_lanes {
    ($width:ident, $group:ident, $out:ident; $($lane:literal)+) => {
        $( $out[$lane] = lane::<$width>($group, $lane); )+
    };
}

/// Unpacks every group of 32 values at the compile-time width `B`.
fn unpack_width<const B: usize>(packed: &[u32], out: &mut [u32]) {
    let groups = out.len() / GROUP_SIZE;
    for g in 0..groups {
        let group = &packed[g * B..g * B + B];
        let out = &mut out[g * GROUP_SIZE..g * GROUP_SIZE + GROUP_SIZE];
        unpack_lanes!(B, group, out;
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31);
    }
}

macro_rules! unpack_table {
    ($($width:literal)+) => {{
        let mut table: [Option<UnpackFn>; 33] = [None; 33];
        $( table[$width] = Some(unpack_width::<$width> as UnpackFn); )+
        table
    }};
}

/// Width-indexed dispatch table. Entries exist exactly for the supported
/// widths.
static UNPACKERS: [Option<UnpackFn>; 33] =
    unpack_table!(1 2 3 4 5 6 7 8 9 10 11 12 13 16 20 32);

/// Looks up the specialized unpack routine for `bits`.
pub fn unpacker(bits: u32) -> Result<UnpackFn, Error> {
    UNPACKERS
        .get(bits as usize)
        .copied()
        .flatten()
        .ok_or(Error::UnsupportedBitWidth(bits))
}

/// Packs `values` at `width`, returning `values.len() / 32 * b` words.
///
/// Bits of a value above `width` are dropped; callers that care record such
/// values elsewhere.
pub fn pack(values: &[u32], width: BitWidth) -> Result<Vec<u32>, Error> {
    check_group_multiple(values.len())?;
    let mut packed = vec![0; width.packed_words(values.len())];
    pack_into(values, width, &mut packed)?;
    Ok(packed)
}

/// Packs `values` at `width` into `packed`, which must hold exactly
/// `values.len() / 32 * b` words. `packed` is fully overwritten.
pub fn pack_into(values: &[u32], width: BitWidth, packed: &mut [u32]) -> Result<(), Error> {
    check_group_multiple(values.len())?;
    check_packed_len(values.len(), width, packed.len())?;

    let bits = width.bits() as usize;
    let mask = width.mask();
    packed.fill(0);

    for (i, &value) in values.iter().enumerate() {
        let value = value & mask;
        let bit = i * bits;
        let word = bit >> 5;
        let skip = bit & 31;

        packed[word] |= value << skip;
        if skip + bits > 32 {
            packed[word + 1] |= value >> (32 - skip);
        }
    }

    Ok(())
}

/// Unpacks `out.len()` values at `width` from `packed`.
///
/// Nothing is written to `out` unless the lengths check out.
pub fn unpack(packed: &[u32], width: BitWidth, out: &mut [u32]) -> Result<(), Error> {
    let routine = unpacker(width.bits())?;
    check_group_multiple(out.len())?;
    check_packed_len(out.len(), width, packed.len())?;
    routine(packed, out);
    Ok(())
}

fn check_group_multiple(len: usize) -> Result<(), Error> {
    if len % GROUP_SIZE != 0 {
        return Err(Error::InvalidBlockSize(len as u64));
    }
    Ok(())
}

fn check_packed_len(len: usize, width: BitWidth, actual: usize) -> Result<(), Error> {
    let expected = width.packed_words(len);
    if actual != expected {
        return Err(FrameError::PackedLength {
            len,
            bits: width.bits(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}
