//! PER-unaligned length and size determinants.
//!
//! Three forms: short `0vvvvvvv` (0..=127), long `10vvvvvv vvvvvvvv`
//! (128..=16383), and fragmented `110000mm` where `mm` in 1..=4 announces
//! `mm * 16384` items followed by further chunks. Fragment chunks count
//! items: bits for BIT STRING, characters for character strings, elements
//! for SEQUENCE OF, bytes for OCTET STRING and open types.

use crate::buffer::BitBuffer;
use crate::codec::SizeConstraints;
use crate::errors::Error;

const FRAGMENT_UNIT: usize = 16384;

/// One decoded length chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Length {
    /// Final count; no further chunks follow.
    Full(usize),
    /// Fragment of this many items; another chunk follows.
    Fragment(usize),
}

/// Number of bits needed to encode an offset in `0..range`.
pub(crate) fn bits_for_range(range: u128) -> usize {
    if range <= 1 {
        return 0;
    }

    (128 - (range - 1).leading_zeros()) as usize
}

/// Writes a small (non-fragmented) length determinant. `n` must be below
/// 16384; larger counts go through [write_fragmented].
pub(crate) fn write_length_determinant(buf: &mut BitBuffer, n: usize) -> Result<(), Error> {
    if n <= 127 {
        buf.write_bit(false);
        buf.write_bits(n as u64, 7)?;
    } else if n < FRAGMENT_UNIT {
        buf.write_bit(true);
        buf.write_bit(false);
        buf.write_bits(n as u64, 14)?;
    } else {
        return Err(Error::Schema(format!(
            "length {n} out of small determinant range"
        )));
    }

    Ok(())
}

/// Reads one length chunk.
pub(crate) fn read_length_chunk(buf: &mut BitBuffer) -> Result<Length, Error> {
    if !buf.read_bit()? {
        return Ok(Length::Full(buf.read_bits(7)? as usize));
    }

    if !buf.read_bit()? {
        return Ok(Length::Full(buf.read_bits(14)? as usize));
    }

    let multiplier = buf.read_bits(6)? as usize;
    if multiplier == 0 || multiplier > 4 {
        return Err(Error::Wire(format!(
            "reserved length determinant multiplier {multiplier}"
        )));
    }

    Ok(Length::Fragment(multiplier * FRAGMENT_UNIT))
}

/// Writes `total` items framed by length determinants, fragmenting in 16K
/// units when needed. `emit(buf, start, count)` appends items
/// `[start, start + count)`.
pub(crate) fn write_fragmented<F>(buf: &mut BitBuffer, total: usize, mut emit: F) -> Result<(), Error>
where
    F: FnMut(&mut BitBuffer, usize, usize) -> Result<(), Error>,
{
    let mut start = 0;
    let mut remaining = total;

    while remaining >= FRAGMENT_UNIT {
        let multiplier = (remaining / FRAGMENT_UNIT).min(4);
        let count = multiplier * FRAGMENT_UNIT;

        buf.write_bits(0b11, 2)?;
        buf.write_bits(multiplier as u64, 6)?;
        emit(buf, start, count)?;

        start += count;
        remaining -= count;
    }

    write_length_determinant(buf, remaining)?;
    if remaining > 0 {
        emit(buf, start, remaining)?;
    }

    Ok(())
}

/// Reads length chunks until a final one, handing each count to
/// `read_chunk`. Returns the total item count.
pub(crate) fn read_fragmented<F>(buf: &mut BitBuffer, mut read_chunk: F) -> Result<usize, Error>
where
    F: FnMut(&mut BitBuffer, usize) -> Result<(), Error>,
{
    let mut total = 0;

    loop {
        match read_length_chunk(buf)? {
            Length::Fragment(count) => {
                read_chunk(buf, count)?;
                total += count;
            }
            Length::Full(count) => {
                read_chunk(buf, count)?;
                return Ok(total + count);
            }
        }
    }
}

/// Writes a normally-small non-negative integer: `0` plus 6 bits for
/// 0..=63, otherwise `1` plus a semi-constrained integer.
pub(crate) fn write_normally_small(buf: &mut BitBuffer, value: u64) -> Result<(), Error> {
    if value <= 63 {
        buf.write_bit(false);
        buf.write_bits(value, 6)?;
        return Ok(());
    }

    buf.write_bit(true);
    let bytes = min_unsigned_bytes(value);
    write_length_determinant(buf, bytes)?;
    buf.write_octets(&value.to_be_bytes()[8 - bytes..]);

    Ok(())
}

/// Reads a normally-small non-negative integer.
pub(crate) fn read_normally_small(buf: &mut BitBuffer) -> Result<u64, Error> {
    if !buf.read_bit()? {
        return buf.read_bits(6);
    }

    let bytes = match read_length_chunk(buf)? {
        Length::Full(n) => n,
        Length::Fragment(_) => {
            return Err(Error::Wire("fragmented normally-small integer".to_string()));
        }
    };

    if bytes == 0 || bytes > 8 {
        return Err(Error::Wire(format!(
            "normally-small integer with {bytes} content bytes"
        )));
    }

    let mut value = 0u64;
    for byte in buf.read_octets(bytes)? {
        value = (value << 8) | byte as u64;
    }

    Ok(value)
}

/// Minimal number of big-endian bytes for an unsigned value; at least one.
pub(crate) fn min_unsigned_bytes(value: u64) -> usize {
    ((64 - value.leading_zeros() as usize).div_ceil(8)).max(1)
}

/// Minimal number of big-endian two's-complement bytes; at least one.
pub(crate) fn min_signed_bytes(value: i64) -> usize {
    let significant = if value >= 0 {
        64 - value.leading_zeros() as usize + 1
    } else {
        64 - value.leading_ones() as usize + 1
    };

    significant.div_ceil(8).max(1)
}

/// Encodes a size determinant for `n` items under `size`, then emits the
/// items through `emit(buf, start, count)` (fragmenting when the size is
/// framed by length determinants).
pub(crate) fn encode_with_size<F>(
    buf: &mut BitBuffer,
    n: usize,
    size: &SizeConstraints,
    mut emit: F,
) -> Result<(), Error>
where
    F: FnMut(&mut BitBuffer, usize, usize) -> Result<(), Error>,
{
    if let Some(fixed) = size.fixed {
        if n == fixed {
            if size.extensible {
                buf.write_bit(false);
            }
            return emit(buf, 0, n);
        }

        if !size.extensible {
            return Err(Error::Constraint(format!("size {n} differs from fixed {fixed}")));
        }

        buf.write_bit(true);
        return write_fragmented(buf, n, emit);
    }

    let lo = size.min.unwrap_or(0);
    let hi = size.max;
    let in_range = n >= lo && hi.is_none_or(|hi| n <= hi);

    if size.extensible {
        if let Some(hi) = hi {
            if hi - lo < 65536 {
                buf.write_bit(!in_range);
                if !in_range {
                    return write_fragmented(buf, n, emit);
                }
                let bits = bits_for_range((hi - lo + 1) as u128);
                buf.write_bits((n - lo) as u64, bits)?;
                return emit(buf, 0, n);
            }
        }
    }

    if !in_range {
        return Err(Error::Constraint(format!(
            "size {n} outside {lo}..{}",
            hi.map_or("".to_string(), |h| h.to_string())
        )));
    }

    if let Some(hi) = hi {
        if hi - lo < 65536 {
            let bits = bits_for_range((hi - lo + 1) as u128);
            buf.write_bits((n - lo) as u64, bits)?;
            return emit(buf, 0, n);
        }
    }

    write_fragmented(buf, n, emit)
}

/// Decodes a size determinant under `size`, handing each chunk's item count
/// to `read_chunk`. Returns the total item count.
pub(crate) fn decode_with_size<F>(
    buf: &mut BitBuffer,
    size: &SizeConstraints,
    mut read_chunk: F,
) -> Result<usize, Error>
where
    F: FnMut(&mut BitBuffer, usize) -> Result<(), Error>,
{
    if let Some(fixed) = size.fixed {
        if size.extensible && buf.read_bit()? {
            return read_fragmented(buf, read_chunk);
        }
        read_chunk(buf, fixed)?;
        return Ok(fixed);
    }

    let lo = size.min.unwrap_or(0);
    let hi = size.max;

    if size.extensible {
        if let Some(hi) = hi {
            if hi - lo < 65536 && buf.read_bit()? {
                return read_fragmented(buf, read_chunk);
            }
        }
    }

    if let Some(hi) = hi {
        if hi - lo < 65536 {
            let bits = bits_for_range((hi - lo + 1) as u128);
            let offset = buf.read_bits(bits)? as usize;
            if offset > hi - lo {
                return Err(Error::Wire(format!(
                    "size offset {offset} beyond range {lo}..{hi}"
                )));
            }
            read_chunk(buf, lo + offset)?;
            return Ok(lo + offset);
        }
    }

    let total = read_fragmented(buf, read_chunk)?;
    if total < lo || hi.is_some_and(|hi| total > hi) {
        return Err(Error::Wire(format!("size {total} outside declared bounds")));
    }

    Ok(total)
}
