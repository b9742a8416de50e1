//! Bit-level primitives for PER-unaligned (UPER) encoding.
//!
//! UPER packs a SEQUENCE as a preamble of presence bits for its OPTIONAL
//! fields followed by the fields themselves; a constrained whole number
//! `INTEGER (lo..hi)` occupies exactly enough bits for `hi - lo`. These two
//! operations, plus small length determinants for bounded SEQUENCE OF, are
//! all the DENM schema subset needs.

use thiserror::Error;

/// Errors that can occur while reading a UPER bit stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UperError {
    /// The stream ended before the requested number of bits.
    #[error("unexpected end of input: wanted {wanted} bits, {remaining} left")]
    UnexpectedEnd {
        /// Number of bits the caller asked for.
        wanted: usize,
        /// Number of bits remaining in the stream.
        remaining: usize,
    },
    /// A decoded value fell outside its constrained range.
    #[error("value {value} outside constrained range {lo}..={hi}")]
    OutOfRange {
        /// Decoded raw value.
        value: i64,
        /// Lower bound of the constraint.
        lo: i64,
        /// Upper bound of the constraint.
        hi: i64,
    },
}

/// Number of bits needed for a constrained range with `count` values.
#[must_use]
pub const fn bits_for_range(count: u64) -> u32 {
    if count <= 1 {
        0
    } else {
        u64::BITS - (count - 1).leading_zeros()
    }
}

/// Append-only bit writer producing a left-aligned, zero-padded byte vector.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Number of valid bits in `buf`.
    len: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.len
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        let byte = self.len / 8;
        if byte == self.buf.len() {
            self.buf.push(0);
        }
        if bit {
            self.buf[byte] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Writes the low `bits` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, bits: u32) {
        debug_assert!(bits <= 64);
        for i in (0..bits).rev() {
            self.write_bit(value >> i & 1 == 1);
        }
    }

    /// Writes a constrained whole number `INTEGER (lo..hi)`.
    ///
    /// The caller must have validated `lo <= value <= hi`; the offset from
    /// `lo` is written in the minimal bit width for the range.
    #[allow(clippy::cast_sign_loss)]
    pub fn write_constrained(&mut self, value: i64, lo: i64, hi: i64) {
        debug_assert!(lo <= value && value <= hi);
        let count = (hi - lo) as u64 + 1;
        self.write_bits((value - lo) as u64, bits_for_range(count));
    }

    /// Finishes the stream, padding the final byte with zero bits.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reader over a UPER bit stream.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over the given bytes.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of unread bits (including any final-byte padding).
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    /// Reads a single bit.
    ///
    /// # Errors
    ///
    /// Returns [`UperError::UnexpectedEnd`] at end of stream.
    pub fn read_bit(&mut self) -> Result<bool, UperError> {
        if self.remaining() == 0 {
            return Err(UperError::UnexpectedEnd {
                wanted: 1,
                remaining: 0,
            });
        }
        let bit = self.data[self.pos / 8] & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads `bits` bits, most significant first.
    ///
    /// # Errors
    ///
    /// Returns [`UperError::UnexpectedEnd`] if fewer bits remain.
    pub fn read_bits(&mut self, bits: u32) -> Result<u64, UperError> {
        debug_assert!(bits <= 64);
        if self.remaining() < bits as usize {
            return Err(UperError::UnexpectedEnd {
                wanted: bits as usize,
                remaining: self.remaining(),
            });
        }
        let mut value = 0u64;
        for _ in 0..bits {
            value = value << 1 | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Reads a constrained whole number `INTEGER (lo..hi)`.
    ///
    /// # Errors
    ///
    /// Returns [`UperError::UnexpectedEnd`] on truncation and
    /// [`UperError::OutOfRange`] when the decoded offset exceeds the range.
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_constrained(&mut self, lo: i64, hi: i64) -> Result<i64, UperError> {
        let count = (hi - lo) as u64 + 1;
        let offset = self.read_bits(bits_for_range(count))?;
        let value = lo + offset as i64;
        if value > hi {
            return Err(UperError::OutOfRange { value, lo, hi });
        }
        Ok(value)
    }
}
