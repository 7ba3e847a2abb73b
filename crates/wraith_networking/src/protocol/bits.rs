//! # Bit Stream
//!
//! LSB-first bit writer and reader bounded by the packet budget.
//!
//! Values are accumulated in a 64-bit scratch word and flushed a byte at a
//! time, so writes of up to 32 bits never straddle more than the scratch.

use crate::error::{NetError, NetResult};

/// Bit writer with a hard size limit.
pub struct BitWriter {
    buffer: Vec<u8>,
    scratch: u64,
    scratch_bits: usize,
    max_bytes: usize,
}

impl BitWriter {
    /// Creates a writer that refuses to grow past `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_bytes.min(256)),
            scratch: 0,
            scratch_bits: 0,
            max_bytes,
        }
    }

    /// Bits written so far.
    #[inline]
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.buffer.len() * 8 + self.scratch_bits
    }

    /// Bytes the output will occupy (rounded up).
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        (self.bit_len() + 7) / 8
    }

    /// Writes the low `bits` bits of `value`.
    pub fn write_bits(&mut self, value: u32, bits: u8) -> NetResult<()> {
        debug_assert!(bits <= 32);
        if bits == 0 {
            return Ok(());
        }

        let available = self.max_bytes * 8 - self.bit_len().min(self.max_bytes * 8);
        if usize::from(bits) > available {
            return Err(NetError::PacketOverflow {
                requested: usize::from(bits),
                available,
            });
        }

        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        self.scratch |= u64::from(value & mask) << self.scratch_bits;
        self.scratch_bits += usize::from(bits);

        while self.scratch_bits >= 8 {
            self.buffer.push((self.scratch & 0xFF) as u8);
            self.scratch >>= 8;
            self.scratch_bits -= 8;
        }
        Ok(())
    }

    /// Writes a boolean (1 bit).
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> NetResult<()> {
        self.write_bits(u32::from(value), 1)
    }

    /// Writes a full byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> NetResult<()> {
        self.write_bits(u32::from(value), 8)
    }

    /// Writes a full 32-bit word.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> NetResult<()> {
        self.write_bits(value, 32)
    }

    /// Drops everything written after the first `bit_len` bits.
    pub fn rewind(&mut self, bit_len: usize) {
        if bit_len >= self.bit_len() {
            return;
        }
        let bytes = bit_len / 8;
        let bits = bit_len % 8;
        let partial = match self.buffer.get(bytes) {
            Some(&byte) => u64::from(byte),
            None => self.scratch,
        };
        self.buffer.truncate(bytes);
        self.scratch = partial & ((1 << bits) - 1);
        self.scratch_bits = bits;
    }

    /// Appends the first `bit_len` bits of `bytes`, as produced by another
    /// writer's [`BitWriter::finish`].
    pub fn write_stream(&mut self, bytes: &[u8], bit_len: usize) -> NetResult<()> {
        let whole = (bit_len / 8).min(bytes.len());
        for &byte in &bytes[..whole] {
            self.write_u8(byte)?;
        }
        #[allow(clippy::cast_possible_truncation)]
        let tail = (bit_len % 8) as u8;
        if tail > 0 {
            let byte = bytes.get(whole).copied().unwrap_or(0);
            self.write_bits(u32::from(byte), tail)?;
        }
        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align(&mut self) -> NetResult<()> {
        #[allow(clippy::cast_possible_truncation)]
        let pad = ((8 - self.scratch_bits % 8) % 8) as u8;
        self.write_bits(0, pad)
    }

    /// Flushes the trailing partial byte and returns the packet.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.scratch_bits > 0 {
            self.buffer.push((self.scratch & 0xFF) as u8);
        }
        self.buffer
    }
}

/// Bit reader over a received packet.
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader at bit 0.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bits remaining, including trailing padding.
    #[inline]
    #[must_use]
    pub const fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// Reads `bits` bits as an unsigned value.
    pub fn read_bits(&mut self, bits: u8) -> NetResult<u32> {
        debug_assert!(bits <= 32);
        let wanted = usize::from(bits);
        if wanted > self.remaining_bits() {
            return Err(NetError::Truncated {
                requested: wanted,
                available: self.remaining_bits(),
            });
        }

        let mut value = 0u64;
        let mut read = 0usize;
        while read < wanted {
            let byte = self.data[self.position / 8];
            let offset = self.position % 8;
            let take = (8 - offset).min(wanted - read);
            let chunk = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            value |= chunk << read;
            read += take;
            self.position += take;
        }
        #[allow(clippy::cast_possible_truncation)]
        let value = value as u32;
        Ok(value)
    }

    /// Reads one bit.
    #[inline]
    pub fn read_bool(&mut self) -> NetResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads a full byte.
    #[inline]
    pub fn read_u8(&mut self) -> NetResult<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let byte = self.read_bits(8)? as u8;
        Ok(byte)
    }

    /// Reads a full 32-bit word.
    #[inline]
    pub fn read_u32(&mut self) -> NetResult<u32> {
        self.read_bits(32)
    }

    /// Skips to the next byte boundary.
    pub fn align(&mut self) {
        self.position = (self.position + 7) / 8 * 8;
        self.position = self.position.min(self.data.len() * 8);
    }
}
