//! # Numeric Compression Model
//!
//! Variable-length integer encoding that favours small magnitudes.
//!
//! ## Layout
//!
//! ```text
//! value ──► bucket i (offset_i <= value < offset_i + 2^bits_i)
//!
//! wire:  [ prefix code of bucket i ][ value - offset_i : bits_i raw bits ]
//! ```
//!
//! Prefix codes are canonical Huffman codes built from a bucket frequency
//! table. The default table is static; [`CompressionModel::from_frequencies`]
//! builds a model from observed traffic.
//!
//! **CRITICAL:** encoder and decoder must hold bit-identical models. A
//! mismatch is undetectable on the wire and silently decodes garbage, so
//! the model is a build-time contract checked with [`CompressionModel::fingerprint`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use super::bits::{BitReader, BitWriter};
use crate::error::{NetError, NetResult};

/// Number of magnitude buckets.
pub const BUCKET_COUNT: usize = 16;

/// Longest prefix code a 16-symbol Huffman tree can produce.
const MAX_CODE_LENGTH: usize = BUCKET_COUNT - 1;

/// Raw bits carried after each bucket's prefix.
const BUCKET_BITS: [u8; BUCKET_COUNT] = [0, 0, 1, 2, 3, 4, 6, 8, 10, 12, 15, 18, 21, 24, 27, 32];

/// Bucket frequencies for the static model, skewed to small deltas.
const DEFAULT_FREQUENCIES: [u32; BUCKET_COUNT] =
    [400, 220, 160, 120, 90, 70, 50, 36, 24, 16, 10, 6, 4, 2, 1, 1];

const FINGERPRINT_KEYS: (u64, u64) = (0x5752_4149_5448_0001, 0x4748_4f53_5450_524f);

/// Shared numeric compression model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionModel {
    offsets: [u32; BUCKET_COUNT],
    code_lengths: [u8; BUCKET_COUNT],
    /// Codes bit-reversed so they can be written LSB-first.
    reversed_codes: [u32; BUCKET_COUNT],
    /// Canonical decode tables, indexed by code length.
    first_code: [u32; MAX_CODE_LENGTH + 1],
    length_count: [u32; MAX_CODE_LENGTH + 1],
    first_index: [u32; MAX_CODE_LENGTH + 1],
    sorted_buckets: [u8; BUCKET_COUNT],
}

impl CompressionModel {
    /// Builds a model from bucket frequencies.
    ///
    /// Zero counts are treated as one so every bucket stays encodable.
    #[must_use]
    pub fn from_frequencies(frequencies: &[u32; BUCKET_COUNT]) -> Self {
        let code_lengths = huffman_lengths(frequencies);

        let mut offsets = [0u32; BUCKET_COUNT];
        let mut next = 0u64;
        for (offset, bits) in offsets.iter_mut().zip(BUCKET_BITS) {
            #[allow(clippy::cast_possible_truncation)]
            let start = next.min(u64::from(u32::MAX)) as u32;
            *offset = start;
            next += 1u64 << bits;
        }

        let mut sorted_buckets = [0u8; BUCKET_COUNT];
        let mut order: Vec<usize> = (0..BUCKET_COUNT).collect();
        order.sort_by_key(|&i| (code_lengths[i], i));
        for (slot, bucket) in sorted_buckets.iter_mut().zip(&order) {
            #[allow(clippy::cast_possible_truncation)]
            let bucket = *bucket as u8;
            *slot = bucket;
        }

        let mut length_count = [0u32; MAX_CODE_LENGTH + 1];
        for &len in &code_lengths {
            length_count[usize::from(len)] += 1;
        }

        let mut first_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut first_index = [0u32; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            code = (code + length_count[len - 1]) << 1;
            first_code[len] = code;
            first_index[len] = index;
            index += length_count[len];
        }

        let mut reversed_codes = [0u32; BUCKET_COUNT];
        let mut next_code = first_code;
        for &bucket in &sorted_buckets {
            let bucket = usize::from(bucket);
            let len = usize::from(code_lengths[bucket]);
            let code = next_code[len];
            next_code[len] += 1;
            reversed_codes[bucket] = code.reverse_bits() >> (32 - len);
        }

        Self {
            offsets,
            code_lengths,
            reversed_codes,
            first_code,
            length_count,
            first_index,
            sorted_buckets,
        }
    }

    /// Prefix code length of each bucket.
    #[must_use]
    pub const fn code_lengths(&self) -> &[u8; BUCKET_COUNT] {
        &self.code_lengths
    }

    /// Stable 64-bit fingerprint of the model.
    ///
    /// Two models encode identically iff their fingerprints match.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(FINGERPRINT_KEYS.0, FINGERPRINT_KEYS.1);
        hasher.write(&BUCKET_BITS);
        hasher.write(&self.code_lengths);
        hasher.finish()
    }

    /// Returns the bucket holding `value`.
    #[inline]
    fn bucket_of(&self, value: u32) -> usize {
        self.offsets.iter().rposition(|&offset| offset <= value).unwrap_or(0)
    }

    /// Number of bits `value` costs on the wire.
    #[must_use]
    pub fn packed_size(&self, value: u32) -> usize {
        let bucket = self.bucket_of(value);
        usize::from(self.code_lengths[bucket]) + usize::from(BUCKET_BITS[bucket])
    }

    /// Writes an unsigned integer.
    pub fn write_packed_uint(&self, writer: &mut BitWriter, value: u32) -> NetResult<()> {
        let bucket = self.bucket_of(value);
        writer.write_bits(self.reversed_codes[bucket], self.code_lengths[bucket])?;
        writer.write_bits(value - self.offsets[bucket], BUCKET_BITS[bucket])
    }

    /// Reads an unsigned integer.
    pub fn read_packed_uint(&self, reader: &mut BitReader<'_>) -> NetResult<u32> {
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            code |= reader.read_bits(1)?;
            let relative = code.wrapping_sub(self.first_code[len]);
            if relative < self.length_count[len] {
                let slot = (self.first_index[len] + relative) as usize;
                let bucket = usize::from(self.sorted_buckets[slot]);
                let raw = reader.read_bits(BUCKET_BITS[bucket])?;
                return Ok(self.offsets[bucket].wrapping_add(raw));
            }
            code <<= 1;
        }
        Err(NetError::InvalidPrefixCode)
    }

    /// Writes a signed integer (zig-zag mapped).
    #[inline]
    pub fn write_packed_int(&self, writer: &mut BitWriter, value: i32) -> NetResult<()> {
        self.write_packed_uint(writer, zigzag(value))
    }

    /// Reads a signed integer.
    #[inline]
    pub fn read_packed_int(&self, reader: &mut BitReader<'_>) -> NetResult<i32> {
        Ok(unzigzag(self.read_packed_uint(reader)?))
    }

    /// Writes `value` as a signed delta against `baseline`.
    #[inline]
    pub fn write_packed_int_delta(
        &self,
        writer: &mut BitWriter,
        value: i32,
        baseline: i32,
    ) -> NetResult<()> {
        self.write_packed_int(writer, value.wrapping_sub(baseline))
    }

    /// Reads a signed delta and applies it to `baseline`.
    #[inline]
    pub fn read_packed_int_delta(
        &self,
        reader: &mut BitReader<'_>,
        baseline: i32,
    ) -> NetResult<i32> {
        Ok(baseline.wrapping_add(self.read_packed_int(reader)?))
    }

    /// Writes `value` as a signed delta against an unsigned `baseline`.
    #[inline]
    #[allow(clippy::cast_possible_wrap)]
    pub fn write_packed_uint_delta(
        &self,
        writer: &mut BitWriter,
        value: u32,
        baseline: u32,
    ) -> NetResult<()> {
        self.write_packed_int(writer, value.wrapping_sub(baseline) as i32)
    }

    /// Reads a signed delta and applies it to an unsigned `baseline`.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn read_packed_uint_delta(
        &self,
        reader: &mut BitReader<'_>,
        baseline: u32,
    ) -> NetResult<u32> {
        Ok(baseline.wrapping_add(self.read_packed_int(reader)? as u32))
    }
}

impl Default for CompressionModel {
    fn default() -> Self {
        Self::from_frequencies(&DEFAULT_FREQUENCIES)
    }
}

/// Maps signed to unsigned so small magnitudes stay small.
#[inline]
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag`].
#[inline]
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Huffman code lengths for the given symbol weights.
fn huffman_lengths(frequencies: &[u32; BUCKET_COUNT]) -> [u8; BUCKET_COUNT] {
    // Nodes 0..16 are leaves; internal nodes are appended.
    let mut parent: Vec<usize> = vec![usize::MAX; BUCKET_COUNT];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = frequencies
        .iter()
        .enumerate()
        .map(|(i, &f)| Reverse((u64::from(f.max(1)), i)))
        .collect();

    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let node = parent.len();
        parent.push(usize::MAX);
        parent[a] = node;
        parent[b] = node;
        heap.push(Reverse((wa + wb, node)));
    }

    let mut lengths = [0u8; BUCKET_COUNT];
    for (leaf, length) in lengths.iter_mut().enumerate() {
        let mut depth = 0u8;
        let mut node = leaf;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth += 1;
        }
        *length = depth;
    }
    lengths
}
