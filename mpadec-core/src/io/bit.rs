// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

/// The maximum number of bits that may be read or peeked at once.
pub const MAX_READ_BITS: u32 = 25;

/// `ReadBits` reads unsigned fields of up-to [`MAX_READ_BITS`] bits, most-significant bit first.
///
/// Reads never fail. Bits requested past the end of the valid data read as 0 and the cursor stops
/// at the end. Callers that must distinguish a truncated read check [`ReadBits::overrun`].
pub trait ReadBits {
    /// Read `n` bits and advance the cursor.
    fn read_bits(&mut self, n: u32) -> u32;

    /// Read `n` bits without advancing the cursor.
    fn peek_bits(&self, n: u32) -> u32;

    /// Advance (or, if negative, rewind) the cursor by `n` bits. The cursor is clamped to the
    /// valid data.
    fn skip_bits(&mut self, n: isize);

    /// The absolute cursor position in bits.
    fn bit_pos(&self) -> usize;

    /// Returns true if any read or skip was clamped at the end of the valid data.
    fn overrun(&self) -> bool;

    /// Read a single bit.
    #[inline(always)]
    fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }
}

/// Peek `n` bits at bit offset `pos` of `buf`, treating bytes beyond `buf` as 0.
#[inline]
fn peek_at(buf: &[u8], pos: usize, n: u32) -> u32 {
    debug_assert!(n <= MAX_READ_BITS);

    if n == 0 {
        return 0;
    }

    let byte = pos >> 3;

    let mut word = 0u32;
    for i in 0..4 {
        word = (word << 8) | u32::from(buf.get(byte + i).copied().unwrap_or(0));
    }

    (word << (pos & 7)) >> (32 - n)
}

/// Byte and sub-byte cursor shared by the readers.
#[derive(Clone, Copy, Debug, Default)]
struct BitCursor {
    byte_pos: usize,
    bit_pos: u32,
    overrun: bool,
}

impl BitCursor {
    #[inline(always)]
    fn abs(&self) -> usize {
        (self.byte_pos << 3) + self.bit_pos as usize
    }

    #[inline]
    fn set_abs(&mut self, abs: isize, limit: usize) {
        let end = (limit << 3) as isize;

        let clamped = if abs < 0 {
            self.overrun = true;
            0
        }
        else if abs > end {
            self.overrun = true;
            end
        }
        else {
            abs
        } as usize;

        self.byte_pos = clamped >> 3;
        self.bit_pos = (clamped & 7) as u32;
    }

    #[inline]
    fn read(&mut self, buf: &[u8], limit: usize, n: u32) -> u32 {
        let abs = self.abs();
        let value = peek_at(&buf[..limit], abs, n);
        self.set_abs((abs + n as usize) as isize, limit);
        value
    }

    #[inline]
    fn skip_bytes(&mut self, n: usize, limit: usize) {
        let byte_pos = self.byte_pos + n;
        if byte_pos > limit {
            self.overrun = true;
        }
        self.byte_pos = min(byte_pos, limit);
        self.bit_pos = 0;
    }
}

/// `BitReader` reads bits from a borrowed byte slice. It is rebound to a new buffer with
/// [`BitReader::feed`] rather than copying.
#[derive(Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    cursor: BitCursor,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BitReader { buf, cursor: Default::default() }
    }

    /// Rebind the reader to `buf`, positioned at byte `offset`.
    pub fn feed(&mut self, buf: &'a [u8], offset: usize) {
        self.buf = buf;
        self.cursor = Default::default();
        self.cursor.skip_bytes(offset, buf.len());
    }

    /// Skip to the start of the `n`th byte after the current byte. Discards the sub-byte cursor.
    pub fn skip_bytes(&mut self, n: usize) {
        self.cursor.skip_bytes(n, self.buf.len());
    }

    /// The current byte position.
    pub fn byte_pos(&self) -> usize {
        self.cursor.byte_pos
    }
}

impl ReadBits for BitReader<'_> {
    #[inline(always)]
    fn read_bits(&mut self, n: u32) -> u32 {
        self.cursor.read(self.buf, self.buf.len(), n)
    }

    #[inline(always)]
    fn peek_bits(&self, n: u32) -> u32 {
        peek_at(self.buf, self.cursor.abs(), n)
    }

    fn skip_bits(&mut self, n: isize) {
        let abs = self.cursor.abs() as isize + n;
        self.cursor.set_abs(abs, self.buf.len());
    }

    fn bit_pos(&self) -> usize {
        self.cursor.abs()
    }

    fn overrun(&self) -> bool {
        self.cursor.overrun
    }
}

/// `BitReservoir` is an owned, bounded byte buffer that is appended to and read from. Unread bytes
/// survive appends: when an append does not fit, the unread tail is first moved to the front of
/// the buffer. Bytes that still do not fit are rejected.
///
/// Layer III uses it to hold main data that later frames may reference through
/// `main_data_begin`.
pub struct BitReservoir {
    buf: Box<[u8]>,
    size: usize,
    cursor: BitCursor,
    appended: u64,
}

impl BitReservoir {
    /// Instantiate a reservoir that can hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        BitReservoir {
            buf: vec![0; capacity].into_boxed_slice(),
            size: 0,
            cursor: Default::default(),
            appended: 0,
        }
    }

    /// Append as many bytes of `data` as fit, compacting first if necessary. Returns the number
    /// of bytes appended.
    pub fn append(&mut self, data: &[u8]) -> usize {
        if self.size + data.len() > self.buf.len() {
            let start = self.cursor.byte_pos;
            self.buf.copy_within(start..self.size, 0);
            self.size -= start;
            self.cursor.byte_pos = 0;
        }

        let len = min(data.len(), self.buf.len() - self.size);

        self.buf[self.size..self.size + len].copy_from_slice(&data[..len]);
        self.size += len;
        self.appended += len as u64;

        len
    }

    /// Position the cursor on the byte `n` bytes before the end of the buffered data. Returns
    /// false, leaving the cursor untouched, if fewer than `n` bytes are buffered.
    pub fn rewind_from_end(&mut self, n: usize) -> bool {
        if n > self.size {
            return false;
        }
        self.cursor.byte_pos = self.size - n;
        self.cursor.bit_pos = 0;
        true
    }

    /// Skip to the start of the `n`th byte after the current byte. Discards the sub-byte cursor.
    pub fn skip_bytes(&mut self, n: usize) {
        self.cursor.skip_bytes(n, self.size);
    }

    /// The number of bytes buffered, including bytes already read.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The current byte position.
    pub fn byte_pos(&self) -> usize {
        self.cursor.byte_pos
    }

    /// The number of bytes from the byte cursor to the end of the buffered data.
    pub fn available(&self) -> usize {
        self.size - self.cursor.byte_pos
    }

    /// The maximum number of bytes the reservoir holds.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The total number of bytes ever appended.
    pub fn total_appended(&self) -> u64 {
        self.appended
    }

    /// Discard all buffered data.
    pub fn clear(&mut self) {
        self.size = 0;
        self.cursor = Default::default();
    }

    /// Clear the overrun flag.
    pub fn clear_overrun(&mut self) {
        self.cursor.overrun = false;
    }
}

impl ReadBits for BitReservoir {
    #[inline(always)]
    fn read_bits(&mut self, n: u32) -> u32 {
        self.cursor.read(&self.buf, self.size, n)
    }

    #[inline(always)]
    fn peek_bits(&self, n: u32) -> u32 {
        peek_at(&self.buf[..self.size], self.cursor.abs(), n)
    }

    fn skip_bits(&mut self, n: isize) {
        let abs = self.cursor.abs() as isize + n;
        self.cursor.set_abs(abs, self.size);
    }

    fn bit_pos(&self) -> usize {
        self.cursor.abs()
    }

    fn overrun(&self) -> bool {
        self.cursor.overrun
    }
}

#[cfg(test)]
mod tests {
    use super::{BitReader, BitReservoir, ReadBits};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn verify_bitreader_fields() {
        let buf = [0b1010_1100, 0b0101_0011, 0b1111_0000, 0x0f];
        let mut bs = BitReader::new(&buf);

        assert_eq!(bs.read_bits(1), 1);
        assert_eq!(bs.read_bits(3), 0b010);
        assert_eq!(bs.peek_bits(4), 0b1100);
        assert_eq!(bs.read_bits(12), 0b1100_0101_0011);
        assert_eq!(bs.read_bits(16), 0b1111_0000_0000_1111);
        assert_eq!(bs.bit_pos(), 32);
        assert!(!bs.overrun());

        bs.skip_bits(-9);
        assert_eq!(bs.read_bits(8), 0b0000_0111);
    }

    #[test]
    fn verify_bitreader_feed_and_skip() {
        let a = [0xffu8, 0x00];
        let b = [0x12u8, 0x34, 0x56];
        let mut bs = BitReader::new(&a);

        assert_eq!(bs.read_bits(4), 0xf);
        bs.feed(&b, 1);
        assert_eq!(bs.read_bits(4), 0x3);
        bs.skip_bytes(1);
        assert_eq!(bs.byte_pos(), 2);
        assert_eq!(bs.read_bits(8), 0x56);
    }

    #[test]
    fn verify_bitreader_clamps_at_end() {
        let buf = [0xffu8];
        let mut bs = BitReader::new(&buf);

        assert_eq!(bs.read_bits(12), 0xff0);
        assert!(bs.overrun());
        assert_eq!(bs.bit_pos(), 8);
        assert_eq!(bs.read_bits(8), 0);
        assert_eq!(bs.bit_pos(), 8);
    }

    #[test]
    fn verify_reservoir_compaction_keeps_unread() {
        let mut res = BitReservoir::new(8);

        assert_eq!(res.append(&[1, 2, 3, 4, 5, 6]), 6);
        res.skip_bytes(4);
        assert_eq!(res.available(), 2);

        // Does not fit without compaction; the two unread bytes move to the front.
        assert_eq!(res.append(&[7, 8, 9, 10, 11, 12, 13]), 6);
        assert_eq!(res.available(), 8);
        assert_eq!(res.byte_pos(), 0);

        for expected in 5..=12 {
            assert_eq!(res.read_bits(8), expected);
        }

        assert_eq!(res.available(), 0);
        assert_eq!(res.total_appended(), 12);
    }

    #[test]
    fn verify_reservoir_rewind_from_end() {
        let mut res = BitReservoir::new(16);

        res.append(&[0xaa, 0xbb, 0xcc]);
        res.skip_bytes(3);

        assert!(res.rewind_from_end(2));
        assert_eq!(res.read_bits(8), 0xbb);
        assert!(!res.rewind_from_end(4));
        assert_eq!(res.byte_pos(), 2);
    }

    #[test]
    fn verify_reservoir_accounting() {
        let mut rng = SmallRng::seed_from_u64(0x6d70_6164);

        let mut res = BitReservoir::new(512);
        let mut history = Vec::new();
        let mut consumed = 0usize;

        for _ in 0..2000 {
            if rng.random_bool(0.5) {
                let mut chunk = vec![0u8; rng.random_range(0..200)];
                rng.fill(&mut chunk[..]);

                let n = res.append(&chunk);
                history.extend_from_slice(&chunk[..n]);
            }
            else {
                let n = rng.random_range(0..=res.available());

                // Alternate between skipping and reading so both paths consume bytes.
                if n % 2 == 0 {
                    res.skip_bytes(n);
                }
                else {
                    for i in 0..n {
                        assert_eq!(res.read_bits(8) as u8, history[consumed + i]);
                    }
                }
                consumed += n;
            }

            assert_eq!(res.available(), history.len() - consumed);
            assert_eq!(res.total_appended(), history.len() as u64);
        }

        assert!(!res.overrun());
    }
}
