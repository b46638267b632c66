// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers for building synthetic bitstreams in tests.

/// A most-significant-bit first bit writer.
#[derive(Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Append the low `n` bits of `value`.
    pub fn write(&mut self, value: u32, n: u32) -> &mut Self {
        for i in (0..n).rev() {
            if self.bits % 8 == 0 {
                self.buf.push(0);
            }
            if (value >> i) & 1 != 0 {
                let last = self.buf.len() - 1;
                self.buf[last] |= 0x80 >> (self.bits % 8);
            }
            self.bits += 1;
        }
        self
    }

    /// Append each `(value, n)` pair in turn.
    pub fn write_all(&mut self, fields: &[(u32, u32)]) -> &mut Self {
        for &(value, n) in fields {
            self.write(value, n);
        }
        self
    }

    pub fn bit_len(&self) -> usize {
        self.bits
    }

    /// The written bytes, zero padded to `len` bytes.
    pub fn to_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = self.buf.clone();
        assert!(bytes.len() <= len, "bitstream overflows {} bytes", len);
        bytes.resize(len, 0);
        bytes
    }
}

/// Prefix `payload` with the 4 byte header `word` and pad it to `frame_size` bytes.
pub fn frame_bytes(word: u32, payload: &[u8], frame_size: usize) -> Vec<u8> {
    let mut frame = word.to_be_bytes().to_vec();
    frame.extend_from_slice(payload);
    assert!(frame.len() <= frame_size, "payload overflows the frame");
    frame.resize(frame_size, 0);
    frame
}

#[cfg(test)]
mod tests {
    use super::BitWriter;

    #[test]
    fn verify_bit_writer() {
        let mut bw = BitWriter::new();
        bw.write(0b101, 3).write(0x1f, 5).write(1, 1);
        assert_eq!(bw.bit_len(), 9);
        assert_eq!(bw.to_bytes(3), vec![0b1011_1111, 0b1000_0000, 0]);
    }
}
