// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::io::bit::ReadBits;

use crate::common::SAMPLES_PER_GRANULE;

use super::huffman_tables::*;
use super::ChannelInfo;

/// Decode one big_values pair from `codebook`, returning the unsigned `(x, y)` values.
#[inline]
fn read_pair<B: ReadBits>(bs: &mut B, codebook: &[i16]) -> (u32, u32) {
    let mut width = 5;
    let mut entry = i32::from(codebook[bs.peek_bits(width) as usize]);

    while entry < 0 {
        bs.skip_bits(width as isize);
        width = (entry & 7) as u32;
        entry = i32::from(codebook[(bs.peek_bits(width) as i32 - (entry >> 3)) as usize]);
    }

    bs.skip_bits((entry >> 8) as isize);

    ((entry & 0xf) as u32, ((entry >> 4) & 0xf) as u32)
}

/// Complete a decoded magnitude: read the linbits extension of an escaped value, then its sign.
#[inline]
fn read_value<B: ReadBits>(bs: &mut B, value: u32, linbits: u32) -> i32 {
    if value == 0 {
        return 0;
    }

    let value = if value == 15 && linbits > 0 { value + bs.read_bits(linbits) } else { value };

    if bs.read_bit() {
        -(value as i32)
    }
    else {
        value as i32
    }
}

/// Decode one count1 quad, returning the packed leaf (code length and v, w, x, y flags).
#[inline]
fn read_quad<B: ReadBits>(bs: &mut B, codebook: &[u8]) -> u8 {
    let mut leaf = codebook[bs.peek_bits(4) as usize];

    if leaf & 8 == 0 {
        let width = u32::from(leaf & 3);
        let next = bs.peek_bits(4 + width) & ((1 << width) - 1);
        leaf = codebook[usize::from(leaf >> 3) + next as usize];
    }

    bs.skip_bits(isize::from(leaf & 7));

    leaf
}

/// Decode the Huffman coded part3 data of a channel into `hv`, stopping at bit position `end`.
///
/// Returns the number of leading values that may be non-zero. Every value from that index on is
/// zero.
pub(super) fn read_spectrum<B: ReadBits>(
    bs: &mut B,
    channel: &ChannelInfo,
    end: usize,
    hv: &mut [i32; SAMPLES_PER_GRANULE],
) -> usize {
    let big_values_end = (2 * channel.big_values).min(SAMPLES_PER_GRANULE);

    let regions = [
        (channel.region1_start.min(big_values_end), channel.table_select[0]),
        (channel.region2_start.min(big_values_end), channel.table_select[1]),
        (big_values_end, channel.table_select[2]),
    ];

    let mut i = 0;

    for &(region_end, table) in regions.iter() {
        let codebook = &BIG_VALUE_CODES[usize::from(BIG_VALUE_OFFSETS[table])..];
        let linbits = u32::from(LINBITS[table]);

        while i < region_end && bs.bit_pos() < end {
            let (x, y) = read_pair(bs, codebook);

            hv[i] = read_value(bs, x, linbits);
            hv[i + 1] = read_value(bs, y, linbits);

            i += 2;
        }
    }

    let codebook: &[u8] = if channel.count1table_select == 0 { &COUNT1_A } else { &COUNT1_B };

    while i + 4 <= SAMPLES_PER_GRANULE && bs.bit_pos() < end {
        let leaf = read_quad(bs, codebook);

        for (j, flag) in [0x80, 0x40, 0x20, 0x10].into_iter().enumerate() {
            hv[i + j] = read_value(bs, u32::from(leaf & flag != 0), 0);
        }

        // The last quad may straddle part2_3_length, in which case it is stuffing.
        if bs.bit_pos() > end {
            hv[i..i + 4].fill(0);
            break;
        }

        i += 4;
    }

    hv[i..].fill(0);

    i
}

#[cfg(test)]
mod tests {
    use super::*;

    use mpadec_core::io::bit::BitReader;

    use crate::layer3::BlockType;
    use crate::test_util::BitWriter;

    fn long_channel(big_values: usize, tables: [usize; 3], count1table: usize) -> ChannelInfo {
        ChannelInfo {
            big_values,
            table_select: tables,
            region1_start: 4,
            region2_start: 8,
            count1table_select: count1table,
            block_type: BlockType::Long,
            ..Default::default()
        }
    }

    #[test]
    fn verify_table1_pairs() {
        // Table 1: (0,0) "1", (0,1) "001", (1,0) "01", (1,1) "000".
        let mut bw = BitWriter::new();
        bw.write_all(&[(0b01, 2), (1, 1)]); // (-1, 0)
        bw.write_all(&[(0b000, 3), (0, 1), (1, 1)]); // (1, -1)
        bw.write_all(&[(0b1, 1)]); // (0, 0)
        bw.write_all(&[(0b001, 3), (0, 1)]); // (0, 1)
        let end = bw.bit_len();

        let buf = bw.to_bytes(8);
        let mut bs = BitReader::new(&buf);

        let mut hv = [7; SAMPLES_PER_GRANULE];
        let rzero = read_spectrum(&mut bs, &long_channel(4, [1, 1, 1], 0), end, &mut hv);

        assert_eq!(hv[..8], [-1, 0, 1, -1, 0, 0, 0, 1]);
        assert_eq!(rzero, 8);
        assert!(hv[8..].iter().all(|&v| v == 0));
        assert_eq!(bs.bit_pos(), end);
    }

    #[test]
    fn verify_linbits_escape() {
        // Table 16 has 1 linbit. Its (15, 0) code is "000011" (the 6 bit tail of a jump),
        // found by searching the codebook rather than hard coding the tree.
        let codebook = &BIG_VALUE_CODES[usize::from(BIG_VALUE_OFFSETS[16])..];

        let mut code = None;
        'search: for len in 1..=19u32 {
            for bits in 0..(1u32 << len) {
                let mut bw = BitWriter::new();
                bw.write(bits, len);
                let buf = bw.to_bytes(8);
                let mut bs = BitReader::new(&buf);

                if read_pair(&mut bs, codebook) == (15, 0) && bs.bit_pos() == len as usize {
                    code = Some((bits, len));
                    break 'search;
                }
            }
        }

        let (bits, len) = code.unwrap();

        let mut bw = BitWriter::new();
        bw.write_all(&[(bits, len), (1, 1), (1, 1)]);
        let end = bw.bit_len();

        let buf = bw.to_bytes(8);
        let mut bs = BitReader::new(&buf);

        let mut hv = [0; SAMPLES_PER_GRANULE];
        read_spectrum(&mut bs, &long_channel(1, [16, 16, 16], 0), end, &mut hv);

        assert_eq!(hv[..2], [-16, 0]);
    }

    #[test]
    fn verify_count1_quads() {
        let mut bw = BitWriter::new();
        // Table B, "1111" is (0,0,0,0), "0000" is (1,1,1,1).
        bw.write(0b1111, 4);
        bw.write_all(&[(0b0000, 4), (0, 1), (1, 1), (0, 1), (1, 1)]);
        // Table B, "1010" is (0,1,0,1).
        bw.write_all(&[(0b1010, 4), (1, 1), (0, 1)]);
        let end = bw.bit_len();

        let buf = bw.to_bytes(8);
        let mut bs = BitReader::new(&buf);

        let mut hv = [0; SAMPLES_PER_GRANULE];
        let rzero = read_spectrum(&mut bs, &long_channel(0, [0, 0, 0], 1), end, &mut hv);

        assert_eq!(hv[..12], [0, 0, 0, 0, 1, -1, 1, -1, 0, -1, 0, 1]);
        assert_eq!(rzero, 12);
    }

    #[test]
    fn verify_count1_table_a() {
        // Table A: "1" is (0,0,0,0), "0101" is (0,0,0,1), "000000" is (1,0,1,1).
        let mut bw = BitWriter::new();
        bw.write_all(&[(0b1, 1), (0b0101, 4), (1, 1), (0b000000, 6), (0, 1), (0, 1), (1, 1)]);
        let end = bw.bit_len();

        let buf = bw.to_bytes(8);
        let mut bs = BitReader::new(&buf);

        let mut hv = [0; SAMPLES_PER_GRANULE];
        let rzero = read_spectrum(&mut bs, &long_channel(0, [0, 0, 0], 0), end, &mut hv);

        assert_eq!(hv[..12], [0, 0, 0, 0, 0, 0, 0, -1, 1, 0, 1, -1]);
        assert_eq!(rzero, 12);
    }

    #[test]
    fn verify_straddling_quad_is_discarded() {
        let mut bw = BitWriter::new();
        bw.write_all(&[(0b0000, 4), (0, 1), (0, 1), (0, 1), (0, 1)]);
        // part2_3_length ends inside the quad.
        let end = 6;

        let buf = bw.to_bytes(8);
        let mut bs = BitReader::new(&buf);

        let mut hv = [0; SAMPLES_PER_GRANULE];
        let rzero = read_spectrum(&mut bs, &long_channel(0, [0, 0, 0], 1), end, &mut hv);

        assert_eq!(rzero, 0);
        assert!(hv.iter().all(|&v| v == 0));
    }
}
