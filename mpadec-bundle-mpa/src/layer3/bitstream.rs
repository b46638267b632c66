// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::errors::{decode_error, Result};
use mpadec_core::io::bit::{BitReader, ReadBits};

use lazy_static::lazy_static;

use crate::common::{ChannelMode, SFB_LONG_BANDS};
use crate::header::FrameHeader;

use super::{BlockType, ChannelInfo, FrameData};

/// MPEG1 `(slen1, slen2)` scale factor bit widths indexed by `scalefac_compress`.
const MPEG1_SLEN: [(u32, u32); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (3, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
];

/// The long block scale factor band groups an MPEG1 `scfsi` bit applies to.
const SCFSI_BANDS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

/// Number of scale factors in each of the 4 slen groups of an LSF granule, per layout row and
/// block kind (long, short, mixed). ISO/IEC 13818-3 table B.5.
const LSF_NSFB: [[[usize; 4]; 3]; 6] = [
    // Intensity stereo channel, layouts 0 to 2.
    [[7, 7, 7, 0], [12, 12, 12, 0], [6, 15, 12, 0]],
    [[6, 6, 6, 3], [12, 9, 9, 6], [6, 12, 9, 6]],
    [[8, 8, 5, 0], [15, 12, 9, 0], [6, 18, 9, 0]],
    // Normal channel, layouts 3 to 5.
    [[6, 5, 5, 5], [9, 9, 9, 9], [6, 9, 9, 9]],
    [[6, 5, 7, 3], [9, 9, 12, 6], [6, 9, 12, 6]],
    [[11, 10, 0, 0], [18, 18, 0, 0], [15, 18, 0, 0]],
];

/// The decoded form of an LSF `scalefac_compress` value.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
struct LsfLayout {
    slen: [u8; 4],
    row: u8,
    preflag: bool,
}

lazy_static! {
    /// Every LSF `scalefac_compress` value decoded once. Index 0 holds the layouts of a normal
    /// channel, index 1 those of the intensity stereo (right) channel.
    static ref LSF_LAYOUTS: [[LsfLayout; 512]; 2] = {
        let mut layouts = [[LsfLayout::default(); 512]; 2];

        for (sfc, layout) in layouts[0].iter_mut().enumerate() {
            *layout = match sfc {
                0..=399 => LsfLayout {
                    slen: [(sfc >> 4) / 5, (sfc >> 4) % 5, (sfc % 16) >> 2, sfc % 4].map(|s| s as u8),
                    row: 3,
                    preflag: false,
                },
                400..=499 => {
                    let s = sfc - 400;
                    LsfLayout {
                        slen: [(s >> 2) / 5, (s >> 2) % 5, s % 4, 0].map(|s| s as u8),
                        row: 4,
                        preflag: false,
                    }
                }
                _ => {
                    let s = sfc - 500;
                    LsfLayout { slen: [s / 3, s % 3, 0, 0].map(|s| s as u8), row: 5, preflag: true }
                }
            };
        }

        for (sfc, layout) in layouts[1].iter_mut().enumerate() {
            // The low bit selects the intensity scale instead.
            let c = sfc >> 1;

            *layout = match c {
                0..=179 => LsfLayout {
                    slen: [c / 36, (c % 36) / 6, (c % 36) % 6, 0].map(|s| s as u8),
                    row: 0,
                    preflag: false,
                },
                180..=243 => {
                    let s = c - 180;
                    LsfLayout {
                        slen: [(s % 64) >> 4, (s % 16) >> 2, s % 4, 0].map(|s| s as u8),
                        row: 1,
                        preflag: false,
                    }
                }
                _ => {
                    let s = c - 244;
                    LsfLayout { slen: [s / 3, s % 3, 0, 0].map(|s| s as u8), row: 2, preflag: false }
                }
            };
        }

        layouts
    };
}

fn read_channel_side_info(
    bs: &mut BitReader<'_>,
    header: &FrameHeader,
    channel: &mut ChannelInfo,
) -> Result<()> {
    channel.part2_3_length = bs.read_bits(12) as usize;
    channel.big_values = bs.read_bits(9) as usize;

    if channel.big_values > 288 {
        return decode_error("mp3: big_values > 288");
    }

    channel.global_gain = bs.read_bits(8) as i32;
    channel.scalefac_compress = bs.read_bits(if header.is_mpeg1() { 4 } else { 9 }) as usize;

    let bands = &SFB_LONG_BANDS[header.sample_rate_idx];

    if bs.read_bit() {
        let block_type = bs.read_bits(2);
        let is_mixed = bs.read_bit();

        channel.block_type = match block_type {
            0b01 => BlockType::Start,
            0b10 => BlockType::Short { is_mixed },
            0b11 => BlockType::End,
            _ => return decode_error("mp3: reserved block_type with window switching"),
        };

        for table in channel.table_select[..2].iter_mut() {
            *table = bs.read_bits(5) as usize;
        }
        channel.table_select[2] = 0;

        for gain in channel.subblock_gain.iter_mut() {
            *gain = bs.read_bits(3) as i32;
        }

        // region0 implicitly spans 8 long bands, or 9 short bands (3 windows) for a pure short
        // block. There is no region2.
        channel.region1_start = if header.is_mpeg1() {
            36
        }
        else if channel.block_type == (BlockType::Short { is_mixed: false }) {
            bands[6]
        }
        else {
            bands[8]
        };
        channel.region2_start = 576;
    }
    else {
        channel.block_type = BlockType::Long;

        for table in channel.table_select.iter_mut() {
            *table = bs.read_bits(5) as usize;
        }
        channel.subblock_gain = [0; 3];

        let region0_count = bs.read_bits(4) as usize + 1;
        let region1_count = bs.read_bits(3) as usize + 1;

        channel.region1_start = bands[region0_count];
        channel.region2_start = bands.get(region0_count + region1_count).copied().unwrap_or(576);
    }

    channel.preflag = header.is_mpeg1() && bs.read_bit();
    channel.scalefac_scale = bs.read_bit();
    channel.count1table_select = bs.read_bits(1) as usize;

    Ok(())
}

/// Read the side information of a frame into `frame`. `buf` holds exactly the side information
/// bytes following the header and CRC.
pub(super) fn read_side_info(buf: &[u8], header: &FrameHeader, frame: &mut FrameData) -> Result<()> {
    let mut bs = BitReader::new(buf);

    let n_channels = header.n_channels();

    if header.is_mpeg1() {
        frame.main_data_begin = bs.read_bits(9) as usize;

        // Private bits.
        bs.skip_bits(if header.channel_mode == ChannelMode::Mono { 5 } else { 3 });

        for scfsi in frame.scfsi[..n_channels].iter_mut() {
            for band in scfsi.iter_mut() {
                *band = bs.read_bit();
            }
        }
    }
    else {
        frame.main_data_begin = bs.read_bits(8) as usize;
        bs.skip_bits(if header.channel_mode == ChannelMode::Mono { 1 } else { 2 });
        frame.scfsi = [[false; 4]; 2];
    }

    for granule in frame.granules[..header.n_granules()].iter_mut() {
        for channel in granule[..n_channels].iter_mut() {
            read_channel_side_info(&mut bs, header, channel)?;
        }
    }

    if bs.overrun() {
        return decode_error("mp3: side information is truncated");
    }

    Ok(())
}

/// Read the MPEG1 scale factors of channel `ch` in granule `gr`. Long block bands flagged in the
/// channel's `scfsi` are inherited from granule 0.
pub(super) fn read_scale_factors_mpeg1<B: ReadBits>(
    bs: &mut B,
    gr: usize,
    ch: usize,
    frame: &mut FrameData,
) {
    let scfsi = frame.scfsi[ch];
    let inherited = frame.granules[0][ch].scalefacs;

    let channel = &mut frame.granules[gr][ch];

    let (slen1, slen2) = MPEG1_SLEN[channel.scalefac_compress];

    match channel.block_type {
        BlockType::Short { is_mixed } => {
            // A mixed block carries 8 long bands and short bands 3..6 with slen1. Short bands
            // 6..12 always use slen2. Short band 12 is never transmitted.
            let n_slen1 = if is_mixed { 8 + 3 * 3 } else { 6 * 3 };

            for (i, sf) in channel.scalefacs[..n_slen1 + 6 * 3].iter_mut().enumerate() {
                let slen = if i < n_slen1 { slen1 } else { slen2 };
                *sf = bs.read_bits(slen) as u8;
            }
            channel.scalefacs[n_slen1 + 6 * 3..].fill(0);
        }
        _ => {
            for (group, &(start, end)) in SCFSI_BANDS.iter().enumerate() {
                if gr > 0 && scfsi[group] {
                    channel.scalefacs[start..end]
                        .copy_from_slice(&inherited[start..end]);
                    continue;
                }

                let slen = if group < 2 { slen1 } else { slen2 };

                for sf in channel.scalefacs[start..end].iter_mut() {
                    *sf = bs.read_bits(slen) as u8;
                }
            }
            channel.scalefacs[21..].fill(0);
        }
    }
}

/// Read the LSF (MPEG2 and MPEG2.5) scale factors of a channel. `is_intensity` is true for the
/// right channel of an intensity stereo frame, whose `scalefac_compress` is laid out differently.
pub(super) fn read_scale_factors_lsf<B: ReadBits>(
    bs: &mut B,
    is_intensity: bool,
    channel: &mut ChannelInfo,
) {
    let layout = LSF_LAYOUTS[usize::from(is_intensity)][channel.scalefac_compress];

    let kind = match channel.block_type {
        BlockType::Short { is_mixed: false } => 1,
        BlockType::Short { is_mixed: true } => 2,
        _ => 0,
    };

    channel.preflag = layout.preflag;

    let mut i = 0;

    for (&nsfb, &slen) in LSF_NSFB[usize::from(layout.row)][kind].iter().zip(&layout.slen) {
        for sf in channel.scalefacs[i..i + nsfb].iter_mut() {
            *sf = bs.read_bits(u32::from(slen)) as u8;
        }
        i += nsfb;
    }

    channel.scalefacs[i..].fill(0);
}
