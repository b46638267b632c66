// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f32::consts::FRAC_1_SQRT_2;

use lazy_static::lazy_static;

use crate::common::SAMPLES_PER_GRANULE;
use crate::header::FrameHeader;

use super::{partitions, ChannelInfo};

/// The largest decodable magnitude: 15 plus a 13 bit linbits extension.
const MAX_MAGNITUDE: usize = 15 + 8191;

/// Pre-emphasis added to the long block scale factors when `preflag` is set. ISO/IEC 11172-3
/// table B.6.
const PRETAB: [i32; 22] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0];

lazy_static! {
    /// `POW43[i] = i^(4/3)`.
    static ref POW43: Box<[f32; MAX_MAGNITUDE + 1]> = {
        let mut pow43 = Box::new([0f32; MAX_MAGNITUDE + 1]);
        for (i, p) in pow43.iter_mut().enumerate() {
            *p = f64::powf(i as f64, 4.0 / 3.0) as f32;
        }
        pow43
    };
}

/// The last scale factor partition holding a non-zero value, for the long partitions and for
/// each short window. Intensity stereo is coded in the partitions above.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct NonZeroBands {
    pub long: Option<usize>,
    pub short: [Option<usize>; 3],
}

/// Requantize the Huffman decoded values `hv` of a channel into the frequency lines `xr`.
///
/// When the frame is mid-side coded the `1/sqrt(2)` of the mid-side matrix is applied here, so
/// the stereo stage only sums and differences.
pub(super) fn requantize(
    header: &FrameHeader,
    channel: &ChannelInfo,
    hv: &[i32; SAMPLES_PER_GRANULE],
    xr: &mut [f32; SAMPLES_PER_GRANULE],
) -> NonZeroBands {
    let pow43: &[f32; MAX_MAGNITUDE + 1] = &POW43;

    let (bounds, switch) = partitions(header.sample_rate_idx, channel.block_type);

    let rzero = channel.rzero.min(SAMPLES_PER_GRANULE);
    let shift = if channel.scalefac_scale { 2 } else { 1 };
    let ms_gain = if header.is_mid_side() { FRAC_1_SQRT_2 } else { 1.0 };

    let mut nonzero = NonZeroBands::default();

    for (i, part) in bounds.windows(2).enumerate() {
        let start = part[0];
        let end = part[1].min(rzero);

        if start >= end {
            break;
        }

        let sf = i32::from(channel.scalefacs[i]);

        // The gain exponent in quarter steps.
        let exponent = if i < switch {
            let pre = if channel.preflag { PRETAB[i] } else { 0 };
            channel.global_gain - 210 - ((sf + pre) << shift)
        }
        else {
            let window = (i - switch) % 3;
            channel.global_gain - 210 - 8 * channel.subblock_gain[window] - (sf << shift)
        };

        let gain = f32::powf(2.0, 0.25 * exponent as f32) * ms_gain;

        let mut any = false;

        for (x, &v) in xr[start..end].iter_mut().zip(&hv[start..end]) {
            let magnitude = pow43[(v.unsigned_abs() as usize).min(MAX_MAGNITUDE)] * gain;
            *x = if v < 0 { -magnitude } else { magnitude };
            any |= v != 0;
        }

        if any {
            if i < switch {
                nonzero.long = Some(i);
            }
            else {
                nonzero.short[(i - switch) % 3] = Some(i);
            }
        }
    }

    xr[rzero..].fill(0.0);

    nonzero
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::header::parse_frame_header;
    use crate::header::tests::header_word;
    use crate::layer3::BlockType;

    fn mono_header() -> FrameHeader {
        parse_frame_header(header_word(0b11, 0b01, 9, 0, 3)).unwrap()
    }

    #[test]
    fn verify_pow43() {
        assert_eq!(POW43[0], 0.0);
        assert_eq!(POW43[1], 1.0);
        assert!((POW43[8] - 16.0).abs() < 1e-4);
        assert!((POW43[MAX_MAGNITUDE] - (MAX_MAGNITUDE as f32).powf(4.0 / 3.0)).abs() < 1.0);
    }

    #[test]
    fn verify_global_gain_and_scalefactors() {
        let header = mono_header();

        let mut channel = ChannelInfo { global_gain: 214, rzero: 8, ..Default::default() };
        channel.scalefacs[1] = 3;

        let mut hv = [0; SAMPLES_PER_GRANULE];
        hv[0] = -8;
        hv[5] = 1;

        let mut xr = [1.0; SAMPLES_PER_GRANULE];
        let nonzero = requantize(&header, &channel, &hv, &mut xr);

        // 2^(0.25 * 4) = 2.
        assert!((xr[0] + 32.0).abs() < 1e-4);
        // Band 1 spans lines 4..8, 2^(1 - 0.5 * 3).
        assert!((xr[5] - f32::powf(2.0, -0.5)).abs() < 1e-6);
        assert!(xr[8..].iter().all(|&x| x == 0.0));
        assert_eq!(nonzero.long, Some(1));
    }

    #[test]
    fn verify_preflag_and_scalefac_scale() {
        let header = mono_header();

        let mut channel = ChannelInfo {
            global_gain: 210,
            rzero: 576,
            preflag: true,
            scalefac_scale: true,
            ..Default::default()
        };

        let mut hv = [0; SAMPLES_PER_GRANULE];
        // Band 16 starts at line 162 at 44.1 kHz and has a pre-emphasis of 2.
        hv[162] = 1;

        let mut xr = [0.0; SAMPLES_PER_GRANULE];
        requantize(&header, &channel, &hv, &mut xr);
        assert!((xr[162] - 0.25).abs() < 1e-6);

        channel.preflag = false;
        requantize(&header, &channel, &hv, &mut xr);
        assert_eq!(xr[162], 1.0);
    }

    #[test]
    fn verify_short_block_subblock_gain() {
        let header = mono_header();

        let channel = ChannelInfo {
            global_gain: 210,
            rzero: 576,
            block_type: BlockType::Short { is_mixed: false },
            subblock_gain: [0, 1, 2],
            ..Default::default()
        };

        // Short band 0 spans lines 0..12 with windows of 4 lines.
        let mut hv = [0; SAMPLES_PER_GRANULE];
        hv[0] = 1;
        hv[4] = 1;
        hv[8] = 1;

        let mut xr = [0.0; SAMPLES_PER_GRANULE];
        let nonzero = requantize(&header, &channel, &hv, &mut xr);

        assert_eq!(xr[0], 1.0);
        assert!((xr[4] - 0.25).abs() < 1e-6);
        assert!((xr[8] - 0.0625).abs() < 1e-6);
        assert_eq!(nonzero.long, None);
        assert_eq!(nonzero.short, [Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn verify_mid_side_gain_folding() {
        // Joint stereo with M/S.
        let header = parse_frame_header(header_word(0b11, 0b01, 9, 0, 1) | 0x20).unwrap();

        let channel = ChannelInfo { global_gain: 210, rzero: 2, ..Default::default() };

        let mut hv = [0; SAMPLES_PER_GRANULE];
        hv[1] = 1;

        let mut xr = [0.0; SAMPLES_PER_GRANULE];
        requantize(&header, &channel, &hv, &mut xr);

        assert!((xr[1] - FRAC_1_SQRT_2).abs() < 1e-7);
    }
}
