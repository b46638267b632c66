// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f32::consts::SQRT_2;
use std::f64::consts::PI;

use lazy_static::lazy_static;
use log::debug;

use crate::common::{ChannelMode, Mode, SAMPLES_PER_GRANULE};
use crate::header::FrameHeader;

use super::requantize::NonZeroBands;
use super::{partitions, ChannelInfo};

/// MPEG1 intensity positions from 7 on mean the band is not intensity coded.
const MPEG1_INVALID_POS: usize = 7;

/// LSF intensity positions from 31 on mean the band is not intensity coded.
const LSF_INVALID_POS: usize = 31;

lazy_static! {
    /// MPEG1 `(left, right)` intensity gains per position, `k_l = r / (1 + r)` and
    /// `k_r = 1 / (1 + r)` where `r = tan(pos * pi / 12)`.
    static ref MPEG1_RATIOS: [(f32, f32); MPEG1_INVALID_POS] = {
        let mut ratios = [(0.0, 0.0); MPEG1_INVALID_POS];

        for (pos, ratio) in ratios.iter_mut().enumerate() {
            *ratio = if pos == 6 {
                // tan(pi / 2) is infinite, everything is panned left.
                (1.0, 0.0)
            }
            else {
                let r = (pos as f64 * PI / 12.0).tan();
                ((r / (1.0 + r)) as f32, (1.0 / (1.0 + r)) as f32)
            };
        }

        ratios
    };

    /// LSF `(left, right)` intensity gains per intensity scale and position. Odd positions
    /// attenuate the left channel by `i0^((pos + 1) / 2)`, even positions the right channel by
    /// `i0^(pos / 2)`, where `i0` is `2^-0.25` for intensity scale 0 and `2^-0.5` for scale 1.
    static ref LSF_RATIOS: [[(f32, f32); LSF_INVALID_POS + 1]; 2] = {
        let mut ratios = [[(1.0, 1.0); LSF_INVALID_POS + 1]; 2];

        for (scale, ratios) in ratios.iter_mut().enumerate() {
            let i0 = if scale == 0 { f64::powf(2.0, -0.25) } else { f64::powf(2.0, -0.5) };

            for (pos, ratio) in ratios.iter_mut().enumerate().skip(1) {
                *ratio = if pos & 1 == 1 {
                    (i0.powi((pos as i32 + 1) / 2) as f32, 1.0)
                }
                else {
                    (1.0, i0.powi(pos as i32 / 2) as f32)
                };
            }
        }

        ratios
    };
}

/// The `(left, right)` gains of intensity position `pos`, or `None` if the position marks the
/// band as not intensity coded.
fn intensity_ratio(header: &FrameHeader, right: &ChannelInfo, pos: usize) -> Option<(f32, f32)> {
    if header.is_mpeg1() {
        MPEG1_RATIOS.get(pos).copied()
    }
    else if pos < LSF_INVALID_POS {
        Some(LSF_RATIOS[right.scalefac_compress & 1][pos])
    }
    else {
        None
    }
}

#[inline(always)]
fn mid_side(mid: &mut [f32], side: &mut [f32]) {
    for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
        let (l, r) = (*m + *s, *m - *s);
        *m = l;
        *s = r;
    }
}

/// Reconstruct left and right from joint stereo coded channels. `nonzero` describes the right
/// channel. Does nothing unless the frame is joint stereo.
pub(super) fn stereo(
    header: &FrameHeader,
    granule: &[ChannelInfo; 2],
    nonzero: &NonZeroBands,
    xr0: &mut [f32; SAMPLES_PER_GRANULE],
    xr1: &mut [f32; SAMPLES_PER_GRANULE],
) {
    let (is_mid_side, is_intensity) = match header.channel_mode {
        ChannelMode::JointStereo(Mode::Layer3 { mid_side, intensity }) => (mid_side, intensity),
        _ => return,
    };

    let [left, right] = granule;

    let is_intensity = if is_intensity && left.block_type != right.block_type {
        debug!("intensity stereo with mismatched block types, decoding as mid-side");
        false
    }
    else {
        is_intensity
    };

    if !is_intensity {
        if is_mid_side {
            let end = left.rzero.max(right.rzero).min(SAMPLES_PER_GRANULE);
            mid_side(&mut xr0[..end], &mut xr1[..end]);
        }
        return;
    }

    let (bounds, switch) = partitions(header.sample_rate_idx, right.block_type);

    let n_parts = bounds.len() - 1;

    // The long partitions of a mixed block may only carry intensity positions if no short window
    // above them holds a value.
    let long_may_be_intensity = switch == n_parts || nonzero.short.iter().all(Option::is_none);

    // Channel 0 had the mid-side gain folded in during requantization.
    let unfold = if is_mid_side { SQRT_2 } else { 1.0 };

    for i in 0..n_parts {
        let (start, end) = (bounds[i], bounds[i + 1]);

        // The last band carries no scale factor of its own and uses the position of the band
        // below it.
        let (is_coded, pos_idx) = if i < switch {
            let above = nonzero.long.map_or(true, |last| i > last);
            (long_may_be_intensity && above, if i + 1 == n_parts { i - 1 } else { i })
        }
        else {
            let window = (i - switch) % 3;
            let above = nonzero.short[window].map_or(true, |last| i > last);
            (above, if i + 3 >= n_parts { i - 3 } else { i })
        };

        let ratio = if is_coded {
            intensity_ratio(header, right, usize::from(right.scalefacs[pos_idx]))
        }
        else {
            None
        };

        match ratio {
            Some((k_l, k_r)) => {
                for (l, r) in xr0[start..end].iter_mut().zip(xr1[start..end].iter_mut()) {
                    let m = *l * unfold;
                    *l = m * k_l;
                    *r = m * k_r;
                }
            }
            None if is_mid_side => mid_side(&mut xr0[start..end], &mut xr1[start..end]),
            None => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use crate::header::parse_frame_header;
    use crate::header::tests::header_word;
    use crate::layer3::BlockType;

    /// Joint stereo, 44.1 kHz, with the given mode extension.
    fn joint_header(version: u32, mode_extension: u32) -> FrameHeader {
        parse_frame_header(header_word(version, 0b01, 9, 0, 1) | (mode_extension << 4)).unwrap()
    }

    fn noise(rng: &mut SmallRng, len: usize) -> [f32; SAMPLES_PER_GRANULE] {
        let mut xr = [0.0; SAMPLES_PER_GRANULE];
        for x in xr[..len].iter_mut() {
            *x = rng.random_range(-1.0..1.0);
        }
        xr
    }

    #[test]
    fn verify_intensity_ratio_tables() {
        assert_eq!(MPEG1_RATIOS[0], (0.0, 1.0));
        assert_eq!(MPEG1_RATIOS[6], (1.0, 0.0));
        // Position 3 pans to the center.
        assert!((MPEG1_RATIOS[3].0 - 0.5).abs() < 1e-6);
        assert!((MPEG1_RATIOS[3].1 - 0.5).abs() < 1e-6);

        for scale in 0..2 {
            assert_eq!(LSF_RATIOS[scale][0], (1.0, 1.0));
        }
        assert!((LSF_RATIOS[1][1].0 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((LSF_RATIOS[0][4].1 - 0.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn verify_intensity_position_zero_copies_channel_0() {
        let mut rng = SmallRng::seed_from_u64(0x1234);

        for version in [0b11, 0b10] {
            // Intensity only.
            let header = joint_header(version, 0b01);
            assert!(header.is_intensity_stereo());

            let granule: [ChannelInfo; 2] = [
                ChannelInfo { rzero: 576, ..Default::default() },
                ChannelInfo { rzero: 0, ..Default::default() },
            ];

            let mut xr0 = noise(&mut rng, 576);
            let mut xr1 = [0.0; SAMPLES_PER_GRANULE];
            let original = xr0;

            // The right channel is entirely zero, so every band is intensity coded at
            // position 0.
            stereo(&header, &granule, &NonZeroBands::default(), &mut xr0, &mut xr1);

            assert_eq!(xr1, original);

            if header.is_mpeg1() {
                assert!(xr0.iter().all(|&x| x == 0.0));
            }
            else {
                assert_eq!(xr0, original);
            }
        }
    }

    #[test]
    fn verify_intensity_starts_above_right_channel() {
        let header = joint_header(0b11, 0b01);

        let mut granule: [ChannelInfo; 2] = Default::default();
        // Position 6 pans fully left, position 7 is not intensity coded.
        granule[1].scalefacs[10] = 6;
        granule[1].scalefacs[11] = 7;

        let mut xr0 = [1.0; SAMPLES_PER_GRANULE];
        let mut xr1 = [0.0; SAMPLES_PER_GRANULE];

        // The right channel's last non-zero value is in band 9 (lines 44..52).
        xr1[50] = 0.5;
        let nonzero = NonZeroBands { long: Some(9), short: [None; 3] };

        stereo(&header, &granule, &nonzero, &mut xr0, &mut xr1);

        // Bands up to 9 are left untouched.
        assert!(xr0[..52].iter().all(|&x| x == 1.0));
        assert_eq!(xr1[50], 0.5);
        // Band 10 (lines 52..62) is panned left.
        assert!(xr0[52..62].iter().all(|&x| x == 1.0));
        assert!(xr1[52..62].iter().all(|&x| x == 0.0));
        // Band 11 (lines 62..74) keeps its left/right values.
        assert!(xr1[62..74].iter().all(|&x| x == 0.0));
        // Band 12 is at position 0, moved entirely right.
        assert!(xr0[74..90].iter().all(|&x| x == 0.0));
        assert!(xr1[74..90].iter().all(|&x| x == 1.0));
    }

    #[test]
    fn verify_mid_side() {
        let mut rng = SmallRng::seed_from_u64(0x5678);

        // Mid-side only.
        let header = joint_header(0b11, 0b10);

        let granule: [ChannelInfo; 2] = [
            ChannelInfo { rzero: 100, ..Default::default() },
            ChannelInfo { rzero: 200, ..Default::default() },
        ];

        let mut xr0 = noise(&mut rng, 100);
        let mut xr1 = noise(&mut rng, 200);
        let (mid, side) = (xr0, xr1);

        stereo(&header, &granule, &NonZeroBands::default(), &mut xr0, &mut xr1);

        for i in 0..SAMPLES_PER_GRANULE {
            assert_eq!(xr0[i], mid[i] + side[i]);
            assert_eq!(xr1[i], mid[i] - side[i]);
        }
    }

    #[test]
    fn verify_short_block_intensity_per_window() {
        let header = joint_header(0b11, 0b01);

        let mut granule: [ChannelInfo; 2] = Default::default();
        for channel in granule.iter_mut() {
            channel.block_type = BlockType::Short { is_mixed: false };
        }

        let mut xr0 = [1.0; SAMPLES_PER_GRANULE];
        let mut xr1 = [0.0; SAMPLES_PER_GRANULE];

        // Window 1 of short band 2 (lines 28..32) holds a right channel value.
        xr1[30] = 0.25;
        let nonzero = NonZeroBands { long: None, short: [None, Some(7), None] };

        stereo(&header, &granule, &nonzero, &mut xr0, &mut xr1);

        // Window 0 is intensity coded from band 0 at position 0.
        assert!(xr0[0..4].iter().all(|&x| x == 0.0));
        assert!(xr1[0..4].iter().all(|&x| x == 1.0));
        // Window 1 is untouched up to band 2.
        assert!(xr0[4..8].iter().all(|&x| x == 1.0));
        assert!(xr1[4..8].iter().all(|&x| x == 0.0));
        assert_eq!(xr1[30], 0.25);
        // And intensity coded above.
        assert!(xr1[40..44].iter().all(|&x| x == 1.0));
    }
}
