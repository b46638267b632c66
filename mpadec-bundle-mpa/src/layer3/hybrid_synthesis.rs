// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Antialiasing, the IMDCT, and overlap-add of a granule channel.

use std::f64::consts::PI;

use lazy_static::lazy_static;

use crate::common::SAMPLES_PER_GRANULE;
use crate::header::FrameHeader;

use super::{partitions, BlockType, ChannelInfo};

lazy_static! {
    /// The 36 point IMDCT windows of the normal, start, and end block types.
    static ref LONG_WINDOWS: [[f32; 36]; 3] = {
        let long = |i: usize| (PI / 36.0 * (i as f64 + 0.5)).sin() as f32;
        let short = |i: usize| (PI / 12.0 * (i as f64 + 0.5)).sin() as f32;

        let mut windows = [[0f32; 36]; 3];

        for i in 0..36 {
            windows[0][i] = long(i);

            windows[1][i] = match i {
                0..=17 => long(i),
                18..=23 => 1.0,
                24..=29 => short(i - 18),
                _ => 0.0,
            };

            windows[2][i] = match i {
                0..=5 => 0.0,
                6..=11 => short(i - 6),
                12..=17 => 1.0,
                _ => long(i),
            };
        }

        windows
    };

    /// The 12 point IMDCT window of a short block.
    static ref SHORT_WINDOW: [f32; 12] = {
        let mut window = [0f32; 12];
        for (i, w) in window.iter_mut().enumerate() {
            *w = (PI / 12.0 * (i as f64 + 0.5)).sin() as f32;
        }
        window
    };

    /// `IMDCT12_COS[i][k] = cos(pi / 24 * (2i + 1 + 6) * (2k + 1))`.
    static ref IMDCT12_COS: [[f32; 6]; 12] = {
        let mut cos = [[0f32; 6]; 12];
        for (i, row) in cos.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = (PI / 24.0 * ((2 * i + 7) * (2 * k + 1)) as f64).cos() as f32;
            }
        }
        cos
    };

    /// `(cos, sin)` of `2pi * n * k / 9`, the twiddles between the two passes of 3 point DFTs
    /// making up a 9 point DFT. Indexed by `[n][k]`.
    static ref DFT9_TWIDDLE: [[(f32, f32); 3]; 3] = {
        let mut twiddle = [[(0f32, 0f32); 3]; 3];
        for (n, row) in twiddle.iter_mut().enumerate() {
            for (k, t) in row.iter_mut().enumerate() {
                let arg = 2.0 * PI * (n * k) as f64 / 9.0;
                *t = (arg.cos() as f32, arg.sin() as f32);
            }
        }
        twiddle
    };

    /// `(cos, sin)` of `pi * k / 18`, rotating the 9 point DFT onto the DCT-II.
    static ref DCT9_ROTATION: [(f32, f32); 9] = {
        let mut rotation = [(0f32, 0f32); 9];
        for (k, r) in rotation.iter_mut().enumerate() {
            let arg = PI * k as f64 / 18.0;
            *r = (arg.cos() as f32, arg.sin() as f32);
        }
        rotation
    };

    /// `2cos(pi * (2n + 1) / 36)`, twiddles of the odd half of the 18 point DCT-II.
    static ref DCT18_TWIDDLE: [f32; 9] = {
        let mut twiddle = [0f32; 9];
        for (n, t) in twiddle.iter_mut().enumerate() {
            *t = (2.0 * (PI * (2 * n + 1) as f64 / 36.0).cos()) as f32;
        }
        twiddle
    };

    /// `2cos(pi * (2n + 1) / 72)`, twiddles mapping the 18 point DCT-IV onto a DCT-II.
    static ref DCT_IV_TWIDDLE: [f32; 18] = {
        let mut twiddle = [0f32; 18];
        for (n, t) in twiddle.iter_mut().enumerate() {
            *t = (2.0 * (PI * (2 * n + 1) as f64 / 72.0).cos()) as f32;
        }
        twiddle
    };

    /// Antialias butterfly `(cs, ca)` coefficients. ISO/IEC 11172-3 table B.9.
    static ref ANTIALIAS: [(f32, f32); 8] = {
        const C: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

        let mut butterflies = [(0.0, 0.0); 8];
        for (b, &c) in butterflies.iter_mut().zip(C.iter()) {
            let norm = (1.0 + c * c).sqrt();
            *b = ((1.0 / norm) as f32, (c / norm) as f32);
        }
        butterflies
    };
}

/// Reorder the short block windows of `xr` from scale factor band order (each band stores its 3
/// windows one after another) into frequency order with the windows interleaved, so that each
/// group of 18 lines holds 6 frequencies of all 3 windows.
pub(super) fn reorder(
    header: &FrameHeader,
    channel: &ChannelInfo,
    xr: &mut [f32; SAMPLES_PER_GRANULE],
) {
    if !matches!(channel.block_type, BlockType::Short { .. }) {
        return;
    }

    let (bounds, switch) = partitions(header.sample_rate_idx, channel.block_type);

    let start = bounds[switch];

    let mut reordered = [0f32; SAMPLES_PER_GRANULE];
    let mut j = start;

    for band in bounds[switch..].windows(4).step_by(3) {
        for f in 0..band[1] - band[0] {
            for &window_start in &band[..3] {
                reordered[j] = xr[window_start + f];
                j += 1;
            }
        }
    }

    xr[start..j].copy_from_slice(&reordered[start..j]);
}

/// Reduce the aliasing between adjacent subbands of the long blocks of `xr`.
pub(super) fn antialias(channel: &ChannelInfo, xr: &mut [f32; SAMPLES_PER_GRANULE]) {
    let n_long = match channel.block_type {
        BlockType::Short { is_mixed: false } => return,
        // Only the boundary between the two long subbands.
        BlockType::Short { is_mixed: true } => 2,
        _ => 32,
    };

    let butterflies: &[(f32, f32); 8] = &ANTIALIAS;

    for sb in 1..n_long {
        let boundary = 18 * sb;

        for (i, &(cs, ca)) in butterflies.iter().enumerate() {
            let lower = xr[boundary - 1 - i];
            let upper = xr[boundary + i];

            xr[boundary - 1 - i] = lower * cs - upper * ca;
            xr[boundary + i] = upper * cs + lower * ca;
        }
    }
}

/// Transform each subband of `xr` to the time domain in place, overlap-adding with the
/// previous granule's tail held in `overlap`.
pub(super) fn hybrid_transform(
    channel: &ChannelInfo,
    overlap: &mut [[f32; 18]; 32],
    xr: &mut [f32; SAMPLES_PER_GRANULE],
) {
    let windows: &[[f32; 36]; 3] = &LONG_WINDOWS;

    let (n_long, window) = match channel.block_type {
        BlockType::Long => (32, &windows[0]),
        BlockType::Start => (32, &windows[1]),
        BlockType::End => (32, &windows[2]),
        // The long subbands of a mixed block use the normal window.
        BlockType::Short { is_mixed: true } => (2, &windows[0]),
        BlockType::Short { is_mixed: false } => (0, &windows[0]),
    };

    for (sb, (block, tail)) in xr.chunks_exact_mut(18).zip(overlap.iter_mut()).enumerate() {
        if sb < n_long {
            imdct36(block, window, tail);
        }
        else {
            imdct12(block, tail);
        }
    }
}

/// Negate the odd samples of the odd subbands, undoing the frequency inversion of the analysis
/// filterbank.
pub fn frequency_inversion(xr: &mut [f32; SAMPLES_PER_GRANULE]) {
    for block in xr.chunks_exact_mut(18).skip(1).step_by(2) {
        for x in block.iter_mut().skip(1).step_by(2) {
            *x = -*x;
        }
    }
}

/// 3 point DFT of complex values held as `(re, im)`.
#[inline(always)]
fn dft_3(a: [(f32, f32); 3]) -> [(f32, f32); 3] {
    const SIN_PI_3: f32 = 0.866_025_403_784_438_6;

    let (sr, si) = (a[1].0 + a[2].0, a[1].1 + a[2].1);
    let (dr, di) = (SIN_PI_3 * (a[1].0 - a[2].0), SIN_PI_3 * (a[1].1 - a[2].1));
    let (mr, mi) = (a[0].0 - 0.5 * sr, a[0].1 - 0.5 * si);

    [(a[0].0 + sr, a[0].1 + si), (mr + di, mi - dr), (mr - di, mi + dr)]
}

/// 9 point DCT-II, `y[k] = sum(x[n] * cos(pi * k * (2n + 1) / 18))`.
///
/// The input is permuted so that the DCT-II becomes the real part of a rotated 9 point DFT. The
/// DFT is then computed as 3 point DFTs over the columns, a twiddle, and 3 point DFTs over the
/// rows.
fn dct_ii_9(x: &[f32; 9]) -> [f32; 9] {
    let twiddle: &[[(f32, f32); 3]; 3] = &DFT9_TWIDDLE;
    let rotation: &[(f32, f32); 9] = &DCT9_ROTATION;

    // Even inputs in order, then odd inputs reversed.
    let v = [x[0], x[2], x[4], x[6], x[8], x[7], x[5], x[3], x[1]];

    let mut rows = [[(0f32, 0f32); 3]; 3];

    for n in 0..3 {
        let col = dft_3([(v[n], 0.0), (v[n + 3], 0.0), (v[n + 6], 0.0)]);

        for (k, &(re, im)) in col.iter().enumerate() {
            let (c, s) = twiddle[n][k];
            rows[k][n] = (re * c + im * s, im * c - re * s);
        }
    }

    let mut y = [0f32; 9];

    for (k1, row) in rows.iter().enumerate() {
        for (k2, &(re, im)) in dft_3(*row).iter().enumerate() {
            let k = k1 + 3 * k2;
            let (c, s) = rotation[k];
            y[k] = c * re + s * im;
        }
    }

    y
}

/// 18 point DCT-II as two 9 point DCT-IIs over the folded even and odd halves.
fn dct_ii_18(x: &[f32; 18]) -> [f32; 18] {
    let twiddle: &[f32; 9] = &DCT18_TWIDDLE;

    let mut even = [0f32; 9];
    let mut odd = [0f32; 9];

    for n in 0..9 {
        even[n] = x[n] + x[17 - n];
        odd[n] = twiddle[n] * (x[n] - x[17 - n]);
    }

    let even = dct_ii_9(&even);
    let odd = dct_ii_9(&odd);

    let mut y = [0f32; 18];

    for k in 0..9 {
        y[2 * k] = even[k];
    }

    // The odd outputs come out as sums of adjacent odd coefficients.
    y[1] = odd[0] / 2.0;
    for k in 1..9 {
        y[2 * k + 1] = odd[k] - y[2 * k - 1];
    }

    y
}

/// 18 point DCT-IV, `y[k] = sum(x[n] * cos(pi * (2k + 1) * (2n + 1) / 72))`.
fn dct_iv_18(x: &[f32]) -> [f32; 18] {
    let twiddle: &[f32; 18] = &DCT_IV_TWIDDLE;

    let mut v = [0f32; 18];
    for ((v, &x), &t) in v.iter_mut().zip(x).zip(twiddle.iter()) {
        *v = x * t;
    }

    let mut y = dct_ii_18(&v);

    y[0] /= 2.0;
    for k in 1..18 {
        y[k] -= y[k - 1];
    }

    y
}

/// 36 point IMDCT of one long block subband, windowed and overlap-added in place.
fn imdct36(x: &mut [f32], window: &[f32; 36], overlap: &mut [f32; 18]) {
    let c = dct_iv_18(x);

    // The IMDCT output is the DCT-IV output with odd symmetry around 9 and 27.
    let y = |i: usize| match i {
        0..=8 => c[i + 9],
        9..=26 => -c[26 - i],
        _ => -c[i - 27],
    };

    for i in 0..18 {
        x[i] = overlap[i] + y(i) * window[i];
        overlap[i] = y(i + 18) * window[i + 18];
    }
}

/// Three 12 point IMDCTs of one short block subband, windowed and overlap-added in place. The
/// subband holds the 3 windows interleaved.
fn imdct12(x: &mut [f32], overlap: &mut [f32; 18]) {
    let cos: &[[f32; 6]; 12] = &IMDCT12_COS;
    let window: &[f32; 12] = &SHORT_WINDOW;

    // The windows sit at offsets 6, 12, and 18 of the 36 sample block.
    let mut out = [0f32; 36];

    for w in 0..3 {
        for (i, row) in cos.iter().enumerate() {
            let y: f32 = row.iter().enumerate().map(|(k, c)| x[3 * k + w] * c).sum();
            out[6 + 6 * w + i] += y * window[i];
        }
    }

    for i in 0..18 {
        x[i] = overlap[i] + out[i];
        overlap[i] = out[i + 18];
    }
}
