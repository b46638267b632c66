// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lazy_static::lazy_static;

use crate::common::{ChannelMode, Mode, SUBBANDS};
use crate::header::FrameHeader;

lazy_static! {
    /// Layer I and II scale factors, `2.0 * 2^(-i/3)`, from Table B.1 of ISO/IEC 11172-3. Index
    /// 63 is reserved and yields silence.
    pub static ref LAYER12_SCALEFACTORS: [f32; 64] = {
        let mut scalefactors = [0f32; 64];

        for (i, sf) in scalefactors.iter_mut().enumerate().take(63) {
            *sf = (2.0 * f64::powf(2.0, -(i as f64) / 3.0)) as f32;
        }

        scalefactors
    };
}

/// The first subband coded as a single signal for both channels. For all modes other than
/// Joint Stereo this is the number of subbands.
pub fn stereo_bound(header: &FrameHeader) -> usize {
    match header.channel_mode {
        ChannelMode::JointStereo(Mode::Intensity { bound }) => bound.min(SUBBANDS),
        _ => SUBBANDS,
    }
}
