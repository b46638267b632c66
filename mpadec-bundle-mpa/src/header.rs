// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use log::{debug, info};
use mpadec_core::errors::{decode_error, unsupported_error, Error, Result};

use crate::common::*;
use crate::vbr::{parse_vbr_tag, VbrInfo, VbrTagKind};

/// The length in bytes of a MPEG frame header word.
pub const MPEG_HEADER_LEN: usize = 4;

/// The maximum length in bytes of a MPEG audio frame including the header.
pub const MAX_MPEG_FRAME_SIZE: usize = 2881;

/// The mask for the 11 bit sync word.
const SYNC_MASK: u32 = 0xffe0_0000;

/// Bit-rate lookup table for MPEG version 1 layer 1.
const BIT_RATES_MPEG1_L1: [u32; 15] = [
    0, 32_000, 64_000, 96_000, 128_000, 160_000, 192_000, 224_000, 256_000, 288_000, 320_000,
    352_000, 384_000, 416_000, 448_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 2.
const BIT_RATES_MPEG1_L2: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000, 224_000,
    256_000, 320_000, 384_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 3.
const BIT_RATES_MPEG1_L3: [u32; 15] = [
    0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000,
    224_000, 256_000, 320_000,
];

/// Bit-rate lookup table for MPEG version 2 & 2.5 audio layer 1.
const BIT_RATES_MPEG2_L1: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 144_000, 160_000, 176_000,
    192_000, 224_000, 256_000,
];

/// Bit-rate lookup table for MPEG version 2 & 2.5 audio layers 2 & 3.
const BIT_RATES_MPEG2_L23: [u32; 15] = [
    0, 8_000, 16_000, 24_000, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000,
    128_000, 144_000, 160_000,
];

/// A parsed MPEG audio frame header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    /// Bit-rate in bits per second.
    pub bitrate: u32,
    pub bitrate_idx: u8,
    pub sample_rate: u32,
    /// Sample rate index `0..9` across all versions (44.1, 48, 32, 22.05, 24, 16, 11.025, 12, 8).
    pub sample_rate_idx: usize,
    pub channel_mode: ChannelMode,
    /// The raw 2 bit mode extension field.
    pub mode_extension: u8,
    pub emphasis: Emphasis,
    pub is_copyrighted: bool,
    pub is_original: bool,
    pub has_padding: bool,
    pub has_crc: bool,
    /// The total frame size in bytes, including the 4 byte header.
    pub frame_size: usize,
    /// Layer III side information size in bytes. Zero for layers I and II.
    pub side_info_size: usize,
    /// The number of bytes following the header, CRC, and side information.
    pub main_data_size: usize,
}

impl FrameHeader {
    /// Returns true if this a MPEG1 frame, false otherwise.
    #[inline(always)]
    pub fn is_mpeg1(&self) -> bool {
        self.version == MpegVersion::Mpeg1
    }

    /// Returns true if this a MPEG2.5 frame, false otherwise.
    #[inline(always)]
    pub fn is_mpeg2p5(&self) -> bool {
        self.version == MpegVersion::Mpeg2p5
    }

    /// Returns true for the low sampling frequency versions (MPEG2 and MPEG2.5).
    #[inline(always)]
    pub fn is_lsf(&self) -> bool {
        self.version != MpegVersion::Mpeg1
    }

    /// The bit-rate in kbps.
    #[inline(always)]
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate / 1000
    }

    /// Returns the number of granules in the frame.
    #[inline(always)]
    pub fn n_granules(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 2,
            _ => 1,
        }
    }

    /// Returns the number of channels per granule.
    #[inline(always)]
    pub fn n_channels(&self) -> usize {
        self.channel_mode.count()
    }

    /// Returns true if Intensity Stereo encoding is used, false otherwise.
    #[inline(always)]
    pub fn is_intensity_stereo(&self) -> bool {
        match self.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { .. }) => true,
            ChannelMode::JointStereo(Mode::Layer3 { intensity, .. }) => intensity,
            _ => false,
        }
    }

    /// Returns true if Mid-Side stereo encoding is used, false otherwise.
    #[inline(always)]
    pub fn is_mid_side(&self) -> bool {
        matches!(self.channel_mode, ChannelMode::JointStereo(Mode::Layer3 { mid_side: true, .. }))
    }

    /// The number of PCM samples per channel the frame decodes to.
    pub fn samples_per_frame(&self) -> usize {
        match self.layer {
            MpegLayer::Layer1 => 384,
            MpegLayer::Layer2 => 1152,
            MpegLayer::Layer3 => SAMPLES_PER_GRANULE * self.n_granules(),
        }
    }

    /// The number of bytes of interleaved 16 bit PCM the frame decodes to.
    pub fn pcm_size(&self) -> usize {
        self.samples_per_frame() * self.n_channels() * 2
    }

    /// The frame duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples_per_frame() as f64 / f64::from(self.sample_rate)
    }
}

/// Quickly check if a header word is a frame header candidate. `mask` selects the bits that
/// must be set, which once synchronized also pins the version, layer, and sample rate.
#[inline]
pub fn check_header(header: u32, mask: u32) -> bool {
    if header & mask != mask {
        return false;
    }
    // Version (0x1 is not allowed).
    if (header >> 19) & 0x3 == 0x1 {
        return false;
    }
    // Layer (0x0 is not allowed).
    if (header >> 17) & 0x3 == 0x0 {
        return false;
    }
    // Bitrate (free format and 0xf are not accepted).
    let bitrate_idx = (header >> 12) & 0xf;
    if bitrate_idx == 0x0 || bitrate_idx == 0xf {
        return false;
    }
    // Sample rate (0x3 is not allowed).
    if (header >> 10) & 0x3 == 0x3 {
        return false;
    }
    true
}

pub fn parse_frame_header(header: u32) -> Result<FrameHeader> {
    // The MPEG audio header is structured as follows:
    //
    // 0b1111_1111 0b111v_vlly 0brrrr_hhpx 0bmmmm_coee
    // where:
    //     vv   = version, ll = layer      , y = crc
    //     rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
    //     mmmm = mode   , c  = copyright  , o = original, ee = emphasis

    if header & SYNC_MASK != SYNC_MASK {
        return decode_error("mpa: missing sync word");
    }

    let version = match (header & 0x18_0000) >> 19 {
        0b00 => MpegVersion::Mpeg2p5,
        0b10 => MpegVersion::Mpeg2,
        0b11 => MpegVersion::Mpeg1,
        _ => return decode_error("mpa: invalid MPEG version"),
    };

    let layer = match (header & 0x6_0000) >> 17 {
        0b01 => MpegLayer::Layer3,
        0b10 => MpegLayer::Layer2,
        0b11 => MpegLayer::Layer1,
        _ => return decode_error("mpa: invalid MPEG layer"),
    };

    let bitrate_idx = ((header & 0xf000) >> 12) as u8;

    let bitrate = match (bitrate_idx, version, layer) {
        (0b0000, _, _) => return unsupported_error("mpa: free bit-rate is not supported"),
        (0b1111, _, _) => return decode_error("mpa: invalid bit-rate"),
        (i, MpegVersion::Mpeg1, MpegLayer::Layer1) => BIT_RATES_MPEG1_L1[usize::from(i)],
        (i, MpegVersion::Mpeg1, MpegLayer::Layer2) => BIT_RATES_MPEG1_L2[usize::from(i)],
        (i, MpegVersion::Mpeg1, MpegLayer::Layer3) => BIT_RATES_MPEG1_L3[usize::from(i)],
        (i, _, MpegLayer::Layer1) => BIT_RATES_MPEG2_L1[usize::from(i)],
        (i, _, _) => BIT_RATES_MPEG2_L23[usize::from(i)],
    };

    let (sample_rate, sample_rate_idx) = match ((header & 0xc00) >> 10, version) {
        (0b00, MpegVersion::Mpeg1) => (44_100, 0),
        (0b01, MpegVersion::Mpeg1) => (48_000, 1),
        (0b10, MpegVersion::Mpeg1) => (32_000, 2),
        (0b00, MpegVersion::Mpeg2) => (22_050, 3),
        (0b01, MpegVersion::Mpeg2) => (24_000, 4),
        (0b10, MpegVersion::Mpeg2) => (16_000, 5),
        (0b00, MpegVersion::Mpeg2p5) => (11_025, 6),
        (0b01, MpegVersion::Mpeg2p5) => (12_000, 7),
        (0b10, MpegVersion::Mpeg2p5) => (8_000, 8),
        _ => return decode_error("mpa: invalid sample rate"),
    };

    let mode_extension = ((header & 0x30) >> 4) as u8;

    let channel_mode = match (header & 0xc0) >> 6 {
        0b00 => ChannelMode::Stereo,
        0b10 => ChannelMode::DualMono,
        0b11 => ChannelMode::Mono,
        // Layer III joint stereo combines Mid-Side and Intensity Stereo per the mode extension.
        _ if layer == MpegLayer::Layer3 => ChannelMode::JointStereo(Mode::Layer3 {
            mid_side: mode_extension & 0x2 != 0x0,
            intensity: mode_extension & 0x1 != 0x0,
        }),
        // Layers I and II only support Intensity Stereo from the bound subband upwards.
        _ => ChannelMode::JointStereo(Mode::Intensity {
            bound: (1 + usize::from(mode_extension)) << 2,
        }),
    };

    // Some layer 2 channel and bit-rate combinations are not allowed.
    if layer == MpegLayer::Layer2 && version == MpegVersion::Mpeg1 {
        if channel_mode == ChannelMode::Mono {
            if matches!(bitrate, 224_000 | 256_000 | 320_000 | 384_000) {
                return decode_error("mpa: invalid Layer 2 bitrate for mono channel mode");
            }
        }
        else if matches!(bitrate, 32_000 | 48_000 | 56_000 | 80_000) {
            return decode_error("mpa: invalid Layer 2 bitrate for non-mono channel mode");
        }
    }

    let emphasis = match header & 0x3 {
        0b01 => Emphasis::Fifty15,
        0b11 => Emphasis::CcitJ17,
        _ => Emphasis::None,
    };

    let is_copyrighted = header & 0x8 != 0x0;
    let is_original = header & 0x4 != 0x0;
    let has_padding = header & 0x200 != 0;

    let has_crc = header & 0x1_0000 == 0;

    // Constants provided for size calculation in section ISO-11172 section 2.4.3.1.
    let factor = match layer {
        MpegLayer::Layer1 => 12,
        MpegLayer::Layer2 => 144,
        MpegLayer::Layer3 if version == MpegVersion::Mpeg1 => 144,
        MpegLayer::Layer3 => 72,
    };

    // For layers 2 & 3 a slot is 1 byte, however for layer 1 a slot is 4 bytes.
    let slot_size = match layer {
        MpegLayer::Layer1 => 4,
        _ => 1,
    };

    let frame_size_slots = (factor * bitrate / sample_rate) as usize + usize::from(has_padding);
    let frame_size = frame_size_slots * slot_size;

    let side_info_size = match (layer, version, channel_mode) {
        (MpegLayer::Layer3, MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
        (MpegLayer::Layer3, MpegVersion::Mpeg1, _) => 32,
        (MpegLayer::Layer3, _, ChannelMode::Mono) => 9,
        (MpegLayer::Layer3, _, _) => 17,
        _ => 0,
    };

    let overhead = MPEG_HEADER_LEN + side_info_size + if has_crc { 2 } else { 0 };

    if frame_size < overhead {
        return decode_error("mpa: frame too small for side information");
    }

    Ok(FrameHeader {
        version,
        layer,
        bitrate,
        bitrate_idx,
        sample_rate,
        sample_rate_idx,
        channel_mode,
        mode_extension,
        emphasis,
        is_copyrighted,
        is_original,
        has_padding,
        has_crc,
        frame_size,
        side_info_size,
        main_data_size: frame_size - overhead,
    })
}

#[inline(always)]
pub(crate) fn read_be_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// `FrameSync` locates consecutive frame headers within a byte window and tracks the stream
/// level metadata (frame count, duration, VBR tag) learned along the way.
pub struct FrameSync {
    header_mask: u32,
    synced: bool,
    offset: usize,
    frames: u64,
    resyncs: u64,
    track_length: u64,
    track_frames: u64,
    frame_duration: f64,
    duration: f64,
    first: Option<FrameHeader>,
    vbr: Option<VbrInfo>,
    tag_frame: bool,
}

impl Default for FrameSync {
    fn default() -> Self {
        FrameSync::new(0, 0.0)
    }
}

impl FrameSync {
    /// Create a new `FrameSync` for a track of `track_length` bytes lasting `duration` seconds.
    /// Either may be zero if unknown.
    pub fn new(track_length: u64, duration: f64) -> Self {
        FrameSync {
            header_mask: SYNC_MASK,
            synced: false,
            offset: 0,
            frames: 0,
            resyncs: 0,
            track_length,
            track_frames: 0,
            frame_duration: 0.0,
            duration,
            first: None,
            vbr: None,
            tag_frame: false,
        }
    }

    /// Reset all state, making the synchronizer reusable for another track.
    pub fn initialize(&mut self, track_length: u64, duration: f64) {
        *self = FrameSync::new(track_length, duration);
    }

    /// Search `buf[offset..limit)` for the next frame header.
    ///
    /// On success the header is returned and [`offset`](Self::offset) points past the header
    /// (and CRC, if present), where the frame's side information begins. On failure
    /// `Error::SyncLost` is returned and `offset` points at the first byte that must be kept
    /// for the next attempt once more bytes are available.
    pub fn sync(&mut self, buf: &[u8], offset: usize, limit: usize) -> Result<FrameHeader> {
        let limit = limit.min(buf.len());

        self.offset = offset;
        self.tag_frame = false;

        if offset + MPEG_HEADER_LEN >= limit {
            return Err(Error::SyncLost);
        }

        let mut pos = offset + MPEG_HEADER_LEN;
        let mut word = read_be_u32(buf, offset);

        let header = loop {
            if !check_header(word, self.header_mask) {
                if pos >= limit {
                    self.fail_at(pos - MPEG_HEADER_LEN, offset);
                    return Err(Error::SyncLost);
                }
                word = (word << 8) | u32::from(buf[pos]);
                pos += 1;
                continue;
            }

            let start = pos - MPEG_HEADER_LEN;

            if start > offset && self.synced {
                debug!("lost sync, skipped {} bytes", start - offset);
                self.synced = false;
                self.resyncs += 1;
            }

            let header = match parse_frame_header(word) {
                Ok(header) => header,
                Err(_) => {
                    // Possibly a valid header word, but not a decodable header.
                    if pos >= limit {
                        self.fail_at(start, offset);
                        return Err(Error::SyncLost);
                    }
                    word = (word << 8) | u32::from(buf[pos]);
                    pos += 1;
                    continue;
                }
            };

            // The whole frame must be buffered.
            if start + header.frame_size > limit {
                self.offset = start;
                return Err(Error::SyncLost);
            }

            if !self.synced {
                // Confirm this header with the header of the frame that follows it.
                if start + header.frame_size + MPEG_HEADER_LEN > limit {
                    self.offset = start;
                    return Err(Error::SyncLost);
                }

                let mask = SYNC_MASK | (word & 0x18_0000) | (word & 0x6_0000) | (word & 0xc00);
                let next = read_be_u32(buf, start + header.frame_size);

                if !check_header(next, mask) {
                    if pos >= limit {
                        self.fail_at(start, offset);
                        return Err(Error::SyncLost);
                    }
                    word = (word << 8) | u32::from(buf[pos]);
                    pos += 1;
                    continue;
                }

                if self.first.is_none() {
                    self.header_mask = mask;
                    self.on_first_frame(&header, &buf[start..start + header.frame_size]);
                }

                self.synced = true;
            }

            break header;
        };

        self.offset = pos + if header.has_crc { 2 } else { 0 };
        self.frames += 1;

        Ok(header)
    }

    fn fail_at(&mut self, keep_from: usize, offset: usize) {
        if keep_from > offset {
            self.synced = false;
        }
        self.offset = keep_from;
    }

    fn on_first_frame(&mut self, header: &FrameHeader, frame: &[u8]) {
        self.track_frames = self.track_length / header.frame_size as u64;

        self.vbr = parse_vbr_tag(frame, header);

        if let Some(vbr) = &self.vbr {
            self.tag_frame = true;

            match vbr.kind {
                VbrTagKind::Xing | VbrTagKind::Info => {
                    // The tag frame carries no audio.
                    self.track_length = self.track_length.saturating_sub(header.frame_size as u64);
                }
                VbrTagKind::Vbri => (),
            }

            if let Some(frames) = vbr.frames {
                self.track_frames = u64::from(frames);
            }
            if let Some(bytes) = vbr.bytes {
                self.track_length = u64::from(bytes);
            }
            if let Some(music_length) = vbr.lame.as_ref().map(|lame| lame.music_length) {
                if music_length != 0 {
                    self.track_length = u64::from(music_length);
                }
            }
        }

        self.frame_duration = header.duration();

        if self.track_frames == 0 && self.frame_duration > 0.0 {
            self.track_frames = (self.duration / self.frame_duration) as u64;
        }
        if self.track_length == 0 {
            self.track_length = self.track_frames * header.frame_size as u64;
        }

        self.duration = self.frame_duration * self.track_frames as f64;
        self.first = Some(*header);

        info!("synchronized: {}", header_summary(header, self));
    }

    /// The buffer position following the last successful or failed search.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True if the last successful search found a header confirmed by its successor.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// True if the frame last returned carries a VBR tag rather than audio.
    pub fn is_tag_frame(&self) -> bool {
        self.tag_frame
    }

    /// The number of frames located so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The number of times synchronization had to be re-established.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// The number of audio bytes in the track.
    pub fn track_length(&self) -> u64 {
        self.track_length
    }

    /// The number of frames in the track, if known.
    pub fn track_frames(&self) -> u64 {
        self.track_frames
    }

    /// The duration of a single frame in seconds.
    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// The playback time in seconds of the frames located so far.
    pub fn elapsed(&self) -> f64 {
        self.frames as f64 * self.frame_duration
    }

    /// The duration of the track in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The first confirmed frame header.
    pub fn first_header(&self) -> Option<&FrameHeader> {
        self.first.as_ref()
    }

    /// The VBR tag found in the first frame, if any.
    pub fn vbr_info(&self) -> Option<&VbrInfo> {
        self.vbr.as_ref()
    }

    /// A one line description of the stream, for example
    /// `MPEG-1, Layer 3, 44100Hz, 128K, Joint Stereo(M/S), 03:25`.
    pub fn summary(&self) -> Option<String> {
        self.first.as_ref().map(|header| header_summary(header, self))
    }

    /// A progress line showing the current frame, a bar, and the elapsed time.
    pub fn progress(&self) -> String {
        const BAR_LEN: usize = 40;

        let done = match self.track_frames {
            0 => 0,
            total => ((self.frames.min(total) * BAR_LEN as u64) / total) as usize,
        };

        let mut bar = String::with_capacity(BAR_LEN + 1);
        bar.extend(std::iter::repeat('=').take(done));
        bar.push('>');
        bar.extend(std::iter::repeat('-').take(BAR_LEN - done));

        let elapsed = self.elapsed();
        let minutes = (elapsed / 60.0) as u64;
        let seconds = elapsed - (minutes * 60) as f64;

        format!("#{:<5} [{}] {:02}:{:05.2}", self.frames, bar, minutes, seconds)
    }

    /// Get the byte position, relative to the start of the audio data, at which playback of
    /// `fraction` (`0.0..=1.0`) of the track begins.
    pub fn seek_byte_for(&self, fraction: f64) -> u64 {
        let fraction = fraction.clamp(0.0, 1.0);

        match &self.vbr {
            Some(vbr) => match vbr.seek_byte_for(fraction, self.track_length) {
                Some(pos) => pos,
                None => (fraction * self.track_length as f64) as u64,
            },
            None => (fraction * self.track_length as f64) as u64,
        }
    }
}

fn header_summary(header: &FrameHeader, sync: &FrameSync) -> String {
    let version = match header.version {
        MpegVersion::Mpeg1 => "1",
        MpegVersion::Mpeg2 => "2",
        MpegVersion::Mpeg2p5 => "2.5",
    };

    let bitrate = match sync.vbr.as_ref() {
        Some(vbr) => vbr.bitrate_mode(header.bitrate_kbps()),
        None => format!("{}K", header.bitrate_kbps()),
    };

    let mode = match header.channel_mode {
        ChannelMode::Stereo => "Stereo",
        ChannelMode::JointStereo(Mode::Layer3 { mid_side, intensity }) => {
            match (intensity, mid_side) {
                (true, true) => "Joint Stereo(I/S & M/S)",
                (true, false) => "Joint Stereo(I/S)",
                (false, true) => "Joint Stereo(M/S)",
                (false, false) => "Joint Stereo",
            }
        }
        ChannelMode::JointStereo(Mode::Intensity { .. }) => "Joint Stereo(I/S)",
        ChannelMode::DualMono => "Dual channel",
        ChannelMode::Mono => "Single channel(Mono)",
    };

    let minutes = (sync.duration / 60.0) as u64;
    let seconds = (sync.duration - (minutes * 60) as f64 + 0.5) as u64;

    format!(
        "MPEG-{}, Layer {}, {}Hz, {}, {}, {:02}:{:02}",
        version,
        header.layer.number(),
        header.sample_rate,
        bitrate,
        mode,
        minutes,
        seconds
    )
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?}, {} bps, {} Hz, {:?}, {} bytes",
            self.version, self.layer, self.bitrate, self.sample_rate, self.channel_mode, self.frame_size
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    /// Build a header word for MPEG1 (version 0b11), the given layer bits, bit-rate and sample
    /// rate indicies, and channel mode bits, without CRC.
    pub fn header_word(version: u32, layer: u32, bitrate_idx: u32, sr_idx: u32, mode: u32) -> u32 {
        0xffe0_0000
            | (version << 19)
            | (layer << 17)
            | 0x1_0000
            | (bitrate_idx << 12)
            | (sr_idx << 10)
            | (mode << 6)
    }

    /// Build a stream of `count` frames with the given header and zeroed payloads.
    pub fn frame_stream(word: u32, count: usize) -> Vec<u8> {
        let header = parse_frame_header(word).unwrap();
        let mut buf = Vec::new();
        for _ in 0..count {
            buf.extend_from_slice(&word.to_be_bytes());
            buf.resize(buf.len() + header.frame_size - 4, 0);
        }
        buf
    }

    #[test]
    fn verify_mpeg1_layer3_header() {
        // 128 kbps, 44.1 kHz, joint stereo with M/S.
        let header = parse_frame_header(header_word(0b11, 0b01, 9, 0, 1) | 0x20).unwrap();

        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.layer, MpegLayer::Layer3);
        assert_eq!(header.bitrate, 128_000);
        assert_eq!(header.sample_rate, 44_100);
        assert_eq!(header.frame_size, 417);
        assert_eq!(header.side_info_size, 32);
        assert_eq!(header.main_data_size, 417 - 4 - 32);
        assert!(header.is_mid_side());
        assert!(!header.is_intensity_stereo());
        assert_eq!(header.samples_per_frame(), 1152);
        assert_eq!(header.pcm_size(), 1152 * 2 * 2);
    }

    #[test]
    fn verify_reject_invalid_headers() {
        // Reserved version.
        assert!(parse_frame_header(header_word(0b01, 0b01, 9, 0, 0)).is_err());
        // Reserved layer.
        assert!(parse_frame_header(header_word(0b11, 0b00, 9, 0, 0)).is_err());
        // Bad bit-rate.
        assert!(parse_frame_header(header_word(0b11, 0b01, 15, 0, 0)).is_err());
        // Free format.
        assert!(matches!(
            parse_frame_header(header_word(0b11, 0b01, 0, 0, 0)),
            Err(Error::Unsupported(_))
        ));
        // Reserved sample rate.
        assert!(parse_frame_header(header_word(0b11, 0b01, 9, 3, 0)).is_err());
        // Layer II, 32 kbps is not allowed for stereo and 384 kbps is not allowed for mono.
        assert!(parse_frame_header(header_word(0b11, 0b10, 1, 0, 0)).is_err());
        assert!(parse_frame_header(header_word(0b11, 0b10, 14, 0, 3)).is_err());
        assert!(parse_frame_header(header_word(0b11, 0b10, 14, 0, 0)).is_ok());
    }

    #[test]
    fn verify_frame_size_matches_bitrate() {
        for version in [0b00, 0b10, 0b11] {
            for layer in [0b01, 0b10, 0b11] {
                for bitrate_idx in 1..15 {
                    for sr_idx in 0..3 {
                        for padding in [0, 0x200] {
                            let mode = if layer == 0b10 && bitrate_idx < 6 { 3 } else { 0 };
                            let word = header_word(version, layer, bitrate_idx, sr_idx, mode)
                                | padding;

                            let header = match parse_frame_header(word) {
                                Ok(header) => header,
                                Err(_) => continue,
                            };

                            let slot = if header.layer == MpegLayer::Layer1 { 4 } else { 1 };
                            let exact = f64::from(header.bitrate)
                                * header.samples_per_frame() as f64
                                / f64::from(header.sample_rate)
                                / 8.0;

                            let diff = header.frame_size as f64 - exact;
                            assert!(diff > -(slot as f64) && diff <= slot as f64, "{}", header);

                            let crc = if header.has_crc { 2 } else { 0 };
                            assert_eq!(
                                header.frame_size,
                                4 + crc + header.side_info_size + header.main_data_size
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn verify_sync_consecutive_frames() {
        let word = header_word(0b11, 0b01, 9, 0, 3);
        let buf = frame_stream(word, 4);

        let mut sync = FrameSync::new(buf.len() as u64, 0.0);

        let header = sync.sync(&buf, 0, buf.len()).unwrap();
        assert_eq!(header.frame_size, 417);
        assert_eq!(sync.offset(), 4);
        assert!(sync.is_synced());

        let header = sync.sync(&buf, 417, buf.len()).unwrap();
        assert_eq!(sync.offset(), 417 + 4);
        assert_eq!(header.bitrate, 128_000);

        assert_eq!(sync.frames(), 2);
        assert_eq!(sync.track_frames(), 4);
        assert!((sync.duration() - 4.0 * 1152.0 / 44_100.0).abs() < 1e-9);
    }

    #[test]
    fn verify_sync_needs_successor() {
        let word = header_word(0b11, 0b01, 9, 0, 3);
        let buf = frame_stream(word, 1);

        // A lone frame can not be confirmed.
        let mut sync = FrameSync::default();
        assert!(matches!(sync.sync(&buf, 0, buf.len()), Err(Error::SyncLost)));
        assert_eq!(sync.offset(), 0);
    }

    #[test]
    fn verify_sync_skips_garbage_and_false_sync() {
        let word = header_word(0b11, 0b01, 9, 0, 3);
        let frames = frame_stream(word, 3);

        // A false sync word with a plausible header, followed by junk.
        let mut buf = vec![0x00, 0x12, 0xff, 0xfb, 0x90, 0xc4, 0x01, 0x02];
        buf.extend_from_slice(&frames);

        let mut sync = FrameSync::default();
        let header = sync.sync(&buf, 0, buf.len()).unwrap();
        assert_eq!(header.frame_size, 417);
        assert_eq!(sync.offset(), 8 + 4);
    }

    #[test]
    fn verify_sync_on_noise_finds_nothing() {
        let mut rng = SmallRng::seed_from_u64(0x6d70_6164);

        // Noise without any 0xff byte can never contain a sync word.
        let buf: Vec<u8> = (0..65_536).map(|_| rng.random_range(0..0xffu8)).collect();

        let mut sync = FrameSync::default();
        assert!(sync.sync(&buf, 0, buf.len()).is_err());
        assert_eq!(sync.frames(), 0);
        assert!(sync.offset() <= buf.len());

        // Random noise with sync words rarely yields confirmed frames, and never panics.
        let buf: Vec<u8> = (0..65_536).map(|_| rng.random()).collect();
        let mut pos = 0;
        while let Ok(header) = sync.sync(&buf, pos, buf.len()) {
            assert!(sync.offset() > pos);
            pos = sync.offset() + header.frame_size - 4;
        }
    }

    #[test]
    fn verify_summary_and_progress() {
        let word = header_word(0b11, 0b01, 9, 0, 1) | 0x20;
        let buf = frame_stream(word, 4);

        let mut sync = FrameSync::new(0, 205.0);
        sync.sync(&buf, 0, buf.len()).unwrap();

        let summary = sync.summary().unwrap();
        assert!(summary.starts_with("MPEG-1, Layer 3, 44100Hz, 128K, Joint Stereo(M/S), "));

        let progress = sync.progress();
        assert!(progress.starts_with("#1     ["));
        assert!(progress.ends_with("00:00.03"));
    }

    #[test]
    fn verify_linear_seek_without_tag() {
        let word = header_word(0b11, 0b01, 9, 0, 3);
        let buf = frame_stream(word, 4);

        let mut sync = FrameSync::new(4170, 0.0);
        sync.sync(&buf, 0, buf.len()).unwrap();

        assert_eq!(sync.seek_byte_for(0.5), 2085);
        assert_eq!(sync.seek_byte_for(2.0), 4170);
    }
}
