// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Xing, Info, VBRI, and LAME tags stored in the first frame of a stream.

use std::fmt;

use log::debug;

use crate::header::{read_be_u32, FrameHeader, MPEG_HEADER_LEN};

/// The minimum number of bytes following a Xing or Info tag identifier.
const XING_TAG_MIN_LEN: usize = 120;

/// The length of the fixed part of a VBRI tag.
const VBRI_TAG_LEN: usize = 26;

/// The length of a LAME extension tag.
const LAME_TAG_LEN: usize = 36;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VbrTagKind {
    Xing,
    Info,
    Vbri,
}

impl VbrTagKind {
    fn as_str(&self) -> &'static str {
        match self {
            VbrTagKind::Xing => "Xing",
            VbrTagKind::Info => "Info",
            VbrTagKind::Vbri => "VBRI",
        }
    }
}

/// The LAME encoder extension following a Xing or Info tag.
#[derive(Clone, Debug, PartialEq)]
pub struct LameTag {
    pub encoder: String,
    pub revision: u8,
    pub vbr_method: u8,
    pub lowpass_hz: u32,
    pub peak: f32,
    pub radio_gain: u16,
    pub audiophile_gain: u16,
    pub encoding_flags: u8,
    /// ABR/CBR bit-rate, or the minimum VBR bit-rate, in kbps. 255 means 255 kbps or more.
    pub bitrate: u8,
    pub encoder_delay: u16,
    pub encoder_padding: u16,
    pub misc: u8,
    pub mp3_gain: i8,
    pub surround: u8,
    pub preset: u16,
    pub music_length: u32,
    pub music_crc: u16,
    pub tag_crc: u16,
}

/// Metadata parsed from a VBR tag frame.
#[derive(Clone, Debug, PartialEq)]
pub struct VbrInfo {
    pub kind: VbrTagKind,
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
    pub quality: Option<u32>,
    /// Raw table of contents bytes, `toc_number` entries of `toc_per` bytes each.
    pub toc: Vec<u8>,
    pub toc_number: u16,
    pub toc_per: u16,
    pub toc_factor: u16,
    /// VBRI only, the number of frames each TOC entry spans.
    pub toc_frames: u16,
    pub lame: Option<LameTag>,
}

#[inline(always)]
fn read_be_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([buf[pos], buf[pos + 1]])
}

/// Parse a VBR tag from `frame`, the complete first frame of a stream including its header.
///
/// A tag is only recognized when the side information is zeroed, as every known encoder writes
/// it. The first two bytes after the header are ignored since they may hold a CRC.
pub fn parse_vbr_tag(frame: &[u8], header: &FrameHeader) -> Option<VbrInfo> {
    let end = header.frame_size.min(frame.len());
    let side_info = MPEG_HEADER_LEN..MPEG_HEADER_LEN + header.side_info_size;

    if side_info.end + 4 > end {
        return None;
    }

    if frame[side_info.start..side_info.end].iter().skip(2).any(|&b| b != 0) {
        return None;
    }

    let mut pos = side_info.end;

    let mut info = match &frame[pos..pos + 4] {
        b"Xing" | b"Info" => {
            if end - pos < XING_TAG_MIN_LEN {
                return None;
            }
            let kind = if frame[pos] == b'X' { VbrTagKind::Xing } else { VbrTagKind::Info };
            read_xing_tag(frame, &mut pos, kind)
        }
        b"VBRI" => {
            if end - pos < VBRI_TAG_LEN {
                return None;
            }
            let mut info = read_vbri_tag(frame, &mut pos);
            let toc_len = usize::from(info.toc_number) * usize::from(info.toc_per);
            if end - pos < toc_len {
                return None;
            }
            info.toc = frame[pos..pos + toc_len].to_vec();
            pos += toc_len;
            info
        }
        _ => return None,
    };

    if end - pos >= LAME_TAG_LEN && frame[pos] != 0 {
        info.lame = Some(read_lame_tag(&frame[pos..pos + LAME_TAG_LEN]));
    }

    debug!("found {} tag", info.kind.as_str());

    Some(info)
}

fn read_xing_tag(frame: &[u8], pos: &mut usize, kind: VbrTagKind) -> VbrInfo {
    let flags = read_be_u32(frame, *pos + 4);
    *pos += 8;

    let next_u32 = |pos: &mut usize| {
        let value = read_be_u32(frame, *pos);
        *pos += 4;
        value
    };

    let frames = if flags & 0x1 != 0 { Some(next_u32(pos)) } else { None };
    let bytes = if flags & 0x2 != 0 { Some(next_u32(pos)) } else { None };

    let toc = if flags & 0x4 != 0 {
        let toc = frame[*pos..*pos + 100].to_vec();
        *pos += 100;
        toc
    }
    else {
        Vec::new()
    };

    let quality = if flags & 0x8 != 0 { Some(next_u32(pos)) } else { None };

    VbrInfo {
        kind,
        frames,
        bytes,
        quality,
        toc,
        toc_number: 100,
        toc_per: 1,
        toc_factor: 1,
        toc_frames: 0,
        lame: None,
    }
}

fn read_vbri_tag(frame: &[u8], pos: &mut usize) -> VbrInfo {
    let base = *pos;
    *pos += VBRI_TAG_LEN;

    // Skip the version and delay fields.
    VbrInfo {
        kind: VbrTagKind::Vbri,
        quality: Some(u32::from(read_be_u16(frame, base + 8))),
        bytes: Some(read_be_u32(frame, base + 10)),
        frames: Some(read_be_u32(frame, base + 14)),
        toc_number: read_be_u16(frame, base + 18),
        toc_factor: read_be_u16(frame, base + 20),
        toc_per: read_be_u16(frame, base + 22),
        toc_frames: read_be_u16(frame, base + 24),
        toc: Vec::new(),
        lame: None,
    }
}

fn read_lame_tag(tag: &[u8]) -> LameTag {
    let encoder = tag[0..9].iter().map(|&b| char::from(b)).collect::<String>();

    let delay_padding = (u32::from(tag[21]) << 16) | (u32::from(tag[22]) << 8) | u32::from(tag[23]);
    let preset_surround = read_be_u16(tag, 26);

    LameTag {
        encoder: encoder.trim_end_matches('\0').to_string(),
        revision: tag[9] >> 4,
        vbr_method: tag[9] & 0xf,
        lowpass_hz: u32::from(tag[10]) * 100,
        peak: f32::from_bits(read_be_u32(tag, 11)),
        radio_gain: read_be_u16(tag, 15),
        audiophile_gain: read_be_u16(tag, 17),
        encoding_flags: tag[19],
        bitrate: tag[20],
        encoder_delay: (delay_padding >> 12) as u16,
        encoder_padding: (delay_padding & 0xfff) as u16,
        misc: tag[24],
        mp3_gain: tag[25] as i8,
        surround: ((preset_surround >> 11) & 0x7) as u8,
        preset: preset_surround & 0x7ff,
        music_length: read_be_u32(tag, 28),
        music_crc: read_be_u16(tag, 32),
        tag_crc: read_be_u16(tag, 34),
    }
}

impl VbrInfo {
    /// Describe the bit-rate mode. `kbps` is the bit-rate of the tag frame.
    pub fn bitrate_mode(&self, kbps: u32) -> String {
        let lame = match &self.lame {
            Some(lame) => lame,
            None => return "VBR".to_string(),
        };

        match lame.vbr_method {
            1 | 8 => format!("CBR {}K", kbps),
            2 | 9 if lame.bitrate == 0xff => format!("ABR {}K+", lame.bitrate),
            2 | 9 => format!("ABR {}K", lame.bitrate),
            _ if lame.bitrate == 0 => "VBR".to_string(),
            _ => format!("VBR(min{}K)", lame.bitrate),
        }
    }

    /// Get the byte offset of `fraction` of `track_length` using the table of contents. Returns
    /// `None` if the tag has no usable table.
    pub fn seek_byte_for(&self, fraction: f64, track_length: u64) -> Option<u64> {
        match self.kind {
            VbrTagKind::Xing | VbrTagKind::Info => {
                if self.toc.len() < 100 {
                    return None;
                }

                let percent = (fraction * 100.0).clamp(0.0, 100.0);
                let idx = (percent as usize).min(99);

                let a = f64::from(self.toc[idx]);
                let b = if idx < 99 { f64::from(self.toc[idx + 1]) } else { 256.0 };
                let x = a + (b - a) * (percent - idx as f64);

                Some(((x / 256.0) * track_length as f64) as u64)
            }
            VbrTagKind::Vbri => {
                let per = usize::from(self.toc_per);
                let number = usize::from(self.toc_number);

                if per == 0 || per > 4 || number == 0 || self.toc.len() < per * number {
                    return None;
                }

                let entries = ((fraction * number as f64) as usize).min(number);

                let bytes = self.toc.chunks_exact(per).take(entries).fold(0u64, |acc, entry| {
                    let size = entry.iter().fold(0u64, |v, &b| (v << 8) | u64::from(b));
                    acc + size * u64::from(self.toc_factor)
                });

                Some(bytes.min(track_length))
            }
        }
    }
}

impl fmt::Display for VbrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   vbr header: {}", self.kind.as_str())?;

        if let Some(frames) = self.frames {
            write!(f, "\n track frames: {}", frames)?;
        }
        if let Some(bytes) = self.bytes {
            write!(f, "\n  track bytes: {}", bytes)?;
        }
        if let Some(quality) = self.quality {
            write!(f, "\n      quality: {}", quality)?;
        }
        if self.kind == VbrTagKind::Vbri {
            write!(f, "\n   toc frames: {}", self.toc_frames)?;
            write!(
                f,
                "\n          TOC: {} * {}, factor = {}",
                self.toc_number, self.toc_per, self.toc_factor
            )?;
        }

        if let Some(lame) = &self.lame {
            write!(f, "\n      encoder: {}", lame.encoder)?;
            write!(f, "\n      lowpass: {}Hz", lame.lowpass_hz)?;
            write!(f, "\n     revision: {}", lame.revision)?;
            write!(f, "\n        delay: {}, padding: {}", lame.encoder_delay, lame.encoder_padding)?;

            match lame.surround {
                1 => write!(f, "\n     surround: DPL")?,
                2 => write!(f, "\n     surround: DPL2")?,
                3 => write!(f, "\n     surround: Ambisonic")?,
                7 => write!(f, "\n     surround: invalid data")?,
                _ => (),
            }

            if lame.preset != 0 {
                write!(f, "\n       preset: {}", lame.preset)?;
            }
            if lame.mp3_gain != 0 {
                write!(
                    f,
                    "\n     MP3 Gain: {} [psa={},rrg={},arg={}]",
                    lame.mp3_gain, lame.peak, lame.radio_gain, lame.audiophile_gain
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{parse_frame_header, FrameSync};

    /// MPEG1 Layer III, 128 kbps, 44.1 kHz, mono.
    const MONO_HEADER: u32 = 0xfffb_90c4;

    fn tag_frame(tag: &[u8]) -> (FrameHeader, Vec<u8>) {
        let header = parse_frame_header(MONO_HEADER).unwrap();
        let mut frame = MONO_HEADER.to_be_bytes().to_vec();
        frame.resize(4 + header.side_info_size, 0);
        frame.extend_from_slice(tag);
        frame.resize(header.frame_size, 0);
        (header, frame)
    }

    fn xing_tag(frames: u32, bytes: u32, lame: Option<&[u8]>) -> Vec<u8> {
        let mut tag = b"Xing".to_vec();
        tag.extend_from_slice(&0xfu32.to_be_bytes());
        tag.extend_from_slice(&frames.to_be_bytes());
        tag.extend_from_slice(&bytes.to_be_bytes());
        tag.extend((0..100).map(|i| (i * 256 / 100) as u8));
        tag.extend_from_slice(&57u32.to_be_bytes());
        if let Some(lame) = lame {
            tag.extend_from_slice(lame);
        }
        tag
    }

    fn lame_tag(method: u8, bitrate: u8) -> Vec<u8> {
        let mut tag = b"LAME3.99r".to_vec();
        tag.push(method);
        tag.push(160);
        tag.extend_from_slice(&[0; 8]);
        tag.push(0);
        tag.push(bitrate);
        // Delay 576, padding 1152.
        tag.extend_from_slice(&[0x24, 0x04, 0x80]);
        tag.push(0);
        tag.push(0);
        tag.extend_from_slice(&[0x08, 0x01]);
        tag.extend_from_slice(&123_456u32.to_be_bytes());
        tag.extend_from_slice(&[0; 4]);
        tag
    }

    #[test]
    fn verify_xing_with_lame() {
        let (header, frame) = tag_frame(&xing_tag(1000, 400_000, Some(&lame_tag(0x03, 64))));
        let info = parse_vbr_tag(&frame, &header).unwrap();

        assert_eq!(info.kind, VbrTagKind::Xing);
        assert_eq!(info.frames, Some(1000));
        assert_eq!(info.bytes, Some(400_000));
        assert_eq!(info.quality, Some(57));
        assert_eq!(info.toc.len(), 100);

        let lame = info.lame.as_ref().unwrap();
        assert_eq!(lame.encoder, "LAME3.99r");
        assert_eq!(lame.lowpass_hz, 16_000);
        assert_eq!(lame.encoder_delay, 576);
        assert_eq!(lame.encoder_padding, 1152);
        assert_eq!(lame.surround, 1);
        assert_eq!(lame.preset, 1);
        assert_eq!(lame.music_length, 123_456);

        assert_eq!(info.bitrate_mode(128), "VBR(min64K)");
    }

    #[test]
    fn verify_bitrate_modes() {
        let (header, frame) = tag_frame(&xing_tag(1, 1, Some(&lame_tag(0x01, 128))));
        assert_eq!(parse_vbr_tag(&frame, &header).unwrap().bitrate_mode(128), "CBR 128K");

        let (header, frame) = tag_frame(&xing_tag(1, 1, Some(&lame_tag(0x02, 0xff))));
        assert_eq!(parse_vbr_tag(&frame, &header).unwrap().bitrate_mode(128), "ABR 255K+");

        let (header, frame) = tag_frame(&xing_tag(1, 1, None));
        assert_eq!(parse_vbr_tag(&frame, &header).unwrap().bitrate_mode(128), "VBR");
    }

    #[test]
    fn verify_side_info_must_be_zero() {
        let (header, mut frame) = tag_frame(&xing_tag(1, 1, None));
        frame[7] = 1;
        assert!(parse_vbr_tag(&frame, &header).is_none());

        // Possible CRC bytes are ignored.
        frame[7] = 0;
        frame[4] = 0xab;
        frame[5] = 0xcd;
        assert!(parse_vbr_tag(&frame, &header).is_some());
    }

    #[test]
    fn verify_vbri() {
        let mut tag = b"VBRI".to_vec();
        tag.extend_from_slice(&[0, 1, 0, 0]);
        tag.extend_from_slice(&75u16.to_be_bytes());
        tag.extend_from_slice(&80_000u32.to_be_bytes());
        tag.extend_from_slice(&200u32.to_be_bytes());
        // 4 entries, factor 10, 2 bytes each, 50 frames each.
        tag.extend_from_slice(&4u16.to_be_bytes());
        tag.extend_from_slice(&10u16.to_be_bytes());
        tag.extend_from_slice(&2u16.to_be_bytes());
        tag.extend_from_slice(&50u16.to_be_bytes());
        for _ in 0..4 {
            tag.extend_from_slice(&2000u16.to_be_bytes());
        }

        let (header, frame) = tag_frame(&tag);
        let info = parse_vbr_tag(&frame, &header).unwrap();

        assert_eq!(info.kind, VbrTagKind::Vbri);
        assert_eq!(info.quality, Some(75));
        assert_eq!(info.bytes, Some(80_000));
        assert_eq!(info.frames, Some(200));
        assert_eq!(info.toc.len(), 8);
        assert_eq!(info.seek_byte_for(0.5, 80_000), Some(40_000));
        assert!(info.lame.is_none());
    }

    #[test]
    fn verify_tag_updates_track_metadata() {
        let (_, frame) = tag_frame(&xing_tag(1000, 400_000, Some(&lame_tag(0x03, 64))));

        let mut buf = frame.clone();
        buf.extend_from_slice(&frame);

        let mut sync = FrameSync::new(1_000_000, 0.0);
        sync.sync(&buf, 0, buf.len()).unwrap();

        assert!(sync.is_tag_frame());
        assert_eq!(sync.track_frames(), 1000);
        // The LAME music length overrides the Xing byte count.
        assert_eq!(sync.track_length(), 123_456);
        assert!((sync.duration() - 1000.0 * 1152.0 / 44_100.0).abs() < 1e-6);

        // TOC entry 50 is 128, which is half of the track.
        assert_eq!(sync.seek_byte_for(0.5), 123_456 / 2);
    }
}
