// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::audio::AudioSink;
use mpadec_core::errors::{decode_error, Result};
use mpadec_core::io::bit::{BitReader, ReadBits};

use lazy_static::lazy_static;

use crate::common::SUBBANDS;
use crate::header::FrameHeader;
use crate::layer12::{stereo_bound, LAYER12_SCALEFACTORS};
use crate::output::OutputBuffer;
use crate::synthesis::{self, SynthesisState};

/// The number of 32 sample blocks in a Layer I frame.
const BLOCKS: usize = 12;

lazy_static! {
    /// `FACTOR[nb] = (2^nb / (2^nb - 1)) * 2^(1 - nb)` for sample widths of 2 to 16 bits.
    static ref FACTOR: [f32; 17] = {
        let mut factor = [0f32; 17];

        // Given the nb-bit sample with its most significant bit inverted, read as a two's
        // complement integer `a`, ISO/IEC 11172-3 dequantizes it as
        //
        //     (2^nb / (2^nb - 1)) * (a / 2^(nb - 1) + 2^(1 - nb))
        //
        // which factors into `FACTOR[nb] * (a + 1)`.
        for (nb, factor) in factor.iter_mut().enumerate().skip(2) {
            let levels = f64::from(1u32 << nb);
            *factor = (levels / (levels - 1.0) / (levels / 2.0)) as f32;
        }

        factor
    };
}

/// Dequantize the `bits` wide sample `raw`.
#[inline(always)]
fn dequantize(bits: u32, factor: f32, raw: u32) -> f32 {
    let inv = raw ^ (1 << (bits - 1));

    // Sign extend.
    let shift = 32 - bits;
    let a = ((inv << shift) as i32) >> shift;

    factor * (a + 1) as f32
}

/// Layer I decoder state: one synthesis filterbank per channel.
pub struct Layer1 {
    synthesis: [SynthesisState; 2],
    samples: [[f32; SUBBANDS * BLOCKS]; 2],
    pcm: [i16; SUBBANDS * BLOCKS],
}

impl Layer1 {
    pub fn new() -> Self {
        Layer1 {
            synthesis: Default::default(),
            samples: [[0.0; SUBBANDS * BLOCKS]; 2],
            pcm: [0; SUBBANDS * BLOCKS],
        }
    }

    /// Decode the frame payload following the header (and CRC) into `out`.
    pub fn decode(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        out: &mut OutputBuffer,
        sink: &mut dyn AudioSink,
    ) -> Result<()> {
        let mut bs = BitReader::new(payload);

        let n_channels = header.n_channels();
        let bound = stereo_bound(header);

        // A 0 allocation means the subband carries no samples, otherwise the sample width is
        // the allocation + 1 bits.
        let mut alloc = [[0u32; SUBBANDS]; 2];
        let mut scalefacs = [[0f32; SUBBANDS]; 2];

        for sb in 0..SUBBANDS {
            let shared = sb >= bound;

            for ch in 0..n_channels {
                if shared && ch > 0 {
                    alloc[ch][sb] = alloc[0][sb];
                    continue;
                }

                let bits = bs.read_bits(4);

                if bits == 0xf {
                    return decode_error("mp1: invalid bit allocation");
                }

                alloc[ch][sb] = if bits != 0 { bits + 1 } else { 0 };
            }
        }

        // Above the bound each channel still carries its own scale factor.
        for sb in 0..SUBBANDS {
            for ch in 0..n_channels {
                if alloc[ch][sb] != 0 {
                    scalefacs[ch][sb] = LAYER12_SCALEFACTORS[bs.read_bits(6) as usize];
                }
            }
        }

        let factor: &[f32; 17] = &FACTOR;

        for samples in self.samples.iter_mut() {
            samples.fill(0.0);
        }

        for s in 0..BLOCKS {
            for sb in 0..SUBBANDS {
                if sb < bound {
                    for ch in 0..n_channels {
                        let bits = alloc[ch][sb];

                        if bits != 0 {
                            let sample = dequantize(bits, factor[bits as usize], bs.read_bits(bits));
                            self.samples[ch][BLOCKS * sb + s] = scalefacs[ch][sb] * sample;
                        }
                    }
                }
                else {
                    let bits = alloc[0][sb];

                    if bits != 0 {
                        let sample = dequantize(bits, factor[bits as usize], bs.read_bits(bits));

                        for ch in 0..n_channels {
                            self.samples[ch][BLOCKS * sb + s] = scalefacs[ch][sb] * sample;
                        }
                    }
                }
            }
        }

        if bs.overrun() {
            return decode_error("mp1: frame payload is truncated");
        }

        for ch in 0..n_channels {
            synthesis::synthesis(&mut self.synthesis[ch], BLOCKS, &self.samples[ch], &mut self.pcm);
            out.write_channel(ch, &self.pcm);
        }

        out.commit(SUBBANDS * BLOCKS, sink)
    }

    /// Reset the filterbanks.
    pub fn reset(&mut self) {
        for state in self.synthesis.iter_mut() {
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mpadec_core::audio::{MemorySink, SignalSpec};

    use crate::header::parse_frame_header;
    use crate::header::tests::header_word;
    use crate::test_util::BitWriter;

    #[test]
    fn verify_dequantize() {
        // Two bit samples represent 3 levels.
        assert!((dequantize(2, FACTOR[2], 0b00) + 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(dequantize(2, FACTOR[2], 0b01), 0.0);
        assert!((dequantize(2, FACTOR[2], 0b10) - 2.0 / 3.0).abs() < 1e-6);

        // Four bit samples represent 15 levels.
        assert!((dequantize(4, FACTOR[4], 0b1110) - 14.0 / 15.0).abs() < 1e-6);
        assert!((dequantize(4, FACTOR[4], 0b0000) + 14.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn verify_invalid_allocation() {
        // 32 kbps mono, 44.1 kHz.
        let header = parse_frame_header(header_word(0b11, 0b11, 1, 0, 3)).unwrap();

        let mut bw = BitWriter::new();
        bw.write(0xf, 4);

        let mut sink = MemorySink::new();
        let mut out = OutputBuffer::new(1, header.pcm_size());
        let payload = bw.to_bytes(header.main_data_size);

        let result = Layer1::new().decode(&header, &payload, &mut out, &mut sink);
        assert!(result.is_err());
    }

    #[test]
    fn verify_intensity_subbands_use_own_scalefactors() {
        // 448 kbps joint stereo, 48 kHz, bound at subband 4.
        let header = parse_frame_header(header_word(0b11, 0b11, 14, 1, 1)).unwrap();
        assert_eq!(stereo_bound(&header), 4);

        let mut bw = BitWriter::new();
        // Below the bound each channel has an allocation, all 0 here.
        for _ in 0..4 {
            bw.write(0, 4).write(0, 4);
        }
        // Above the bound a single allocation; only subband 8 carries 4 bit samples.
        for sb in 4..32 {
            bw.write(if sb == 8 { 3 } else { 0 }, 4);
        }
        // Scale factors 0.5 and 0.25 for subband 8.
        bw.write(6, 6).write(9, 6);
        for s in 0..12 {
            bw.write([0b0000, 0b1110, 0b0100, 0b1010][s % 4], 4);
        }

        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(2, 48_000));

        let payload = bw.to_bytes(header.main_data_size);
        let mut out = OutputBuffer::new(2, header.pcm_size());
        let mut layer1 = Layer1::new();

        for _ in 0..3 {
            layer1.decode(&header, &payload, &mut out, &mut sink).unwrap();
        }

        let samples = sink.samples();
        assert_eq!(samples.len(), 3 * 384 * 2);

        let mut energy = 0i64;
        for frame in samples.chunks_exact(2) {
            let (l, r) = (i32::from(frame[0]), i32::from(frame[1]));
            assert!((l - 2 * r).abs() <= 2, "{} {}", l, r);
            energy += i64::from(l * l);
        }
        assert!(energy > 0);
    }

    #[test]
    fn verify_unallocated_frame_is_silent() {
        let header = parse_frame_header(header_word(0b11, 0b11, 1, 0, 3)).unwrap();

        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(1, 44_100));

        let payload = vec![0; header.main_data_size];
        let mut out = OutputBuffer::new(1, header.pcm_size());

        Layer1::new().decode(&header, &payload, &mut out, &mut sink).unwrap();

        let samples = sink.samples();
        assert_eq!(samples.len(), 384);
        assert!(samples.iter().all(|&s| s == 0));
    }
}
