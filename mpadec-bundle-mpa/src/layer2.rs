// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::audio::AudioSink;
use mpadec_core::errors::{decode_error, Result};
use mpadec_core::io::bit::{BitReader, ReadBits};

use crate::common::SUBBANDS;
use crate::header::FrameHeader;
use crate::layer12::{stereo_bound, LAYER12_SCALEFACTORS};
use crate::output::OutputBuffer;
use crate::synthesis::{self, SynthesisState};

/// The number of granules of 3 samples per subband in a Layer II frame.
const GRANULES: usize = 12;

/// The number of samples per subband in a Layer II frame.
const SAMPLES: usize = 3 * GRANULES;

/// Quantization classes indexed by the allocation code of a subband. Classes 1 through 16 code
/// each sample with that many bits (`2^bits - 1` levels). Classes 17, 18, and 19 code 3 samples
/// with a single 5, 7, or 10 bit word of 3, 5, or 9 levels.
#[rustfmt::skip]
const QUANT_CLASSES: [[u8; 16]; 6] = [
    // ISO/IEC 11172-3 Table B.2a-b, subbands 0 to 2.
    [0, 17,  3,  4,  5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
    // Table B.2a-b, subbands 3 to 10.
    [0, 17, 18,  3, 19, 4, 5, 6, 7,  8,  9, 10, 11, 12, 13, 16],
    // Table B.2a-b, subbands 11 to 22.
    [0, 17, 18,  3, 19, 4, 5, 16, 0, 0, 0, 0, 0, 0, 0, 0],
    // Table B.2a-b, subbands 23 to 29.
    [0, 17, 18, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    // Table B.2c-d, and ISO/IEC 13818-3 Table B.1 subbands 4 to 29.
    [0, 17, 18, 19,  4, 5, 6, 7, 8,  9, 10, 11, 12, 13, 14, 15],
    // ISO/IEC 13818-3 Table B.1, subbands 0 to 3.
    [0, 17, 18,  3, 19, 4, 5, 6, 7,  8,  9, 10, 11, 12, 13, 14],
];

/// A run of consecutive subbands sharing an allocation field width and quantization classes.
#[derive(Copy, Clone)]
struct AllocGroup {
    classes: usize,
    nbal: u32,
    count: usize,
}

const fn group(classes: usize, nbal: u32, count: usize) -> AllocGroup {
    AllocGroup { classes, nbal, count }
}

/// MPEG-1 at 56 kbps per channel and up (Tables B.2a and B.2b).
const ALLOC_HIGH_RATE: [AllocGroup; 4] =
    [group(0, 4, 3), group(1, 4, 8), group(2, 3, 12), group(3, 2, 7)];

/// MPEG-1 below 56 kbps per channel (Tables B.2c and B.2d).
const ALLOC_LOW_RATE: [AllocGroup; 2] = [group(4, 4, 2), group(4, 3, 10)];

/// MPEG-2 and MPEG-2.5 low sample rates.
const ALLOC_LSF: [AllocGroup; 3] = [group(5, 4, 4), group(4, 3, 7), group(4, 2, 19)];

/// The allocation table for a frame and its subband limit.
fn alloc_table(header: &FrameHeader) -> (&'static [AllocGroup], usize) {
    if !header.is_mpeg1() {
        return (&ALLOC_LSF[..], 30);
    }

    let kbps = header.bitrate_kbps() / header.n_channels() as u32;

    if kbps < 56 {
        // 32 kHz uses the wider Table B.2d.
        let sblimit = if header.sample_rate == 32_000 { 12 } else { 8 };
        (&ALLOC_LOW_RATE[..], sblimit)
    }
    else if kbps >= 96 && header.sample_rate != 48_000 {
        (&ALLOC_HIGH_RATE[..], 30)
    }
    else {
        (&ALLOC_HIGH_RATE[..], 27)
    }
}

/// Dequantize the code `c` of a quantizer with `levels` levels into `-1.0..1.0`.
#[inline(always)]
fn dequantize(c: u32, levels: u32) -> f32 {
    (2 * c as i32 + 1 - levels as i32) as f32 / levels as f32
}

/// Read the 3 consecutive samples of a subband in one granule for quantization class `class`.
fn read_triple<B: ReadBits>(bs: &mut B, class: u8) -> [f32; 3] {
    match class {
        17..=19 => {
            let (levels, bits) = match class {
                17 => (3, 5),
                18 => (5, 7),
                _ => (9, 10),
            };

            let mut code = bs.read_bits(bits);
            let mut triple = [0f32; 3];

            for sample in triple.iter_mut() {
                *sample = dequantize(code % levels, levels);
                code /= levels;
            }

            triple
        }
        _ => {
            let bits = u32::from(class);
            let levels = (1 << bits) - 1;
            [
                dequantize(bs.read_bits(bits), levels),
                dequantize(bs.read_bits(bits), levels),
                dequantize(bs.read_bits(bits), levels),
            ]
        }
    }
}

/// Layer II decoder state: one synthesis filterbank per channel.
pub struct Layer2 {
    synthesis: [SynthesisState; 2],
    samples: [[f32; SUBBANDS * SAMPLES]; 2],
    pcm: [i16; SUBBANDS * SAMPLES],
}

impl Layer2 {
    pub fn new() -> Self {
        Layer2 {
            synthesis: Default::default(),
            samples: [[0.0; SUBBANDS * SAMPLES]; 2],
            pcm: [0; SUBBANDS * SAMPLES],
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
        self.read_samples(header, payload)?;

        for ch in 0..header.n_channels() {
            synthesis::synthesis(&mut self.synthesis[ch], SAMPLES, &self.samples[ch], &mut self.pcm);
            out.write_channel(ch, &self.pcm);
        }

        out.commit(SUBBANDS * SAMPLES, sink)
    }

    /// Read and dequantize the subband samples of one frame.
    fn read_samples(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        let mut bs = BitReader::new(payload);

        let n_channels = header.n_channels();
        let (table, sblimit) = alloc_table(header);
        let bound = stereo_bound(header).min(sblimit);

        // Quantization class of each subband, 0 if not allocated.
        let mut classes = [[0u8; SUBBANDS]; 2];

        let mut sb = 0;
        for group in table {
            for _ in 0..group.count {
                if sb >= sblimit {
                    break;
                }

                for ch in 0..n_channels {
                    classes[ch][sb] = if sb >= bound && ch > 0 {
                        classes[0][sb]
                    }
                    else {
                        QUANT_CLASSES[group.classes][bs.read_bits(group.nbal) as usize]
                    };
                }

                sb += 1;
            }
        }

        // Scale factor selection information.
        let mut scfsi = [[0u32; SUBBANDS]; 2];

        for sb in 0..sblimit {
            for ch in 0..n_channels {
                if classes[ch][sb] != 0 {
                    scfsi[ch][sb] = bs.read_bits(2);
                }
            }
        }

        // One scale factor for each third of the frame.
        let mut scalefacs = [[[0f32; 3]; SUBBANDS]; 2];

        for sb in 0..sblimit {
            for ch in 0..n_channels {
                if classes[ch][sb] == 0 {
                    continue;
                }

                let sf = &mut scalefacs[ch][sb];
                let mut read = || LAYER12_SCALEFACTORS[bs.read_bits(6) as usize];

                match scfsi[ch][sb] {
                    0 => {
                        sf[0] = read();
                        sf[1] = read();
                        sf[2] = read();
                    }
                    1 => {
                        sf[0] = read();
                        sf[1] = sf[0];
                        sf[2] = read();
                    }
                    2 => {
                        sf[0] = read();
                        sf[1] = sf[0];
                        sf[2] = sf[0];
                    }
                    _ => {
                        sf[0] = read();
                        sf[1] = read();
                        sf[2] = sf[1];
                    }
                }
            }
        }

        for samples in self.samples.iter_mut() {
            samples.fill(0.0);
        }

        for gr in 0..GRANULES {
            let part = gr / 4;

            for sb in 0..sblimit {
                for ch in 0..n_channels {
                    let class = classes[ch][sb];

                    if class == 0 || (sb >= bound && ch > 0) {
                        continue;
                    }

                    let triple = read_triple(&mut bs, class);

                    // Above the bound the samples are shared, but each channel keeps its own
                    // scale factors.
                    let last = if sb >= bound { n_channels } else { ch + 1 };

                    for dst in ch..last {
                        let scale = scalefacs[dst][sb][part];
                        let start = SAMPLES * sb + 3 * gr;

                        for (out, &s) in self.samples[dst][start..start + 3].iter_mut().zip(&triple) {
                            *out = scale * s;
                        }
                    }
                }
            }
        }

        if bs.overrun() {
            return decode_error("mp2: frame payload is truncated");
        }

        Ok(())
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
    fn verify_alloc_table_selection() {
        // 128 kbps mono at 44.1 kHz uses Table B.2b.
        let header = parse_frame_header(header_word(0b11, 0b10, 8, 0, 3)).unwrap();
        assert_eq!(alloc_table(&header).1, 30);

        // 128 kbps stereo at 44.1 kHz is 64 kbps per channel, Table B.2a.
        let header = parse_frame_header(header_word(0b11, 0b10, 8, 0, 0)).unwrap();
        assert_eq!(alloc_table(&header).1, 27);

        // 192 kbps mono at 48 kHz is always Table B.2a.
        let header = parse_frame_header(header_word(0b11, 0b10, 10, 1, 3)).unwrap();
        assert_eq!(alloc_table(&header).1, 27);

        // 64 kbps stereo at 32 kHz uses Table B.2d, at 44.1 kHz Table B.2c.
        let header = parse_frame_header(header_word(0b11, 0b10, 4, 2, 0)).unwrap();
        assert_eq!(alloc_table(&header).1, 12);
        let header = parse_frame_header(header_word(0b11, 0b10, 4, 0, 0)).unwrap();
        assert_eq!(alloc_table(&header).1, 8);

        // Low sample rates.
        let header = parse_frame_header(header_word(0b10, 0b10, 8, 0, 0)).unwrap();
        assert_eq!(alloc_table(&header).1, 30);

        // The groups of every table cover at least the subband limit.
        for table in [&ALLOC_HIGH_RATE[..], &ALLOC_LOW_RATE[..], &ALLOC_LSF[..]] {
            let total: usize = table.iter().map(|g| g.count).sum();
            assert!(total >= 12);
        }
    }

    #[test]
    fn verify_grouped_samples() {
        // A 3 level code of 2 + 3 * 1 + 9 * 0.
        let mut bw = BitWriter::new();
        bw.write(5, 5);
        // A 9 level code of 8 + 9 * 4 + 81 * 0.
        bw.write(44, 10);
        // Ungrouped 7 level samples.
        bw.write(0, 3).write(3, 3).write(6, 3);

        let bytes = bw.to_bytes(4);
        let mut bs = BitReader::new(&bytes);

        assert_eq!(read_triple(&mut bs, 17), [2.0 / 3.0, 0.0, -2.0 / 3.0]);
        assert_eq!(read_triple(&mut bs, 19), [8.0 / 9.0, 0.0, -8.0 / 9.0]);
        assert_eq!(read_triple(&mut bs, 3), [-6.0 / 7.0, 0.0, 6.0 / 7.0]);
    }

    /// A 128 kbps mono 44.1 kHz frame with only subband 0 allocated to 3 grouped levels, one
    /// scale factor for the whole frame, and the given code in every granule.
    fn mono_frame(scalefactor: u32, code: u32) -> (FrameHeader, Vec<u8>) {
        let header = parse_frame_header(header_word(0b11, 0b10, 8, 0, 3)).unwrap();

        let mut bw = BitWriter::new();
        // Allocation index 1 in subband 0 selects 3 levels.
        bw.write(1, 4);
        for sb in 1..30 {
            let nbal = match sb {
                0..=10 => 4,
                11..=22 => 3,
                _ => 2,
            };
            bw.write(0, nbal);
        }
        // scfsi 2: a single scale factor.
        bw.write(2, 2);
        bw.write(scalefactor, 6);
        for _ in 0..GRANULES {
            bw.write(code, 5);
        }

        let payload = bw.to_bytes(header.main_data_size);
        (header, payload)
    }

    #[test]
    fn verify_subband_samples() {
        let (header, payload) = mono_frame(9, 5);

        let mut layer2 = Layer2::new();
        layer2.read_samples(&header, &payload).unwrap();

        let expected = [0.25 * 2.0 / 3.0, 0.0, -0.25 * 2.0 / 3.0];

        for gr in 0..GRANULES {
            for (i, &e) in expected.iter().enumerate() {
                assert!((layer2.samples[0][3 * gr + i] - e).abs() < 1e-6);
            }
        }
        assert!(layer2.samples[0][SAMPLES..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_frame_decodes_1152_samples() {
        let (header, payload) = mono_frame(12, 5);

        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(1, 44_100));

        let mut out = OutputBuffer::new(1, header.pcm_size());
        let mut layer2 = Layer2::new();

        layer2.decode(&header, &payload, &mut out, &mut sink).unwrap();
        layer2.decode(&header, &payload, &mut out, &mut sink).unwrap();

        let samples = sink.samples();
        assert_eq!(samples.len(), 2 * 1152);
        assert!(samples.iter().any(|&s| s != 0));
    }
}
