// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::audio::AudioSink;
use mpadec_core::errors::{decode_error, main_data_error, Result};
use mpadec_core::io::bit::{BitReservoir, ReadBits};

use log::debug;

use crate::common::{SAMPLES_PER_GRANULE, SFB_LONG_BANDS, SFB_MIXED_BANDS};
use crate::common::{SFB_MIXED_SWITCH_POINT, SFB_SHORT_BANDS};
use crate::header::FrameHeader;
use crate::output::OutputBuffer;
use crate::pipeline::Synthesizer;

mod bitstream;
mod huffman;
mod huffman_tables;
mod hybrid_synthesis;
mod requantize;
mod stereo;

pub use hybrid_synthesis::frequency_inversion;

use requantize::NonZeroBands;

/// The reservoir holds the current frame's main data plus up-to 511 bytes of earlier frames.
const RESERVOIR_CAPACITY: usize = 4096;

/// The block type of a granule channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum BlockType {
    // Default case when window switching is off. Also the normal case when window switching is
    // on. Granule contains one long block.
    #[default]
    Long,
    Start,
    Short { is_mixed: bool },
    End,
}

/// Side information and scale factors of one channel in one granule.
#[derive(Clone, Debug)]
pub(crate) struct ChannelInfo {
    /// Total number of bits used for scale factors (part2) and Huffman encoded data (part3).
    pub part2_3_length: usize,
    /// Half the number of frequency lines in the big_values region.
    pub big_values: usize,
    pub global_gain: i32,
    pub scalefac_compress: usize,
    pub block_type: BlockType,
    /// Gain offset of each short window, in units of 8 quarter steps.
    pub subblock_gain: [i32; 3],
    /// Huffman table of each big_values region.
    pub table_select: [usize; 3],
    /// First frequency line of big_values region 1.
    pub region1_start: usize,
    /// First frequency line of big_values region 2.
    pub region2_start: usize,
    pub preflag: bool,
    pub scalefac_scale: bool,
    pub count1table_select: usize,
    /// Scale factors, one per partition returned by [`partitions`].
    pub scalefacs: [u8; 39],
    /// Every frequency line from this index on is zero.
    pub rzero: usize,
}

impl Default for ChannelInfo {
    fn default() -> Self {
        ChannelInfo {
            part2_3_length: 0,
            big_values: 0,
            global_gain: 0,
            scalefac_compress: 0,
            block_type: BlockType::Long,
            subblock_gain: [0; 3],
            table_select: [0; 3],
            region1_start: 0,
            region2_start: 0,
            preflag: false,
            scalefac_scale: false,
            count1table_select: 0,
            scalefacs: [0; 39],
            rzero: 0,
        }
    }
}

/// The side information of a frame.
#[derive(Default)]
pub(crate) struct FrameData {
    /// Byte offset of this frame's main data, counted backwards from the end of the main data
    /// already in the reservoir.
    pub main_data_begin: usize,
    /// Scale factor selection information, per channel and scfsi band group.
    pub scfsi: [[bool; 4]; 2],
    pub granules: [[ChannelInfo; 2]; 2],
}

/// The scale factor partitions of a channel, and the index of the first short block partition.
///
/// Partition `i` spans the lines `bounds[i]..bounds[i + 1]` and is scaled by `scalefacs[i]`. Long
/// blocks have 22 partitions and no short ones. Short blocks have 3 partitions per band, one per
/// window. A partition at or past the switch point belongs to window `(i - switch) % 3`.
pub(crate) fn partitions(sample_rate_idx: usize, block_type: BlockType) -> (&'static [usize], usize) {
    match block_type {
        BlockType::Short { is_mixed: false } => (&SFB_SHORT_BANDS[sample_rate_idx], 0),
        BlockType::Short { is_mixed: true } => {
            (SFB_MIXED_BANDS[sample_rate_idx], SFB_MIXED_SWITCH_POINT[sample_rate_idx])
        }
        _ => (&SFB_LONG_BANDS[sample_rate_idx], 22),
    }
}

/// Layer III decoder state.
pub struct Layer3 {
    reservoir: BitReservoir,
    frame: FrameData,
    /// Huffman decoded values of the granule being decoded.
    hv: [[i32; SAMPLES_PER_GRANULE]; 2],
    /// The second half of the previous granule's IMDCT output, per channel and subband.
    overlap: [[[f32; 18]; 32]; 2],
    synth: Synthesizer,
}

impl Layer3 {
    /// Create a decoder for `channels` channels. If `threaded`, polyphase synthesis runs on one
    /// worker thread per channel.
    pub fn new(channels: usize, threaded: bool) -> Result<Self> {
        Ok(Layer3 {
            reservoir: BitReservoir::new(RESERVOIR_CAPACITY),
            frame: Default::default(),
            hv: [[0; SAMPLES_PER_GRANULE]; 2],
            overlap: [[[0.0; 18]; 32]; 2],
            synth: Synthesizer::new(channels, threaded)?,
        })
    }

    /// Decode the frame payload following the header (and CRC).
    ///
    /// A frame whose main data starts in bytes the reservoir never received is not decoded. Its
    /// main data is still kept for the frames that follow, and a recoverable error is returned.
    pub fn decode(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        out: &mut OutputBuffer,
        sink: &mut dyn AudioSink,
    ) -> Result<()> {
        if payload.len() < header.side_info_size {
            return decode_error("mp3: frame is too short for side info");
        }

        let (side_info, main_data) = payload.split_at(header.side_info_size);

        if let Err(err) = bitstream::read_side_info(side_info, header, &mut self.frame) {
            // Later frames may not reference main data around a broken frame.
            self.reservoir.clear();
            return Err(err);
        }

        self.fill_reservoir(main_data)?;

        for gr in 0..header.n_granules() {
            for ch in 0..header.n_channels() {
                self.read_granule_channel(header, gr, ch)?;
            }

            self.reconstruct_granule(header, gr, out, sink)?;
        }

        Ok(())
    }

    /// Write the PCM of any granule still being synthesized.
    pub fn finish(&mut self, out: &mut OutputBuffer, sink: &mut dyn AudioSink) -> Result<()> {
        self.synth.finish(out, sink)
    }

    /// Stop the synthesis workers.
    pub fn close(&mut self) {
        self.synth.close();
    }

    /// True while synthesis workers are running.
    pub fn is_threaded(&self) -> bool {
        self.synth.is_threaded()
    }

    /// Discard the reservoir and the overlap-add state after a discontinuity.
    pub fn reset(&mut self) {
        self.reservoir.clear();
        self.overlap = [[[0.0; 18]; 32]; 2];
    }

    /// Position the reservoir on this frame's main data, then append the main data carried by
    /// this frame.
    fn fill_reservoir(&mut self, main_data: &[u8]) -> Result<()> {
        let begin = self.frame.main_data_begin;

        if !self.reservoir.rewind_from_end(begin) {
            let available = self.reservoir.size();

            debug!("mp3: main_data_begin {} exceeds the {} buffered bytes", begin, available);

            let unread = self.reservoir.available();
            self.reservoir.skip_bytes(unread);
            self.reservoir.append(main_data);
            self.reservoir.clear_overrun();

            return main_data_error(begin, available);
        }

        let appended = self.reservoir.append(main_data);

        if appended < main_data.len() {
            debug!("mp3: reservoir full, dropped {} bytes", main_data.len() - appended);
        }

        self.reservoir.clear_overrun();

        Ok(())
    }

    /// Read the scale factors and Huffman coded values of channel `ch` in granule `gr`.
    fn read_granule_channel(&mut self, header: &FrameHeader, gr: usize, ch: usize) -> Result<()> {
        let bs = &mut self.reservoir;

        let start = bs.bit_pos();
        let part2_3_length = self.frame.granules[gr][ch].part2_3_length;
        let end = start + part2_3_length;

        if header.is_mpeg1() {
            bitstream::read_scale_factors_mpeg1(bs, gr, ch, &mut self.frame);
        }
        else {
            let is_intensity = ch == 1 && header.is_intensity_stereo();
            bitstream::read_scale_factors_lsf(bs, is_intensity, &mut self.frame.granules[gr][ch]);
        }

        let part2_length = bs.bit_pos() - start;

        if part2_length > part2_3_length {
            return decode_error("mp3: scale factors exceed part2_3_length");
        }

        let channel = &mut self.frame.granules[gr][ch];

        let rzero = huffman::read_spectrum(bs, channel, end, &mut self.hv[ch]);
        channel.rzero = rzero;

        // Ancillary bits may follow the Huffman data, and a damaged stream may run past it. Either
        // way the next channel starts at the end of this one.
        let pos = bs.bit_pos();
        bs.skip_bits(end as isize - pos as isize);

        if bs.overrun() {
            debug!("mp3: main data overrun in granule {} channel {}", gr, ch);
            bs.clear_overrun();
        }

        Ok(())
    }

    /// Requantize, stereo process, and transform granule `gr`, then hand it to synthesis.
    fn reconstruct_granule(
        &mut self,
        header: &FrameHeader,
        gr: usize,
        out: &mut OutputBuffer,
        sink: &mut dyn AudioSink,
    ) -> Result<()> {
        let n_channels = header.n_channels();
        let granule = &self.frame.granules[gr];

        let (xr0, xr1) = self.synth.spectra_mut();

        requantize::requantize(header, &granule[0], &self.hv[0], xr0);

        if n_channels == 2 {
            let nonzero: NonZeroBands = requantize::requantize(header, &granule[1], &self.hv[1], xr1);
            stereo::stereo(header, granule, &nonzero, xr0, xr1);
        }

        for ((channel, overlap), xr) in
            granule.iter().zip(self.overlap.iter_mut()).zip([xr0, xr1]).take(n_channels)
        {
            hybrid_synthesis::reorder(header, channel, xr);
            hybrid_synthesis::antialias(channel, xr);
            hybrid_synthesis::hybrid_transform(channel, overlap, xr);
        }

        self.synth.submit(out, sink)
    }
}
