// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mpadec_core::audio::{AudioSink, SignalSpec};
use mpadec_core::errors::{decode_error, unsupported_error, Result};

use log::debug;

use crate::common::MpegLayer;
use crate::header::{FrameHeader, FrameSync, MPEG_HEADER_LEN};
use crate::output::OutputBuffer;

#[cfg(feature = "mp1")]
use crate::layer1::Layer1;
#[cfg(feature = "mp2")]
use crate::layer2::Layer2;
#[cfg(feature = "mp3")]
use crate::layer3::Layer3;

/// `DecoderOptions` is a common set of options that all decoders use.
#[derive(Copy, Clone, Debug)]
pub struct DecoderOptions {
    /// Run Layer III polyphase synthesis on one worker thread per channel. When false, synthesis
    /// runs inline on the decode thread. The output is identical either way.
    pub threaded_synthesis: bool,
    /// The size of each block of PCM handed to the sink, in frames' worth of samples.
    pub output_block_frames: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { threaded_synthesis: true, output_block_frames: 1 }
    }
}

/// The layer specific decoder, selected once per stream.
enum LayerDecoder {
    #[cfg(feature = "mp1")]
    Layer1(Box<Layer1>),
    #[cfg(feature = "mp2")]
    Layer2(Box<Layer2>),
    #[cfg(feature = "mp3")]
    Layer3(Box<Layer3>),
}

impl LayerDecoder {
    fn try_new(header: &FrameHeader, opts: &DecoderOptions) -> Result<Self> {
        match header.layer {
            #[cfg(feature = "mp1")]
            MpegLayer::Layer1 => Ok(LayerDecoder::Layer1(Box::new(Layer1::new()))),
            #[cfg(feature = "mp2")]
            MpegLayer::Layer2 => Ok(LayerDecoder::Layer2(Box::new(Layer2::new()))),
            #[cfg(feature = "mp3")]
            MpegLayer::Layer3 => Ok(LayerDecoder::Layer3(Box::new(Layer3::new(
                header.n_channels(),
                opts.threaded_synthesis,
            )?))),
            #[allow(unreachable_patterns)]
            _ => unsupported_error("mpa: support for this layer is not enabled"),
        }
    }

    fn layer(&self) -> MpegLayer {
        match self {
            #[cfg(feature = "mp1")]
            LayerDecoder::Layer1(_) => MpegLayer::Layer1,
            #[cfg(feature = "mp2")]
            LayerDecoder::Layer2(_) => MpegLayer::Layer2,
            #[cfg(feature = "mp3")]
            LayerDecoder::Layer3(_) => MpegLayer::Layer3,
        }
    }

    fn decode(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        out: &mut OutputBuffer,
        sink: &mut dyn AudioSink,
    ) -> Result<()> {
        match self {
            #[cfg(feature = "mp1")]
            LayerDecoder::Layer1(layer) => layer.decode(header, payload, out, sink),
            #[cfg(feature = "mp2")]
            LayerDecoder::Layer2(layer) => layer.decode(header, payload, out, sink),
            #[cfg(feature = "mp3")]
            LayerDecoder::Layer3(layer) => layer.decode(header, payload, out, sink),
        }
    }

    fn reset(&mut self) {
        match self {
            #[cfg(feature = "mp1")]
            LayerDecoder::Layer1(layer) => layer.reset(),
            #[cfg(feature = "mp2")]
            LayerDecoder::Layer2(layer) => layer.reset(),
            #[cfg(feature = "mp3")]
            LayerDecoder::Layer3(layer) => layer.reset(),
        }
    }
}

/// MPEG-1, MPEG-2, and MPEG-2.5 Layer I, II, and III decoder.
///
/// Frames are located with [`sync_frame`](Self::sync_frame) and then decoded with
/// [`decode_frame`](Self::decode_frame). Decoded PCM is gathered in an output buffer and written
/// to the sink a block at a time.
pub struct Decoder {
    opts: DecoderOptions,
    sync: FrameSync,
    header: Option<FrameHeader>,
    frame_end: usize,
    resyncs: u64,
    layer: Option<LayerDecoder>,
    out: Option<OutputBuffer>,
    spec: Option<SignalSpec>,
}

impl Decoder {
    pub fn new(opts: DecoderOptions) -> Self {
        Decoder {
            opts,
            sync: FrameSync::default(),
            header: None,
            frame_end: 0,
            resyncs: 0,
            layer: None,
            out: None,
            spec: None,
        }
    }

    /// Reset the track state for a track of `track_length` bytes lasting `duration` seconds.
    /// Either may be zero if unknown.
    pub fn initialize(&mut self, track_length: u64, duration: f64) {
        self.sync.initialize(track_length, duration);
        self.header = None;
        self.resyncs = 0;
    }

    /// Search `buf[offset..limit)` for the next frame. On success the frame's payload starts at
    /// [`current_offset`](Self::current_offset).
    pub fn sync_frame(&mut self, buf: &[u8], offset: usize, limit: usize) -> Result<FrameHeader> {
        let header = self.sync.sync(buf, offset, limit)?;

        let crc_len = if header.has_crc { 2 } else { 0 };
        self.frame_end = self.sync.offset() - MPEG_HEADER_LEN - crc_len + header.frame_size;
        self.header = Some(header);

        Ok(header)
    }

    /// The buffer position following the last frame search.
    pub fn current_offset(&self) -> usize {
        self.sync.offset()
    }

    /// The buffer position following the last frame located.
    pub fn frame_end(&self) -> usize {
        self.frame_end
    }

    /// Decode the frame last located by [`sync_frame`](Self::sync_frame), whose payload starts
    /// at `buf[offset]`. Returns the buffer position of the next frame.
    pub fn decode_frame(
        &mut self,
        buf: &[u8],
        offset: usize,
        sink: &mut dyn AudioSink,
    ) -> Result<usize> {
        let header = match self.header {
            Some(header) => header,
            None => return decode_error("mpa: no frame to decode"),
        };

        let crc_len = if header.has_crc { 2 } else { 0 };
        let end = offset + header.frame_size - MPEG_HEADER_LEN - crc_len;

        if end > buf.len() {
            return decode_error("mpa: frame is truncated");
        }

        // The VBR tag frame carries no audio.
        if self.sync.is_tag_frame() {
            return Ok(end);
        }

        self.prepare(&header)?;

        // Reservoir and overlap state do not survive a gap in the stream.
        if self.sync.resyncs() != self.resyncs {
            self.resyncs = self.sync.resyncs();

            if let Some(layer) = self.layer.as_mut() {
                debug!("resetting decoder state after resync");
                layer.reset();
            }
        }

        if let (Some(layer), Some(out)) = (self.layer.as_mut(), self.out.as_mut()) {
            layer.decode(&header, &buf[offset..end], out, sink)?;
        }

        Ok(end)
    }

    /// Create the layer decoder and output buffer for the first frame, or check a later frame
    /// against them.
    fn prepare(&mut self, header: &FrameHeader) -> Result<()> {
        match (&self.layer, &self.spec) {
            (Some(layer), Some(spec)) => {
                if layer.layer() != header.layer {
                    return decode_error("mpa: layer changed mid-stream");
                }
                if spec.channels != header.n_channels() {
                    return decode_error("mpa: channel count changed mid-stream");
                }
            }
            _ => {
                let block_bytes = self.opts.output_block_frames.max(1) * header.pcm_size();

                self.layer = Some(LayerDecoder::try_new(header, &self.opts)?);
                self.out = Some(OutputBuffer::new(header.n_channels(), block_bytes));
                self.spec = Some(SignalSpec::new(header.n_channels(), header.sample_rate));
            }
        }
        Ok(())
    }

    /// Write all decoded PCM still buffered to `sink`, then drain it.
    pub fn finish(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        #[cfg(feature = "mp3")]
        if let (Some(LayerDecoder::Layer3(layer)), Some(out)) =
            (self.layer.as_mut(), self.out.as_mut())
        {
            layer.finish(out, sink)?;
        }

        match self.out.as_mut() {
            Some(out) => out.flush(sink),
            None => Ok(()),
        }
    }

    /// Release the synthesis workers. Buffered PCM not yet written by
    /// [`finish`](Self::finish) is discarded.
    pub fn close(&mut self) {
        #[cfg(feature = "mp3")]
        if let Some(LayerDecoder::Layer3(layer)) = self.layer.as_mut() {
            layer.close();
        }

        if let Some(out) = self.out.as_mut() {
            out.clear();
        }
    }

    /// True if a Layer III decoder with running synthesis workers exists.
    pub fn is_threaded(&self) -> bool {
        match &self.layer {
            #[cfg(feature = "mp3")]
            Some(LayerDecoder::Layer3(layer)) => layer.is_threaded(),
            _ => false,
        }
    }

    /// The frame synchronizer, holding the stream and track metadata.
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    /// The signal specification of the decoded audio, known after the first frame is decoded.
    pub fn signal_spec(&self) -> Option<SignalSpec> {
        self.spec
    }

    /// Total bytes of PCM written to the sink.
    pub fn pcm_bytes(&self) -> u64 {
        self.out.as_ref().map_or(0, OutputBuffer::bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mpadec_core::audio::MemorySink;
    use mpadec_core::errors::Error;

    use crate::header::tests::{frame_stream, header_word};

    fn decode_all(buf: &[u8], opts: DecoderOptions, sink: &mut MemorySink) -> Decoder {
        let mut decoder = Decoder::new(opts);
        let mut pos = 0;

        while let Ok(header) = decoder.sync_frame(buf, pos, buf.len()) {
            if decoder.signal_spec().is_none() {
                sink.open(SignalSpec::new(header.n_channels(), header.sample_rate));
            }
            pos = decoder.decode_frame(buf, decoder.current_offset(), sink).unwrap();
        }

        decoder.finish(sink).unwrap();
        decoder
    }

    #[test]
    fn verify_layer3_mono_stream() {
        let buf = frame_stream(header_word(0b11, 0b01, 9, 0, 3), 10);

        for threaded in [true, false] {
            let opts = DecoderOptions { threaded_synthesis: threaded, ..Default::default() };

            let mut sink = MemorySink::new();
            let mut decoder = decode_all(&buf, opts, &mut sink);

            assert_eq!(decoder.is_threaded(), threaded);
            decoder.close();
            assert!(!decoder.is_threaded());

            assert_eq!(sink.samples().len(), 10 * 1152);
            assert_eq!(decoder.pcm_bytes(), 10 * 1152 * 2);
            assert_eq!(decoder.sync().frames(), 10);
            assert_eq!(sink.spec(), Some(SignalSpec::new(1, 44_100)));
            assert!(sink.is_drained());
        }
    }

    #[test]
    fn verify_output_blocks() {
        let buf = frame_stream(header_word(0b11, 0b01, 9, 0, 3), 10);

        let opts = DecoderOptions { threaded_synthesis: false, output_block_frames: 4 };

        let mut sink = MemorySink::new();
        let mut decoder = decode_all(&buf, opts, &mut sink);
        decoder.close();

        // Two full blocks of 4 frames, then the remaining 2 frames on flush.
        assert_eq!(sink.writes(), 3);
        assert_eq!(sink.samples().len(), 10 * 1152);
    }

    #[test]
    fn verify_layer1_stream() {
        // Layer I, 448 kbps, 44.1 kHz, stereo.
        let buf = frame_stream(header_word(0b11, 0b11, 14, 0, 0), 6);

        let mut sink = MemorySink::new();
        let mut decoder = decode_all(&buf, DecoderOptions::default(), &mut sink);
        decoder.close();

        assert_eq!(sink.samples().len(), 6 * 384 * 2);
        assert!(!decoder.is_threaded());
    }

    #[test]
    fn verify_channel_count_change_is_rejected() {
        let mut buf = frame_stream(header_word(0b11, 0b01, 9, 0, 3), 3);
        buf.extend(frame_stream(header_word(0b11, 0b01, 9, 0, 0), 3));

        let mut decoder = Decoder::new(DecoderOptions { threaded_synthesis: false, ..Default::default() });
        let mut sink = MemorySink::new();
        let mut pos = 0;
        let mut errors = 0;

        while decoder.sync_frame(&buf, pos, buf.len()).is_ok() {
            match decoder.decode_frame(&buf, decoder.current_offset(), &mut sink) {
                Ok(next) => pos = next,
                Err(Error::DecodeError(_)) => {
                    errors += 1;
                    pos = decoder.frame_end();
                }
                Err(err) => panic!("unexpected error {}", err),
            }
        }

        assert_eq!(errors, 3);
    }

    #[test]
    fn verify_decode_without_sync() {
        let mut decoder = Decoder::new(Default::default());
        let mut sink = MemorySink::new();
        assert!(decoder.decode_frame(&[0; 16], 0, &mut sink).is_err());
    }
}
