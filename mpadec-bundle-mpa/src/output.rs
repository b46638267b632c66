// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use mpadec_core::audio::AudioSink;
use mpadec_core::errors::{Error, Result};

use log::trace;

/// `OutputBuffer` gathers interleaved signed 16-bit little-endian PCM into fixed size blocks
/// and hands each full block to an [`AudioSink`].
///
/// Every channel writes one run of samples with [`write_channel`](Self::write_channel), then a
/// single [`commit`](Self::commit) moves the write cursor past them.
pub struct OutputBuffer {
    buf: Vec<u8>,
    channels: usize,
    pos: usize,
    written: u64,
}

impl OutputBuffer {
    /// Create a buffer of `block_bytes` bytes for `channels` interleaved channels. The block is
    /// rounded down to a whole number of audio frames.
    pub fn new(channels: usize, block_bytes: usize) -> Self {
        let frame = 2 * channels.max(1);
        let len = (block_bytes / frame).max(1) * frame;

        OutputBuffer { buf: vec![0; len], channels: channels.max(1), pos: 0, written: 0 }
    }

    /// The number of interleaved channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The number of audio frames that may still be written before the block is full.
    pub fn frames_free(&self) -> usize {
        (self.buf.len() - self.pos) / (2 * self.channels)
    }

    /// The number of committed bytes not yet written to the sink.
    pub fn pending(&self) -> usize {
        self.pos
    }

    /// Total bytes handed to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Write the samples of channel `ch` into the uncommitted region. Samples that do not fit
    /// in the block are dropped.
    pub fn write_channel(&mut self, ch: usize, pcm: &[i16]) {
        debug_assert!(ch < self.channels);

        let stride = 2 * self.channels;
        let n = pcm.len().min(self.frames_free());

        let region = &mut self.buf[self.pos..self.pos + n * stride];

        for (frame, &sample) in region.chunks_exact_mut(stride).zip(&pcm[..n]) {
            frame[2 * ch..2 * ch + 2].copy_from_slice(&sample.to_le_bytes());
        }
    }

    /// Commit `frames` audio frames written by every channel, writing the block to `sink` once
    /// it is full.
    pub fn commit(&mut self, frames: usize, sink: &mut dyn AudioSink) -> Result<()> {
        let n = frames.min(self.frames_free());
        self.pos += n * 2 * self.channels;

        if self.pos == self.buf.len() {
            self.write_block(sink)?;
        }

        Ok(())
    }

    /// Write any partial block to `sink`, then drain it.
    pub fn flush(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        if self.pos > 0 {
            self.write_block(sink)?;
        }
        sink.drain();
        Ok(())
    }

    /// Forget any committed but unwritten samples.
    pub fn clear(&mut self) {
        self.pos = 0;
    }

    fn write_block(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        let mut done = 0;

        while done < self.pos {
            let n = sink.write(&self.buf[done..self.pos]);

            if n == 0 {
                self.pos = 0;
                return Err(Error::IoError(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "audio sink refused pcm",
                )));
            }

            done += n;
        }

        trace!("wrote {} pcm bytes", done);

        self.written += done as u64;
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mpadec_core::audio::{MemorySink, SignalSpec};

    #[test]
    fn verify_interleaving() {
        let mut sink = MemorySink::default();
        sink.open(SignalSpec::new(2, 44_100));

        let mut out = OutputBuffer::new(2, 16);
        assert_eq!(out.frames_free(), 4);

        out.write_channel(0, &[1, 2]);
        out.write_channel(1, &[-1, -2]);
        out.commit(2, &mut sink).unwrap();

        assert_eq!(out.pending(), 8);
        assert!(sink.samples().is_empty());

        out.write_channel(0, &[3, 4]);
        out.write_channel(1, &[-3, -4]);
        out.commit(2, &mut sink).unwrap();

        // The block filled up and was written.
        assert_eq!(out.pending(), 0);
        assert_eq!(sink.samples(), vec![1, -1, 2, -2, 3, -3, 4, -4]);
        assert_eq!(sink.writes(), 1);
    }

    #[test]
    fn verify_flush_writes_partial_block() {
        let mut sink = MemorySink::default();
        sink.open(SignalSpec::new(1, 8_000));

        let mut out = OutputBuffer::new(1, 1152 * 2);
        out.write_channel(0, &[7; 576]);
        out.commit(576, &mut sink).unwrap();
        out.flush(&mut sink).unwrap();

        assert_eq!(sink.samples().len(), 576);
        assert_eq!(out.bytes_written(), 1152);
        assert!(sink.is_drained());
    }

    #[test]
    fn verify_refusing_sink_is_an_error() {
        struct Refuse;

        impl AudioSink for Refuse {
            fn open(&mut self, _: SignalSpec) -> bool {
                true
            }
            fn write(&mut self, _: &[u8]) -> usize {
                0
            }
        }

        let mut out = OutputBuffer::new(1, 2);
        out.write_channel(0, &[1]);
        assert!(matches!(out.commit(1, &mut Refuse), Err(Error::IoError(_))));
    }
}
