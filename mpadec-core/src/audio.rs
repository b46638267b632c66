// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides the PCM signal description and the audio sink interface.

use std::fmt;

/// `SignalSpec` describes the PCM produced by the decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalSpec {
    /// The number of interleaved channels.
    pub channels: usize,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The width of a sample in bits. Always 16 for this decoder.
    pub bits_per_sample: u32,
}

impl SignalSpec {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        SignalSpec { channels, sample_rate, bits_per_sample: 16 }
    }

    /// The number of bytes occupied by a single interleaved frame of samples.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * (self.bits_per_sample as usize / 8)
    }
}

impl fmt::Display for SignalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz, {}ch, {}-bit", self.sample_rate, self.channels, self.bits_per_sample)
    }
}

/// An `AudioSink` accepts blocks of interleaved, signed 16-bit little-endian PCM.
pub trait AudioSink: Send {
    /// Open the device for the given signal. Returns false if the device is unavailable.
    fn open(&mut self, spec: SignalSpec) -> bool;

    /// Write PCM bytes. Returns the number of bytes accepted.
    fn write(&mut self, pcm: &[u8]) -> usize;

    /// Start (true) or pause (false) rendering.
    fn start(&mut self, _playing: bool) {}

    /// Block until all written PCM has been rendered.
    fn drain(&mut self) {}

    /// Release the device.
    fn close(&mut self) {}

    /// Set the output gain in decibels. Returns false if gain control is unsupported.
    fn set_gain(&mut self, _db: f32) -> bool {
        false
    }
}

/// A sink that accepts and discards everything.
#[derive(Default)]
pub struct NullSink {
    written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Default::default()
    }

    /// The total number of bytes written.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AudioSink for NullSink {
    fn open(&mut self, _: SignalSpec) -> bool {
        true
    }

    fn write(&mut self, pcm: &[u8]) -> usize {
        self.written += pcm.len() as u64;
        pcm.len()
    }
}

/// A sink that collects all PCM in memory.
#[derive(Default)]
pub struct MemorySink {
    spec: Option<SignalSpec>,
    pcm: Vec<u8>,
    writes: usize,
    drained: bool,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Default::default()
    }

    /// The signal the sink was opened with.
    pub fn spec(&self) -> Option<SignalSpec> {
        self.spec
    }

    /// The raw PCM bytes written.
    pub fn bytes(&self) -> &[u8] {
        &self.pcm
    }

    /// The PCM decoded into samples.
    pub fn samples(&self) -> Vec<i16> {
        self.pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect()
    }

    /// The number of `write` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, spec: SignalSpec) -> bool {
        self.spec = Some(spec);
        true
    }

    fn write(&mut self, pcm: &[u8]) -> usize {
        self.pcm.extend_from_slice(pcm);
        self.writes += 1;
        pcm.len()
    }

    fn drain(&mut self) {
        self.drained = true;
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioSink, MemorySink, SignalSpec};

    #[test]
    fn verify_memory_sink_samples() {
        let mut sink = MemorySink::new();

        assert!(sink.open(SignalSpec::new(2, 44_100)));
        assert_eq!(sink.write(&[0x01, 0x00, 0xff, 0xff]), 4);
        assert_eq!(sink.samples(), vec![1, -1]);
        assert_eq!(sink.spec().map(|s| s.bytes_per_frame()), Some(4));
        assert!(!sink.set_gain(-3.0));
    }
}
