// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Audio outputs of the command line player.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use mpadec_core::audio::{AudioSink, SignalSpec};

use log::{error, info};

/// Writes the decoded PCM to a WAV file. The file is created when the sink is opened.
pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    gain: f32,
}

impl WavSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        WavSink { path: path.into(), writer: None, gain: 1.0 }
    }
}

impl AudioSink for WavSink {
    fn open(&mut self, spec: SignalSpec) -> bool {
        let wav_spec = hound::WavSpec {
            channels: spec.channels as u16,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample as u16,
            sample_format: hound::SampleFormat::Int,
        };

        match hound::WavWriter::create(&self.path, wav_spec) {
            Ok(writer) => {
                info!("writing {} to {}", spec, self.path.display());
                self.writer = Some(writer);
                true
            }
            Err(err) => {
                error!("failed to create {}: {}", self.path.display(), err);
                false
            }
        }
    }

    fn write(&mut self, pcm: &[u8]) -> usize {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return 0,
        };

        for (i, bytes) in pcm.chunks_exact(2).enumerate() {
            let sample = i16::from_le_bytes([bytes[0], bytes[1]]);

            let sample = if self.gain != 1.0 {
                (f32::from(sample) * self.gain).round().clamp(-32768.0, 32767.0) as i16
            }
            else {
                sample
            };

            if let Err(err) = writer.write_sample(sample) {
                error!("wav write error: {}", err);
                return 2 * i;
            }
        }

        pcm.len()
    }

    fn drain(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                error!("wav flush error: {}", err);
            }
        }
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                error!("failed to finalize {}: {}", self.path.display(), err);
            }
        }
    }

    fn set_gain(&mut self, db: f32) -> bool {
        self.gain = f32::powf(10.0, db / 20.0);
        true
    }
}
