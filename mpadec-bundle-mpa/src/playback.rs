// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The decode loop: read a byte source, decode every frame, and write the PCM to an audio sink.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use mpadec_core::audio::{AudioSink, SignalSpec};
use mpadec_core::errors::{end_of_stream_error, Error, Result};
use mpadec_core::io::ByteSource;

use log::{debug, info, warn};

use crate::decoder::{Decoder, DecoderOptions};
use crate::header::{FrameHeader, FrameSync};

/// The length of an ID3v2 header or footer.
const ID3V2_HEADER_LEN: usize = 10;

/// The smallest read buffer. It holds any two consecutive frames.
const MIN_READ_BUFFER_LEN: usize = 4096;

/// `PlaybackOptions` configures the decode loop.
#[derive(Copy, Clone, Debug)]
pub struct PlaybackOptions {
    /// The size of the buffer the byte source is read into.
    pub read_buffer_len: usize,
    /// Stop after scanning this many bytes without finding a frame.
    pub max_resync_bytes: usize,
    /// Skip an ID3v2 tag at the start of the stream.
    pub skip_id3v2: bool,
    pub decoder: DecoderOptions,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            read_buffer_len: 8192,
            max_resync_bytes: 0x10000,
            skip_id3v2: true,
            decoder: Default::default(),
        }
    }
}

/// The outcome of a completed decode loop.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Audio frames decoded.
    pub frames: u64,
    /// Frames skipped because of a recoverable error.
    pub skipped_frames: u64,
    /// Bytes of PCM written to the sink.
    pub pcm_bytes: u64,
}

#[derive(Default)]
struct ControlState {
    paused: bool,
    stopped: bool,
}

/// A cloneable handle to pause, resume, or stop a running decode loop from another thread.
#[derive(Clone, Default)]
pub struct PlaybackControl {
    inner: Arc<(Mutex<ControlState>, Condvar)>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.inner.1.notify_all();
    }

    /// Stop the decode loop, waking it if paused.
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.inner.1.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Block while paused. Returns `Error::Stopped` once stopped.
    fn wait(&self, sink: &mut dyn AudioSink) -> Result<()> {
        let was_paused = {
            let state = self.lock();

            if state.stopped {
                return Err(Error::Stopped);
            }

            state.paused
        };

        if !was_paused {
            return Ok(());
        }

        debug!("paused");
        sink.start(false);

        let stopped = {
            let mut state = self.lock();

            while state.paused && !state.stopped {
                state = self.inner.1.wait(state).unwrap_or_else(PoisonError::into_inner);
            }

            state.stopped
        };

        if stopped {
            return Err(Error::Stopped);
        }

        debug!("resumed");
        sink.start(true);

        Ok(())
    }
}

/// Returns the total length of the ID3v2 tag starting at `buf[0]`, if there is one.
fn id3v2_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < ID3V2_HEADER_LEN || &buf[..3] != b"ID3" || buf[3] == 0xff || buf[4] == 0xff {
        return None;
    }

    // The tag size is a 28 bit synchsafe integer.
    let size = buf[6..10].iter().try_fold(0usize, |size, &b| {
        if b & 0x80 != 0 {
            None
        }
        else {
            Some((size << 7) | usize::from(b))
        }
    })?;

    let has_footer = buf[5] & 0x10 != 0;

    Some(ID3V2_HEADER_LEN + size + if has_footer { ID3V2_HEADER_LEN } else { 0 })
}

/// `Playback` drives a [`ByteSource`] through a [`Decoder`] into an [`AudioSink`].
pub struct Playback<S: ByteSource> {
    source: S,
    decoder: Decoder,
    opts: PlaybackOptions,
    control: PlaybackControl,
    buf: Box<[u8]>,
    pos: usize,
    end: usize,
    eof: bool,
    started: bool,
    /// A frame located by `probe` but not yet decoded.
    pending: Option<FrameHeader>,
}

impl<S: ByteSource> Playback<S> {
    pub fn new(source: S, opts: PlaybackOptions) -> Self {
        let len = opts.read_buffer_len.max(MIN_READ_BUFFER_LEN);

        Playback {
            source,
            decoder: Decoder::new(opts.decoder),
            opts,
            control: PlaybackControl::new(),
            buf: vec![0; len].into_boxed_slice(),
            pos: 0,
            end: 0,
            eof: false,
            started: false,
            pending: None,
        }
    }

    /// A handle to pause, resume, or stop playback.
    pub fn control(&self) -> PlaybackControl {
        self.control.clone()
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// The frame synchronizer, holding the stream and track metadata.
    pub fn sync(&self) -> &FrameSync {
        self.decoder.sync()
    }

    /// Locate the first frame without decoding it, making the stream metadata available. If the
    /// source ends before a frame is found an end-of-stream error is returned.
    pub fn probe(&mut self) -> Result<FrameHeader> {
        if let Some(header) = self.pending {
            return Ok(header);
        }

        self.start()?;

        match self.next_frame()? {
            Some(header) => {
                self.pending = Some(header);
                Ok(header)
            }
            None if self.eof => end_of_stream_error(),
            None => Err(Error::SyncLost),
        }
    }

    /// Decode the source to the end, or until stopped.
    pub fn run(&mut self, sink: &mut dyn AudioSink) -> Result<PlaybackReport> {
        self.run_with_progress(sink, |_| ())
    }

    /// Decode the source to the end, or until stopped, calling `progress` after every frame.
    ///
    /// Whatever the outcome, the decoded audio is flushed, the sink is closed, and the synthesis
    /// workers are stopped.
    pub fn run_with_progress<F>(
        &mut self,
        sink: &mut dyn AudioSink,
        mut progress: F,
    ) -> Result<PlaybackReport>
    where
        F: FnMut(&FrameSync),
    {
        let mut report = PlaybackReport::default();

        let result = self.decode_loop(sink, &mut report, &mut progress);

        let finished = self.decoder.finish(sink);

        sink.close();
        self.decoder.close();
        self.source.close();

        report.pcm_bytes = self.decoder.pcm_bytes();

        info!(
            "decoded {} frames, skipped {}, {} bytes of pcm",
            report.frames, report.skipped_frames, report.pcm_bytes
        );

        match result {
            Ok(()) => (),
            Err(Error::Stopped) => info!("playback stopped"),
            Err(err) => return Err(err),
        }

        finished.map(|_| report)
    }

    fn decode_loop<F>(
        &mut self,
        sink: &mut dyn AudioSink,
        report: &mut PlaybackReport,
        progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&FrameSync),
    {
        self.start()?;

        let mut sink_open = false;

        loop {
            self.control.wait(sink)?;

            let header = match self.next_frame()? {
                Some(header) => header,
                None => return Ok(()),
            };

            if !sink_open {
                let spec = SignalSpec::new(header.n_channels(), header.sample_rate);

                if !sink.open(spec) {
                    return Err(Error::IoError(io::Error::new(
                        io::ErrorKind::Other,
                        "failed to open the audio sink",
                    )));
                }

                sink.start(true);
                sink_open = true;
            }

            let offset = self.decoder.current_offset();

            match self.decoder.decode_frame(&self.buf[..self.end], offset, sink) {
                Ok(next) => {
                    self.pos = next;

                    if !self.decoder.sync().is_tag_frame() {
                        report.frames += 1;
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!("skipping frame {}: {}", self.decoder.sync().frames(), err);
                    self.pos = self.decoder.frame_end().min(self.end);
                    report.skipped_frames += 1;
                }
                Err(err) => return Err(err),
            }

            progress(self.decoder.sync());
        }
    }

    /// Skip any ID3v2 tag and initialize the track state. Only the first call does anything.
    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.started = true;

        let mut skipped = 0;

        if self.opts.skip_id3v2 {
            self.fill_at_least(ID3V2_HEADER_LEN)?;

            if let Some(len) = id3v2_len(&self.buf[self.pos..self.end]) {
                info!("skipping {} byte ID3v2 tag", len);
                self.skip_bytes(len)?;
                skipped = len;
            }
        }

        let track_length = self.source.byte_len().unwrap_or(0).saturating_sub(skipped as u64);
        self.decoder.initialize(track_length, 0.0);

        Ok(())
    }

    /// Locate the next frame, reading more of the source as needed. Returns `None` at the end of
    /// the stream.
    fn next_frame(&mut self) -> Result<Option<FrameHeader>> {
        if let Some(header) = self.pending.take() {
            return Ok(Some(header));
        }

        let mut scanned = 0;

        loop {
            match self.decoder.sync_frame(&self.buf, self.pos, self.end) {
                Ok(header) => return Ok(Some(header)),
                Err(Error::SyncLost) => (),
                Err(err) => return Err(err),
            }

            let keep = self.decoder.current_offset().max(self.pos);

            scanned += keep - self.pos;
            self.pos = keep;

            if scanned > self.opts.max_resync_bytes {
                warn!("no frame found in {} bytes, giving up", scanned);
                return Ok(None);
            }

            if !self.refill()? {
                if self.eof {
                    return Ok(None);
                }

                // The buffer is full of bytes that neither form nor rule out a frame.
                self.pos += 1;
                scanned += 1;
            }
        }
    }

    /// Move the unread bytes to the front of the buffer and read more after them. Returns false
    /// if no bytes were read.
    fn refill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        self.buf.copy_within(self.pos..self.end, 0);
        self.end -= self.pos;
        self.pos = 0;

        if self.end == self.buf.len() {
            return Ok(false);
        }

        let n = self.source.read(&mut self.buf[self.end..])?;

        if n == 0 {
            debug!("end of stream");
            self.eof = true;
            return Ok(false);
        }

        self.end += n;

        Ok(true)
    }

    /// Read until at least `n` unread bytes are buffered or the source ends.
    fn fill_at_least(&mut self, n: usize) -> Result<()> {
        while self.end - self.pos < n {
            if !self.refill()? {
                break;
            }
        }
        Ok(())
    }

    /// Discard `n` bytes of the stream.
    fn skip_bytes(&mut self, mut n: usize) -> Result<()> {
        loop {
            let skip = n.min(self.end - self.pos);

            self.pos += skip;
            n -= skip;

            if n == 0 || !self.refill()? {
                return Ok(());
            }
        }
    }
}
