// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer III polyphase synthesis, either inline or overlapped with decoding on one worker thread
//! per channel.
//!
//! The threaded pipeline moves boxed [`Granule`] buffers between the decode thread and the
//! workers, so a buffer is only ever reachable from one thread. A worker hands its finished
//! buffer back through the shared [`Handoff`] and counts itself complete. Before dispatching
//! the next granule the decode thread waits for every worker to complete, writes the returned
//! PCM to the output buffer, then resets the count. The decode thread therefore runs at most one
//! granule ahead of synthesis.

use std::io;
use std::mem;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use mpadec_core::audio::AudioSink;
use mpadec_core::errors::{Error, Result};

use log::{debug, trace, warn};

use crate::common::SAMPLES_PER_GRANULE;
use crate::layer3::frequency_inversion;
use crate::output::OutputBuffer;
use crate::synthesis::{self, SynthesisState};

/// The number of 32 sample blocks in a granule.
const GRANULE_BLOCKS: usize = SAMPLES_PER_GRANULE / 32;

/// The frequency lines of one channel of a granule and the PCM they synthesize to.
pub struct Granule {
    pub xr: [f32; SAMPLES_PER_GRANULE],
    pub pcm: [i16; SAMPLES_PER_GRANULE],
}

impl Granule {
    fn boxed() -> Box<Granule> {
        Box::new(Granule { xr: [0.0; SAMPLES_PER_GRANULE], pcm: [0; SAMPLES_PER_GRANULE] })
    }

    fn synthesize(&mut self, state: &mut SynthesisState) {
        frequency_inversion(&mut self.xr);
        synthesis::synthesis(state, GRANULE_BLOCKS, &self.xr, &mut self.pcm);
    }
}

/// State shared between the decode thread and the workers.
struct Handoff {
    /// The number of workers that finished the granule in flight.
    completed: usize,
    /// Finished buffers, per channel.
    done: [Option<Box<Granule>>; 2],
    shutdown: bool,
}

struct Shared {
    handoff: Mutex<Handoff>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Handoff> {
        self.handoff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_worker(ch: usize, channels: usize, jobs: Receiver<Box<Granule>>, shared: Arc<Shared>) {
    let mut state = SynthesisState::default();

    // The decode thread hanging up is the signal to exit.
    while let Ok(mut granule) = jobs.recv() {
        granule.synthesize(&mut state);

        let mut handoff = shared.lock();

        if handoff.shutdown {
            break;
        }

        handoff.done[ch] = Some(granule);
        handoff.completed += 1;

        if handoff.completed == channels {
            shared.cond.notify_all();
        }
    }

    trace!("synthesis worker {} exiting", ch);
}

/// The worker threads, one per channel.
struct Workers {
    channels: usize,
    shared: Arc<Shared>,
    senders: Vec<Sender<Box<Granule>>>,
    handles: Vec<JoinHandle<()>>,
    in_flight: bool,
}

impl Workers {
    fn spawn(channels: usize) -> Result<Workers> {
        let shared = Arc::new(Shared {
            handoff: Mutex::new(Handoff { completed: channels, done: [None, None], shutdown: false }),
            cond: Condvar::new(),
        });

        let mut workers = Workers {
            channels,
            shared,
            senders: Vec::with_capacity(channels),
            handles: Vec::with_capacity(channels),
            in_flight: false,
        };

        for ch in 0..channels {
            let (tx, rx) = mpsc::channel();
            let shared = Arc::clone(&workers.shared);

            let handle = thread::Builder::new()
                .name(format!("synthesis-{}", ch))
                .spawn(move || run_worker(ch, channels, rx, shared))?;

            workers.senders.push(tx);
            workers.handles.push(handle);
        }

        debug!("started {} synthesis workers", channels);

        Ok(workers)
    }

    /// Block until every worker finished the granule in flight, then take the finished buffers.
    fn collect(&mut self) -> [Option<Box<Granule>>; 2] {
        if !self.in_flight {
            return [None, None];
        }

        let mut handoff = self.shared.lock();

        while handoff.completed < self.channels && !handoff.shutdown {
            handoff = self.shared.cond.wait(handoff).unwrap_or_else(PoisonError::into_inner);
        }

        self.in_flight = false;

        [handoff.done[0].take(), handoff.done[1].take()]
    }

    /// Hand one buffer to each worker. Every worker must be idle.
    fn dispatch(&mut self, jobs: Vec<Box<Granule>>) -> Result<()> {
        debug_assert!(!self.in_flight);

        self.shared.lock().completed = 0;
        self.in_flight = true;

        for (tx, job) in self.senders.iter().zip(jobs) {
            if tx.send(job).is_err() {
                // Do not wait on a worker that will never complete.
                self.shared.lock().completed = self.channels;
                return Err(Error::IoError(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "synthesis worker exited",
                )));
            }
        }

        Ok(())
    }

    /// The number of channels whose buffer is still being synthesized.
    fn outstanding(&self) -> usize {
        self.channels.saturating_sub(self.shared.lock().completed)
    }

    fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }

        {
            let mut handoff = self.shared.lock();
            handoff.shutdown = true;
            handoff.completed = self.channels;
        }
        self.shared.cond.notify_all();

        // Hang up, then wait for the workers to drain out.
        self.senders.clear();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("synthesis worker panicked");
            }
        }

        self.in_flight = false;

        debug!("stopped synthesis workers");
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Backend {
    Inline(Box<[SynthesisState; 2]>),
    Threaded(Workers),
}

/// `Synthesizer` owns the granule buffers the Layer III decoder fills and turns them into PCM.
pub struct Synthesizer {
    channels: usize,
    granules: [Box<Granule>; 2],
    backend: Backend,
}

impl Synthesizer {
    /// Create a synthesizer for `channels` channels. If `threaded`, one worker thread is started
    /// per channel.
    pub fn new(channels: usize, threaded: bool) -> Result<Synthesizer> {
        let channels = channels.clamp(1, 2);

        let backend = if threaded {
            Backend::Threaded(Workers::spawn(channels)?)
        }
        else {
            Backend::Inline(Box::default())
        };

        Ok(Synthesizer { channels, granules: [Granule::boxed(), Granule::boxed()], backend })
    }

    /// The number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The frequency line buffers of both channels for the granule being decoded.
    pub fn spectra_mut(
        &mut self,
    ) -> (&mut [f32; SAMPLES_PER_GRANULE], &mut [f32; SAMPLES_PER_GRANULE]) {
        let [left, right] = &mut self.granules;
        (&mut left.xr, &mut right.xr)
    }

    /// Synthesize the decoded granule.
    ///
    /// Inline, its PCM is written to `out` right away. Threaded, the granule is dispatched to the
    /// workers after the PCM of the previous granule has been written.
    pub fn submit(&mut self, out: &mut OutputBuffer, sink: &mut dyn AudioSink) -> Result<()> {
        let channels = self.channels;

        match &mut self.backend {
            Backend::Inline(states) => {
                for (ch, (granule, state)) in
                    self.granules.iter_mut().zip(states.iter_mut()).take(channels).enumerate()
                {
                    granule.synthesize(state);
                    out.write_channel(ch, &granule.pcm);
                }
                out.commit(SAMPLES_PER_GRANULE, sink)
            }
            Backend::Threaded(workers) => {
                let mut done = workers.collect();

                write_granules(&done, channels, out, sink)?;

                // The returned buffers become the next decode targets.
                let mut jobs = Vec::with_capacity(channels);

                for (granule, slot) in self.granules.iter_mut().zip(done.iter_mut()).take(channels)
                {
                    let next = slot.take().unwrap_or_else(Granule::boxed);
                    jobs.push(mem::replace(granule, next));
                }

                workers.dispatch(jobs)
            }
        }
    }

    /// Wait for the granule in flight, if any, and write its PCM.
    pub fn finish(&mut self, out: &mut OutputBuffer, sink: &mut dyn AudioSink) -> Result<()> {
        if let Backend::Threaded(workers) = &mut self.backend {
            let done = workers.collect();
            write_granules(&done, self.channels, out, sink)?;
        }
        Ok(())
    }

    /// The number of channels with a granule still being synthesized. Never more than the
    /// channel count.
    pub fn outstanding(&self) -> usize {
        match &self.backend {
            Backend::Inline(_) => 0,
            Backend::Threaded(workers) => workers.outstanding(),
        }
    }

    /// True if synthesis runs on worker threads that have not been stopped.
    pub fn is_threaded(&self) -> bool {
        matches!(&self.backend, Backend::Threaded(workers) if !workers.handles.is_empty())
    }

    /// Stop and join the workers. Any granule in flight is dropped.
    pub fn close(&mut self) {
        if let Backend::Threaded(workers) = &mut self.backend {
            workers.shutdown();
        }
    }
}

fn write_granules(
    done: &[Option<Box<Granule>>; 2],
    channels: usize,
    out: &mut OutputBuffer,
    sink: &mut dyn AudioSink,
) -> Result<()> {
    // A missing channel means the pipeline was shut down mid-granule.
    if done[..channels].iter().any(Option::is_none) {
        return Ok(());
    }

    for (ch, granule) in done[..channels].iter().flatten().enumerate() {
        out.write_channel(ch, &granule.pcm);
    }

    out.commit(SAMPLES_PER_GRANULE, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    use mpadec_core::audio::{MemorySink, SignalSpec};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn fill(synth: &mut Synthesizer, rng: &mut SmallRng) {
        let (left, right) = synth.spectra_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l = rng.random_range(-0.5..0.5);
            *r = rng.random_range(-0.5..0.5);
        }
    }

    fn run(threaded: bool, granules: usize) -> (Vec<i16>, MemorySink) {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(2, 44_100));

        let mut out = OutputBuffer::new(2, 2 * 2 * SAMPLES_PER_GRANULE);
        let mut synth = Synthesizer::new(2, threaded).unwrap();

        for g in 0..granules {
            fill(&mut synth, &mut rng);
            synth.submit(&mut out, &mut sink).unwrap();

            assert!(synth.outstanding() <= 2);

            // Threaded, the PCM of a granule is written when the next one is submitted.
            let expected = if threaded { g } else { g + 1 };
            let written = sink.samples().len() + out.pending() / 2;
            assert_eq!(written, 2 * SAMPLES_PER_GRANULE * expected);
        }

        synth.finish(&mut out, &mut sink).unwrap();
        assert_eq!(synth.outstanding(), 0);

        out.flush(&mut sink).unwrap();
        synth.close();
        assert!(!synth.is_threaded());

        (sink.samples(), sink)
    }

    #[test]
    fn verify_threaded_matches_inline() {
        let (inline, _) = run(false, 12);
        let (threaded, sink) = run(true, 12);

        assert_eq!(inline.len(), 12 * 2 * SAMPLES_PER_GRANULE);
        assert_eq!(inline, threaded);
        assert!(sink.is_drained());
        assert!(inline.iter().any(|&s| s != 0));
    }

    #[test]
    fn verify_single_outstanding_granule_per_channel() {
        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(1, 44_100));

        let mut out = OutputBuffer::new(1, 2 * SAMPLES_PER_GRANULE);
        let mut synth = Synthesizer::new(1, true).unwrap();

        for _ in 0..64 {
            synth.submit(&mut out, &mut sink).unwrap();

            // The workers hold at most the granule just dispatched.
            assert!(synth.outstanding() <= synth.channels());
            if let Backend::Threaded(workers) = &synth.backend {
                assert!(workers.in_flight);
                assert!(workers.shared.lock().completed <= 1);
            }
        }

        synth.finish(&mut out, &mut sink).unwrap();
        assert_eq!(sink.samples().len(), 64 * SAMPLES_PER_GRANULE);
    }

    #[test]
    fn verify_close_joins_workers() {
        let mut sink = MemorySink::new();
        sink.open(SignalSpec::new(2, 44_100));

        let mut out = OutputBuffer::new(2, 4 * SAMPLES_PER_GRANULE);
        let mut synth = Synthesizer::new(2, true).unwrap();

        synth.submit(&mut out, &mut sink).unwrap();

        // Closing with a granule in flight neither blocks nor errors.
        synth.close();
        assert!(!synth.is_threaded());

        synth.finish(&mut out, &mut sink).unwrap();
        synth.close();
    }
}
