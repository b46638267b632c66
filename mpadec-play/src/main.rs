// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Justification: Fields on DecoderOptions and PlaybackOptions may change at any time, but
// mpadec-play doesn't want to be updated every time those fields change, therefore always fill
// in the remaining fields with default values.
#![allow(clippy::needless_update)]

use std::io::Write;

use mpadec_bundle_mpa::{DecoderOptions, FrameSync, Playback, PlaybackOptions};
use mpadec_core::audio::{AudioSink, NullSink};
use mpadec_core::errors::Result;
use mpadec_core::io::{ByteSource, FileSource, ReadOnlySource};

use clap::{Arg, ArgMatches};
use log::{error, info, warn};

mod output;

fn main() {
    pretty_env_logger::init();

    let args = clap::Command::new("Mpadec Play")
        .version("1.0")
        .about("Decode MPEG audio Layer I, II, and III with Mpadec")
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("FILE")
                .help("Write the decoded audio to a WAV file")
                .conflicts_with_all(&["null", "info"]),
        )
        .arg(
            Arg::new("null")
                .long("null")
                .help("Decode, but discard the audio")
                .conflicts_with_all(&["output", "info"]),
        )
        .arg(
            Arg::new("no-threads")
                .long("no-threads")
                .help("Run Layer III synthesis on the decode thread"),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Print the stream and VBR tag information, then exit"),
        )
        .arg(Arg::new("no-progress").long("no-progress").help("Do not display decoding progress"))
        .arg(
            Arg::new("gain")
                .long("gain")
                .value_name("DB")
                .allow_hyphen_values(true)
                .help("Apply a gain, in decibels, to the output"),
        )
        .arg(
            Arg::new("INPUT")
                .help("The input file path, or - to use standard input")
                .required(true)
                .index(1),
        )
        .get_matches();

    // For any error, return an exit code -1. Otherwise return the exit code provided.
    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            -1
        }
    };

    std::process::exit(code)
}

fn run(args: &ArgMatches) -> Result<i32> {
    let path = args.value_of("INPUT").unwrap();

    let opts = PlaybackOptions {
        decoder: DecoderOptions {
            threaded_synthesis: !args.is_present("no-threads"),
            ..Default::default()
        },
        ..Default::default()
    };

    // If the path string is '-' then read from standard input.
    if path == "-" {
        play(ReadOnlySource::new(std::io::stdin()), args, opts)
    }
    else {
        play(FileSource::open(path)?, args, opts)
    }
}

fn play<S: ByteSource>(source: S, args: &ArgMatches, opts: PlaybackOptions) -> Result<i32> {
    let mut playback = Playback::new(source, opts);

    if args.is_present("info") {
        playback.probe()?;
        print_info(playback.sync());
        return Ok(0);
    }

    let mut sink: Box<dyn AudioSink> = match args.value_of("output") {
        Some(path) => Box::new(output::WavSink::new(path)),
        None => Box::new(NullSink::new()),
    };

    if let Some(gain) = args.value_of("gain") {
        match gain.parse::<f32>() {
            Ok(db) => {
                if !sink.set_gain(db) {
                    warn!("the output does not support gain, ignoring --gain");
                }
            }
            Err(_) => {
                error!("invalid gain '{}'", gain);
                return Ok(-1);
            }
        }
    }

    let no_progress = args.is_present("no-progress");

    let report = playback.run_with_progress(sink.as_mut(), |sync| {
        if !no_progress {
            print_progress(sync);
        }
    })?;

    if !no_progress {
        println!();
    }

    if let Some(summary) = playback.sync().summary() {
        info!("{}", summary);
    }

    info!(
        "{} frames, {} skipped, {} resyncs, {} bytes of pcm",
        report.frames,
        report.skipped_frames,
        playback.sync().resyncs(),
        report.pcm_bytes
    );

    Ok(0)
}

fn print_info(sync: &FrameSync) {
    if let Some(summary) = sync.summary() {
        println!("{}", summary);
    }

    if let Some(header) = sync.first_header() {
        println!("        frame: {}", header);
    }

    println!("       frames: {}", sync.track_frames());
    println!("     duration: {:.2}s", sync.duration());

    if let Some(vbr) = sync.vbr_info() {
        println!("{}", vbr);
    }
}

fn print_progress(sync: &FrameSync) {
    // Only redraw every 16 frames.
    if sync.frames() % 16 != 0 {
        return;
    }

    // Lock stdout once and use write! rather then print!.
    let stdout = std::io::stdout();
    let mut output = stdout.lock();

    write!(output, "\r{}", sync.progress()).unwrap();
    output.flush().unwrap();
}
