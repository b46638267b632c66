// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Mpadec crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

// Shared modules.
pub mod common;
pub mod header;
pub mod vbr;

// Decoder modules.
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
mod decoder;
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
mod output;
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
mod playback;
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
mod synthesis;

// Shared layer 1 & 2 decoder support module.
#[cfg(any(feature = "mp1", feature = "mp2"))]
mod layer12;

// Layer-specific decoder support modules.
#[cfg(feature = "mp1")]
mod layer1;
#[cfg(feature = "mp2")]
mod layer2;
#[cfg(feature = "mp3")]
mod layer3;
#[cfg(feature = "mp3")]
mod pipeline;

#[cfg(test)]
mod test_util;

pub use header::{FrameHeader, FrameSync};
pub use vbr::VbrInfo;

#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
pub use decoder::{Decoder, DecoderOptions};
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
pub use output::OutputBuffer;
#[cfg(any(feature = "mp1", feature = "mp2", feature = "mp3"))]
pub use playback::{Playback, PlaybackControl, PlaybackOptions, PlaybackReport};
