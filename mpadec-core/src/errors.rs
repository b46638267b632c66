// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Mpadec.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading from the byte source or writing to the sink.
    IoError(std::io::Error),
    /// The stream contained malformed data and the current frame could not be decoded.
    DecodeError(&'static str),
    /// An unsupported stream feature was encountered.
    Unsupported(&'static str),
    /// No frame header could be found in the searched window. More bytes are required.
    SyncLost,
    /// The `main_data_begin` back-reference of a Layer III frame points before the start of the
    /// buffered bit reservoir. Expected for the first frames of a stream.
    InsufficientMainData { required: usize, available: usize },
    /// Decoding was stopped on request.
    Stopped,
}

impl Error {
    /// Returns true if decoding may continue with the next frame after this error.
    pub fn is_recoverable(&self) -> bool {
        match *self {
            Error::DecodeError(_) => true,
            Error::Unsupported(_) => true,
            Error::SyncLost => true,
            Error::InsufficientMainData { .. } => true,
            Error::IoError(_) | Error::Stopped => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::SyncLost => {
                write!(f, "frame synchronization lost")
            }
            Error::InsufficientMainData { required, available } => {
                write!(
                    f,
                    "insufficient main data: {} bytes referenced, {} bytes buffered",
                    required, available
                )
            }
            Error::Stopped => {
                write!(f, "decoding stopped")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an unsupport feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create an insufficient main data error.
pub fn main_data_error<T>(required: usize, available: usize) -> Result<T> {
    Err(Error::InsufficientMainData { required, available })
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_recoverable_classes() {
        assert!(Error::DecodeError("x").is_recoverable());
        assert!(Error::SyncLost.is_recoverable());
        assert!(Error::InsufficientMainData { required: 10, available: 2 }.is_recoverable());
        assert!(!Error::Stopped.is_recoverable());
        assert!(!Error::from(io::Error::new(io::ErrorKind::Other, "x")).is_recoverable());
    }

    #[test]
    fn verify_display() {
        let err = Error::InsufficientMainData { required: 300, available: 12 };
        assert_eq!(
            err.to_string(),
            "insufficient main data: 300 bytes referenced, 12 bytes buffered"
        );
        assert_eq!(Error::DecodeError("bad").to_string(), "malformed stream: bad");
    }
}
