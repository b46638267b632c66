// Mpadec
// Copyright (c) 2026 The Project Mpadec Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements byte sources and bit-level readers.
//!
//! A [`ByteSource`] supplies the compressed stream. Bits are read MSB first through the
//! [`ReadBits`] trait, either from a borrowed slice with [`BitReader`], or from the sliding
//! [`BitReservoir`] that retains Layer III main data across frames.

use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

pub mod bit;

pub use bit::*;

/// `ByteSource` is the producer of compressed bytes consumed by the decode loop.
///
/// Seeking is an optional capability. A source that cannot seek returns `false` from
/// [`ByteSource::seek`] and the caller must not assume any other position.
pub trait ByteSource: Send {
    /// Read up-to `buf.len()` bytes into `buf`. Returns 0 at the end of the source.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Seek to the absolute byte position `pos`. Returns false if seeking is unsupported or failed.
    fn seek(&mut self, pos: u64) -> bool;

    /// Returns the length in bytes, if available.
    fn byte_len(&self) -> Option<u64>;

    /// Release the source. Further reads return 0.
    fn close(&mut self) {}
}

/// A `ByteSource` reading from a local file.
pub struct FileSource {
    file: Option<File>,
    len: Option<u64>,
}

impl FileSource {
    /// Open the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;

        // FIFOs and devices report a meaningless length.
        let len = match file.metadata() {
            Ok(metadata) if metadata.is_file() => Some(metadata.len()),
            _ => None,
        };

        debug!("opened {} ({:?} bytes)", path.as_ref().display(), len);

        Ok(FileSource { file: Some(file), len })
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }

    fn seek(&mut self, pos: u64) -> bool {
        match (self.file.as_mut(), self.len) {
            (Some(file), Some(_)) => file.seek(SeekFrom::Start(pos)).is_ok(),
            _ => false,
        }
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }

    fn close(&mut self) {
        self.file = None;
    }
}

impl<T: AsRef<[u8]> + Send> ByteSource for io::Cursor<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, pos: u64) -> bool {
        if pos > self.get_ref().as_ref().len() as u64 {
            return false;
        }
        self.set_position(pos);
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }

    fn close(&mut self) {
        let len = self.get_ref().as_ref().len() as u64;
        self.set_position(len);
    }
}

/// `ReadOnlySource` wraps any source implementing [`std::io::Read`] in an unseekable
/// [`ByteSource`] of unknown length.
pub struct ReadOnlySource<R: io::Read> {
    inner: Option<R>,
}

impl<R: io::Read + Send> ReadOnlySource<R> {
    /// Instantiates a new `ReadOnlySource<R>` by taking ownership and wrapping the provided
    /// `Read`er.
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner: Some(inner) }
    }

    /// Unwraps this `ReadOnlySource<R>`, returning the underlying reader if it was not closed.
    pub fn into_inner(self) -> Option<R> {
        self.inner
    }
}

impl<R: io::Read + Send> ByteSource for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }

    fn seek(&mut self, _: u64) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteSource, ReadOnlySource};
    use std::io::Cursor;

    #[test]
    fn verify_cursor_source() {
        let mut src = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];

        assert_eq!(src.byte_len(), Some(5));
        assert_eq!(ByteSource::read(&mut src, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert!(ByteSource::seek(&mut src, 1));
        assert_eq!(ByteSource::read(&mut src, &mut buf).unwrap(), 3);
        assert_eq!(buf, [2, 3, 4]);
        assert!(!ByteSource::seek(&mut src, 6));

        src.close();
        assert_eq!(ByteSource::read(&mut src, &mut buf).unwrap(), 0);
    }

    #[test]
    fn verify_read_only_source() {
        let mut src = ReadOnlySource::new(&[9u8, 8, 7][..]);
        let mut buf = [0u8; 4];

        assert!(!src.seek(0));
        assert_eq!(src.byte_len(), None);
        assert_eq!(src.read(&mut buf).unwrap(), 3);

        src.close();
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }
}
