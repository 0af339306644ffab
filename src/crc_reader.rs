//! Helper module to check a decoded payload against its central directory record
//!
//! The CRC32 half is borrowed from zip-rs:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Reader that validates the CRC32 and the total length when it reaches the EOF.
///
/// Failures surface as `io::ErrorKind::InvalidData`
/// so the extractor can tell them apart from trouble writing the output.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    provided_checksum: u32,
    expected_length: u64,
    length: u64,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, provided_checksum: u32, expected_length: u64) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            provided_checksum,
            expected_length,
            length: 0,
        }
    }

    /// Returns true if the final checksum matches the one provided by `new()`
    fn check_matches(&self) -> bool {
        self.provided_checksum == self.hasher.clone().finalize()
    }

    fn check_at_eof(&self) -> io::Result<()> {
        if self.length != self.expected_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Decoded {} bytes, expected {}",
                    self.length, self.expected_length
                ),
            ));
        }
        if !self.check_matches() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid checksum"));
        }
        Ok(())
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.check_at_eof()?;
                0
            }
            Ok(n) => n,
            Err(e) => return Err(e),
        };
        self.length += count as u64;
        // Don't wait for EOF to notice a payload that's running long.
        if self.length > self.expected_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Decoded more than the expected {} bytes", self.expected_length),
            ));
        }
        self.hasher.update(&buf[0..count]);
        Ok(count)
    }
}
