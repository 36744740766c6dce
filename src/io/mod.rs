//! Byte streams: OS files, fixed windows over other streams, and
//! on-the-fly inflation of compressed entries.

mod file;
mod inflate;
mod range;

pub use file::{FileMode, FileStream};
pub use inflate::InflateStream;
pub use range::RangeStream;

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::handle::{Handle, Object};

/// Sequential byte stream with a current position.
pub trait Stream: Send {
    /// Read up to `buf.len()` bytes at the current position. Zero means end.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to `buf.len()` bytes at the current position.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Move the position and return the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Total length of the stream in bytes.
    fn size(&mut self) -> Result<u64>;

    fn position(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    /// Fill `buf` completely or fail with a format error.
    fn read_exact(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read(buf)?;
            if n == 0 {
                return Err(Error::Format(format!(
                    "unexpected end of stream, {} bytes missing",
                    buf.len()
                )));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::OutOfBounds(format!(
                    "stream accepted no more bytes, {} left unwritten",
                    buf.len()
                )));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Read exactly `buf.len()` bytes starting at absolute `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }
}

/// Capability of streams backed by a named file.
pub trait FilePath: Send {
    fn path(&self) -> &Path;
}

impl Handle<dyn Stream> {
    /// Wrap a concrete stream in a new `dyn Stream` handle.
    pub fn from_stream<S: Stream + Object>(stream: S) -> Self {
        Handle::new(stream).upcast(|s| s as Arc<Mutex<dyn Stream>>)
    }
}

/// Resolve a seek request against a stream of `size` bytes positioned at
/// `current`. Positions before the start are rejected.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, size: u64) -> Result<u64> {
    let (base, delta) = match pos {
        SeekFrom::Start(offset) => return Ok(offset),
        SeekFrom::Current(delta) => (current, delta),
        SeekFrom::End(delta) => (size, delta),
    };
    base.checked_add_signed(delta)
        .ok_or_else(|| Error::InvalidParameter(format!("seek to {base} {delta:+} is out of range")))
}

// Lets codecs pull directly from a shared stream.
impl io::Read for Handle<dyn Stream> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.lock().read(buf)?)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStream;
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn resolve_seek_handles_all_origins() {
        assert_eq!(resolve_seek(SeekFrom::Start(7), 3, 10).unwrap(), 7);
        assert_eq!(resolve_seek(SeekFrom::Current(-2), 3, 10).unwrap(), 1);
        assert_eq!(resolve_seek(SeekFrom::End(5), 3, 10).unwrap(), 15);
        let err = resolve_seek(SeekFrom::Current(-4), 3, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn read_exact_reports_truncation() {
        let stream = MemoryStream::handle(b"abc".to_vec());
        let mut buf = [0u8; 5];
        let err = stream.lock().read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatError);
    }

    #[test]
    fn handle_is_std_reader() {
        use std::io::Read;

        let mut stream = MemoryStream::handle(b"hello".to_vec());
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }
}
