use std::io::SeekFrom;

use super::{Stream, resolve_seek};
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Fixed-size window `[offset, offset + length)` over another stream.
///
/// Positions are relative to the window and translated on every access,
/// so any number of windows (including windows of windows) can share one
/// backing stream without copying. The window never grows.
pub struct RangeStream {
    inner: Handle<dyn Stream>,
    offset: u64,
    length: u64,
    position: u64,
}

impl RangeStream {
    pub fn new(inner: Handle<dyn Stream>, offset: u64, length: u64) -> Result<Self> {
        if offset.checked_add(length).is_none() {
            return Err(Error::InvalidParameter(format!(
                "range {offset}+{length} overflows"
            )));
        }
        Ok(Self {
            inner,
            offset,
            length,
            position: 0,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }
}

impl Stream for RangeStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = {
            let mut inner = self.inner.lock();
            inner.seek(SeekFrom::Start(self.offset + self.position))?;
            inner.read(&mut buf[..want])?
        };
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.length {
            return Err(Error::OutOfBounds(format!(
                "write at {} past end of {}-byte range",
                self.position, self.length
            )));
        }
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        let n = {
            let mut inner = self.inner.lock();
            inner.seek(SeekFrom::Start(self.offset + self.position))?;
            inner.write(&buf[..want])?
        };
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, self.length)?;
        Ok(self.position)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.length)
    }
}

crate::implements!(RangeStream => dyn Stream);
