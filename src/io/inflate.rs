use std::io::{self, Read, SeekFrom};

use flate2::read::DeflateDecoder;

use super::{Stream, resolve_seek};
use crate::error::{Error, Result};
use crate::handle::Handle;

const DISCARD_CHUNK: usize = 8 * 1024;

/// Read-only stream that inflates raw deflate data on demand.
///
/// Bytes are produced lazily from the compressed source. Once the full
/// uncompressed size has been produced, the CRC-32 of the output is
/// compared with the expected value and the deflate data must end there.
/// Seeking forward inflates and
/// discards; seeking backward restarts from the beginning of the source.
pub struct InflateStream {
    source: Handle<dyn Stream>,
    decoder: DeflateDecoder<Handle<dyn Stream>>,
    size: u64,
    expected_crc: u32,
    hasher: crc32fast::Hasher,
    // Bytes produced by the current decoder.
    produced: u64,
    // Logical position; may run ahead of `produced` after a seek.
    position: u64,
    // Set once the current decoder has been checked at the declared end.
    verified: bool,
}

impl InflateStream {
    pub fn new(source: Handle<dyn Stream>, size: u64, expected_crc: u32) -> Result<Self> {
        source.lock().seek(SeekFrom::Start(0))?;
        let decoder = DeflateDecoder::new(source.clone());
        Ok(Self {
            source,
            decoder,
            size,
            expected_crc,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            position: 0,
            verified: false,
        })
    }

    fn restart(&mut self) -> Result<()> {
        self.source.lock().seek(SeekFrom::Start(0))?;
        self.decoder = DeflateDecoder::new(self.source.clone());
        self.hasher = crc32fast::Hasher::new();
        self.produced = 0;
        self.verified = false;
        Ok(())
    }

    /// Inflate up to `buf.len()` bytes, never past the declared size.
    fn inflate(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.size - self.produced) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.decoder.read(&mut buf[..want]).map_err(codec_error)?;
        if n == 0 {
            return Err(Error::Integrity(format!(
                "compressed data ended after {} of {} bytes",
                self.produced, self.size
            )));
        }
        self.hasher.update(&buf[..n]);
        self.produced += n as u64;
        if self.produced == self.size {
            self.verify_end()?;
        }
        Ok(n)
    }

    fn verify_end(&mut self) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        let mut extra = [0u8; 1];
        if self.decoder.read(&mut extra).map_err(codec_error)? != 0 {
            return Err(Error::Integrity(format!(
                "compressed data holds more than the declared {} bytes",
                self.size
            )));
        }
        let actual = self.hasher.clone().finalize();
        if actual != self.expected_crc {
            return Err(Error::Integrity(format!(
                "CRC-32 mismatch: expected {:08x}, computed {:08x}",
                self.expected_crc, actual
            )));
        }
        self.verified = true;
        Ok(())
    }
}

fn codec_error(err: io::Error) -> Error {
    if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        if let Some(inner) = err.into_inner() {
            if let Ok(own) = inner.downcast::<Error>() {
                return *own;
            }
        }
        return Error::Unexpected("codec error lost its cause".to_string());
    }
    Error::Integrity(format!("corrupt deflate data: {err}"))
}

impl Stream for InflateStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.size {
            // An empty entry never reaches `inflate`.
            if self.size == 0 {
                self.verify_end()?;
            }
            return Ok(0);
        }
        if self.position < self.produced {
            self.restart()?;
        }
        let mut scratch = [0u8; DISCARD_CHUNK];
        while self.produced < self.position {
            let gap = (self.position - self.produced).min(DISCARD_CHUNK as u64) as usize;
            self.inflate(&mut scratch[..gap])?;
        }
        let n = self.inflate(buf)?;
        self.position = self.produced;
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::NotSupported("inflate streams are read-only".to_string()))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, self.size)?;
        Ok(self.position)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.size)
    }
}

crate::implements!(InflateStream => dyn Stream);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::testing::MemoryStream;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample() -> Vec<u8> {
        (0..50_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    fn inflater(data: &[u8], crc: u32) -> InflateStream {
        InflateStream::new(MemoryStream::handle(compress(data)), data.len() as u64, crc).unwrap()
    }

    fn drain(stream: &mut InflateStream) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn inflates_full_content() {
        let data = sample();
        let mut stream = inflater(&data, crc32fast::hash(&data));
        assert_eq!(stream.size().unwrap(), data.len() as u64);
        assert_eq!(drain(&mut stream).unwrap(), data);
    }

    #[test]
    fn crc_mismatch_is_integrity_error() {
        let data = sample();
        let mut stream = inflater(&data, crc32fast::hash(&data) ^ 1);
        let err = drain(&mut stream).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn truncated_source_is_integrity_error() {
        let data = sample();
        let mut compressed = compress(&data);
        compressed.truncate(compressed.len() / 2);
        let mut stream = InflateStream::new(
            MemoryStream::handle(compressed),
            data.len() as u64,
            crc32fast::hash(&data),
        )
        .unwrap();
        let err = drain(&mut stream).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn seeks_forward_and_backward() {
        let data = sample();
        let mut stream = inflater(&data, crc32fast::hash(&data));
        let mut buf = [0u8; 16];

        stream.seek(SeekFrom::Start(70_000)).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &data[70_000..70_016]);

        stream.seek(SeekFrom::Start(10)).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &data[10..26]);

        stream.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_entry_still_checks_crc() {
        let mut stream = inflater(b"", 0);
        assert!(drain(&mut stream).unwrap().is_empty());

        let mut stream = inflater(b"", 0x1234_5678);
        let err = drain(&mut stream).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn output_past_declared_size_is_integrity_error() {
        let data = sample();
        let short = 1000;
        let mut stream = InflateStream::new(
            MemoryStream::handle(compress(&data)),
            short as u64,
            crc32fast::hash(&data[..short]),
        )
        .unwrap();
        let err = drain(&mut stream).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn writes_are_not_supported() {
        let data = b"abc";
        let mut stream = inflater(data, crc32fast::hash(data));
        assert_eq!(stream.write(b"x").unwrap_err().kind(), ErrorKind::NotSupported);
    }
}
