use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::io::{FilePath, InflateStream, RangeStream, Stream};
use crate::storage::{OpenMode, StorageObject};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipEntry};

/// Read-only storage over a ZIP container.
///
/// The central directory is parsed once at open time. Each part is served
/// as a window over the shared backing stream, inflated on the fly when
/// the entry is deflated.
pub struct ZipObject {
    stream: Handle<dyn Stream>,
    entries: Vec<ZipEntry>,
    index: HashMap<String, usize>,
    location: String,
}

impl ZipObject {
    pub fn open(stream: Handle<dyn Stream>) -> Result<Self> {
        let location = stream
            .query::<dyn FilePath>()
            .map(|named| named.lock().path().display().to_string())
            .unwrap_or_else(|_| "<stream>".to_string());

        let entries = ZipParser::new(stream.clone())?
            .read_entries()
            .map_err(|e| e.context(&location))?;
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.file_name.clone(), i))
            .collect();
        tracing::debug!(container = %location, entries = entries.len(), "read central directory");

        Ok(Self {
            stream,
            entries,
            index,
            location,
        })
    }

    /// Every entry, directories included, in central directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Result<&ZipEntry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| Error::NotFound(format!("{name} in {}", self.location)))
    }
}

impl fmt::Debug for ZipObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipObject")
            .field("location", &self.location)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl StorageObject for ZipObject {
    fn path(&self) -> String {
        self.location.clone()
    }

    fn file_names(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.file_name.clone())
            .collect())
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.entry(name)?.uncompressed_size)
    }

    fn open_file(&mut self, name: &str, mode: OpenMode) -> Result<Handle<dyn Stream>> {
        if mode == OpenMode::Write {
            return Err(Error::NotSupported(format!(
                "{} is a read-only container",
                self.location
            )));
        }
        let entry = self.entry(name)?;
        if entry.is_encrypted() {
            return Err(Error::NotSupported(format!("{name} is encrypted")));
        }

        let range = RangeStream::new(self.stream.clone(), entry.data_offset, entry.compressed_size)?;
        match entry.compression_method {
            CompressionMethod::Stored => Ok(Handle::from_stream(range)),
            CompressionMethod::Deflate => {
                let inflate = InflateStream::new(
                    Handle::from_stream(range),
                    entry.uncompressed_size,
                    entry.crc32,
                )?;
                Ok(Handle::from_stream(inflate))
            }
            CompressionMethod::Unknown(method) => Err(Error::NotSupported(format!(
                "{name} uses compression method {method}"
            ))),
        }
    }
}

crate::implements!(ZipObject => dyn StorageObject);
