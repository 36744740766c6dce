use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{FilePath, Stream};
use crate::error::{Error, Result};

/// How a [`FileStream`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Existing file, read only.
    Read,
    /// Create or truncate, then read and write.
    WriteUpdate,
    /// Existing file, read and write in place.
    ReadUpdate,
}

/// Stream backed by an OS file. The file handle is released on drop.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    path: PathBuf,
    mode: FileMode,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        match mode {
            FileMode::Read => options.read(true),
            FileMode::WriteUpdate => options.read(true).write(true).create(true).truncate(true),
            FileMode::ReadUpdate => options.read(true).write(true),
        };
        let file = options.open(path).map_err(|e| Error::from(e).context(path))?;
        tracing::trace!(path = %path.display(), ?mode, "opened file stream");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.mode == FileMode::Read {
            return Err(Error::Access(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        Ok(self.file.write(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(_) => pos,
            SeekFrom::Current(_) | SeekFrom::End(_) => {
                let current = self.file.stream_position()?;
                let size = self.file.metadata()?.len();
                SeekFrom::Start(super::resolve_seek(pos, current, size)?)
            }
        };
        Ok(self.file.seek(target)?)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl FilePath for FileStream {
    fn path(&self) -> &Path {
        &self.path
    }
}

crate::implements!(FileStream => dyn Stream, dyn FilePath);
