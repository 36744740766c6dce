use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{OpenMode, SEPARATOR, StorageObject};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::io::{FileMode, FileStream, Stream};

/// Storage over a directory tree. Parts map 1:1 to files under the root;
/// files and intermediate directories are created on first write.
#[derive(Debug, Clone)]
pub struct DirectoryObject {
    root: PathBuf,
}

impl DirectoryObject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a part name to a path under the root, rejecting anything that
    /// could resolve outside it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(Error::InvalidName("empty part name".to_string()));
        }
        let mut path = self.root.clone();
        for segment in name.split([SEPARATOR, '\\']) {
            match segment {
                "" => {
                    return Err(Error::InvalidName(format!(
                        "{name:?} is absolute or has an empty segment"
                    )));
                }
                "." | ".." => {
                    return Err(Error::InvalidName(format!(
                        "{name:?} contains a relative path segment"
                    )));
                }
                s if s.contains([':', '\0']) => {
                    return Err(Error::InvalidName(format!(
                        "{name:?} contains a reserved character"
                    )));
                }
                s => path.push(s),
            }
        }
        Ok(path)
    }
}

impl StorageObject for DirectoryObject {
    fn path(&self) -> String {
        self.root.display().to_string()
    }

    fn file_names(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Access(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| Error::Unexpected(e.to_string()))?;
            let segments: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            names.push(segments.join(&SEPARATOR.to_string()));
        }
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let path = self.resolve(name)?;
        Ok(fs::metadata(&path)
            .map_err(|e| Error::from(e).context(&path))?
            .len())
    }

    fn open_file(&mut self, name: &str, mode: OpenMode) -> Result<Handle<dyn Stream>> {
        let path = self.resolve(name)?;
        let stream = match mode {
            OpenMode::Read => FileStream::open(&path, FileMode::Read)?,
            OpenMode::Write => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| Error::from(e).context(parent))?;
                }
                FileStream::open(&path, FileMode::WriteUpdate)?
            }
        };
        Ok(Handle::from_stream(stream))
    }
}

crate::implements!(DirectoryObject => dyn StorageObject);
