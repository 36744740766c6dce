//! Named-part containers.
//!
//! A [`StorageObject`] is anything that holds parts addressed by
//! `/`-separated names: a ZIP container ([`ZipObject`](crate::zip::ZipObject))
//! or a directory tree ([`DirectoryObject`]). Package code copies between
//! the two without knowing which is which.

mod directory;

pub use directory::DirectoryObject;

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::handle::{Handle, Object};
use crate::io::Stream;

/// Canonical separator of part names.
pub const SEPARATOR: char = '/';

/// Access requested from [`StorageObject::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or replace the part.
    Write,
}

pub trait StorageObject: Send {
    /// Human-readable location of the container.
    fn path(&self) -> String;

    /// Names of all parts, in the container's enumeration order.
    fn file_names(&self) -> Result<Vec<String>>;

    /// Uncompressed size of a part.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Open a part. Unknown names fail with `NotFound` when reading.
    fn open_file(&mut self, name: &str, mode: OpenMode) -> Result<Handle<dyn Stream>>;
}

impl Handle<dyn StorageObject> {
    /// Wrap a concrete container in a new `dyn StorageObject` handle.
    pub fn from_storage<S: StorageObject + Object>(storage: S) -> Self {
        Handle::new(storage).upcast(|s| s as Arc<Mutex<dyn StorageObject>>)
    }
}
