//! Read-only access to the ZIP container that carries a package.
//!
//! [`ZipParser`] locates the end of central directory record (following the
//! ZIP64 locator when any field is saturated), walks the central directory
//! and resolves each local header once. [`ZipObject`] then exposes the
//! resulting entries as a [`StorageObject`](crate::storage::StorageObject):
//! every part is a fixed byte range of the backing stream, inflated on the
//! fly when the entry is deflated.
//!
//! Stored and deflated entries are readable. Encrypted entries, spanned
//! archives and other compression methods are rejected as format errors.

mod object;
mod parser;
mod structures;

pub use object::ZipObject;
pub use parser::ZipParser;
pub use structures::*;
