//! # appx-unpack
//!
//! Validate and unpack ZIP-based application packages (`.appx`/`.msix`).
//!
//! A package is a ZIP container holding payload parts plus a reserved set of
//! footprint parts: the manifest, the block map, the content-types part and
//! the signature. This crate reads the container, checks it against a
//! [`ValidationPolicy`] and copies every part into a directory.
//!
//! ## Features
//!
//! - ZIP and ZIP64 containers, STORED and DEFLATE entries, CRC-32 checked
//! - Block map size and SHA-256 block hash verification
//! - Content-type coverage and signature presence checks
//! - Reference-counted handles with capability queries
//! - Status-code boundary functions with a drainable diagnostic log
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use appx_unpack::{api, UnpackPolicy, ValidationPolicy};
//!
//! let status = api::unpack_package(
//!     UnpackPolicy::NONE.with_package_subfolder(),
//!     ValidationPolicy::AllowUnsigned,
//!     Some(Path::new("app.msix")),
//!     Some(Path::new("out")),
//! );
//! if !status.is_ok() {
//!     eprintln!("unpack failed: {status}");
//! }
//! ```

pub mod api;
pub mod cli;
pub mod error;
pub mod factory;
pub mod handle;
pub mod heap;
pub mod io;
pub mod log;
pub mod package;
pub mod storage;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, ErrorKind, Result, Status};
pub use factory::{AppxFactory, PackageFactory};
pub use handle::{Handle, Object};
pub use heap::{Heap, HeapBuffer, SystemHeap};
pub use io::{FilePath, FileMode, FileStream, Stream};
pub use log::DiagnosticLog;
pub use package::{Package, PackageObject, PackageReader, PackageState, UnpackPolicy, ValidationPolicy};
pub use storage::{DirectoryObject, OpenMode, StorageObject};
pub use zip::{ZipEntry, ZipObject};
