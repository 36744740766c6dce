//! Boundary functions.
//!
//! Every function here reports through a [`Status`] and never lets an
//! error or a panic escape. Failures are appended to the process-wide
//! [`DiagnosticLog`] first, where [`get_log_text`] can collect them.
//! Outputs are written to `&mut Option<_>` slots that the caller owns.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result, Status};
use crate::factory::{self, AppxFactory, PackageFactory};
use crate::handle::Handle;
use crate::heap::{Heap, HeapBuffer};
use crate::io::{FileMode, FileStream, Stream};
use crate::log::DiagnosticLog;
use crate::package::{UnpackPolicy, ValidationPolicy};
use crate::storage::{DirectoryObject, StorageObject};

/// Run `body`, turning its error or panic into a status.
fn boundary(operation: &str, body: impl FnOnce() -> Result<()>) -> Status {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Err(Error::Unexpected(message))
    });
    match outcome {
        Ok(()) => Status::OK,
        Err(err) => {
            let status = err.status();
            DiagnosticLog::global().append(format!("{operation}: {err} ({status})"));
            status
        }
    }
}

fn required<'a>(path: Option<&'a Path>, what: &str) -> Result<&'a Path> {
    path.ok_or_else(|| Error::InvalidParameter(format!("{what} path is missing")))
}

/// Open, validate and unpack the package at `source` into `destination`.
pub fn unpack_package(
    unpack_policy: UnpackPolicy,
    validation_policy: ValidationPolicy,
    source: Option<&Path>,
    destination: Option<&Path>,
) -> Status {
    boundary("unpack_package", || {
        let source = required(source, "source")?;
        let destination = required(destination, "destination")?;
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            %unpack_policy,
            %validation_policy,
            "unpack requested"
        );

        let factory = AppxFactory::new(validation_policy, None, DiagnosticLog::global().clone());
        let stream = Handle::from_stream(FileStream::open(source, FileMode::Read)?);
        let target = Handle::from_storage(DirectoryObject::new(destination));
        factory::unpack(&factory, stream, unpack_policy, target)
    })
}

/// Build a factory whose returned buffers come from `heap`, or from the
/// system heap when none is given.
pub fn create_factory(
    heap: Option<Arc<dyn Heap>>,
    validation_policy: ValidationPolicy,
    factory: &mut Option<Handle<dyn PackageFactory>>,
) -> Status {
    boundary("create_factory", || {
        let created = AppxFactory::new(validation_policy, heap, DiagnosticLog::global().clone());
        *factory = Some(Handle::new(created).upcast(|f| f as Arc<Mutex<dyn PackageFactory>>));
        Ok(())
    })
}

/// Open a file stream, read-only when `for_read` is set and read-write
/// (created if missing) otherwise.
pub fn create_stream_on_file(
    path: Option<&Path>,
    for_read: bool,
    stream: &mut Option<Handle<dyn Stream>>,
) -> Status {
    boundary("create_stream_on_file", || {
        let path = required(path, "file")?;
        let mode = if for_read {
            FileMode::Read
        } else {
            FileMode::WriteUpdate
        };
        *stream = Some(Handle::from_stream(FileStream::open(path, mode)?));
        Ok(())
    })
}

/// Hand out the accumulated diagnostic log in a buffer from `heap`, then
/// clear it. `text` must be empty on entry.
pub fn get_log_text(heap: &Arc<dyn Heap>, text: &mut Option<HeapBuffer>) -> Status {
    boundary("get_log_text", || {
        if text.is_some() {
            return Err(Error::InvalidParameter(
                "log text output already holds a buffer".to_string(),
            ));
        }
        let buffer = DiagnosticLog::global().take_with(|pending| HeapBuffer::from_text(heap, pending))?;
        *text = Some(buffer);
        Ok(())
    })
}

/// Open a directory as destination storage. Exposed for callers that drive
/// a package reader by hand.
pub fn create_directory_storage(
    root: Option<&Path>,
    storage: &mut Option<Handle<dyn StorageObject>>,
) -> Status {
    boundary("create_directory_storage", || {
        let root = required(root, "directory")?;
        *storage = Some(Handle::from_storage(DirectoryObject::new(root)));
        Ok(())
    })
}
