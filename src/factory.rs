//! Entry point that turns a source stream into a package reader.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::handle::Handle;
use crate::heap::{HeapBuffer, Heap, default_heap};
use crate::io::{FilePath, Stream};
use crate::log::DiagnosticLog;
use crate::package::{
    Package, PackageObject, PackageReader, SignatureFormatValidator, SignatureValidator,
    ValidationPolicy,
};
use crate::storage::StorageObject;
use crate::zip::ZipObject;

pub trait PackageFactory: Send {
    /// Validation policy applied to every package from this factory.
    fn policy(&self) -> ValidationPolicy;

    /// Build an unopened package reader over a ZIP container stream.
    fn create_package_reader(&self, source: Handle<dyn Stream>) -> Result<Handle<dyn PackageReader>>;

    /// Copy `text` into a null-terminated buffer from the factory's heap.
    fn marshal_text(&self, text: &str) -> Result<HeapBuffer>;
}

/// Factory bound to a validation policy and a caller-supplied heap.
pub struct AppxFactory {
    policy: ValidationPolicy,
    heap: Arc<dyn Heap>,
    log: DiagnosticLog,
    validator: Arc<dyn SignatureValidator>,
}

impl AppxFactory {
    pub fn new(policy: ValidationPolicy, heap: Option<Arc<dyn Heap>>, log: DiagnosticLog) -> Self {
        Self {
            policy,
            heap: heap.unwrap_or_else(default_heap),
            log,
            validator: Arc::new(SignatureFormatValidator),
        }
    }

    pub fn with_signature_validator(mut self, validator: Arc<dyn SignatureValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn heap(&self) -> &Arc<dyn Heap> {
        &self.heap
    }
}

/// Subfolder name for a package read from `source`: the file stem when the
/// stream is file backed.
fn package_identifier(source: &Handle<dyn Stream>) -> String {
    source
        .query::<dyn FilePath>()
        .ok()
        .and_then(|named| {
            named
                .lock()
                .path()
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "package".to_string())
}

impl PackageFactory for AppxFactory {
    fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    fn create_package_reader(&self, source: Handle<dyn Stream>) -> Result<Handle<dyn PackageReader>> {
        let identifier = package_identifier(&source);
        let storage = Handle::from_storage(ZipObject::open(source)?);
        let package = PackageObject::new(storage, self.policy, self.log.clone())
            .with_identifier(identifier)
            .with_signature_validator(Arc::clone(&self.validator));
        Ok(Handle::new(package).upcast(|p| p as Arc<Mutex<dyn PackageReader>>))
    }

    fn marshal_text(&self, text: &str) -> Result<HeapBuffer> {
        HeapBuffer::from_text(&self.heap, text)
    }
}

crate::implements!(AppxFactory => dyn PackageFactory);

/// Open, validate and unpack in one step.
pub fn unpack(
    factory: &dyn PackageFactory,
    source: Handle<dyn Stream>,
    policy: crate::package::UnpackPolicy,
    destination: Handle<dyn StorageObject>,
) -> Result<()> {
    let reader = factory.create_package_reader(source)?;
    reader.lock().open()?;
    reader.lock().validate()?;
    let package = reader.query::<dyn Package>()?;
    package.lock().unpack(policy, destination)
}
