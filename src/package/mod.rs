//! Package validation and extraction.
//!
//! A [`PackageObject`] sits on a source [`StorageObject`] and moves through
//! `Unopened → Opened → Validated → Unpacked`. Any failure parks it in
//! `Failed`, after which it must be discarded.
//!
//! Unpack writes the payload parts, and the footprint parts as well when
//! the policy asks for them. It is part-atomic only: when a part fails
//! midway, the parts already written stay in the destination.

mod blockmap;
mod content_types;
mod policy;
mod signature;
mod xml;

pub use blockmap::{BLOCK_SIZE, BlockMap, BlockMapFile, BlockVerifier};
pub use content_types::ContentTypes;
pub use policy::{SignatureRequirement, UnpackPolicy, ValidationPolicy};
pub use signature::{P7X_MAGIC, SignatureFormatValidator, SignatureInput, SignatureValidator};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::log::DiagnosticLog;
use crate::storage::{OpenMode, SEPARATOR, StorageObject};

pub const MANIFEST: &str = "AppxManifest.xml";
pub const BLOCK_MAP: &str = "AppxBlockMap.xml";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const SIGNATURE: &str = "AppxSignature.p7x";
pub const CODE_INTEGRITY: &str = "AppxMetadata/CodeIntegrity.cat";

/// Footprint parts that can never be covered by the block map.
const UNHASHED_FILES: [&str; 3] = [BLOCK_MAP, CONTENT_TYPES, SIGNATURE];

/// Parts with a reserved meaning; everything else is payload.
pub const FOOTPRINT_FILES: [&str; 5] = [MANIFEST, BLOCK_MAP, CONTENT_TYPES, SIGNATURE, CODE_INTEGRITY];

const COPY_BUFFER: usize = 64 * 1024;
const MAX_FOOTPRINT_PART: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Unopened,
    Opened,
    Validated,
    Unpacked,
    Failed,
}

/// Read side of a package: opening, inspection and validation.
pub trait PackageReader: Send {
    fn state(&self) -> PackageState;

    /// Name used for the package subfolder on unpack.
    fn identifier(&self) -> &str;

    /// Footprint parts present in the package, in enumeration order.
    fn footprint_files(&self) -> &[String];

    fn payload_files(&self) -> &[String];

    /// Parsed block map, available once validated.
    fn block_map(&self) -> Option<&BlockMap>;

    /// Locate the package parts in the source storage.
    fn open(&mut self) -> Result<()>;

    /// Check the package against the validation policy.
    fn validate(&mut self) -> Result<()>;
}

/// Extraction side of a package.
pub trait Package: Send {
    /// Copy the package parts into `destination`.
    fn unpack(&mut self, policy: UnpackPolicy, destination: Handle<dyn StorageObject>) -> Result<()>;
}

pub struct PackageObject {
    source: Handle<dyn StorageObject>,
    policy: ValidationPolicy,
    validator: Arc<dyn SignatureValidator>,
    log: DiagnosticLog,
    identifier: String,
    state: PackageState,
    parts: Vec<String>,
    footprint: Vec<String>,
    payload: Vec<String>,
    block_map: Option<BlockMap>,
}

impl PackageObject {
    pub fn new(source: Handle<dyn StorageObject>, policy: ValidationPolicy, log: DiagnosticLog) -> Self {
        Self {
            source,
            policy,
            validator: Arc::new(SignatureFormatValidator),
            log,
            identifier: "package".to_string(),
            state: PackageState::Unopened,
            parts: Vec::new(),
            footprint: Vec::new(),
            payload: Vec::new(),
            block_map: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_signature_validator(mut self, validator: Arc<dyn SignatureValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Run `step` from state `from`, landing in `to` on success or in
    /// `Failed` on error.
    fn transition(
        &mut self,
        step: &str,
        from: PackageState,
        to: PackageState,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if self.state != from {
            return Err(Error::Unexpected(format!(
                "cannot {step} a package in state {:?}",
                self.state
            )));
        }
        match body(self) {
            Ok(()) => {
                tracing::info!(package = %self.identifier, ?to, "{step} complete");
                self.state = to;
                Ok(())
            }
            Err(err) => {
                self.log.append(format!("{step} of package {} failed: {err}", self.identifier));
                self.state = PackageState::Failed;
                Err(err)
            }
        }
    }

    fn has_part(&self, name: &str) -> bool {
        self.footprint.iter().any(|f| f == name)
    }

    /// Read a whole footprint part. The buffer grows with the bytes
    /// actually read, never with the declared size alone.
    fn read_part(&self, name: &str) -> Result<Vec<u8>> {
        let stream = self.source.lock().open_file(name, OpenMode::Read)?;
        let mut stream = stream.lock();
        let declared = stream.size()?;
        if declared > MAX_FOOTPRINT_PART {
            return Err(Error::Format(format!(
                "{name} declares {declared} bytes, more than the {MAX_FOOTPRINT_PART}-byte limit"
            )));
        }

        let mut data = Vec::new();
        let mut buf = vec![0u8; COPY_BUFFER];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            data.try_reserve(n).map_err(|_| Error::OutOfMemory)?;
            data.extend_from_slice(&buf[..n]);
        }
        if data.len() as u64 != declared {
            return Err(Error::Integrity(format!(
                "{name}: read {} bytes, expected {declared}",
                data.len()
            )));
        }
        Ok(data)
    }

    fn locate_parts(&mut self) -> Result<()> {
        let names = self.source.lock().file_names()?;
        for name in &names {
            if FOOTPRINT_FILES.contains(&name.as_str()) {
                self.footprint.push(name.clone());
            } else if let Some(reserved) = FOOTPRINT_FILES.iter().find(|f| f.eq_ignore_ascii_case(name)) {
                return Err(Error::Format(format!(
                    "{name} collides with the reserved part {reserved}"
                )));
            } else {
                self.payload.push(name.clone());
            }
        }
        for required in [MANIFEST, CONTENT_TYPES] {
            if !self.has_part(required) {
                return Err(Error::Format(format!(
                    "{} has no {required}",
                    self.source.lock().path()
                )));
            }
        }
        self.parts = names;
        Ok(())
    }

    fn check_block_map(&mut self) -> Result<()> {
        if !self.has_part(BLOCK_MAP) {
            self.log.append(format!(
                "package {} has no {BLOCK_MAP}; payload sizes are not checked",
                self.identifier
            ));
            return Ok(());
        }

        let map = BlockMap::parse(&self.read_part(BLOCK_MAP)?)?;
        if let Some(name) = self.payload.iter().find(|name| map.file(name).is_none()) {
            return Err(Error::Integrity(format!("{name} is missing from {BLOCK_MAP}")));
        }
        let parts: HashSet<&str> = self.parts.iter().map(String::as_str).collect();
        for listed in map.files() {
            let name = listed.name.as_str();
            if UNHASHED_FILES.contains(&name) {
                return Err(Error::Integrity(format!("{BLOCK_MAP} must not list {name}")));
            }
            if !parts.contains(name) {
                return Err(Error::Integrity(format!(
                    "{BLOCK_MAP} lists {name} which is not in the package"
                )));
            }
            let actual = self.source.lock().file_size(name)?;
            if listed.size != actual {
                return Err(Error::Integrity(format!(
                    "{name} is {actual} bytes but {BLOCK_MAP} declares {}",
                    listed.size
                )));
            }
        }

        self.block_map = Some(map);
        Ok(())
    }

    fn check_content_types(&self) -> Result<()> {
        if !self.policy.checks_content_types() {
            return Ok(());
        }
        let types = ContentTypes::parse(&self.read_part(CONTENT_TYPES)?)?;
        match self.payload.iter().find(|name| !types.covers(name)) {
            Some(name) => Err(Error::Format(format!(
                "{CONTENT_TYPES} declares no content type for {name}"
            ))),
            None => Ok(()),
        }
    }

    fn check_signature(&self) -> Result<()> {
        let requirement = self.policy.signature();
        if requirement == SignatureRequirement::Ignored {
            return Ok(());
        }
        if !self.has_part(SIGNATURE) {
            return match requirement {
                SignatureRequirement::Required => Err(Error::Validation(format!(
                    "package {} is not signed",
                    self.identifier
                ))),
                _ => {
                    self.log.append(format!(
                        "package {} is unsigned; accepted by the {} policy",
                        self.identifier, self.policy
                    ));
                    Ok(())
                }
            };
        }

        let signature = self.read_part(SIGNATURE)?;
        let block_map = if self.has_part(BLOCK_MAP) {
            Some(self.read_part(BLOCK_MAP)?)
        } else {
            None
        };
        let content_types = self.read_part(CONTENT_TYPES)?;
        let input = SignatureInput {
            signature: &signature,
            block_map: block_map.as_deref(),
            content_types: &content_types,
        };
        self.validator.validate(&input).map_err(|err| match err {
            Error::Validation(_) => err,
            other => Error::Validation(format!("signature rejected: {other}")),
        })
    }

    fn check_manifest(&self) -> Result<()> {
        let root = xml::root_element(MANIFEST, &self.read_part(MANIFEST)?)?;
        if root != "Package" {
            return Err(Error::Format(format!(
                "{MANIFEST} has root element <{root}>, expected <Package>"
            )));
        }
        Ok(())
    }

    fn copy_part(&self, name: &str, target: &str, destination: &Handle<dyn StorageObject>) -> Result<()> {
        let expected = self.source.lock().file_size(name)?;
        let reader = self.source.lock().open_file(name, OpenMode::Read)?;
        let writer = destination.lock().open_file(target, OpenMode::Write)?;
        let mut verifier = match &self.block_map {
            Some(map) if self.policy.checks_block_hashes() => map.file(name).map(BlockMapFile::verifier),
            _ => None,
        };

        let mut buf = vec![0u8; COPY_BUFFER];
        let mut copied = 0u64;
        loop {
            let n = reader.lock().read(&mut buf)?;
            if n == 0 {
                break;
            }
            if let Some(verifier) = verifier.as_mut() {
                verifier.update(&buf[..n])?;
            }
            writer.lock().write_all(&buf[..n])?;
            copied += n as u64;
        }

        if copied != expected {
            return Err(Error::Integrity(format!(
                "{name}: copied {copied} bytes, expected {expected}"
            )));
        }
        if let Some(verifier) = verifier {
            verifier.finish()?;
        }
        tracing::debug!(part = name, target, bytes = copied, "unpacked part");
        Ok(())
    }
}

impl PackageReader for PackageObject {
    fn state(&self) -> PackageState {
        self.state
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn footprint_files(&self) -> &[String] {
        &self.footprint
    }

    fn payload_files(&self) -> &[String] {
        &self.payload
    }

    fn block_map(&self) -> Option<&BlockMap> {
        self.block_map.as_ref()
    }

    fn open(&mut self) -> Result<()> {
        self.transition("open", PackageState::Unopened, PackageState::Opened, Self::locate_parts)
    }

    fn validate(&mut self) -> Result<()> {
        self.transition("validate", PackageState::Opened, PackageState::Validated, |package| {
            package.check_block_map()?;
            package.check_content_types()?;
            package.check_signature()
        })
    }
}

impl Package for PackageObject {
    fn unpack(&mut self, policy: UnpackPolicy, destination: Handle<dyn StorageObject>) -> Result<()> {
        self.transition("unpack", PackageState::Validated, PackageState::Unpacked, |package| {
            if !policy.skip_manifest_validation {
                package.check_manifest()?;
            }
            let prefix = if policy.create_package_subfolder {
                format!("{}{SEPARATOR}", package.identifier)
            } else {
                String::new()
            };
            let parts = if policy.extract_footprint {
                &package.parts
            } else {
                &package.payload
            };
            tracing::info!(
                package = %package.identifier,
                destination = %destination.lock().path(),
                parts = parts.len(),
                "unpacking"
            );
            for name in parts {
                package.copy_part(name, &format!("{prefix}{name}"), &destination)?;
            }
            Ok(())
        })
    }
}

crate::implements!(PackageObject => dyn PackageReader, dyn Package);
