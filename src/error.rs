//! Error taxonomy and the status codes it maps to at the API boundary.
//!
//! Inside the crate every failure is an [`Error`] propagated with `?`.
//! Boundary functions in [`crate::api`] turn the terminal error into a
//! [`Status`], so no error ever crosses the boundary in raw form.

use std::fmt;
use std::io;
use std::path::Path;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the package engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed container: {0}")]
    Format(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O access failed: {0}")]
    Access(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("object does not implement {0}")]
    NoSuchCapability(&'static str),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl Error {
    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Format(_) => ErrorKind::FormatError,
            Error::Integrity(_) => ErrorKind::IntegrityError,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Access(_) => ErrorKind::AccessError,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::OutOfBounds(_) => ErrorKind::OutOfBounds,
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::NoSuchCapability(_) => ErrorKind::NoSuchCapability,
            Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// The boundary status for this error.
    pub fn status(&self) -> Status {
        self.kind().status()
    }

    /// Prefix the message with the path it concerns.
    pub fn context(self, path: impl AsRef<Path>) -> Self {
        let at = path.as_ref().display();
        match self {
            Error::NotFound(msg) => Error::NotFound(format!("{at}: {msg}")),
            Error::Access(msg) => Error::Access(format!("{at}: {msg}")),
            Error::Format(msg) => Error::Format(format!("{at}: {msg}")),
            Error::Integrity(msg) => Error::Integrity(format!("{at}: {msg}")),
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            io::ErrorKind::UnexpectedEof => Error::Format(err.to_string()),
            io::ErrorKind::OutOfMemory => Error::OutOfMemory,
            _ => Error::Access(err.to_string()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AccessError => io::ErrorKind::PermissionDenied,
            ErrorKind::InvalidParameter | ErrorKind::InvalidName => io::ErrorKind::InvalidInput,
            ErrorKind::IntegrityError | ErrorKind::FormatError => io::ErrorKind::InvalidData,
            ErrorKind::NotSupported => io::ErrorKind::Unsupported,
            ErrorKind::OutOfMemory => io::ErrorKind::OutOfMemory,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    NotFound,
    FormatError,
    IntegrityError,
    ValidationError,
    AccessError,
    InvalidName,
    OutOfBounds,
    OutOfMemory,
    NotSupported,
    NoSuchCapability,
    Unexpected,
}

impl ErrorKind {
    const ALL: [ErrorKind; 12] = [
        ErrorKind::InvalidParameter,
        ErrorKind::NotFound,
        ErrorKind::FormatError,
        ErrorKind::IntegrityError,
        ErrorKind::ValidationError,
        ErrorKind::AccessError,
        ErrorKind::InvalidName,
        ErrorKind::OutOfBounds,
        ErrorKind::OutOfMemory,
        ErrorKind::NotSupported,
        ErrorKind::NoSuchCapability,
        ErrorKind::Unexpected,
    ];

    /// Stable numeric code for this kind.
    pub const fn code(self) -> u32 {
        match self {
            ErrorKind::InvalidParameter => 0x8007_0057,
            ErrorKind::NotFound => 0x8007_0002,
            ErrorKind::AccessError => 0x8007_0005,
            ErrorKind::OutOfMemory => 0x8007_000E,
            ErrorKind::NotSupported => 0x8007_0032,
            ErrorKind::NoSuchCapability => 0x8000_4002,
            ErrorKind::Unexpected => 0x8000_FFFF,
            ErrorKind::OutOfBounds => 0x8BAD_0006,
            ErrorKind::InvalidName => 0x8BAD_0007,
            ErrorKind::FormatError => 0x8BAD_0011,
            ErrorKind::IntegrityError => 0x8BAD_0012,
            ErrorKind::ValidationError => 0x8BAD_0041,
        }
    }

    pub const fn status(self) -> Status {
        Status(self.code())
    }
}

/// Numeric result of a boundary call. Zero is success.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u32);

impl Status {
    pub const OK: Status = Status(0);

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Classifies a status back into its kind. Unknown non-zero codes
    /// classify as [`ErrorKind::Unexpected`].
    pub fn kind(self) -> Option<ErrorKind> {
        if self.is_ok() {
            return None;
        }
        Some(
            ErrorKind::ALL
                .into_iter()
                .find(|kind| kind.code() == self.0)
                .unwrap_or(ErrorKind::Unexpected),
        )
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Status(code)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => write!(f, "Status(OK)"),
            Some(kind) => write!(f, "Status({:?}, {:#010x})", kind, self.0),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
