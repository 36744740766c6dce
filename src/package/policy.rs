use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How strictly a package is validated. Fixed per factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidationPolicy {
    /// Every check, signature required.
    #[default]
    Full,
    /// Structural checks only; the signature part is never examined.
    SkipSignature,
    /// Every check, but an unsigned package is accepted.
    AllowUnsigned,
    /// Only block-map size consistency is checked.
    SkipAll,
}

/// What a policy demands of the signature part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRequirement {
    Required,
    IfPresent,
    Ignored,
}

impl ValidationPolicy {
    pub fn signature(self) -> SignatureRequirement {
        match self {
            ValidationPolicy::Full => SignatureRequirement::Required,
            ValidationPolicy::AllowUnsigned => SignatureRequirement::IfPresent,
            ValidationPolicy::SkipSignature | ValidationPolicy::SkipAll => {
                SignatureRequirement::Ignored
            }
        }
    }

    pub fn checks_content_types(self) -> bool {
        self != ValidationPolicy::SkipAll
    }

    pub fn checks_block_hashes(self) -> bool {
        self != ValidationPolicy::SkipAll
    }

    fn as_str(self) -> &'static str {
        match self {
            ValidationPolicy::Full => "full",
            ValidationPolicy::SkipSignature => "skip-signature",
            ValidationPolicy::AllowUnsigned => "allow-unsigned",
            ValidationPolicy::SkipAll => "skip-all",
        }
    }
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ValidationPolicy::Full,
            ValidationPolicy::SkipSignature,
            ValidationPolicy::AllowUnsigned,
            ValidationPolicy::SkipAll,
        ]
        .into_iter()
        .find(|policy| policy.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| Error::InvalidParameter(format!("unknown validation policy {s:?}")))
    }
}

/// Independent extraction flags applied at unpack time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UnpackPolicy {
    /// Write parts under a folder named after the package.
    pub create_package_subfolder: bool,
    /// Do not check that the manifest is a well-formed `Package` document.
    pub skip_manifest_validation: bool,
    /// Also write the footprint parts, not just the payload.
    pub extract_footprint: bool,
}

impl UnpackPolicy {
    pub const NONE: UnpackPolicy = UnpackPolicy {
        create_package_subfolder: false,
        skip_manifest_validation: false,
        extract_footprint: false,
    };

    pub fn with_package_subfolder(mut self) -> Self {
        self.create_package_subfolder = true;
        self
    }

    pub fn with_manifest_validation_skipped(mut self) -> Self {
        self.skip_manifest_validation = true;
        self
    }

    pub fn with_footprint(mut self) -> Self {
        self.extract_footprint = true;
        self
    }
}

impl fmt::Display for UnpackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.create_package_subfolder {
            flags.push("subfolder");
        }
        if self.skip_manifest_validation {
            flags.push("skip-manifest");
        }
        if self.extract_footprint {
            flags.push("footprint");
        }
        if flags.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&flags.join(","))
        }
    }
}

impl FromStr for UnpackPolicy {
    type Err = Error;

    /// Comma-separated flags: `subfolder`, `skip-manifest`, `footprint`,
    /// or `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policy = UnpackPolicy::NONE;
        for flag in s.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match flag.to_ascii_lowercase().as_str() {
                "none" => {}
                "subfolder" => policy.create_package_subfolder = true,
                "skip-manifest" => policy.skip_manifest_validation = true,
                "footprint" => policy.extract_footprint = true,
                _ => {
                    return Err(Error::InvalidParameter(format!(
                        "unknown unpack flag {flag:?}"
                    )));
                }
            }
        }
        Ok(policy)
    }
}
