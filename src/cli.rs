use clap::{Parser, ValueEnum};

use crate::package::{UnpackPolicy, ValidationPolicy};

#[derive(Parser, Debug)]
#[command(name = "appxunpack")]
#[command(version)]
#[command(about = "Validate and unpack APPX/MSIX packages", long_about = None)]
#[command(after_help = "Examples:\n  \
  appxunpack app.msix -d out                 validate fully and unpack into out\n  \
  appxunpack app.msix -d out --subfolder     unpack into out/app\n  \
  appxunpack -l -v app.msix                  list container entries verbosely")]
pub struct Cli {
    /// Package file
    #[arg(value_name = "PACKAGE")]
    pub package: String,

    /// Unpack into this directory
    #[arg(short = 'd', value_name = "DIR", required_unless_present = "list")]
    pub destination: Option<String>,

    /// Validation strictness
    #[arg(long, value_enum, default_value_t = Validation::Full)]
    pub validation: Validation,

    /// Unpack under a folder named after the package
    #[arg(long)]
    pub subfolder: bool,

    /// Skip the manifest root check
    #[arg(long)]
    pub skip_manifest: bool,

    /// Also write manifest, block map, content types and signature
    #[arg(long)]
    pub footprint: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// List container entries (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// Verbose listing / debug logging
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Full,
    SkipSignature,
    AllowUnsigned,
    SkipAll,
}

impl From<Validation> for ValidationPolicy {
    fn from(value: Validation) -> Self {
        match value {
            Validation::Full => ValidationPolicy::Full,
            Validation::SkipSignature => ValidationPolicy::SkipSignature,
            Validation::AllowUnsigned => ValidationPolicy::AllowUnsigned,
            Validation::SkipAll => ValidationPolicy::SkipAll,
        }
    }
}

impl Cli {
    pub fn validation_policy(&self) -> ValidationPolicy {
        self.validation.into()
    }

    pub fn unpack_policy(&self) -> UnpackPolicy {
        UnpackPolicy {
            create_package_subfolder: self.subfolder,
            skip_manifest_validation: self.skip_manifest,
            extract_footprint: self.footprint,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default tracing filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.is_very_quiet() {
            "off"
        } else if self.is_quiet() {
            "error"
        } else if self.verbose && !self.list {
            "appx_unpack=debug"
        } else {
            "warn"
        }
    }
}
