//! Hook through which the package signature is checked.
//!
//! The engine decides when a signature must be present and valid; the
//! cryptographic verification itself belongs to the installed
//! [`SignatureValidator`].

use crate::error::{Error, Result};

/// Magic at the start of an `AppxSignature.p7x` container.
pub const P7X_MAGIC: &[u8; 4] = b"PKCX";

/// Everything a validator may need to check a signature.
#[derive(Debug, Clone, Copy)]
pub struct SignatureInput<'a> {
    /// Raw bytes of the signature part.
    pub signature: &'a [u8],
    /// Raw bytes of the block map, when the package has one.
    pub block_map: Option<&'a [u8]>,
    /// Raw bytes of the content-types part.
    pub content_types: &'a [u8],
}

pub trait SignatureValidator: Send + Sync {
    /// Accept or reject the package signature. Any error rejects it.
    fn validate(&self, input: &SignatureInput<'_>) -> Result<()>;
}

/// Default validator: accepts any well-formed `PKCX` container with a
/// non-empty body, without checking the signature cryptographically.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureFormatValidator;

impl SignatureValidator for SignatureFormatValidator {
    fn validate(&self, input: &SignatureInput<'_>) -> Result<()> {
        match input.signature.strip_prefix(P7X_MAGIC) {
            Some(body) if !body.is_empty() => Ok(()),
            Some(_) => Err(Error::Validation("signature container is empty".to_string())),
            None => Err(Error::Validation(
                "signature part is not a PKCX container".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(signature: &[u8]) -> SignatureInput<'_> {
        SignatureInput {
            signature,
            block_map: None,
            content_types: b"<Types/>",
        }
    }

    #[test]
    fn accepts_pkcx_container() {
        assert!(SignatureFormatValidator.validate(&input(b"PKCX\x30\x82")).is_ok());
    }

    #[test]
    fn rejects_other_content() {
        assert!(SignatureFormatValidator.validate(&input(b"PKCX")).is_err());
        assert!(SignatureFormatValidator.validate(&input(b"\x30\x82\x01")).is_err());
    }
}
