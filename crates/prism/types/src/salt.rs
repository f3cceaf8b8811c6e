//! Salt construction for deterministic deployments.
//!
//! Salts are reproducible purely from public inputs: the factory uses a
//! build-time frozen constant (overridable by the operator), facets use a
//! derived salt over public tags.

use alloy_primitives::{b256, keccak256};
use thiserror::Error;

use crate::Hash32;

/// The frozen factory salt used on every chain when the operator does not
/// override it. ASCII `prism.factory.v1`, zero padded.
pub const FROZEN_FACTORY_SALT: Hash32 =
    b256!("707269736d2e666163746f72792e763100000000000000000000000000000000");

#[derive(Debug, Error)]
pub enum SaltError {
    #[error("salt must be exactly 32 bytes, got {0}")]
    BadLength(usize),
    #[error("salt is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// Parses an operator-supplied salt from hex. The value must encode exactly
/// 32 bytes; a `0x` prefix is accepted.
pub fn parse_salt(value: &str) -> Result<Hash32, SaltError> {
    let raw = hex::decode(value.trim_start_matches("0x"))?;
    if raw.len() != 32 {
        return Err(SaltError::BadLength(raw.len()));
    }
    Ok(Hash32::from_slice(&raw))
}

/// Derives the salt for a facet deployment:
/// `keccak256( domain_tag || facet_name || operator_tag || version )`.
pub fn facet_salt(domain_tag: &str, facet_name: &str, operator_tag: &str, version: &str) -> Hash32 {
    let mut preimage =
        Vec::with_capacity(domain_tag.len() + facet_name.len() + operator_tag.len() + version.len());
    preimage.extend_from_slice(domain_tag.as_bytes());
    preimage.extend_from_slice(facet_name.as_bytes());
    preimage.extend_from_slice(operator_tag.as_bytes());
    preimage.extend_from_slice(version.as_bytes());
    keccak256(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_salt_is_ascii_tag() {
        assert_eq!(&FROZEN_FACTORY_SALT[..16], b"prism.factory.v1");
        assert_eq!(&FROZEN_FACTORY_SALT[16..], &[0u8; 16]);
    }

    #[test]
    fn parse_salt_accepts_prefixed_and_bare() {
        let bare = "00".repeat(32);
        assert_eq!(parse_salt(&bare).unwrap(), Hash32::ZERO);
        assert_eq!(parse_salt(&format!("0x{bare}")).unwrap(), Hash32::ZERO);
    }

    #[test]
    fn parse_salt_rejects_wrong_length() {
        assert_matches::assert_matches!(parse_salt("0xdeadbeef"), Err(SaltError::BadLength(4)));
    }

    #[test]
    fn facet_salt_is_reproducible_and_input_sensitive() {
        let a = facet_salt("prism.facet", "SwapFacet", "ops", "1.2.0");
        let b = facet_salt("prism.facet", "SwapFacet", "ops", "1.2.0");
        let c = facet_salt("prism.facet", "SwapFacet", "ops", "1.2.1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
