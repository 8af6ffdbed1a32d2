//! Integrity Verification
//!
//! Compares the SHA-256 computed while downloading against the digest
//! published in the manifest. This guards against corruption and
//! tampering in transit only; there is no signature check, and an empty
//! expected digest skips verification entirely.

use tracing::{debug, warn};

use super::error::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The digest matched the expected value
    Verified,
    /// No expected digest was provided, nothing was checked
    Skipped,
}

/// Check `computed` against the hex-encoded `expected_hex`.
///
/// Hex case and surrounding whitespace are ignored. On mismatch the caller
/// must discard the staged artifact.
pub fn verify_digest(expected_hex: &str, computed: &[u8]) -> Result<VerifyOutcome, UpdateError> {
    let expected = expected_hex.trim();
    if expected.is_empty() {
        warn!("No SHA256 provided, skipping integrity verification");
        return Ok(VerifyOutcome::Skipped);
    }

    let actual = hex::encode(computed);
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(UpdateError::Integrity {
            expected: expected.to_lowercase(),
            actual,
        });
    }

    debug!(sha256 = %actual, "SHA256 verified");
    Ok(VerifyOutcome::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn digest(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn test_checksum_verification_success() {
        let result = verify_digest(HELLO_SHA256, &digest(b"hello"));
        assert_eq!(result.unwrap(), VerifyOutcome::Verified);
    }

    #[test]
    fn test_checksum_is_case_insensitive() {
        let upper = HELLO_SHA256.to_uppercase();
        assert!(verify_digest(&format!(" {} ", upper), &digest(b"hello")).is_ok());
    }

    #[test]
    fn test_checksum_verification_failure() {
        let other = "0".repeat(64);
        let result = verify_digest(&other, &digest(b"hello"));
        match result {
            Err(UpdateError::Integrity { expected, actual }) => {
                assert_eq!(expected, other);
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_expected_fails() {
        let result = verify_digest("wrongchecksum", &digest(b"hello"));
        assert!(matches!(result, Err(UpdateError::Integrity { .. })));
    }

    #[test]
    fn test_empty_expected_skips() {
        let result = verify_digest("", &digest(b"anything"));
        assert_eq!(result.unwrap(), VerifyOutcome::Skipped);
    }
}
