//! One-way password digest for the k-anonymity range protocol.
//!
//! The range protocol is defined over SHA-1: the corpus is bucketed by the
//! first 5 hex characters of the digest, so a different hash function would
//! not interoperate with the remote service. SHA-1 is used here purely as a
//! bucketing transform, not for collision resistance.

use sha1::{Digest, Sha1};

/// Number of hex characters in the public prefix (20 bits).
pub const PREFIX_LEN: usize = 5;

/// Number of hex characters in the private suffix.
pub const SUFFIX_LEN: usize = 35;

/// A password digest split at the k-anonymity boundary.
///
/// Only `prefix` ever leaves the process; `suffix` is compared against
/// candidate suffixes locally and never transmitted or logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub prefix: String,
    pub suffix: String,
}

/// Computes the SHA-1 digest of `password` and splits it into the 5-char
/// public prefix and 35-char private suffix, both uppercase hex.
///
/// Deterministic and side-effect-free: repeated calls for the same password
/// yield identical results.
pub fn digest_password(password: &str) -> PasswordDigest {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let hash: [u8; 20] = hasher.finalize().into();

    let hex: String = hash.iter().map(|b| format!("{b:02X}")).collect();
    let (prefix, suffix) = hex.split_at(PREFIX_LEN);

    PasswordDigest { prefix: prefix.to_string(), suffix: suffix.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest_password("correct horse battery staple");
        let b = digest_password("correct horse battery staple");
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_vector_password123() {
        // password123 -> SHA1: CBFDAC6008F9CAB4083784CBD1874F76618D2A97
        let d = digest_password("password123");
        assert_eq!(d.prefix, "CBFDA");
        assert_eq!(d.suffix, "C6008F9CAB4083784CBD1874F76618D2A97");
    }

    #[test]
    fn test_known_vector_password() {
        // password -> SHA1: 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
        let d = digest_password("password");
        assert_eq!(d.prefix, "5BAA6");
        assert_eq!(d.suffix, "1E4C9B93F3F0682250B6CF8331B7EE68FD8");
    }

    #[test]
    fn test_lengths() {
        let d = digest_password("");
        assert_eq!(d.prefix.len(), PREFIX_LEN);
        assert_eq!(d.suffix.len(), SUFFIX_LEN);
    }

    #[test]
    fn test_unicode_password() {
        let d = digest_password("pässwörd✓");
        assert_eq!(d.prefix.len(), PREFIX_LEN);
        assert!(d.prefix.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
