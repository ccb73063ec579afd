//! Revision fingerprints.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Length in characters of a digest-derived fingerprint.
pub const DIGEST_HEX_LEN: usize = 40;

/// A printable identifier for the revision state of a working copy.
///
/// Backends with a native global revision (a Git commit, an SVN revision
/// number) use it as-is. Backends without one derive a fingerprint by
/// digesting their own change-log output with [`Fingerprint::digest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a native revision identifier reported by a backend.
    ///
    /// Surrounding whitespace (the trailing newline most tools print) is
    /// stripped.
    pub fn native(rev: impl AsRef<str>) -> Self {
        Self(rev.as_ref().trim().to_string())
    }

    /// Derives a fingerprint from raw tool output.
    ///
    /// The SHA-1 digest is taken over exactly the bytes given, with no
    /// reordering or whitespace cleanup, and hex-encoded in lowercase.
    pub fn digest(output: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(output);
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no revision text was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a shortened form for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Consumes the fingerprint, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_value() {
        // sha1("abc")
        let fp = Fingerprint::digest(b"abc");
        assert_eq!(fp.as_str(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(fp.as_str().len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_digest_empty_input() {
        let fp = Fingerprint::digest(b"");
        assert_eq!(fp.as_str(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert!(!fp.is_empty());
    }

    #[test]
    fn test_digest_is_whitespace_sensitive() {
        let a = Fingerprint::digest(b"rev 1.4\n");
        let b = Fingerprint::digest(b"rev 1.4\n\n");
        assert_ne!(a, b);
        assert_eq!(a, Fingerprint::digest(b"rev 1.4\n"));
    }

    #[test]
    fn test_native_trims() {
        let fp = Fingerprint::native("  4f2a9c\n");
        assert_eq!(fp.as_str(), "4f2a9c");
        assert_eq!(fp.to_string(), "4f2a9c");
    }

    #[test]
    fn test_short() {
        let fp = Fingerprint::digest(b"abc");
        assert_eq!(fp.short(), "a9993e364706");
        assert_eq!(Fingerprint::native("1234").short(), "1234");
    }

    #[test]
    fn test_serde_transparent() {
        let fp = Fingerprint::native("abc123");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"abc123\"");
        let back: Fingerprint = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(back, fp);
    }
}
