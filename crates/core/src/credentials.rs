use sha2::{Digest, Sha256};
use std::fmt;

/// API key and secret authorizing trading calls on a venue.
///
/// Neither half is ever printed: `Debug` and `Display` only show a short
/// fingerprint, so credentials can flow through `tracing` fields safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.secret.trim().is_empty()
    }

    /// Stable, non-reversible identifier for this pair.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        hasher.update(b":");
        hasher.update(self.secret.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    /// Replace any occurrence of the key or secret in `text`.
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for needle in [&self.secret, &self.api_key] {
            if !needle.is_empty() {
                out = out.replace(needle.as_str(), "***");
            }
        }
        out
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "credentials#{}", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_secrets() {
        let creds = Credentials::new("my-api-key", "my-secret");
        let debug = format!("{:?}", creds);
        let display = creds.to_string();
        for rendered in [debug, display] {
            assert!(!rendered.contains("my-api-key"));
            assert!(!rendered.contains("my-secret"));
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = Credentials::new("key", "secret");
        let b = Credentials::new("key", "other");
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_scrub() {
        let creds = Credentials::new("AKIA123", "s3cr3t");
        let scrubbed = creds.scrub("invalid key AKIA123 with signature from s3cr3t");
        assert_eq!(scrubbed, "invalid key *** with signature from ***");
    }

    #[test]
    fn test_is_complete() {
        assert!(Credentials::new("k", "s").is_complete());
        assert!(!Credentials::new("k", " ").is_complete());
        assert!(!Credentials::new("", "s").is_complete());
    }
}
