use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

/// Content and identity digest of a split payload.
///
/// The digest covers the payload bytes, then the namespace, then the logical
/// name, fed to SHA-224 in that order with no separators. Changing the order
/// changes every fingerprint, so it is part of the wire protocol. The hex form
/// is 56 characters, short enough to be used as a label value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn compute(data: &[u8], namespace: &str, name: &str) -> Self {
        let mut builder = FingerprintBuilder::new();
        builder.update(data);
        builder.finish(namespace, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Incremental form of [`Fingerprint::compute`], for payloads read chunk by
/// chunk.
#[derive(Clone, Default)]
pub struct FingerprintBuilder {
    hasher: Sha224,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finish(mut self, namespace: &str, name: &str) -> Fingerprint {
        self.hasher.update(namespace.as_bytes());
        self.hasher.update(name.as_bytes());
        Fingerprint(format!("{:x}", self.hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_empty_input_is_sha224_of_nothing() {
        let fingerprint = Fingerprint::compute(b"", "", "");
        assert_eq!(
            fingerprint.as_str(),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
    }

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute(b"payload", "default", "my-conf");
        let b = Fingerprint::compute(b"payload", "default", "my-conf");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 56);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_single_byte_changes() {
        let base = Fingerprint::compute(b"payload", "default", "my-conf");

        assert_ne!(base, Fingerprint::compute(b"paylaad", "default", "my-conf"));
        assert_ne!(base, Fingerprint::compute(b"payload", "defaulu", "my-conf"));
        assert_ne!(base, Fingerprint::compute(b"payload", "default", "my-cong"));
        assert_ne!(base, Fingerprint::compute(b"payload\0", "default", "my-conf"));
    }

    #[test]
    fn test_builder_matches_one_shot() {
        let mut data = vec![0u8; 10_000];
        rand::rng().fill(&mut data[..]);

        let mut builder = FingerprintBuilder::new();
        for chunk in data.chunks(333) {
            builder.update(chunk);
        }
        assert_eq!(
            builder.finish("ns", "name"),
            Fingerprint::compute(&data, "ns", "name")
        );
    }
}
