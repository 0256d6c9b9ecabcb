use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a normalized text.
///
/// The digest is always taken over the UTF-8 bytes of the text. Changing the
/// encoding would invalidate every stored fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintParseError {
    #[error("expected 64 hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex character at offset {0}")]
    InvalidChar(usize),
}

/// Fingerprint a normalized text.
pub fn fingerprint(normalized_text: &str) -> Fingerprint {
    let digest = Sha256::digest(normalized_text.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex characters, for log lines.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(64));
        hex
    }

    pub fn from_hex(input: &str) -> Result<Self, FingerprintParseError> {
        if input.len() != 64 {
            return Err(FingerprintParseError::Length(input.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(input, &mut bytes).map_err(|err| match err {
            hex::FromHexError::InvalidHexCharacter { index, .. } => {
                FingerprintParseError::InvalidChar(index)
            }
            _ => FingerprintParseError::Length(input.len()),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short(12))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{fingerprint, Fingerprint, FingerprintParseError};

    #[test]
    fn digest_matches_known_sha256() {
        assert_eq!(
            fingerprint("").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            fingerprint("abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let text = "Plan: $10/mo\nPro plan now $20/mo";
        assert_eq!(fingerprint(text), fingerprint(text));
        assert_ne!(fingerprint(text), fingerprint("Plan: $10/mo"));
    }

    #[test]
    fn hex_parse_accepts_own_output() {
        let fp = fingerprint("pricing");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Ok(fp));
        assert_eq!(fp.to_hex().to_uppercase().parse::<Fingerprint>(), Ok(fp));
    }

    #[test]
    fn hex_parse_rejects_garbage() {
        assert_eq!(
            Fingerprint::from_hex("abc"),
            Err(FingerprintParseError::Length(3))
        );
        let bad = format!("zz{}", "0".repeat(62));
        assert_eq!(
            Fingerprint::from_hex(&bad),
            Err(FingerprintParseError::InvalidChar(0))
        );
        let bad = format!("{}g", "0".repeat(63));
        assert_eq!(
            Fingerprint::from_hex(&bad),
            Err(FingerprintParseError::InvalidChar(63))
        );
    }

    #[test]
    fn serializes_as_hex_string() {
        let fp = fingerprint("abc");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
