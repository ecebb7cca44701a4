//! Info-hash identifier for torrents observed on the DHT.
//!
//! The catalog keys everything on the canonical 40-character lowercase hex
//! form. Raw 20-byte values arrive from the DHT engine; hex strings and
//! magnet URIs arrive from users.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32;
use librqbit_core::magnet::Magnet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of an info-hash in bytes.
pub const INFO_HASH_LEN: usize = 20;

/// Length of the hex representation of an info-hash.
pub const INFO_HASH_HEX_LEN: usize = 40;

/// Length of the base32 representation used by some magnet links.
pub const INFO_HASH_BASE32_LEN: usize = 32;

/// Errors produced when parsing an info-hash.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InfoHashError {
    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid hex in hash: {0}")]
    InvalidHex(String),

    #[error("Invalid base32 in hash: {0}")]
    InvalidBase32(String),

    #[error("Invalid magnet URI: {0}")]
    InvalidMagnet(String),
}

/// A 20-byte BitTorrent v1 info-hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    pub const fn new(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from raw bytes as delivered by the DHT engine.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InfoHashError> {
        let arr: [u8; INFO_HASH_LEN] =
            bytes
                .try_into()
                .map_err(|_| InfoHashError::InvalidLength {
                    expected: INFO_HASH_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Parse a 40-character hex string (any case).
    pub fn from_hex(s: &str) -> Result<Self, InfoHashError> {
        let s = s.trim();
        if s.len() != INFO_HASH_HEX_LEN {
            return Err(InfoHashError::InvalidLength {
                expected: INFO_HASH_HEX_LEN,
                actual: s.len(),
            });
        }
        let mut arr = [0u8; INFO_HASH_LEN];
        hex::decode_to_slice(s, &mut arr).map_err(|e| InfoHashError::InvalidHex(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Parse the `xt=urn:btih:` parameter of a magnet URI.
    ///
    /// Both the hex and the 32-character base32 encodings are accepted.
    pub fn from_magnet(uri: &str) -> Result<Self, InfoHashError> {
        if !uri.starts_with("magnet:") {
            return Err(InfoHashError::InvalidMagnet(
                "missing magnet: scheme".to_string(),
            ));
        }

        let magnet = Magnet::parse(uri).map_err(|e| InfoHashError::InvalidMagnet(e.to_string()))?;
        magnet
            .as_id20()
            .map(|id| Self(id.0))
            .ok_or_else(|| InfoHashError::InvalidMagnet("no v1 btih topic".to_string()))
    }

    /// Parse a 32-character base32 hash (any case).
    pub fn from_base32(s: &str) -> Result<Self, InfoHashError> {
        let s = s.trim();
        if s.len() != INFO_HASH_BASE32_LEN {
            return Err(InfoHashError::InvalidLength {
                expected: INFO_HASH_BASE32_LEN,
                actual: s.len(),
            });
        }
        let decoded = BASE32
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|e| InfoHashError::InvalidBase32(e.to_string()))?;
        Self::from_bytes(&decoded)
    }

    /// Parse user input: a magnet URI, or a bare hex or base32 hash.
    pub fn parse_user_input(input: &str) -> Result<Self, InfoHashError> {
        let input = input.trim();
        if input.starts_with("magnet:") {
            Self::from_magnet(input)
        } else if input.len() == INFO_HASH_BASE32_LEN {
            Self::from_base32(input)
        } else {
            Self::from_hex(input)
        }
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    /// Canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Magnet URI for this hash.
    pub fn magnet_uri(&self) -> String {
        format!("magnet:?xt=urn:btih:{}", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn test_from_hex_roundtrips_lowercase() {
        let hash = InfoHash::from_hex(HEX).unwrap();
        assert_eq!(hash.to_hex(), HEX);
        assert_eq!(hash.to_string(), HEX);
    }

    #[test]
    fn test_from_hex_normalizes_uppercase() {
        let hash = InfoHash::from_hex(&HEX.to_uppercase()).unwrap();
        assert_eq!(hash.to_hex(), HEX);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        let err = InfoHash::from_hex("abc123").unwrap_err();
        assert_eq!(
            err,
            InfoHashError::InvalidLength {
                expected: 40,
                actual: 6
            }
        );
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        let bad = "zz".repeat(20);
        assert!(matches!(
            InfoHash::from_hex(&bad),
            Err(InfoHashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(InfoHash::from_bytes(&[7u8; 20]).is_ok());
        assert!(matches!(
            InfoHash::from_bytes(&[7u8; 19]),
            Err(InfoHashError::InvalidLength { actual: 19, .. })
        ));
    }

    #[test]
    fn test_from_magnet_hex() {
        let uri = format!("magnet:?xt=urn:btih:{}&dn=ubuntu.iso", HEX.to_uppercase());
        assert_eq!(InfoHash::from_magnet(&uri).unwrap().to_hex(), HEX);
    }

    #[test]
    fn test_from_magnet_base32() {
        // 20 zero bytes encode to 32 'A's in base32.
        let uri = format!("magnet:?dn=x&xt=urn:btih:{}", "A".repeat(32));
        assert_eq!(InfoHash::from_magnet(&uri).unwrap().as_bytes(), &[0u8; 20]);
    }

    #[test]
    fn test_from_magnet_missing_topic() {
        assert!(matches!(
            InfoHash::from_magnet("magnet:?dn=nothing"),
            Err(InfoHashError::InvalidMagnet(_))
        ));
        assert!(matches!(
            InfoHash::from_magnet("http://example.com"),
            Err(InfoHashError::InvalidMagnet(_))
        ));
    }

    #[test]
    fn test_from_magnet_base32_matches_hex() {
        let hash = InfoHash::from_hex(HEX).unwrap();
        let encoded = BASE32.encode(hash.as_bytes());
        let uri = format!("magnet:?xt=urn:btih:{}&tr=udp://tracker.example:1337", encoded);
        assert_eq!(InfoHash::from_magnet(&uri).unwrap(), hash);
    }

    #[test]
    fn test_from_magnet_rejects_bad_topic() {
        assert!(matches!(
            InfoHash::from_magnet("magnet:?xt=urn:btih:abc123"),
            Err(InfoHashError::InvalidMagnet(_))
        ));
        assert!(matches!(
            InfoHash::from_magnet("magnet:?xt=urn:sha1:abc123"),
            Err(InfoHashError::InvalidMagnet(_))
        ));
    }

    #[test]
    fn test_from_base32_any_case() {
        let hash = InfoHash::from_hex(HEX).unwrap();
        let encoded = BASE32.encode(hash.as_bytes());
        assert_eq!(InfoHash::from_base32(&encoded).unwrap(), hash);
        assert_eq!(
            InfoHash::from_base32(&encoded.to_lowercase()).unwrap(),
            hash
        );
        assert!(matches!(
            InfoHash::from_base32(&"1".repeat(32)),
            Err(InfoHashError::InvalidBase32(_))
        ));
    }

    #[test]
    fn test_parse_user_input_accepts_all_forms() {
        let a = InfoHash::parse_user_input(HEX).unwrap();
        let b = InfoHash::parse_user_input(&a.magnet_uri()).unwrap();
        let c = InfoHash::parse_user_input(&BASE32.encode(a.as_bytes())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_serde_as_string() {
        let hash = InfoHash::from_hex(HEX).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", HEX));
        let parsed: InfoHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }
}
