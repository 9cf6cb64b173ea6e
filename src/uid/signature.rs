//! Finalised 128-bit signatures.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Width of a signature in bytes.
pub const SIGNATURE_LEN: usize = 16;

/// A finalised hash, ordered bytewise and printed as base64.
///
/// The all-zero value is reserved for "nothing hashed yet" and never denotes
/// a real identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HashSignature([u8; SIGNATURE_LEN]);

/// Text that is not a base64 rendering of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid signature text `{text}`")]
pub struct SignatureParseError {
    text: String,
}

impl HashSignature {
    /// The empty signature.
    pub const EMPTY: Self = Self([0; SIGNATURE_LEN]);

    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Whether this is the reserved empty signature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Canonical base64 text.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Display for HashSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for HashSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashSignature({self})")
    }
}

impl FromStr for HashSignature {
    type Err = SignatureParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bytes = STANDARD.decode(text).map_err(|_| SignatureParseError {
            text: text.to_owned(),
        })?;
        <[u8; SIGNATURE_LEN]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| SignatureParseError {
                text: text.to_owned(),
            })
    }
}

impl Serialize for HashSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HashSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_signature_renders_as_zero_bytes() {
        assert!(HashSignature::EMPTY.is_empty());
        assert_eq!(HashSignature::EMPTY.to_string(), "AAAAAAAAAAAAAAAAAAAAAA==");
        assert_eq!(HashSignature::default(), HashSignature::EMPTY);
    }

    #[test]
    fn text_form_parses_back() {
        let sig = HashSignature::from_bytes([7; SIGNATURE_LEN]);
        assert_eq!(sig.to_string().parse::<HashSignature>(), Ok(sig));
    }

    #[rstest]
    #[case("not base64!")]
    #[case("AAAA")]
    fn malformed_text_is_rejected(#[case] text: &str) {
        assert!(text.parse::<HashSignature>().is_err());
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0; SIGNATURE_LEN];
        low[15] = 0xff;
        let mut high = [0; SIGNATURE_LEN];
        high[0] = 1;
        assert!(HashSignature::from_bytes(low) < HashSignature::from_bytes(high));
    }
}
