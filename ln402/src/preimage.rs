//! Preimage validation and payment hash derivation.
//!
//! A client proves payment by presenting the 32-byte preimage of an invoice,
//! hex-encoded in the `X-Preimage` header. The gate never stores the preimage
//! itself; it only derives the [`PaymentHash`] (SHA-256 of the raw bytes),
//! which is the public identifier of the invoice and the record-store key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Number of hex characters in an encoded preimage or payment hash.
pub const HEX_LEN: usize = 64;

/// Reasons a presented preimage is rejected before it is ever hashed.
///
/// The two variants are kept apart so clients can tell a truncated or padded
/// value from one with a stray non-hex character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreimageError {
    /// The value is not exactly 64 characters long.
    #[error("The provided preimage isn't properly formatted")]
    Format,
    /// The value has the right length but is not valid hex.
    #[error("The provided preimage isn't properly hex encoded")]
    Encoding,
}

/// A validated 32-byte payment preimage.
///
/// Construct one with [`validate_format`] or [`Preimage::from_str`]. The
/// `Debug` implementation never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Preimage([u8; 32]);

impl Preimage {
    /// Wraps raw preimage bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw preimage bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex encoding, as sent in the `X-Preimage` header.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derives the payment hash of this preimage.
    #[must_use]
    pub fn payment_hash(&self) -> PaymentHash {
        hash(self)
    }
}

impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preimage(<redacted>)")
    }
}

impl FromStr for Preimage {
    type Err = PreimageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_format(s)
    }
}

/// Checks that `proof` is exactly 64 hex characters and decodes it.
///
/// # Errors
///
/// Returns [`PreimageError::Format`] when the length is wrong and
/// [`PreimageError::Encoding`] when a character is not hexadecimal.
pub fn validate_format(proof: &str) -> Result<Preimage, PreimageError> {
    if proof.len() != HEX_LEN {
        return Err(PreimageError::Format);
    }
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(proof, &mut bytes).map_err(|_| PreimageError::Encoding)?;
    Ok(Preimage(bytes))
}

/// Computes the payment hash (SHA-256 of the raw preimage bytes).
#[must_use]
pub fn hash(preimage: &Preimage) -> PaymentHash {
    PaymentHash(Sha256::digest(preimage.0).into())
}

/// SHA-256 digest identifying a Lightning invoice.
///
/// Displayed, parsed and serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaymentHash([u8; 32]);

impl PaymentHash {
    /// Wraps raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Builds a hash from a byte slice, which must be exactly 32 bytes long.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    /// Returns the raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentHash({self})")
    }
}

/// Error returned when a string is not a hex-encoded 32-byte hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid payment hash {0:?}: expected 64 hex characters")]
pub struct ParsePaymentHashError(pub String);

impl FromStr for PaymentHash {
    type Err = ParsePaymentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParsePaymentHashError(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for PaymentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PaymentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
