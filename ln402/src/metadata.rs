//! The bookkeeping record stored per issued invoice.

use serde::{Deserialize, Serialize};

use crate::invoice::Invoice;

/// Anti-replay and binding record, keyed by the invoice's payment hash.
///
/// Created with `used == false` when the invoice is issued and flipped to
/// `true` exactly once, when the matching preimage is redeemed. Records are
/// stored as JSON objects with camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMetadata {
    /// Backend identifier used to re-check settlement.
    pub implementation_id: String,
    /// HTTP method of the request the invoice was issued for.
    pub method: String,
    /// URL path of the request the invoice was issued for.
    pub path: String,
    /// Whether the preimage has already been redeemed.
    #[serde(default)]
    pub used: bool,
}

impl InvoiceMetadata {
    /// Creates an unused record binding `invoice` to `method` and `path`.
    #[must_use]
    pub fn issued(invoice: &Invoice, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            implementation_id: invoice.implementation_id.clone(),
            method: method.into(),
            path: path.into(),
            used: false,
        }
    }

    /// Encodes the record for storage.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which does not occur for well-formed strings.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a JSON encoded record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_uses_camel_case() {
        let record = InvoiceMetadata {
            implementation_id: "abc".into(),
            method: "GET".into(),
            path: "/ping".into(),
            used: true,
        };
        let value: serde_json::Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "implementationId": "abc",
                "method": "GET",
                "path": "/ping",
                "used": true,
            })
        );
    }

    #[test]
    fn test_decode_defaults_used_to_false() {
        let bytes = br#"{"implementationId":"id","method":"POST","path":"/a"}"#;
        let record = InvoiceMetadata::from_bytes(bytes).unwrap();
        assert!(!record.used);
        assert_eq!(record.method, "POST");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(InvoiceMetadata::from_bytes(b"not json").is_err());
        assert!(InvoiceMetadata::from_bytes(br#"{"method":"GET"}"#).is_err());
    }
}
