//! Invoices and the options used to request them.

use serde::{Deserialize, Serialize};

use crate::preimage::PaymentHash;

/// Price charged when none (or a non-positive one) is configured, in satoshis.
pub const DEFAULT_PRICE: u64 = 1;

/// Invoice description used when none is configured.
pub const DEFAULT_MEMO: &str = "API call";

/// A payment obligation freshly created by a settlement oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Encoded payable invoice (BOLT-11). Opaque to the gate.
    pub payment_request: String,
    /// Hash identifying the obligation; used as the record-store key.
    pub payment_hash: PaymentHash,
    /// Backend-specific identifier used to query settlement status later.
    pub implementation_id: String,
}

/// Price and memo attached to every invoice the gate issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceOptions {
    /// Amount in satoshis.
    pub price: u64,
    /// Human readable description shown by the payer's wallet.
    pub memo: String,
}

impl Default for InvoiceOptions {
    fn default() -> Self {
        Self {
            price: DEFAULT_PRICE,
            memo: DEFAULT_MEMO.to_owned(),
        }
    }
}

impl InvoiceOptions {
    /// Creates options with the given price, raising zero to [`DEFAULT_PRICE`].
    #[must_use]
    pub fn new(price: u64, memo: impl Into<String>) -> Self {
        Self::default().with_price(price).with_memo(memo)
    }

    /// Sets the price. Zero is raised to [`DEFAULT_PRICE`].
    #[must_use]
    pub const fn with_price(mut self, price: u64) -> Self {
        self.price = if price == 0 { DEFAULT_PRICE } else { price };
        self
    }

    /// Sets the price from a signed amount, as found in loosely typed configs.
    ///
    /// Values `<= 0` are raised to [`DEFAULT_PRICE`].
    #[must_use]
    pub fn with_signed_price(self, price: i64) -> Self {
        self.with_price(u64::try_from(price).unwrap_or(0))
    }

    /// Sets the memo. An empty memo is allowed.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    /// Returns the price with the `<= 0` rule applied, even for options that
    /// were deserialized or built field by field.
    #[must_use]
    pub const fn effective_price(&self) -> u64 {
        if self.price == 0 { DEFAULT_PRICE } else { self.price }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = InvoiceOptions::default();
        assert_eq!(options.price, 1);
        assert_eq!(options.memo, "API call");
    }

    #[test]
    fn test_non_positive_price_is_raised() {
        assert_eq!(InvoiceOptions::default().with_price(0).price, DEFAULT_PRICE);
        assert_eq!(InvoiceOptions::default().with_signed_price(-5).price, DEFAULT_PRICE);
        assert_eq!(InvoiceOptions::default().with_signed_price(42).price, 42);

        let raw = InvoiceOptions {
            price: 0,
            memo: String::new(),
        };
        assert_eq!(raw.effective_price(), DEFAULT_PRICE);
    }

    #[test]
    fn test_empty_memo_is_kept() {
        let options = InvoiceOptions::new(10, "");
        assert_eq!(options.price, 10);
        assert_eq!(options.memo, "");
    }

    #[test]
    fn test_options_deserialize_with_missing_fields() {
        let options: InvoiceOptions = serde_json::from_str(r#"{"price": 3}"#).unwrap();
        assert_eq!(options.price, 3);
        assert_eq!(options.memo, DEFAULT_MEMO);
    }
}
