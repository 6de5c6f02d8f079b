//! The settlement oracle capability.
//!
//! A [`SettlementOracle`] is the Lightning backend the gate talks to: it
//! creates invoices and reports whether they have been paid. Concrete
//! backends (lnd, Lightning Charge) live in `ln402-http`; the gate depends on
//! this trait only.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::BoxFuture;
use crate::invoice::Invoice;

/// Classification of oracle failures.
///
/// The gate uses the kind, never the message, to decide between rejecting
/// the client and failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleErrorKind {
    /// The oracle has no invoice with the given identifier.
    NotFound,
    /// The oracle could not be reached or timed out.
    Transient,
    /// Any other failure, such as an unexpected response.
    Other,
}

impl fmt::Display for OracleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Transient => f.write_str("transient"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Error returned by a [`SettlementOracle`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct OracleError {
    kind: OracleErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl OracleError {
    /// Creates an error of the given kind.
    pub fn new(kind: OracleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an [`OracleErrorKind::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::NotFound, message)
    }

    /// Shorthand for an [`OracleErrorKind::Transient`] error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::Transient, message)
    }

    /// Shorthand for an [`OracleErrorKind::Other`] error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::Other, message)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> OracleErrorKind {
        self.kind
    }

    /// Returns `true` if the oracle reported that the invoice does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == OracleErrorKind::NotFound
    }
}

/// Creates invoices and reports their settlement status.
///
/// Implementations are long-lived and shared across requests, so methods
/// take `&self` and must be safe to call concurrently.
pub trait SettlementOracle: Send + Sync {
    /// Creates an invoice for `amount_sat` satoshis with the given memo.
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>>;

    /// Returns whether the invoice identified by `implementation_id` is settled.
    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>>;
}

impl<T: SettlementOracle + ?Sized> SettlementOracle for Arc<T> {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        (**self).generate_invoice(amount_sat, memo)
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        (**self).check_invoice(implementation_id)
    }
}

impl<T: SettlementOracle + ?Sized> SettlementOracle for Box<T> {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        (**self).generate_invoice(amount_sat, memo)
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        (**self).check_invoice(implementation_id)
    }
}
