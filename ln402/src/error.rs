//! Error types for the payment gate.
//!
//! A request the gate refuses is either the client's fault ([`Rejection`],
//! answered with 400) or the server's ([`ServiceError`], answered with 500).
//! [`PaywallError`] wraps both and knows the matching status code.

use std::time::Duration;

use crate::oracle::OracleError;
use crate::preimage::PreimageError;
use crate::store::StoreError;

/// Client-attributable reasons for refusing a presented preimage.
///
/// The `Display` output is sent to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The preimage is not 64 hex characters.
    #[error(transparent)]
    Malformed(#[from] PreimageError),
    /// No invoice was issued for the preimage's hash.
    #[error(
        "You seem to have sent an invalid preimage or one that doesn't correspond to an invoice that was issued for an initial request"
    )]
    UnknownPreimage,
    /// The invoice was issued for a different HTTP method.
    #[error("Your invoice was created for a {expected} request, but you're sending a {actual} request")]
    MethodMismatch {
        /// Method recorded at issuance.
        expected: String,
        /// Method of the current request.
        actual: String,
    },
    /// The invoice was issued for a different URL path.
    #[error(
        "Your invoice was created for the path \"{expected}\", but you're sending a request to \"{actual}\""
    )]
    PathMismatch {
        /// Path recorded at issuance.
        expected: String,
        /// Path of the current request.
        actual: String,
    },
    /// The preimage was already redeemed.
    #[error(
        "You already sent a request with the same preimage. You have to pay a new invoice for and include the corresponding preimage in each request."
    )]
    AlreadyUsed,
    /// The invoice exists but has not been paid.
    #[error("You somehow obtained the preimage of the invoice, but the invoice is not settled yet")]
    NotSettled,
    /// The oracle does not know the invoice.
    #[error("No corresponding invoice was found for the provided preimage")]
    InvoiceNotFound,
}

/// Server-side failures while issuing or redeeming.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The oracle failed to create an invoice.
    #[error("Couldn't generate invoice: {0}")]
    InvoiceGeneration(#[source] OracleError),
    /// The oracle failed to report settlement status.
    #[error("An error occurred during checking the preimage: {0}")]
    Settlement(#[source] OracleError),
    /// The record store failed.
    #[error("An error occurred while accessing the invoice store: {0}")]
    Store(#[from] StoreError),
    /// An oracle or store call exceeded the configured timeout.
    #[error("The {operation} call timed out after {timeout:?}")]
    Timeout {
        /// Name of the call that timed out.
        operation: &'static str,
        /// The configured limit.
        timeout: Duration,
    },
}

/// Any reason the gate did not forward a request carrying a preimage, or
/// failed to issue an invoice.
#[derive(Debug, thiserror::Error)]
pub enum PaywallError {
    /// The request was refused because of something the client sent.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The gate could not complete its work.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<PreimageError> for PaywallError {
    fn from(err: PreimageError) -> Self {
        Self::Rejected(Rejection::Malformed(err))
    }
}

impl From<StoreError> for PaywallError {
    fn from(err: StoreError) -> Self {
        Self::Service(ServiceError::Store(err))
    }
}

impl PaywallError {
    /// HTTP status code answering this error: 400 or 500.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Rejected(_) => 400,
            Self::Service(_) => 500,
        }
    }

    /// Returns `true` if the client is to blame.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
