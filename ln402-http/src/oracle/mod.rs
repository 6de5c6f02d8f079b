//! [`SettlementOracle`] implementations talking to Lightning nodes over HTTP.
//!
//! - [`LndClient`] uses lnd's REST gateway.
//! - [`ChargeClient`] uses Lightning Charge on top of c-lightning.
//! - [`LightningOracle`] picks one of them at runtime.
//!
//! ## Error Handling
//!
//! Both clients report [`OracleClientError`], which captures URL construction,
//! transport, deserialization and unexpected status failures. Converting it
//! into [`OracleError`] classifies it for the gate: unknown invoices become
//! [`OracleErrorKind::NotFound`], transport failures
//! [`OracleErrorKind::Transient`], everything else [`OracleErrorKind::Other`].

mod charge;
mod lnd;

use std::fmt::Display;

use http::StatusCode;
use ln402::{BoxFuture, Invoice, OracleError, OracleErrorKind, SettlementOracle};
use reqwest::RequestBuilder;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Span;

pub use charge::ChargeClient;
pub use lnd::LndClient;

/// Error message lnd returns for unknown payment hashes.
const LND_NOT_FOUND: &str = "unable to locate invoice";

/// Errors that can occur while talking to a Lightning node.
#[derive(Debug, thiserror::Error)]
pub enum OracleClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The base URL cannot have path segments (e.g. `mailto:`).
    #[error("URL cannot be a base: {0}")]
    CannotBeABase(Url),
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The node answered, but with content that makes no sense.
    #[error("Invalid response: {context}: {message}")]
    InvalidResponse {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong.
        message: String,
    },
    /// An invoice identifier that the node cannot possibly know.
    #[error("Invalid invoice identifier: {0:?}")]
    InvalidInvoiceId(String),
    /// The node does not know the looked-up invoice.
    #[error("Invoice not found: {context}: {body}")]
    UnknownInvoice {
        /// Human-readable context.
        context: &'static str,
        /// The response body.
        body: String,
    },
    /// The node refused to pay an invoice.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
    /// Reading a credential file failed.
    #[error("Failed to read {context}: {source}")]
    Io {
        /// Which file was being read.
        context: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl OracleClientError {
    /// Classifies this error for the payment gate.
    #[must_use]
    pub fn kind(&self) -> OracleErrorKind {
        match self {
            Self::InvalidInvoiceId(_) | Self::UnknownInvoice { .. } => OracleErrorKind::NotFound,
            Self::Http { .. } | Self::ResponseBodyRead { .. } => OracleErrorKind::Transient,
            _ => OracleErrorKind::Other,
        }
    }
}

impl OracleClientError {
    /// Reinterprets a failed invoice lookup: a `404`, or lnd's "unable to
    /// locate invoice" under any status, means the invoice is unknown.
    ///
    /// Only lookups go through here, so a misrouted base URL on other
    /// endpoints still surfaces as a server error.
    fn into_lookup_error(self) -> Self {
        match self {
            Self::HttpStatus {
                context,
                status,
                body,
            } if status == StatusCode::NOT_FOUND || body.contains(LND_NOT_FOUND) => {
                Self::UnknownInvoice { context, body }
            }
            other => other,
        }
    }
}

impl From<OracleClientError> for OracleError {
    fn from(err: OracleClientError) -> Self {
        Self::new(err.kind(), err.to_string()).with_source(err)
    }
}

#[cfg(feature = "client")]
impl From<OracleClientError> for crate::client::PayError {
    fn from(err: OracleClientError) -> Self {
        match err {
            OracleClientError::PaymentFailed(reason) => Self::Failed(reason),
            other => Self::Backend(Box::new(other)),
        }
    }
}

/// A Lightning backend chosen at runtime, e.g. from configuration.
#[derive(Debug, Clone)]
pub enum LightningOracle {
    /// lnd REST gateway.
    Lnd(LndClient),
    /// Lightning Charge.
    Charge(ChargeClient),
}

impl From<LndClient> for LightningOracle {
    fn from(client: LndClient) -> Self {
        Self::Lnd(client)
    }
}

impl From<ChargeClient> for LightningOracle {
    fn from(client: ChargeClient) -> Self {
        Self::Charge(client)
    }
}

impl SettlementOracle for LightningOracle {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        match self {
            Self::Lnd(client) => client.generate_invoice(amount_sat, memo),
            Self::Charge(client) => client.generate_invoice(amount_sat, memo),
        }
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        match self {
            Self::Lnd(client) => client.check_invoice(implementation_id),
            Self::Charge(client) => client.check_invoice(implementation_id),
        }
    }
}

/// Parses `value` as a base URL, normalized to a single trailing slash.
fn parse_base_url(value: &str) -> Result<Url, OracleClientError> {
    let mut normalized = value.trim_end_matches('/').to_string();
    normalized.push('/');
    let url = Url::parse(&normalized).map_err(|e| OracleClientError::UrlParse {
        context: "Failed to parse base url",
        source: e,
    })?;
    if url.cannot_be_a_base() {
        return Err(OracleClientError::CannotBeABase(url));
    }
    Ok(url)
}

/// Appends escaped path segments to `base`.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, OracleClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| OracleClientError::CannotBeABase(base.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends `req` and decodes a successful JSON body, mapping every failure to
/// [`OracleClientError`].
///
/// `context` is a human-readable identifier used in tracing and error messages
/// (e.g. `"POST /v1/invoices"`).
async fn send_json<R>(req: RequestBuilder, context: &'static str) -> Result<R, OracleClientError>
where
    R: serde::de::DeserializeOwned,
{
    let http_response = req
        .send()
        .await
        .map_err(|e| OracleClientError::Http { context, source: e })?;

    let result = if http_response.status().is_success() {
        http_response
            .json::<R>()
            .await
            .map_err(|e| OracleClientError::JsonDeserialization { context, source: e })
    } else {
        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| OracleClientError::ResponseBodyRead { context, source: e })?;
        Err(OracleClientError::HttpStatus {
            context,
            status,
            body,
        })
    };

    record_result_on_span(&result);

    result
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to Lightning node failed");
        }
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
