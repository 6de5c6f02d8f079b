//! Client for lnd's REST gateway.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use ln402::{BoxFuture, Invoice, OracleError, PaymentHash, Preimage, SettlementOracle};
use reqwest::{Certificate, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{OracleClientError, endpoint, parse_base_url, send_json};
use crate::constants::LND_MACAROON_HEADER;

/// Settlement oracle backed by an lnd node's REST gateway.
///
/// Requests authenticate with an admin or invoice macaroon sent in the
/// `Grpc-Metadata-macaroon` header. lnd uses a self-signed certificate by
/// default; trust it with [`LndClient::with_tls_cert_file`].
#[derive(Clone)]
pub struct LndClient {
    base_url: Url,
    client: Client,
    macaroon: Option<String>,
    timeout: Option<Duration>,
}

impl fmt::Debug for LndClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LndClient")
            .field("base_url", &self.base_url.as_str())
            .field("macaroon", &self.macaroon.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AddInvoiceRequest<'a> {
    value: String,
    memo: &'a str,
}

#[derive(Deserialize)]
struct AddInvoiceResponse {
    r_hash: String,
    payment_request: String,
}

#[derive(Deserialize)]
struct LookupInvoiceResponse {
    #[serde(default)]
    settled: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
struct SendPaymentRequest<'a> {
    payment_request: &'a str,
}

#[derive(Deserialize)]
struct SendPaymentResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_preimage: String,
}

impl LndClient {
    /// Creates a client for the REST gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::CannotBeABase`] if `base_url` cannot carry
    /// a path.
    pub fn try_new(base_url: Url) -> Result<Self, OracleClientError> {
        if base_url.cannot_be_a_base() {
            return Err(OracleClientError::CannotBeABase(base_url));
        }
        Ok(Self {
            base_url,
            client: Client::new(),
            macaroon: None,
            timeout: None,
        })
    }

    /// Returns the base URL of the gateway.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Authenticates with a raw macaroon.
    #[must_use]
    pub fn with_macaroon(mut self, macaroon: &[u8]) -> Self {
        self.macaroon = Some(hex::encode(macaroon));
        self
    }

    /// Authenticates with the macaroon stored at `path`, e.g. `invoice.macaroon`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::Io`] if the file cannot be read.
    pub fn with_macaroon_file(self, path: impl AsRef<Path>) -> Result<Self, OracleClientError> {
        let macaroon = std::fs::read(path).map_err(|e| OracleClientError::Io {
            context: "macaroon file",
            source: e,
        })?;
        Ok(self.with_macaroon(&macaroon))
    }

    /// Trusts the PEM certificate at `path`, usually lnd's `tls.cert`.
    ///
    /// This replaces the underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::Io`] if the file cannot be read and
    /// [`OracleClientError::Http`] if it is not a valid certificate.
    pub fn with_tls_cert_file(mut self, path: impl AsRef<Path>) -> Result<Self, OracleClientError> {
        let pem = std::fs::read(path).map_err(|e| OracleClientError::Io {
            context: "TLS certificate file",
            source: e,
        })?;
        let cert = Certificate::from_pem(&pem).map_err(|e| OracleClientError::Http {
            context: "Failed to parse TLS certificate",
            source: e,
        })?;
        self.client = Client::builder()
            .add_root_certificate(cert)
            .build()
            .map_err(|e| OracleClientError::Http {
                context: "Failed to build HTTP client",
                source: e,
            })?;
        Ok(self)
    }

    /// Uses `client` for all future requests.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates an invoice over `amount_sat` satoshis.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError`] if the request fails or the node returns
    /// a malformed payment hash.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "ln402.lnd.add_invoice",
            skip(self, memo),
            fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
        )
    )]
    pub async fn add_invoice(&self, amount_sat: u64, memo: &str) -> Result<Invoice, OracleClientError> {
        let url = endpoint(&self.base_url, &["v1", "invoices"])?;
        let body = AddInvoiceRequest {
            value: amount_sat.to_string(),
            memo,
        };
        let response: AddInvoiceResponse =
            send_json(self.request(self.client.post(url).json(&body)), "POST /v1/invoices").await?;

        let payment_hash = decode_base64(&response.r_hash)
            .as_deref()
            .and_then(PaymentHash::from_slice)
            .ok_or_else(|| OracleClientError::InvalidResponse {
                context: "POST /v1/invoices",
                message: format!("r_hash {:?} is not a 32 byte hash", response.r_hash),
            })?;

        Ok(Invoice {
            payment_request: response.payment_request,
            payment_hash,
            implementation_id: payment_hash.to_hex(),
        })
    }

    /// Reports whether the invoice with the hex payment hash `r_hash` is settled.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::InvalidInvoiceId`] if `r_hash` is not a
    /// hex payment hash, and other [`OracleClientError`]s if the lookup fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "ln402.lnd.lookup_invoice",
            skip(self),
            fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
        )
    )]
    pub async fn lookup_invoice(&self, r_hash: &str) -> Result<bool, OracleClientError> {
        let hash: PaymentHash = r_hash
            .parse()
            .map_err(|_| OracleClientError::InvalidInvoiceId(r_hash.to_owned()))?;
        let url = endpoint(&self.base_url, &["v1", "invoice", &hash.to_hex()])?;
        let response: LookupInvoiceResponse =
            send_json(self.request(self.client.get(url)), "GET /v1/invoice")
                .await
                .map_err(OracleClientError::into_lookup_error)?;
        Ok(response.settled || response.state.as_deref() == Some("SETTLED"))
    }

    /// Pays a BOLT-11 invoice and returns its preimage.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::PaymentFailed`] if the node could not route
    /// the payment, and other [`OracleClientError`]s if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "ln402.lnd.send_payment",
            skip_all,
            fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
        )
    )]
    pub async fn send_payment(&self, payment_request: &str) -> Result<Preimage, OracleClientError> {
        let url = endpoint(&self.base_url, &["v1", "channels", "transactions"])?;
        let body = SendPaymentRequest { payment_request };
        let response: SendPaymentResponse = send_json(
            self.request(self.client.post(url).json(&body)),
            "POST /v1/channels/transactions",
        )
        .await?;

        if !response.payment_error.is_empty() {
            return Err(OracleClientError::PaymentFailed(response.payment_error));
        }
        decode_base64(&response.payment_preimage)
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Preimage::from_bytes)
            .ok_or_else(|| OracleClientError::InvalidResponse {
                context: "POST /v1/channels/transactions",
                message: "payment_preimage is not 32 bytes".to_owned(),
            })
    }

    fn request(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(macaroon) = &self.macaroon {
            req = req.header(LND_MACAROON_HEADER, macaroon.as_str());
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }
}

/// lnd encodes bytes fields as standard base64; some proxies re-encode them URL-safe.
fn decode_base64(value: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(value)
        .or_else(|_| URL_SAFE.decode(value))
        .ok()
}

impl TryFrom<&str> for LndClient {
    type Error = OracleClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(parse_base_url(value)?)
    }
}

impl TryFrom<String> for LndClient {
    type Error = OracleClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl SettlementOracle for LndClient {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        Box::pin(async move { Ok(self.add_invoice(amount_sat, memo).await?) })
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        Box::pin(async move { Ok(self.lookup_invoice(implementation_id).await?) })
    }
}

#[cfg(feature = "client")]
impl crate::client::InvoicePayer for LndClient {
    fn pay<'a>(
        &'a self,
        payment_request: &'a str,
    ) -> BoxFuture<'a, Result<Preimage, crate::client::PayError>> {
        Box::pin(async move { Ok(self.send_payment(payment_request).await?) })
    }
}
