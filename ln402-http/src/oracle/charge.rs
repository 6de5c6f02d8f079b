//! Client for Lightning Charge.

use std::fmt;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use ln402::{BoxFuture, Invoice, OracleError, PaymentHash, SettlementOracle};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use url::Url;
use url::form_urlencoded;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{OracleClientError, endpoint, parse_base_url, send_json};
use crate::constants::CHARGE_API_USER;

/// Settlement oracle backed by a [Lightning Charge] server.
///
/// Invoices are identified by Charge's own invoice id, so settlement checks
/// fetch a single invoice instead of scanning all of them.
///
/// [Lightning Charge]: https://github.com/ElementsProject/lightning-charge
#[derive(Clone)]
pub struct ChargeClient {
    base_url: Url,
    client: Client,
    api_token: String,
    timeout: Option<Duration>,
}

impl fmt::Debug for ChargeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargeClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Invoice as returned by Charge, e.g.
/// `{"id":"4ya51ILHmKU6C8UjfEcnR","msatoshi":"1000000","rhash":"4bb4...","payreq":"lntb10u1...","status":"unpaid"}`.
#[derive(Deserialize)]
struct ChargeInvoice {
    id: String,
    rhash: String,
    #[serde(default)]
    payreq: String,
    #[serde(default)]
    status: String,
}

impl ChargeClient {
    /// Creates a client for the Charge server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::CannotBeABase`] if `base_url` cannot carry
    /// a path.
    pub fn try_new(base_url: Url, api_token: impl Into<String>) -> Result<Self, OracleClientError> {
        if base_url.cannot_be_a_base() {
            return Err(OracleClientError::CannotBeABase(base_url));
        }
        Ok(Self {
            base_url,
            client: Client::new(),
            api_token: api_token.into(),
            timeout: None,
        })
    }

    /// Parses `base_url` and creates a client for it.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::UrlParse`] if `base_url` is not a URL.
    pub fn from_url_str(base_url: &str, api_token: impl Into<String>) -> Result<Self, OracleClientError> {
        Self::try_new(parse_base_url(base_url)?, api_token)
    }

    /// Returns the base URL of the server.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
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
    /// Returns [`OracleClientError`] if the request fails or Charge returns
    /// a malformed payment hash.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "ln402.charge.create_invoice",
            skip(self, memo),
            fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
        )
    )]
    pub async fn create_invoice(&self, amount_sat: u64, memo: &str) -> Result<Invoice, OracleClientError> {
        let url = endpoint(&self.base_url, &["invoice"])?;
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("msatoshi", &amount_sat.saturating_mul(1000).to_string())
            .append_pair("description", memo)
            .finish();
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form);
        let invoice: ChargeInvoice = send_json(self.request(req), "POST /invoice").await?;

        let payment_hash: PaymentHash =
            invoice
                .rhash
                .parse()
                .map_err(|_| OracleClientError::InvalidResponse {
                    context: "POST /invoice",
                    message: format!("rhash {:?} is not a hex payment hash", invoice.rhash),
                })?;

        Ok(Invoice {
            payment_request: invoice.payreq,
            payment_hash,
            implementation_id: invoice.id,
        })
    }

    /// Reports whether the invoice with Charge id `id` is paid.
    ///
    /// Expired invoices count as unpaid.
    ///
    /// # Errors
    ///
    /// Returns [`OracleClientError::InvalidResponse`] for statuses other than
    /// `paid`, `unpaid` and `expired`, and other [`OracleClientError`]s if the
    /// request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "ln402.charge.get_invoice",
            skip(self),
            fields(otel.status_code = tracing::field::Empty, error.message = tracing::field::Empty)
        )
    )]
    pub async fn get_invoice(&self, id: &str) -> Result<bool, OracleClientError> {
        if id.is_empty() {
            return Err(OracleClientError::InvalidInvoiceId(id.to_owned()));
        }
        let url = endpoint(&self.base_url, &["invoice", id])?;
        let invoice: ChargeInvoice = send_json(self.request(self.client.get(url)), "GET /invoice")
            .await
            .map_err(OracleClientError::into_lookup_error)?;

        match invoice.status.as_str() {
            "paid" => Ok(true),
            "unpaid" | "expired" => Ok(false),
            other => Err(OracleClientError::InvalidResponse {
                context: "GET /invoice",
                message: format!("invoice {} has unhandled status {other:?}", invoice.id),
            }),
        }
    }

    fn request(&self, mut req: RequestBuilder) -> RequestBuilder {
        req = req.basic_auth(CHARGE_API_USER, Some(&self.api_token));
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }
}

impl SettlementOracle for ChargeClient {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        Box::pin(async move { Ok(self.create_invoice(amount_sat, memo).await?) })
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        Box::pin(async move { Ok(self.get_invoice(implementation_id).await?) })
    }
}
