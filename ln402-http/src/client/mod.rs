//! Reqwest middleware that pays Lightning paywalls automatically.
//!
//! [`PaywallClient`] sends a request as usual. When the server answers
//! `402 Payment Required` with a BOLT-11 invoice, it pays the invoice through
//! an [`InvoicePayer`], then repeats the request once with the preimage in
//! the `X-Preimage` header.
//!
//! ```ignore
//! use ln402_http::client::{PaywallClient, ReqwestWithPayments, ReqwestWithPaymentsBuild};
//! use ln402_http::oracle::LndClient;
//!
//! let node = LndClient::try_from("https://localhost:8080")?.with_macaroon_file("admin.macaroon")?;
//! let http = reqwest::Client::new().with_payments(PaywallClient::new(node)).build();
//! let pong = http.get("http://localhost:8080/ping").send().await?.text().await?;
//! ```
//!
//! Only requests whose body can be cloned are retried; streaming bodies fail
//! with [`PaywallClientError::RequestNotCloneable`] before anything is paid.

mod middleware;

pub use middleware::*;

use ln402::{BoxFuture, Preimage};
use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

/// Errors from paying an invoice.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// The node could not pay, e.g. because no route was found.
    #[error("Payment failed: {0}")]
    Failed(String),
    /// Talking to the paying node failed.
    #[error("{0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Capability to pay a BOLT-11 invoice and learn its preimage.
pub trait InvoicePayer: Send + Sync {
    /// Pays `payment_request` and returns the preimage revealed by the payment.
    fn pay<'a>(&'a self, payment_request: &'a str) -> BoxFuture<'a, Result<Preimage, PayError>>;
}

impl<T: InvoicePayer + ?Sized> InvoicePayer for std::sync::Arc<T> {
    fn pay<'a>(&'a self, payment_request: &'a str) -> BoxFuture<'a, Result<Preimage, PayError>> {
        (**self).pay(payment_request)
    }
}

/// Trait for adding paywall payment handling to reqwest clients.
///
/// This trait is implemented on [`Client`] and [`ClientBuilder`].
pub trait ReqwestWithPayments<A, P> {
    /// Adds the payment middleware to the client or builder.
    fn with_payments(self, paywall_client: PaywallClient<P>) -> ReqwestWithPaymentsBuilder<A, P>;
}

impl<P> ReqwestWithPayments<Self, P> for Client {
    fn with_payments(self, paywall_client: PaywallClient<P>) -> ReqwestWithPaymentsBuilder<Self, P> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            paywall_client,
        }
    }
}

impl<P> ReqwestWithPayments<Self, P> for ClientBuilder {
    fn with_payments(self, paywall_client: PaywallClient<P>) -> ReqwestWithPaymentsBuilder<Self, P> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            paywall_client,
        }
    }
}

/// Builder for creating a reqwest client with the payment middleware.
#[allow(missing_debug_implementations)] // generic A may not implement Debug
pub struct ReqwestWithPaymentsBuilder<A, P> {
    inner: A,
    paywall_client: PaywallClient<P>,
}

/// Trait for building the final client from a [`ReqwestWithPaymentsBuilder`].
pub trait ReqwestWithPaymentsBuild {
    /// The type returned by [`build`]
    type BuildResult;
    /// The type returned by [`builder`]
    type BuilderResult;

    /// Builds the client, consuming the builder.
    fn build(self) -> Self::BuildResult;

    /// Returns the underlying reqwest client builder with middleware added.
    fn builder(self) -> Self::BuilderResult;
}

impl<P> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client, P>
where
    PaywallClient<P>: rqm::Middleware,
{
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.paywall_client)
    }
}

impl<P> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder, P>
where
    PaywallClient<P>: rqm::Middleware,
{
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.paywall_client))
    }
}
