//! The [`PaywallClient`] middleware.

use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace};

use super::{InvoicePayer, PayError};
use crate::constants::{BOLT11_CONTENT_TYPE, PREIMAGE_HEADER_NAME};

/// Errors raised by [`PaywallClient`] while handling a `402` response.
#[derive(Debug, thiserror::Error)]
pub enum PaywallClientError {
    /// The request body cannot be cloned, so it could not be repeated.
    #[error("Request body cannot be cloned, so the paid request cannot be sent")]
    RequestNotCloneable,
    /// The `402` response carried no usable invoice.
    #[error("Invalid invoice in 402 response: {0}")]
    InvalidInvoice(String),
    /// Paying the invoice failed.
    #[error(transparent)]
    Payment(#[from] PayError),
    /// The preimage could not be put into a header.
    #[error("Invalid preimage header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// Reqwest middleware paying Lightning invoices returned with `402`.
#[derive(Debug, Clone)]
pub struct PaywallClient<P> {
    payer: P,
}

impl<P> PaywallClient<P>
where
    P: InvoicePayer,
{
    /// Creates a middleware paying through `payer`.
    pub const fn new(payer: P) -> Self {
        Self { payer }
    }

    /// Returns the payer.
    pub const fn payer(&self) -> &P {
        &self.payer
    }

    /// Pays the invoice in a `402` response and returns the header proving it.
    ///
    /// # Errors
    ///
    /// Returns [`PaywallClientError::InvalidInvoice`] if the body is empty or
    /// unreadable, and [`PaywallClientError::Payment`] if paying fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "ln402.reqwest.pay_invoice", skip_all, err)
    )]
    pub async fn pay_invoice(&self, res: Response) -> Result<HeaderValue, PaywallClientError> {
        let body = res
            .text()
            .await
            .map_err(|e| PaywallClientError::InvalidInvoice(e.to_string()))?;
        let payment_request = body.trim();
        if payment_request.is_empty() {
            return Err(PaywallClientError::InvalidInvoice("empty body".to_owned()));
        }

        let preimage = self.payer.pay(payment_request).await?;

        #[cfg(feature = "telemetry")]
        debug!(payment_hash = %preimage.payment_hash(), "Invoice paid");

        Ok(HeaderValue::from_str(&preimage.to_hex())?)
    }
}

/// Whether `res` is a paywall asking for a Lightning payment.
fn is_invoice_response(res: &Response) -> bool {
    res.status() == StatusCode::PAYMENT_REQUIRED
        && res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(BOLT11_CONTENT_TYPE))
}

/// Runs the next middleware or HTTP client with optional telemetry instrumentation.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "ln402.reqwest.next", skip_all)
)]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await
}

#[async_trait::async_trait]
impl<P> rqm::Middleware for PaywallClient<P>
where
    P: InvoicePayer + 'static,
{
    /// Handles a request, paying and retrying once on a Lightning `402`.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "ln402.reqwest.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = run_next(next.clone(), req, extensions).await?;

        if !is_invoice_response(&res) {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = ?res.url(), "Received 402 Payment Required, paying invoice");

        let mut retry = retry_req.ok_or_else(|| {
            rqm::Error::Middleware(PaywallClientError::RequestNotCloneable.into())
        })?;
        let proof = self
            .pay_invoice(res)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;
        retry.headers_mut().insert(PREIMAGE_HEADER_NAME, proof);

        #[cfg(feature = "telemetry")]
        trace!(url = ?retry.url(), "Retrying request with preimage");

        run_next(next, retry, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ln402::{BoxFuture, Preimage};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::{ReqwestWithPayments, ReqwestWithPaymentsBuild};

    #[derive(Default)]
    struct RecordingPayer {
        paid: Mutex<Vec<String>>,
        fail: bool,
    }

    impl InvoicePayer for RecordingPayer {
        fn pay<'a>(
            &'a self,
            payment_request: &'a str,
        ) -> BoxFuture<'a, Result<Preimage, PayError>> {
            Box::pin(async move {
                if self.fail {
                    return Err(PayError::Failed("no route".to_owned()));
                }
                self.paid.lock().unwrap().push(payment_request.to_owned());
                Ok(Preimage::from_bytes([7; 32]))
            })
        }
    }

    fn invoice_response() -> ResponseTemplate {
        ResponseTemplate::new(402).set_body_raw("lnbc10n1paywall", BOLT11_CONTENT_TYPE)
    }

    #[tokio::test]
    async fn test_pays_and_retries_with_preimage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("x-preimage", "07".repeat(32).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(invoice_response())
            .expect(1)
            .mount(&server)
            .await;

        let payer = Arc::new(RecordingPayer::default());
        let client = reqwest::Client::new()
            .with_payments(PaywallClient::new(Arc::clone(&payer)))
            .build();
        let res = client
            .get(format!("{}/ping", server.uri()))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "pong");
        assert_eq!(*payer.paid.lock().unwrap(), vec!["lnbc10n1paywall"]);
    }

    #[tokio::test]
    async fn test_other_responses_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/free"))
            .respond_with(ResponseTemplate::new(200).set_body_string("free"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/other-402"))
            .respond_with(ResponseTemplate::new(402).set_body_string("not lightning"))
            .mount(&server)
            .await;

        let payer = Arc::new(RecordingPayer::default());
        let client = reqwest::Client::new()
            .with_payments(PaywallClient::new(Arc::clone(&payer)))
            .build();

        let res = client.get(format!("{}/free", server.uri())).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let res = client
            .get(format!("{}/other-402", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(payer.paid.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_invoice_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).insert_header("content-type", BOLT11_CONTENT_TYPE))
            .mount(&server)
            .await;

        let client = reqwest::Client::new()
            .with_payments(PaywallClient::new(RecordingPayer::default()))
            .build();
        let err = client.get(server.uri()).send().await.unwrap_err();
        assert!(err.to_string().contains("Invalid invoice"));
    }

    #[tokio::test]
    async fn test_failed_payment_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(invoice_response())
            .expect(1)
            .mount(&server)
            .await;

        let payer = RecordingPayer {
            fail: true,
            ..RecordingPayer::default()
        };
        let client = reqwest::Client::new()
            .with_payments(PaywallClient::new(payer))
            .build();
        let err = client.get(server.uri()).send().await.unwrap_err();
        assert!(err.to_string().contains("no route"));
    }
}
