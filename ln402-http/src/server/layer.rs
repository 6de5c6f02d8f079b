//! Tower layer and service wrapping a [`PaywallGate`].
//!
//! [`Paywall`] configures the gate, [`PaywallLayer`] shares it between all
//! routes it is applied to, and [`PaywallService`] runs it for every request.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum_core::extract::Request;
use axum_core::response::Response;
use ln402::{InvoiceOptions, PaywallGate, PaywallHooks, RecordStore, SettlementOracle};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

#[cfg(feature = "telemetry")]
use tracing::Instrument;

use super::adapter::AxumRequest;

/// Builder for the paywall middleware.
///
/// Create one per price point and turn it into a layer with
/// [`Paywall::layer`].
pub struct Paywall<O, S> {
    gate: PaywallGate<O, S>,
}

impl<O, S> fmt::Debug for Paywall<O, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paywall").field("gate", &self.gate).finish()
    }
}

impl<O, S> Paywall<O, S>
where
    O: SettlementOracle,
    S: RecordStore,
{
    /// Creates a paywall charging the default price (1 satoshi).
    pub fn new(oracle: O, store: S) -> Self {
        Self {
            gate: PaywallGate::new(oracle, store),
        }
    }

    /// Sets the price in satoshis. Zero is raised to the default.
    #[must_use]
    pub fn with_price(mut self, price: u64) -> Self {
        self.gate = self.gate.with_price(price);
        self
    }

    /// Sets the invoice memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.gate = self.gate.with_memo(memo);
        self
    }

    /// Replaces price and memo.
    #[must_use]
    pub fn with_options(mut self, options: InvoiceOptions) -> Self {
        self.gate = self.gate.with_options(options);
        self
    }

    /// Bounds every node and store call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.gate = self.gate.with_timeout(timeout);
        self
    }

    /// Registers an outcome observer.
    #[must_use]
    pub fn with_hook(mut self, hook: impl PaywallHooks + 'static) -> Self {
        self.gate = self.gate.with_hook(hook);
        self
    }

    /// Finishes configuration.
    #[must_use]
    pub fn layer(self) -> PaywallLayer<O, S> {
        PaywallLayer::new(self.gate)
    }
}

/// Tower layer applying one shared [`PaywallGate`] to the wrapped services.
pub struct PaywallLayer<O, S> {
    gate: Arc<PaywallGate<O, S>>,
}

impl<O, S> PaywallLayer<O, S> {
    /// Wraps an already configured gate.
    pub fn new(gate: PaywallGate<O, S>) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    /// Returns the shared gate.
    pub const fn gate(&self) -> &Arc<PaywallGate<O, S>> {
        &self.gate
    }
}

impl<O, S> From<Arc<PaywallGate<O, S>>> for PaywallLayer<O, S> {
    fn from(gate: Arc<PaywallGate<O, S>>) -> Self {
        Self { gate }
    }
}

impl<O, S> Clone for PaywallLayer<O, S> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<O, S> fmt::Debug for PaywallLayer<O, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaywallLayer").field("gate", &self.gate).finish()
    }
}

impl<T, O, S> Layer<T> for PaywallLayer<O, S>
where
    T: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    T::Future: Send + 'static,
{
    type Service = PaywallService<O, S>;

    fn layer(&self, inner: T) -> Self::Service {
        PaywallService {
            gate: Arc::clone(&self.gate),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces Lightning payments on incoming requests.
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PaywallService<O, S> {
    /// The gate shared by every clone of this service
    gate: Arc<PaywallGate<O, S>>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<O, S> Clone for PaywallService<O, S> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            inner: self.inner.clone(),
        }
    }
}

impl<O, S> Service<Request> for PaywallService<O, S>
where
    O: SettlementOracle + 'static,
    S: RecordStore + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Runs the gate; the wrapped service is only called for admitted requests.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let adapter = AxumRequest::new(req, self.inner.clone());

        Box::pin(async move {
            #[cfg(feature = "telemetry")]
            {
                let response = gate
                    .handle(adapter)
                    .instrument(tracing::info_span!("ln402.paywall"))
                    .await;
                Ok(response)
            }
            #[cfg(not(feature = "telemetry"))]
            {
                Ok(gate.handle(adapter).await)
            }
        })
    }
}
