//! The payment gate state machine.
//!
//! [`PaywallGate`] decides, for each request, whether to issue an invoice
//! (no `X-Preimage` header), to admit the request (valid, settled, unused
//! preimage bound to the same method and path), or to refuse it.
//!
//! Redemption of a given payment hash is serialized by a per-key lock and
//! finished with the store's atomic [`mark_used`](RecordStore::mark_used), so
//! of N concurrent requests presenting the same preimage exactly one is
//! admitted.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::adapter::RequestAdapter;
use crate::error::{PaywallError, Rejection, ServiceError};
use crate::hooks::{HookContext, HookList, PaywallHooks};
use crate::invoice::{Invoice, InvoiceOptions};
use crate::metadata::InvoiceMetadata;
use crate::oracle::SettlementOracle;
use crate::preimage::{self, PaymentHash};
use crate::store::RecordStore;

/// Status of an issuance response.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Request header carrying the hex-encoded preimage.
pub const PREIMAGE_HEADER: &str = "X-Preimage";

/// Content type of a 402 response; the body is a BOLT-11 payment request.
pub const BOLT11_CONTENT_TYPE: &str = "application/vnd.lightning.bolt11";

/// Content type of 400 and 500 responses.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Successful outcome of [`PaywallGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No preimage was presented; this invoice was issued and recorded.
    Issue(Invoice),
    /// The preimage was redeemed; the request may proceed.
    Admit(PaymentHash),
}

/// Lightning payment gate.
///
/// Generic over the [`SettlementOracle`] creating and checking invoices and
/// the [`RecordStore`] remembering them. Wrap the gate in an `Arc` to share it
/// between requests.
pub struct PaywallGate<O, S> {
    oracle: O,
    store: S,
    options: InvoiceOptions,
    timeout: Option<Duration>,
    hooks: HookList,
    locks: KeyLocks,
}

impl<O, S> fmt::Debug for PaywallGate<O, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaywallGate")
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("hooks", &self.hooks)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl<O, S> PaywallGate<O, S> {
    /// Creates a gate charging the default price with the default memo.
    pub fn new(oracle: O, store: S) -> Self {
        Self {
            oracle,
            store,
            options: InvoiceOptions::default(),
            timeout: None,
            hooks: HookList::default(),
            locks: KeyLocks::default(),
        }
    }

    /// Replaces price and memo.
    #[must_use]
    pub fn with_options(mut self, options: InvoiceOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the price in satoshis. Zero is raised to the default.
    #[must_use]
    pub fn with_price(mut self, price: u64) -> Self {
        self.options = self.options.with_price(price);
        self
    }

    /// Sets the invoice memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.options = self.options.with_memo(memo);
        self
    }

    /// Bounds every oracle and store call. An expired call fails the request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Registers an observer. Hooks run in registration order.
    #[must_use]
    pub fn with_hook(mut self, hook: impl PaywallHooks + 'static) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Returns the invoice options.
    pub const fn options(&self) -> &InvoiceOptions {
        &self.options
    }

    /// Returns the settlement oracle.
    pub const fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Returns the record store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the number of registered hooks.
    pub const fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    async fn bounded<F: Future>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<F::Output, ServiceError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ServiceError::Timeout {
                    operation,
                    timeout: limit,
                }),
            None => Ok(fut.await),
        }
    }
}

impl<O, S> PaywallGate<O, S>
where
    O: SettlementOracle,
    S: RecordStore,
{
    /// Runs the gate for one request and answers it through `adapter`.
    ///
    /// Issuance yields 402 with the payment request as body, refusals yield
    /// 400 or 500 with a plain-text reason, and an admitted request is passed
    /// on with [`RequestAdapter::continue_to_next`].
    #[cfg_attr(feature = "telemetry", instrument(name = "ln402.handle", skip_all))]
    pub async fn handle<A: RequestAdapter>(&self, adapter: A) -> A::Output {
        let proof = adapter.proof_header().map(Cow::into_owned);
        let method = adapter.method().to_owned();
        let path = adapter.path().to_owned();
        let result = self.evaluate(&method, &path, proof.as_deref()).await;
        match result {
            Ok(Admission::Issue(invoice)) => adapter.respond(
                HTTP_STATUS_PAYMENT_REQUIRED,
                &[("Content-Type", BOLT11_CONTENT_TYPE)],
                invoice.payment_request.into_bytes(),
            ),
            Ok(Admission::Admit(_)) => adapter.continue_to_next().await,
            Err(err) => adapter.respond(
                err.status(),
                &[("Content-Type", TEXT_CONTENT_TYPE)],
                err.to_string().into_bytes(),
            ),
        }
    }

    /// Decides what to do with a request, without answering it.
    ///
    /// A missing or empty `proof` issues a new invoice bound to `method` and
    /// `path`; anything else is redeemed as a preimage.
    ///
    /// # Errors
    ///
    /// Returns [`PaywallError::Rejected`] when the client is to blame and
    /// [`PaywallError::Service`] when the oracle or store failed.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "ln402.evaluate", skip(self, proof), err)
    )]
    pub async fn evaluate(
        &self,
        method: &str,
        path: &str,
        proof: Option<&str>,
    ) -> Result<Admission, PaywallError> {
        let mut ctx = HookContext {
            method: method.to_owned(),
            path: path.to_owned(),
            payment_hash: None,
        };
        let result = match proof.filter(|p| !p.is_empty()) {
            None => self.issue(&mut ctx).await.map(Admission::Issue),
            Some(proof) => self.redeem(&mut ctx, proof).await.map(Admission::Admit),
        };
        self.report(&ctx, &result).await;
        result
    }

    async fn issue(&self, ctx: &mut HookContext) -> Result<Invoice, PaywallError> {
        let invoice = self
            .bounded(
                "generate_invoice",
                self.oracle
                    .generate_invoice(self.options.effective_price(), &self.options.memo),
            )
            .await?
            .map_err(ServiceError::InvoiceGeneration)?;
        ctx.payment_hash = Some(invoice.payment_hash);

        // The binding must be stored before the invoice leaves the gate.
        let record = InvoiceMetadata::issued(&invoice, ctx.method.as_str(), ctx.path.as_str());
        self.bounded("put", self.store.put(&invoice.payment_hash, &record))
            .await??;
        Ok(invoice)
    }

    async fn redeem(&self, ctx: &mut HookContext, proof: &str) -> Result<PaymentHash, PaywallError> {
        let preimage = preimage::validate_format(proof)?;
        let hash = preimage::hash(&preimage);
        ctx.payment_hash = Some(hash);

        let _guard = self.locks.lock(hash).await;

        let record = self
            .bounded("get", self.store.get(&hash))
            .await??
            .ok_or(Rejection::UnknownPreimage)?;
        if record.method != ctx.method {
            return Err(Rejection::MethodMismatch {
                expected: record.method,
                actual: ctx.method.clone(),
            }
            .into());
        }
        if record.path != ctx.path {
            return Err(Rejection::PathMismatch {
                expected: record.path,
                actual: ctx.path.clone(),
            }
            .into());
        }
        if record.used {
            return Err(Rejection::AlreadyUsed.into());
        }

        let settled = match self
            .bounded(
                "check_invoice",
                self.oracle.check_invoice(&record.implementation_id),
            )
            .await?
        {
            Ok(settled) => settled,
            Err(e) if e.is_not_found() => return Err(Rejection::InvoiceNotFound.into()),
            Err(e) => return Err(ServiceError::Settlement(e).into()),
        };
        if !settled {
            return Err(Rejection::NotSettled.into());
        }

        if !self.finish_redemption(&hash).await? {
            return Err(Rejection::AlreadyUsed.into());
        }
        Ok(hash)
    }

    /// Runs `mark_used` under the timeout.
    ///
    /// A backend may commit after the caller stops polling, so on expiry the
    /// call is still awaited: a committed redemption is admitted, anything
    /// else fails with the timeout.
    async fn finish_redemption(&self, hash: &PaymentHash) -> Result<bool, PaywallError> {
        let mut marking = self.store.mark_used(hash);
        match self.bounded("mark_used", &mut marking).await {
            Ok(marked) => Ok(marked?),
            Err(timeout) => match marking.await {
                Ok(true) => {
                    tracing::warn!(payment_hash = %hash, "mark_used outlived the timeout but committed");
                    Ok(true)
                }
                _ => Err(timeout.into()),
            },
        }
    }

    async fn report(&self, ctx: &HookContext, result: &Result<Admission, PaywallError>) {
        let payment_hash = ctx.payment_hash.map(tracing::field::display);
        match result {
            Ok(Admission::Issue(invoice)) => {
                tracing::info!(
                    payment_hash = %invoice.payment_hash,
                    method = %ctx.method,
                    path = %ctx.path,
                    "issued invoice"
                );
                self.hooks.issued(ctx, invoice).await;
            }
            Ok(Admission::Admit(hash)) => {
                tracing::info!(
                    payment_hash = %hash,
                    method = %ctx.method,
                    path = %ctx.path,
                    "preimage redeemed, forwarding request"
                );
                self.hooks.redeemed(ctx).await;
            }
            Err(PaywallError::Rejected(rejection)) => {
                tracing::warn!(
                    payment_hash,
                    method = %ctx.method,
                    path = %ctx.path,
                    reason = %rejection,
                    "rejected request"
                );
                self.hooks.rejected(ctx, rejection).await;
            }
            Err(PaywallError::Service(error)) => {
                tracing::error!(
                    payment_hash,
                    method = %ctx.method,
                    path = %ctx.path,
                    error = %error,
                    "payment gate failed"
                );
                self.hooks.failed(ctx, error).await;
            }
        }
    }
}

/// Per payment hash mutexes; entries are dropped once nobody holds them.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Arc<DashMap<PaymentHash, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn lock(&self, key: PaymentHash) -> KeyGuard {
        let mutex = Arc::clone(&*self.locks.entry(key).or_default());
        let guard = mutex.lock_owned().await;
        KeyGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct KeyGuard {
    locks: Arc<DashMap<PaymentHash, Arc<Mutex<()>>>>,
    key: PaymentHash,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: no holder and no waiter.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
