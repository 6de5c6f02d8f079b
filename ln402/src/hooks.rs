//! Observer hooks for gate outcomes.
//!
//! Hooks are registered on the [`PaywallGate`](crate::gate::PaywallGate) at
//! construction and are told about every terminal outcome:
//!
//! - **Issued**: an invoice was created, recorded and returned with 402.
//! - **Redeemed**: a preimage passed every check and the request is forwarded.
//! - **Rejected**: the request was refused with 400.
//! - **Failed**: the gate answered with 500.
//!
//! Hooks observe only; they cannot change the outcome. All methods have
//! default no-op implementations, and the trait is dyn-compatible.

use std::fmt;

use crate::BoxFuture;
use crate::error::{Rejection, ServiceError};
use crate::invoice::Invoice;
use crate::preimage::PaymentHash;

/// The request a hook event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    /// HTTP method of the request.
    pub method: String,
    /// URL path of the request.
    pub path: String,
    /// Payment hash involved, once known.
    ///
    /// `None` for issuance failures and for malformed preimages.
    pub payment_hash: Option<PaymentHash>,
}

/// Lifecycle observer for [`PaywallGate`](crate::gate::PaywallGate).
pub trait PaywallHooks: Send + Sync {
    /// Called after an invoice was issued and recorded.
    fn on_issued<'a>(&'a self, _ctx: &'a HookContext, _invoice: &'a Invoice) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Called after a preimage was redeemed, right before forwarding.
    fn on_redeemed<'a>(&'a self, _ctx: &'a HookContext) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Called when a request is refused because of the client.
    fn on_rejected<'a>(
        &'a self,
        _ctx: &'a HookContext,
        _rejection: &'a Rejection,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Called when the gate fails with a server error.
    fn on_failed<'a>(
        &'a self,
        _ctx: &'a HookContext,
        _error: &'a ServiceError,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// An ordered list of hooks, run one after another.
#[derive(Default)]
pub(crate) struct HookList(Vec<Box<dyn PaywallHooks>>);

impl fmt::Debug for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} hooks]", self.0.len())
    }
}

impl HookList {
    pub(crate) fn push(&mut self, hook: impl PaywallHooks + 'static) {
        self.0.push(Box::new(hook));
    }

    pub(crate) const fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) async fn issued(&self, ctx: &HookContext, invoice: &Invoice) {
        for hook in &self.0 {
            hook.on_issued(ctx, invoice).await;
        }
    }

    pub(crate) async fn redeemed(&self, ctx: &HookContext) {
        for hook in &self.0 {
            hook.on_redeemed(ctx).await;
        }
    }

    pub(crate) async fn rejected(&self, ctx: &HookContext, rejection: &Rejection) {
        for hook in &self.0 {
            hook.on_rejected(ctx, rejection).await;
        }
    }

    pub(crate) async fn failed(&self, ctx: &HookContext, error: &ServiceError) {
        for hook in &self.0 {
            hook.on_failed(ctx, error).await;
        }
    }
}
