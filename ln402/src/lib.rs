#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core payment gate for Lightning-paywalled HTTP APIs.
//!
//! A client calling a protected endpoint without proof of payment receives
//! `402 Payment Required` with a BOLT-11 invoice. After paying it, the client
//! repeats the same request with the invoice's preimage in the `X-Preimage`
//! header. The gate checks that the preimage hashes to an invoice it issued,
//! that the invoice was issued for the same method and path, that it is
//! settled, and that it was never redeemed before; then it lets the request
//! through, exactly once.
//!
//! # Modules
//!
//! - [`preimage`] - Preimage validation and payment hash derivation
//! - [`invoice`] - Invoices and invoice options
//! - [`metadata`] - The per-invoice binding and anti-replay record
//! - [`oracle`] - The settlement oracle capability (Lightning backend)
//! - [`store`] - The record store capability and its backends
//! - [`adapter`] - The web framework binding capability
//! - [`hooks`] - Outcome observers
//! - [`gate`] - The [`PaywallGate`] state machine
//! - [`error`] - Rejection and failure types
//!
//! # Feature Flags
//!
//! - `sqlite` (default) - Enables [`store::SqliteStore`]
//! - `telemetry` - Enables tracing spans around gate operations

pub mod adapter;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod invoice;
pub mod metadata;
pub mod oracle;
pub mod preimage;
pub mod store;

use std::future::Future;
use std::pin::Pin;

pub use adapter::RequestAdapter;
pub use error::{PaywallError, Rejection, ServiceError};
pub use gate::{Admission, BOLT11_CONTENT_TYPE, PREIMAGE_HEADER, PaywallGate};
pub use hooks::{HookContext, PaywallHooks};
pub use invoice::{Invoice, InvoiceOptions};
pub use metadata::InvoiceMetadata;
pub use oracle::{OracleError, OracleErrorKind, SettlementOracle};
pub use preimage::{PaymentHash, Preimage, PreimageError};
pub use store::{AnyStore, MemoryStore, RecordStore, StoreError};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

/// A boxed, `Send` future, as returned by the capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
