//! Axum middleware for putting routes behind a Lightning paywall.
//!
//! A request without an `X-Preimage` header receives `402 Payment Required`
//! with a BOLT-11 invoice as body. Repeating the request with the invoice's
//! preimage, once paid, reaches the wrapped route exactly once.
//!
//! ```ignore
//! use ln402::MemoryStore;
//! use ln402_http::oracle::LndClient;
//! use ln402_http::server::Paywall;
//!
//! let oracle = LndClient::try_from("https://localhost:8080")?;
//! let app = Router::new()
//!     .route("/ping", get(|| async { "pong" }))
//!     .layer(Paywall::new(oracle, MemoryStore::new()).with_price(10).layer());
//! ```
//!
//! ## Configuration Notes
//!
//! - **[`Paywall::with_price`]** sets the price in satoshis (default 1).
//! - **[`Paywall::with_memo`]** sets the invoice description (default `API call`).
//! - **[`Paywall::with_timeout`]** bounds every node and store call.
//! - **[`Paywall::with_hook`]** registers an outcome observer.

mod adapter;
pub mod layer;

pub use adapter::AxumRequest;
pub use layer::{Paywall, PaywallLayer, PaywallService};

// Re-export gate types for convenience.
pub use ln402::{PaywallError, PaywallGate, PaywallHooks, Rejection, ServiceError};
