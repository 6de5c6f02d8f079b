//! Standalone server selling API calls for Lightning payments.
//!
//! Serves `GET /ping` behind a paywall backed by lnd or Lightning Charge, and
//! an unprotected `GET /health`.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`config`] - Server configuration with environment variable expansion

pub mod config;
pub mod handlers;

pub use handlers::router;
