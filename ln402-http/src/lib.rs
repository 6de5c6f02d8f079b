#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for Lightning-paywalled APIs.
//!
//! Builds on the [`ln402`] payment gate and provides, behind feature flags:
//!
//! - [`server`] - A `tower` layer that puts a [`ln402::PaywallGate`] in front
//!   of any axum route (feature: `server`)
//! - [`oracle`] - Settlement oracles talking to lnd's REST gateway and to
//!   Lightning Charge (feature: `oracle`)
//! - [`client`] - A `reqwest` middleware that pays `402` invoices and retries
//!   with the preimage (feature: `client`)
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names, content types, default URLs
//!
//! # Feature Flags
//!
//! - `server`, `oracle`, `client` (all enabled by default)
//! - `telemetry` - Enables tracing instrumentation

pub mod constants;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "oracle")]
pub mod oracle;
#[cfg(feature = "server")]
pub mod server;
