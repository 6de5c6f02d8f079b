//! HTTP-specific constants for Lightning-paywalled APIs.

pub use ln402::gate::{
    BOLT11_CONTENT_TYPE, HTTP_STATUS_PAYMENT_REQUIRED, PREIMAGE_HEADER, TEXT_CONTENT_TYPE,
};

/// [`PREIMAGE_HEADER`] as a typed header name.
#[cfg(any(feature = "server", feature = "client"))]
pub const PREIMAGE_HEADER_NAME: http::HeaderName = http::HeaderName::from_static("x-preimage");

/// Default address of the lnd REST gateway.
pub const DEFAULT_LND_URL: &str = "https://localhost:8080";

/// Default address of a Lightning Charge server.
pub const DEFAULT_CHARGE_URL: &str = "http://localhost:9112";

/// Header carrying the hex-encoded macaroon for lnd's REST gateway.
pub const LND_MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Basic auth user name expected by Lightning Charge.
pub const CHARGE_API_USER: &str = "api-token";
