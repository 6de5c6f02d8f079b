//! Binding between the gate and a web framework.

use std::borrow::Cow;
use std::future::Future;

/// A single in-flight request as seen by the gate.
///
/// The adapter is consumed by whichever of [`respond`](Self::respond) or
/// [`continue_to_next`](Self::continue_to_next) the gate picks, so a request
/// is answered exactly once.
pub trait RequestAdapter: Send {
    /// What the framework expects back, e.g. an HTTP response.
    type Output: Send;

    /// Raw value of the `X-Preimage` header, if present.
    ///
    /// Non UTF-8 values are converted lossily and then fail format checks.
    fn proof_header(&self) -> Option<Cow<'_, str>>;

    /// HTTP method, e.g. `GET`.
    fn method(&self) -> &str;

    /// URL path without query string.
    fn path(&self) -> &str;

    /// Answers the request directly.
    fn respond(self, status: u16, headers: &[(&str, &str)], body: Vec<u8>) -> Self::Output;

    /// Hands the request to the protected handler.
    fn continue_to_next(self) -> impl Future<Output = Self::Output> + Send;
}
