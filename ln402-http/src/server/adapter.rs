use std::borrow::Cow;
use std::convert::Infallible;
use std::future::Future;

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderName, HeaderValue, StatusCode};
use ln402::RequestAdapter;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;

use crate::constants::PREIMAGE_HEADER_NAME;

/// An axum request paired with the route it would be forwarded to.
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct AxumRequest {
    request: Request,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl AxumRequest {
    /// Wraps `request`; `inner` is called if the gate admits it.
    pub const fn new(request: Request, inner: BoxCloneSyncService<Request, Response, Infallible>) -> Self {
        Self { request, inner }
    }
}

impl RequestAdapter for AxumRequest {
    type Output = Response;

    fn proof_header(&self) -> Option<Cow<'_, str>> {
        self.request
            .headers()
            .get(&PREIMAGE_HEADER_NAME)
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
    }

    fn method(&self) -> &str {
        self.request.method().as_str()
    }

    fn path(&self) -> &str {
        self.request.uri().path()
    }

    fn respond(self, status: u16, headers: &[(&str, &str)], body: Vec<u8>) -> Response {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }

    fn continue_to_next(self) -> impl Future<Output = Response> + Send {
        async move {
            match self.inner.oneshot(self.request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::service_fn;

    fn echo() -> BoxCloneSyncService<Request, Response, Infallible> {
        BoxCloneSyncService::new(service_fn(|req: Request| async move {
            Ok::<_, Infallible>(Response::new(Body::from(req.uri().path().to_owned())))
        }))
    }

    #[test]
    fn test_extracts_request_parts() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/resource?x=1")
            .header("x-preimage", "abcd")
            .body(Body::empty())
            .unwrap();
        let adapter = AxumRequest::new(request, echo());
        assert_eq!(adapter.method(), "POST");
        assert_eq!(adapter.path(), "/resource");
        assert_eq!(adapter.proof_header().as_deref(), Some("abcd"));
    }

    #[test]
    fn test_missing_header_is_none() {
        let request = http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let adapter = AxumRequest::new(request, echo());
        assert!(adapter.proof_header().is_none());
    }

    #[test]
    fn test_respond_sets_status_and_headers() {
        let request = http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = AxumRequest::new(request, echo()).respond(
            402,
            &[("Content-Type", "application/vnd.lightning.bolt11")],
            b"lnbc1".to_vec(),
        );
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/vnd.lightning.bolt11"
        );
    }

    #[tokio::test]
    async fn test_continue_calls_inner() {
        let request = http::Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let response = AxumRequest::new(request, echo()).continue_to_next().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
