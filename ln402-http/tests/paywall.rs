//! End-to-end tests: an axum router behind the paywall, paid for by hand and
//! through the paying reqwest client.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use ln402::{BoxFuture, Invoice, MemoryStore, OracleError, PaymentHash, Preimage, SettlementOracle};
use ln402_http::client::{InvoicePayer, PayError, PaywallClient, ReqwestWithPayments, ReqwestWithPaymentsBuild};
use ln402_http::constants::{BOLT11_CONTENT_TYPE, PREIMAGE_HEADER};
use ln402_http::server::Paywall;
use tower::ServiceExt;

/// A fake Lightning node acting both as the server's oracle and the client's wallet.
#[derive(Default)]
struct TestNode {
    counter: AtomicU64,
    invoices: Mutex<HashMap<String, Preimage>>,
    known: Mutex<HashSet<PaymentHash>>,
    settled: Mutex<HashSet<PaymentHash>>,
}

impl SettlementOracle for TestNode {
    fn generate_invoice<'a>(
        &'a self,
        amount_sat: u64,
        _memo: &'a str,
    ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
        Box::pin(async move {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let mut bytes = [0u8; 32];
            bytes[24..].copy_from_slice(&n.to_be_bytes());
            let preimage = Preimage::from_bytes(bytes);
            let payment_hash = preimage.payment_hash();
            let payment_request = format!("lnbc{amount_sat}n1test{n}");

            self.invoices
                .lock()
                .unwrap()
                .insert(payment_request.clone(), preimage);
            self.known.lock().unwrap().insert(payment_hash);
            Ok(Invoice {
                payment_request,
                payment_hash,
                implementation_id: payment_hash.to_hex(),
            })
        })
    }

    fn check_invoice<'a>(
        &'a self,
        implementation_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, OracleError>> {
        Box::pin(async move {
            let hash: PaymentHash = implementation_id
                .parse()
                .map_err(|_| OracleError::not_found("unable to locate invoice"))?;
            if !self.known.lock().unwrap().contains(&hash) {
                return Err(OracleError::not_found("unable to locate invoice"));
            }
            Ok(self.settled.lock().unwrap().contains(&hash))
        })
    }
}

impl InvoicePayer for TestNode {
    fn pay<'a>(&'a self, payment_request: &'a str) -> BoxFuture<'a, Result<Preimage, PayError>> {
        Box::pin(async move {
            let preimage = self
                .invoices
                .lock()
                .unwrap()
                .get(payment_request)
                .cloned()
                .ok_or_else(|| PayError::Failed("unknown invoice".to_owned()))?;
            self.settled.lock().unwrap().insert(preimage.payment_hash());
            Ok(preimage)
        })
    }
}

fn app(node: &Arc<TestNode>) -> Router {
    let paywall = Paywall::new(Arc::clone(node), MemoryStore::new())
        .with_price(10)
        .layer();
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/other", get(|| async { "other" }))
        .route("/submit", post(|| async { "submitted" }))
        .layer(paywall)
        .route("/health", get(|| async { "ok" }))
}

fn request(method: &str, uri: &str, preimage: Option<&Preimage>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(preimage) = preimage {
        builder = builder.header(PREIMAGE_HEADER, preimage.to_hex());
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn buy(app: &Router, node: &TestNode, method: &str, uri: &str) -> Preimage {
    let res = app.clone().oneshot(request(method, uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        BOLT11_CONTENT_TYPE
    );
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let payment_request = String::from_utf8(body.to_vec()).unwrap();
    node.pay(&payment_request).await.unwrap()
}

#[tokio::test]
async fn test_pay_then_call_once() {
    let node = Arc::new(TestNode::default());
    let app = app(&node);

    let preimage = buy(&app, &node, "GET", "/ping").await;

    let (status, body) = send(&app, request("GET", "/ping", Some(&preimage))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");

    let (status, body) = send(&app, request("GET", "/ping", Some(&preimage))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("You already sent a request with the same preimage"));
}

#[tokio::test]
async fn test_invoice_is_bound_to_path_and_method() {
    let node = Arc::new(TestNode::default());
    let app = app(&node);

    let preimage = buy(&app, &node, "GET", "/ping").await;

    let (status, body) = send(&app, request("GET", "/other", Some(&preimage))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("\"/ping\""));

    let (status, body) = send(&app, request("POST", "/submit", Some(&preimage))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("GET request"));

    let (status, _) = send(&app, request("GET", "/ping", Some(&preimage))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unpaid_and_unknown_preimages() {
    let node = Arc::new(TestNode::default());
    let app = app(&node);

    let res = app.clone().oneshot(request("GET", "/ping", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    // The first issued invoice uses preimage 1; it was never paid.
    let mut bytes = [0u8; 32];
    bytes[31] = 1;
    let unpaid = Preimage::from_bytes(bytes);
    let (status, body) = send(&app, request("GET", "/ping", Some(&unpaid))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not settled yet"));

    let stranger = Preimage::from_bytes([0xab; 32]);
    let (status, _) = send(&app, request("GET", "/ping", Some(&stranger))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header(PREIMAGE_HEADER, "xyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unprotected_route_is_free() {
    let node = Arc::new(TestNode::default());
    let (status, body) = send(&app(&node), request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    assert_eq!(node.counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_paying_client_against_live_server() {
    let node = Arc::new(TestNode::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(&node);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let client = reqwest::Client::new()
        .with_payments(PaywallClient::new(Arc::clone(&node)))
        .build();
    for _ in 0..2 {
        let res = client
            .get(format!("http://{addr}/ping"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "pong");
    }
    assert_eq!(node.counter.load(Ordering::SeqCst), 2);
    assert_eq!(node.settled.lock().unwrap().len(), 2);

    server.abort();
}
