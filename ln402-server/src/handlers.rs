//! Axum route handlers for the paywalled server.

use axum::routing::get;
use axum::{Json, Router};
use ln402::{RecordStore, SettlementOracle};
use ln402_http::server::PaywallLayer;
use tower_http::trace::TraceLayer;

/// `GET /ping` - The paid endpoint.
pub async fn ping() -> &'static str {
    "pong"
}

/// `GET /health` - Liveness probe, never paywalled.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the application router with `/ping` behind `paywall`.
pub fn router<O, S>(paywall: PaywallLayer<O, S>) -> Router
where
    O: SettlementOracle + 'static,
    S: RecordStore + 'static,
{
    Router::new()
        .route("/ping", get(ping))
        .layer(paywall)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use ln402::{BoxFuture, Invoice, MemoryStore, OracleError, PaymentHash};
    use ln402_http::server::Paywall;
    use tower::ServiceExt;

    use super::*;

    struct OfflineNode;

    impl SettlementOracle for OfflineNode {
        fn generate_invoice<'a>(
            &'a self,
            amount_sat: u64,
            memo: &'a str,
        ) -> BoxFuture<'a, Result<Invoice, OracleError>> {
            Box::pin(async move {
                let payment_hash = PaymentHash::from_bytes([9; 32]);
                Ok(Invoice {
                    payment_request: format!("lnbc{amount_sat}n1{memo}"),
                    payment_hash,
                    implementation_id: payment_hash.to_hex(),
                })
            })
        }

        fn check_invoice<'a>(
            &'a self,
            _implementation_id: &'a str,
        ) -> BoxFuture<'a, Result<bool, OracleError>> {
            Box::pin(async { Err(OracleError::transient("node offline")) })
        }
    }

    fn app() -> Router {
        router(
            Paywall::new(OfflineNode, MemoryStore::new())
                .with_price(5)
                .with_memo("ping")
                .layer(),
        )
    }

    async fn get_text(uri: &str) -> (StatusCode, String) {
        let res = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_ping_requires_payment() {
        let (status, body) = get_text("/ping").await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body, "lnbc5n1ping");
    }

    #[tokio::test]
    async fn test_health_is_free() {
        let (status, body) = get_text("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
    }
}
