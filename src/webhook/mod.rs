//! HTTP intake for billing webhook deliveries.
//!
//! Admission is decided by the signature alone. An admitted delivery is
//! answered `200` even when reconciliation ignores or drops it, so the
//! provider stops redelivering it. `400` marks a delivery that is itself
//! bad (signature or payload) and must not be retried; `503` marks a
//! transient fault on our side that is worth retrying.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::http::StatusCode;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::Reconciler;
use crate::WEBHOOK_DELIVERIES;

#[cfg(test)]
mod webhook_test;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Builds the webhook route tree. Split from the server so tests can drive
/// it through `warp::test` without binding a socket.
pub fn webhook_routes(
    reconciler: Arc<Reconciler>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let billing = warp::path!("hooks" / "billing")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(warp::header::optional::<String>(SIGNATURE_HEADER))
        .and(warp::any().map(move || reconciler.clone()))
        .and_then(billing_hook_handler);

    let health = warp::path!("healthz")
        .and(warp::get())
        .map(|| warp::reply::with_status("ok", StatusCode::OK));

    billing.or(health)
}

async fn billing_hook_handler(
    body: Bytes,
    signature: Option<String>,
    reconciler: Arc<Reconciler>,
) -> Result<impl Reply, Rejection> {
    match reconciler.process(&body, signature.as_deref()).await {
        Ok(outcome) => {
            WEBHOOK_DELIVERIES
                .with_label_values(&[outcome.label()])
                .inc();
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "received": true, "outcome": outcome.label() })),
                StatusCode::OK,
            ))
        }
        Err(e) if e.is_transient() => {
            WEBHOOK_DELIVERIES.with_label_values(&["failed"]).inc();
            error!("billing hook failed transiently: {:?}", e);
            // Tell the provider to redeliver; the event itself is fine
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "received": false, "error": "temporarily unavailable" })),
                StatusCode::SERVICE_UNAVAILABLE,
            ))
        }
        Err(e) => {
            WEBHOOK_DELIVERIES.with_label_values(&["rejected"]).inc();
            warn!("billing hook rejected: {}", e);
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "received": false, "error": "invalid delivery" })),
                StatusCode::BAD_REQUEST,
            ))
        }
    }
}

/// Serves the webhook routes until the shutdown signal fires.
pub async fn start_webhook_server(
    port: u16,
    reconciler: Arc<Reconciler>,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let routes = webhook_routes(reconciler);

    info!("webhook server listening on port {}", port);
    let (_, server) =
        warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
    info!("webhook server stopped");
}
