use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use serde_json::Value;

use super::*;
use crate::sign_payload;
use crate::BillingStore;
use crate::MemoryBillingStore;
use crate::MockBillingStore;
use crate::MockCustomerDirectory;
use crate::Plan;
use crate::PlanCatalog;
use crate::Reconciler;
use crate::StaticDirectory;
use crate::StorageError;
use crate::WebhookVerifier;

const SECRET: &str = "whsec_test";
const SIGNED_AT: u64 = 1_700_000_000;

fn reconciler_over(store: Arc<dyn BillingStore>) -> Arc<Reconciler> {
    let mut price_plans = HashMap::new();
    price_plans.insert("price_pro_monthly".to_string(), Plan::Pro);
    let mut customer_workspaces = HashMap::new();
    customer_workspaces.insert("cus_100".to_string(), "ws_arrow".to_string());

    Arc::new(Reconciler::new(
        WebhookVerifier::new(SECRET, 0),
        PlanCatalog::new(price_plans, Plan::Pro),
        store,
        Arc::new(StaticDirectory::new(customer_workspaces)),
    ))
}

fn subscription_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": "customer.subscription.created",
        "created": SIGNED_AT,
        "data": {
            "object": {
                "id": "sub_1",
                "customer": "cus_100",
                "status": "active",
                "cancel_at_period_end": false,
                "items": { "data": [{ "price": { "id": "price_pro_monthly" } }] }
            }
        }
    }))
    .unwrap()
}

fn outcome_of(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["outcome"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn valid_delivery_should_return_200() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));
    let body = subscription_body();
    let header = sign_payload(SECRET, &body, SIGNED_AT);

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, header)
        .body(&body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(outcome_of(response.body()), "created");
}

#[tokio::test]
async fn missing_signature_should_return_400() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .body(subscription_body())
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn forged_signature_should_return_400() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));
    let body = subscription_body();
    let forged = sign_payload("whsec_other", &body, SIGNED_AT);

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, forged)
        .body(&body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn signed_garbage_should_return_400() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));
    let body = b"not json at all";
    let header = sign_payload(SECRET, body, SIGNED_AT);

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, header)
        .body(body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn transient_store_failure_should_return_503() {
    let mut store = MockBillingStore::new();
    store
        .expect_find()
        .returning(|_| Err(StorageError::Transient("backend offline".to_string()).into()));

    let reconciler = Arc::new(Reconciler::new(
        WebhookVerifier::new(SECRET, 0),
        PlanCatalog::new(HashMap::new(), Plan::Pro),
        Arc::new(store),
        Arc::new(MockCustomerDirectory::new()),
    ));
    let routes = webhook_routes(reconciler);

    let body = subscription_body();
    let header = sign_payload(SECRET, &body, SIGNED_AT);
    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, header)
        .body(&body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn unrecognized_event_should_still_return_200() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));
    let body = serde_json::to_vec(&json!({
        "id": "evt_noise",
        "type": "customer.updated",
        "created": SIGNED_AT,
        "data": { "object": { "id": "cus_100" } }
    }))
    .unwrap();
    let header = sign_payload(SECRET, &body, SIGNED_AT);

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, header)
        .body(&body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(outcome_of(response.body()), "ignored");
}

#[tokio::test]
async fn dropped_event_should_still_return_200() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));
    let body = serde_json::to_vec(&json!({
        "id": "evt_orphan",
        "type": "invoice.paid",
        "created": SIGNED_AT,
        "data": { "object": { "customer": "cus_100", "subscription": "sub_1" } }
    }))
    .unwrap();
    let header = sign_payload(SECRET, &body, SIGNED_AT);

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .header(SIGNATURE_HEADER, header)
        .body(&body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(outcome_of(response.body()), "dropped");
}

#[tokio::test]
async fn oversized_body_should_return_413() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));

    let response = warp::test::request()
        .method("POST")
        .path("/hooks/billing")
        .body(vec![0u8; 1024 * 1024 + 1])
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn wrong_method_should_return_405() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));

    let response = warp::test::request()
        .method("GET")
        .path("/hooks/billing")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn healthz_should_return_200() {
    let routes = webhook_routes(reconciler_over(Arc::new(MemoryBillingStore::new())));

    let response = warp::test::request()
        .method("GET")
        .path("/healthz")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "ok");
}
