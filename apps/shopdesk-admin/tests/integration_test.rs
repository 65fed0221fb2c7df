//! HTTP integration tests for the admin API.
//!
//! Requests go through the full layer stack into a real PostgreSQL with
//! row level security enforced on the request role.
//!
//! Run with: `cargo test -p shopdesk-admin --features integration`

#![cfg(feature = "integration")]

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, get, write, TestContext};
use serde_json::{json, Value};
use shopdesk_api::{ConcurrencyArbiter, IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_STATUS_HEADER};
use shopdesk_core::IfMatch;
use shopdesk_db::{TenantTable, TenantTransaction};
use tower::ServiceExt;

#[tokio::test]
async fn test_appointment_of_other_tenant_is_not_found() {
    let ctx = TestContext::new().await;
    let tenant_a = ctx.create_tenant("Shop A").await;
    let tenant_b = ctx.create_tenant("Shop B").await;
    let customer = ctx.create_customer(tenant_a, "Ada Lovelace").await;
    let appointment = ctx.create_appointment(tenant_a, customer).await;
    let uri = format!("/appointments/{appointment}");

    let response = ctx.app.clone().oneshot(get(&uri, tenant_a)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"v1\"");

    let response = ctx.app.clone().oneshot(get(&uri, tenant_b)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["errors"]["code"], "not_found");

    ctx.drop_tenant(tenant_a).await;
    ctx.drop_tenant(tenant_b).await;
}

#[tokio::test]
async fn test_stale_if_match_is_conflict() {
    let ctx = TestContext::new().await;
    let tenant = ctx.create_tenant("Shop").await;
    let customer = ctx.create_customer(tenant, "Ada Lovelace").await;
    let appointment = ctx.create_appointment(tenant, customer).await;
    let uri = format!("/appointments/{appointment}");
    let patch = json!({ "notes": "bring the spare key" });

    let response = ctx
        .app
        .clone()
        .oneshot(write("PATCH", &uri, tenant, &[("if-match", "\"v1\"")], &patch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"v2\"");

    let response = ctx
        .app
        .clone()
        .oneshot(write("PATCH", &uri, tenant, &[("if-match", "\"v1\"")], &patch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["code"], "conflict");
    assert_eq!(body["errors"]["message"], "etag_mismatch");
    assert_eq!(body["errors"]["details"]["current_version"], "v2");

    ctx.drop_tenant(tenant).await;
}

#[tokio::test]
async fn test_retried_patch_replays_with_new_etag() {
    let ctx = TestContext::new().await;
    let tenant = ctx.create_tenant("Shop").await;
    let customer = ctx.create_customer(tenant, "Ada Lovelace").await;
    let appointment = ctx.create_appointment(tenant, customer).await;
    let uri = format!("/appointments/{appointment}");
    let patch = json!({ "status": "in_progress" });
    let headers = [("if-match", "\"v1\""), (IDEMPOTENCY_KEY_HEADER, "patch-1")];

    let first = ctx
        .app
        .clone()
        .oneshot(write("PATCH", &uri, tenant, &headers, &patch))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[IDEMPOTENCY_STATUS_HEADER], "original");
    assert_eq!(first.headers()[header::ETAG], "\"v2\"");
    let first_body = body_json(first).await;

    // Same key, same body, now stale If-Match: the stored response wins.
    let retry = ctx
        .app
        .clone()
        .oneshot(write("PATCH", &uri, tenant, &headers, &patch))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::OK);
    assert_eq!(retry.headers()[IDEMPOTENCY_STATUS_HEADER], "replayed");
    assert_eq!(retry.headers()[header::ETAG], "\"v2\"");
    let retry_body = body_json(retry).await;
    assert_eq!(retry_body["data"], first_body["data"]);
    assert_eq!(retry_body["data"]["version"], 2);

    // A different patch under the same key is refused.
    let response = ctx
        .app
        .clone()
        .oneshot(write("PATCH", &uri, tenant, &headers, &json!({ "status": "completed" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["code"], "idempotency_key_conflict");

    ctx.drop_tenant(tenant).await;
}

#[tokio::test]
async fn test_repeated_invoice_post_creates_one_row() {
    let ctx = TestContext::new().await;
    let tenant = ctx.create_tenant("Shop").await;
    let customer = ctx.create_customer(tenant, "Ada Lovelace").await;
    let invoice = json!({ "customer_id": customer.to_string(), "total_cents": 12_500 });
    let headers = [(IDEMPOTENCY_KEY_HEADER, "invoice-1")];

    let mut numbers = Vec::new();
    for attempt in 0..3 {
        let response = ctx
            .app
            .clone()
            .oneshot(write("POST", "/invoices", tenant, &headers, &invoice))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let expected = if attempt == 0 { "original" } else { "replayed" };
        assert_eq!(response.headers()[IDEMPOTENCY_STATUS_HEADER], expected);
        let body = body_json(response).await;
        numbers.push(body["data"]["number"].clone());
    }

    assert!(numbers.iter().all(|n| *n == numbers[0]));
    assert_eq!(ctx.count_invoices(tenant).await, 1);

    ctx.drop_tenant(tenant).await;
}

#[tokio::test]
async fn test_concurrent_duplicate_posts_create_one_row() {
    let ctx = TestContext::new().await;
    let tenant = ctx.create_tenant("Shop").await;
    let customer = ctx.create_customer(tenant, "Ada Lovelace").await;
    let invoice = json!({ "customer_id": customer.to_string(), "total_cents": 4_200 });

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let request = write(
                "POST",
                "/invoices",
                tenant,
                &[(IDEMPOTENCY_KEY_HEADER, "invoice-race")],
                &invoice,
            );
            tokio::spawn(ctx.app.clone().oneshot(request))
        })
        .collect();

    let mut markers = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        markers.push(
            response.headers()[IDEMPOTENCY_STATUS_HEADER]
                .to_str()
                .unwrap()
                .to_string(),
        );
    }

    assert_eq!(markers.iter().filter(|m| *m == "original").count(), 1);
    assert_eq!(markers.iter().filter(|m| *m == "replayed").count(), 4);
    assert_eq!(ctx.count_invoices(tenant).await, 1);

    ctx.drop_tenant(tenant).await;
}

#[tokio::test]
async fn test_invoice_for_other_tenants_customer_is_rejected() {
    let ctx = TestContext::new().await;
    let tenant_a = ctx.create_tenant("Shop A").await;
    let tenant_b = ctx.create_tenant("Shop B").await;
    let customer_of_a = ctx.create_customer(tenant_a, "Ada Lovelace").await;
    let invoice = json!({ "customer_id": customer_of_a.to_string(), "total_cents": 100 });

    let response = ctx
        .app
        .clone()
        .oneshot(write("POST", "/invoices", tenant_b, &[], &invoice))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["code"], "validation_error");
    assert_eq!(ctx.count_invoices(tenant_b).await, 0);

    ctx.drop_tenant(tenant_a).await;
    ctx.drop_tenant(tenant_b).await;
}

#[tokio::test]
async fn test_advanced_version_is_served_as_etag() {
    let ctx = TestContext::new().await;
    let tenant = ctx.create_tenant("Shop").await;
    let customer = ctx.create_customer(tenant, "Ada Lovelace").await;
    let appointment = ctx.create_appointment(tenant, customer).await;

    let mut tx = TenantTransaction::begin(&ctx.pool, tenant).await.unwrap();
    let guard = ConcurrencyArbiter::acquire(
        &mut tx,
        TenantTable::Appointments,
        appointment,
        &IfMatch::parse("\"v1\"").unwrap(),
    )
    .await
    .unwrap();
    let token = guard.advance(&mut tx).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(token.etag(), "\"v2\"");

    let response = ctx
        .app
        .clone()
        .oneshot(get(&format!("/appointments/{appointment}"), tenant))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::ETAG], "\"v2\"");

    // The advanced guard's version is gone; a second advance from it fails.
    let mut tx = TenantTransaction::begin(&ctx.pool, tenant).await.unwrap();
    let stale = ConcurrencyArbiter::acquire(
        &mut tx,
        TenantTable::Appointments,
        appointment,
        &IfMatch::parse("\"v1\"").unwrap(),
    )
    .await
    .unwrap_err();
    assert_eq!(stale.kind(), shopdesk_core::ErrorKind::Conflict);

    ctx.drop_tenant(tenant).await;
}
