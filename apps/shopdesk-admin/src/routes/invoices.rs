//! Invoice creation, replayable with `Idempotency-Key`.

use axum::{extract::State, http::StatusCode, response::Response};
use shopdesk_api::{finish, Admission, ApiResult, IdempotencyCache, IdempotentRequest, TenantBinder};
use shopdesk_core::Envelope;
use shopdesk_db::models::{CreateInvoice, Invoice};

/// `POST /invoices`
///
/// The idempotency record and the invoice are written in one transaction:
/// either both exist after commit or neither does. The transaction begins
/// only once the body has been read.
pub async fn create_invoice(
    State(cache): State<IdempotencyCache>,
    binder: TenantBinder,
    request: IdempotentRequest,
) -> ApiResult<Response> {
    let mut tx = binder.begin().await?;
    let claim = match cache.admit(&mut tx, &request).await? {
        Admission::Replay(response) => return Ok(response),
        Admission::Proceed(claim) => claim,
    };

    let input: CreateInvoice = request.json()?;
    let invoice = Invoice::create(&mut tx, &input).await?;

    let response = finish(claim, &mut tx, StatusCode::CREATED, &Envelope::ok(invoice)).await?;
    tx.commit().await?;
    Ok(response)
}
