//! Appointment endpoints: read with `ETag`, patch with `If-Match`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use shopdesk_api::{
    finish_tagged, Admission, ApiError, ApiResult, ConcurrencyArbiter, IdempotencyCache,
    IdempotentRequest, IfMatchHeader, Tagged, TenantBinder, TenantTx,
};
use shopdesk_core::{AppointmentId, Envelope};
use shopdesk_db::models::{Appointment, AppointmentPatch, Versioned};
use shopdesk_db::TenantTable;
use uuid::Uuid;

/// `GET /appointments/:id`
pub async fn get_appointment(
    Path(id): Path<Uuid>,
    mut tx: TenantTx,
) -> ApiResult<Tagged<Appointment>> {
    let appointment = Appointment::find_by_id(&mut tx, AppointmentId::from_uuid(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;
    Ok(Tagged::new(appointment.version_token(), appointment))
}

/// `PATCH /appointments/:id`
///
/// The row is locked and its version compared before the write; the write
/// itself is guarded by the same version, in the same transaction.
///
/// With `Idempotency-Key`, the key is admitted before the version check: a
/// retry of a patch that already committed carries a now stale `If-Match`
/// and gets the stored response, new `ETag` included, instead of a conflict.
pub async fn patch_appointment(
    State(cache): State<IdempotencyCache>,
    Path(id): Path<Uuid>,
    IfMatchHeader(if_match): IfMatchHeader,
    binder: TenantBinder,
    request: IdempotentRequest,
) -> ApiResult<Response> {
    let patch: AppointmentPatch = request.json()?;
    if patch.is_empty() {
        return Err(ApiError::Validation("Patch contains no changes".into()));
    }

    let mut tx = binder.begin().await?;
    let claim = match cache.admit(&mut tx, &request).await? {
        Admission::Replay(response) => return Ok(response),
        Admission::Proceed(claim) => claim,
    };

    let guard = ConcurrencyArbiter::acquire(&mut tx, TenantTable::Appointments, id, &if_match).await?;
    let updated =
        Appointment::update(&mut tx, AppointmentId::from_uuid(id), &patch, guard.expected()).await?;

    tracing::info!(
        appointment_id = %updated.id,
        version = updated.version,
        "Appointment updated"
    );
    let token = updated.version_token();
    let response =
        finish_tagged(claim, &mut tx, StatusCode::OK, &token, &Envelope::ok(updated)).await?;
    tx.commit().await?;
    Ok(response)
}
