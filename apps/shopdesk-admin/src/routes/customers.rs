//! Customer read endpoints.

use axum::{extract::Path, http::Uri, Json};
use shopdesk_api::{page_params, ApiError, ApiResult, Tagged, TenantTx};
use shopdesk_core::{CustomerId, Envelope};
use shopdesk_db::models::{Customer, Versioned};
use uuid::Uuid;

/// `GET /customers?page=&page_size=`
///
/// Paginated in SQL; the envelope middleware leaves the result untouched.
pub async fn list_customers(mut tx: TenantTx, uri: Uri) -> ApiResult<Json<Envelope<Vec<Customer>>>> {
    let params = page_params(&uri);
    let (customers, total) = Customer::list(&mut tx, &params).await?;
    tx.commit().await?;
    Ok(Json(Envelope::paginated(customers, &params, total)))
}

/// `GET /customers/:id`
pub async fn get_customer(Path(id): Path<Uuid>, mut tx: TenantTx) -> ApiResult<Tagged<Customer>> {
    let customer = Customer::find_by_id(&mut tx, CustomerId::from_uuid(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;
    Ok(Tagged::new(customer.version_token(), customer))
}
