//! Business routes. Every route here is tenant scoped.

pub mod appointments;
pub mod customers;
pub mod invoices;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn business_router(state: AppState) -> Router {
    Router::new()
        .route("/customers", get(customers::list_customers))
        .route("/customers/:id", get(customers::get_customer))
        .route(
            "/appointments/:id",
            get(appointments::get_appointment).patch(appointments::patch_appointment),
        )
        .route("/invoices", post(invoices::create_invoice))
        .with_state(state)
}
