use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

pub mod auth;
pub mod events;
pub mod midtrans;
pub mod scan_history;
pub mod ticket_types;
pub mod tickets;
pub mod transactions;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "tiket-api",
    };

    success(payload, "Health check successful").into_response()
}
