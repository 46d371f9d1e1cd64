use axum::extract::{Path, State};
use axum::response::Response;

use crate::auth::AuthUser;
use crate::payment::notification::MidtransNotification;
use crate::services::webhook;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::validation::AppJson;

/// Unauthenticated; trust comes from the notification signature.
pub async fn callback(
    State(state): State<AppState>,
    AppJson(notification): AppJson<MidtransNotification>,
) -> Result<Response, AppError> {
    let ack = webhook::handle_notification(&state, notification).await?;
    Ok(success(ack, "Notification processed"))
}

pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Response, AppError> {
    let report = webhook::payment_status(&state, &user, &order_id).await?;
    Ok(success(report, "Payment status retrieved"))
}
