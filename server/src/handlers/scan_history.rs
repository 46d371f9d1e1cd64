use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::auth::AuthUser;
use crate::services::checkin::{self, ScanPageQuery};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn for_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<Response, AppError> {
    let entry = checkin::scan_for_ticket(&state, &user, ticket_id).await?;
    Ok(success(entry, "Scan history retrieved"))
}

pub async fn for_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let entries = checkin::scans_for_event(&state, &user, event_id).await?;
    Ok(success(entries, "Scan history retrieved"))
}

pub async fn by_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let entries = checkin::scans_by_user(&state, &user, user_id).await?;
    Ok(success(entries, "Scan history retrieved"))
}

pub async fn all(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ScanPageQuery>,
) -> Result<Response, AppError> {
    let page = checkin::all_scans(&state, &user, query).await?;
    Ok(success(page, "Scan history retrieved"))
}

pub async fn statistics(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let stats = checkin::scan_statistics(&state, &user).await?;
    Ok(success(stats, "Scan statistics retrieved"))
}
