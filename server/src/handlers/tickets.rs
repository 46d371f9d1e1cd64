use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::auth::AuthUser;
use crate::services::checkin::{self, EventTicketQuery, ScanRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::validation::AppJson;

pub async fn my_tickets(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let tickets = checkin::my_tickets(&state, &user).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket = checkin::show(&state, &user, id).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn verify(
    State(state): State<AppState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let lookup = checkin::verify(&state, &user, &code).await?;
    Ok(success(lookup, "Ticket found"))
}

pub async fn scan(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<ScanRequest>,
) -> Result<Response, AppError> {
    let receipt = checkin::scan(&state, &user, request).await?;
    Ok(success(receipt, "Check-in successful"))
}

pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket = checkin::cancel(&state, &user, id).await?;
    Ok(success(ticket, "Ticket cancelled"))
}

pub async fn for_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    Query(query): Query<EventTicketQuery>,
) -> Result<Response, AppError> {
    let tickets = checkin::tickets_for_event(&state, &user, event_id, query).await?;
    Ok(success(tickets, "Event tickets retrieved"))
}

pub async fn statistics(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let stats = checkin::statistics(&state, &user, event_id).await?;
    Ok(success(stats, "Ticket statistics retrieved"))
}
