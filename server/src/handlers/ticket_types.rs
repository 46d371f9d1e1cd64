use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::models::ticket_type::{NewTicketType, TicketTypePatch};
use crate::services::events;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::AppJson;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub event_id: Option<i64>,
}

pub async fn index(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<IndexQuery>,
) -> Result<Response, AppError> {
    let ticket_types = events::list_all_ticket_types(&state, &user, query.event_id).await?;
    Ok(success(ticket_types, "Ticket types retrieved"))
}

pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket_type = events::show_ticket_type(&state, &user, id).await?;
    Ok(success(ticket_type, "Ticket type retrieved"))
}

pub async fn availability(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Response, AppError> {
    let check = events::check_availability(&state, &user, id, query.quantity).await?;
    Ok(success(check, "Availability checked"))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(new_type): AppJson<NewTicketType>,
) -> Result<Response, AppError> {
    let ticket_type = events::create_ticket_type(&state, &user, new_type).await?;
    Ok(created(ticket_type, "Ticket type created"))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(patch): AppJson<TicketTypePatch>,
) -> Result<Response, AppError> {
    let ticket_type = events::update_ticket_type(&state, &user, id, patch).await?;
    Ok(success(ticket_type, "Ticket type updated"))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    events::delete_ticket_type(&state, &user, id).await?;
    Ok(empty_success("Ticket type deleted"))
}
