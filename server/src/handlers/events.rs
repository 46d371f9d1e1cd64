use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::models::event::{EventPatch, NewEvent};
use crate::services::events;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::AppJson;

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_owner_id: i64,
}

pub async fn list_public(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = events::list_public(&state).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let events = events::list_for(&state, &user).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn managed(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let managed = events::list_managed(&state, &user).await?;
    Ok(success(managed, "Managed events retrieved"))
}

pub async fn show(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(slug_or_id): Path<String>,
) -> Result<Response, AppError> {
    let event = events::show(&state, &slug_or_id).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(new_event): AppJson<NewEvent>,
) -> Result<Response, AppError> {
    let event = events::create(&state, &user, new_event).await?;
    Ok(created(event, "Event created"))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    AppJson(patch): AppJson<EventPatch>,
) -> Result<Response, AppError> {
    let event = events::update(&state, &user, event_id, patch).await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    events::delete(&state, &user, event_id).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let members = events::members(&state, &user, event_id).await?;
    Ok(success(members, "Event members retrieved"))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    AppJson(request): AppJson<MemberRequest>,
) -> Result<Response, AppError> {
    let member = events::add_member(&state, &user, event_id, request.user_id).await?;
    Ok(created(member, "Member added"))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((event_id, member_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    events::remove_member(&state, &user, event_id, member_id).await?;
    Ok(empty_success("Member removed"))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    AppJson(request): AppJson<TransferRequest>,
) -> Result<Response, AppError> {
    events::transfer_ownership(&state, &user, event_id, request.new_owner_id).await?;
    Ok(empty_success("Ownership transferred"))
}

pub async fn ticket_types(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket_types = events::list_ticket_types(&state, &user, event_id).await?;
    Ok(success(ticket_types, "Ticket types retrieved"))
}
