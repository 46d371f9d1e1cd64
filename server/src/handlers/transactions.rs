use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::services::transactions::{self, PurchaseRequest, RegisterFreeRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};
use crate::utils::validation::AppJson;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn register_free(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<RegisterFreeRequest>,
) -> Result<Response, AppError> {
    let registration = transactions::register_free(&state, &user, request).await?;
    Ok(created(registration, "Registration successful"))
}

pub async fn purchase(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<PurchaseRequest>,
) -> Result<Response, AppError> {
    let purchase = transactions::purchase(&state, &user, request).await?;
    Ok(created(purchase, "Transaction created, awaiting payment"))
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let list = transactions::list(&state, &user, query.status.as_deref()).await?;
    Ok(success(list, "Transactions retrieved"))
}

pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let transaction = transactions::show(&state, &user, id).await?;
    Ok(success(transaction, "Transaction retrieved"))
}

pub async fn show_by_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Response, AppError> {
    let transaction = transactions::show_by_order(&state, &user, &order_id).await?;
    Ok(success(transaction, "Transaction retrieved"))
}

pub async fn can_register(
    State(state): State<AppState>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let check = transactions::can_register(&state, &user, event_id).await?;
    Ok(success(check, "Registration status retrieved"))
}

pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let transaction = transactions::cancel(&state, &user, id).await?;
    Ok(success(transaction, "Transaction cancelled"))
}

pub async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let transaction = transactions::approve(&state, &user, id).await?;
    Ok(success(transaction, "Transaction approved"))
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let transaction = transactions::reject(&state, &user, id).await?;
    Ok(success(transaction, "Transaction rejected"))
}
