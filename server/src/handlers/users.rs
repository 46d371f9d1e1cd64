use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::models::user::UserPatch;
use crate::services::rbac;
use crate::services::users::{self, CreateUserRequest, UserQuery};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::AppJson;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub permission: String,
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Response, AppError> {
    let found = users::list(&state, &user, query).await?;
    Ok(success(found, "Users retrieved"))
}

pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let details = users::show(&state, &user, user_id).await?;
    Ok(success(details, "User retrieved"))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateUserRequest>,
) -> Result<Response, AppError> {
    let summary = users::create(&state, &user, request).await?;
    Ok(created(summary, "User created"))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
    AppJson(patch): AppJson<UserPatch>,
) -> Result<Response, AppError> {
    let summary = users::update(&state, &user, user_id, patch).await?;
    Ok(success(summary, "User updated"))
}

pub async fn deactivate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    users::deactivate(&state, &user, user_id).await?;
    Ok(empty_success("User deactivated"))
}

pub async fn permissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let grants = rbac::grants_of(&state, &user, user_id).await?;
    Ok(success(grants, "User permissions retrieved"))
}

pub async fn assign_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<RoleRequest>,
) -> Result<Response, AppError> {
    let grants = rbac::assign_role(&state, &user, user_id, &request.role).await?;
    Ok(success(grants, "Role assigned"))
}

pub async fn remove_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((user_id, role)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    let grants = rbac::remove_role(&state, &user, user_id, &role).await?;
    Ok(success(grants, "Role removed"))
}

pub async fn grant_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<PermissionRequest>,
) -> Result<Response, AppError> {
    let grants = rbac::grant_permission(&state, &user, user_id, &request.permission).await?;
    Ok(success(grants, "Permission granted"))
}

pub async fn revoke_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Path((user_id, permission)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    let grants = rbac::revoke_permission(&state, &user, user_id, &permission).await?;
    Ok(success(grants, "Permission revoked"))
}
