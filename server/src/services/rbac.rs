use serde::Serialize;
use tracing::info;

use crate::auth::{AuthUser, Capability, Role};
use crate::state::AppState;
use crate::utils::error::AppError;

#[derive(Debug, Serialize)]
pub struct UserGrants {
    pub user_id: i64,
    pub roles: Vec<Role>,
    pub permissions: Vec<Capability>,
}

fn parse_role(name: &str) -> Result<Role, AppError> {
    name.parse().map_err(AppError::ValidationError)
}

fn parse_capability(name: &str) -> Result<Capability, AppError> {
    name.parse().map_err(AppError::ValidationError)
}

pub async fn grants_of(
    state: &AppState,
    user: &AuthUser,
    target_id: i64,
) -> Result<UserGrants, AppError> {
    user.require(Capability::UserManageRoles)?;
    state
        .store
        .find_user(target_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {target_id} not found")))?;
    let grants = state.permissions.grants(state.store.as_ref(), target_id).await?;
    Ok(UserGrants {
        user_id: target_id,
        roles: grants.roles(),
        permissions: grants.capabilities(),
    })
}

pub async fn assign_role(
    state: &AppState,
    user: &AuthUser,
    target_id: i64,
    role: &str,
) -> Result<UserGrants, AppError> {
    user.require(Capability::UserManageRoles)?;
    let role = parse_role(role)?;
    state.store.assign_role(target_id, role).await?;
    state.permissions.invalidate(target_id).await;
    info!(target_id, role = %role, by = user.id(), "Role assigned");
    grants_of(state, user, target_id).await
}

pub async fn remove_role(
    state: &AppState,
    user: &AuthUser,
    target_id: i64,
    role: &str,
) -> Result<UserGrants, AppError> {
    user.require(Capability::UserManageRoles)?;
    let role = parse_role(role)?;
    state.store.remove_role(target_id, role).await?;
    state.permissions.invalidate(target_id).await;
    info!(target_id, role = %role, by = user.id(), "Role removed");
    grants_of(state, user, target_id).await
}

pub async fn grant_permission(
    state: &AppState,
    user: &AuthUser,
    target_id: i64,
    permission: &str,
) -> Result<UserGrants, AppError> {
    user.require(Capability::UserManageRoles)?;
    let capability = parse_capability(permission)?;
    state.store.grant_permission(target_id, capability).await?;
    state.permissions.invalidate(target_id).await;
    info!(target_id, permission = %capability, by = user.id(), "Permission granted");
    grants_of(state, user, target_id).await
}

pub async fn revoke_permission(
    state: &AppState,
    user: &AuthUser,
    target_id: i64,
    permission: &str,
) -> Result<UserGrants, AppError> {
    user.require(Capability::UserManageRoles)?;
    let capability = parse_capability(permission)?;
    state.store.revoke_permission(target_id, capability).await?;
    state.permissions.invalidate(target_id).await;
    info!(target_id, permission = %capability, by = user.id(), "Permission revoked");
    grants_of(state, user, target_id).await
}
