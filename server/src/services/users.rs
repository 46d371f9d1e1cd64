use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{AuthUser, Capability, Role};
use crate::models::user::{NewUser, User, UserPatch, UserStatus};
use crate::state::AppState;
use crate::store::UserFilter;
use crate::utils::error::AppError;
use crate::utils::validation::{not_blank, validate_request};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(custom(function = "not_blank"))]
    pub firebase_uid: String,
    #[validate(
        custom(function = "not_blank"),
        length(max = 100, message = "The name may not be greater than 100 characters.")
    )]
    pub name: String,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(max = 20, message = "The phone may not be greater than 20 characters."))]
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
    pub direct_permissions: Vec<Capability>,
    pub all_permissions: Vec<Capability>,
}

fn parse_roles(names: &[String]) -> Result<Vec<Role>, AppError> {
    names
        .iter()
        .map(|name| name.parse().map_err(AppError::ValidationError))
        .collect()
}

async fn require_user(state: &AppState, id: i64) -> Result<User, AppError> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
}

async fn summary(state: &AppState, user: User) -> Result<UserSummary, AppError> {
    let roles = state.store.user_roles(user.id).await?;
    Ok(UserSummary { user, roles })
}

/// Newest first, optionally narrowed by a search term, a role and a status.
pub async fn list(
    state: &AppState,
    user: &AuthUser,
    query: UserQuery,
) -> Result<Vec<UserSummary>, AppError> {
    user.require(Capability::UserView)?;
    let filter = UserFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        role: query
            .role
            .map(|r| r.parse::<Role>())
            .transpose()
            .map_err(AppError::ValidationError)?,
        status: query
            .status
            .map(|s| s.parse::<UserStatus>())
            .transpose()
            .map_err(AppError::ValidationError)?,
    };

    let mut summaries = Vec::new();
    for found in state.store.list_users(filter).await? {
        summaries.push(summary(state, found).await?);
    }
    Ok(summaries)
}

pub async fn show(state: &AppState, user: &AuthUser, id: i64) -> Result<UserDetails, AppError> {
    user.require(Capability::UserView)?;
    let found = require_user(state, id).await?;
    let grants = state.permissions.grants(state.store.as_ref(), id).await?;
    Ok(UserDetails {
        user: found,
        roles: grants.roles(),
        direct_permissions: state.store.user_permissions(id).await?,
        all_permissions: grants.capabilities(),
    })
}

/// Creates an account ahead of its first login. Without roles it becomes a plain `User`.
pub async fn create(
    state: &AppState,
    user: &AuthUser,
    request: CreateUserRequest,
) -> Result<UserSummary, AppError> {
    user.require(Capability::UserCreate)?;
    validate_request(&request)?;
    let mut roles = parse_roles(&request.roles)?;
    if roles.is_empty() {
        roles.push(Role::User);
    } else if roles != [Role::User] {
        user.require(Capability::UserManageRoles)?;
    }

    let new_user = NewUser {
        firebase_uid: request.firebase_uid.trim().to_string(),
        name: request.name.trim().to_string(),
        email: request.email,
        phone: request.phone,
        photo: request.photo,
        status: request.status.unwrap_or(UserStatus::Active),
    };
    let created = state.store.create_user(new_user, &roles, Utc::now()).await?;
    info!(user_id = created.id, by = user.id(), "User created");
    summary(state, created).await
}

pub async fn update(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    patch: UserPatch,
) -> Result<UserSummary, AppError> {
    user.require(Capability::UserUpdate)?;
    validate_request(&patch)?;
    let deactivating = patch.status == Some(UserStatus::Inactive);
    let updated = state.store.update_user(id, patch, Utc::now()).await?;
    if deactivating {
        state.store.set_session_token(id, None, None).await?;
    }
    info!(user_id = id, by = user.id(), "User updated");
    summary(state, updated).await
}

/// Accounts are never removed: they turn inactive and lose their session.
pub async fn deactivate(state: &AppState, user: &AuthUser, id: i64) -> Result<(), AppError> {
    user.require(Capability::UserDelete)?;
    if id == user.id() {
        return Err(AppError::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }
    let patch = UserPatch {
        status: Some(UserStatus::Inactive),
        ..Default::default()
    };
    state.store.update_user(id, patch, Utc::now()).await?;
    state.store.set_session_token(id, None, None).await?;
    info!(user_id = id, by = user.id(), "User deactivated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_must_be_known() {
        let roles = parse_roles(&["EO".to_string(), "Panitia".to_string()]).unwrap();
        assert_eq!(roles, vec![Role::Eo, Role::Panitia]);
        assert!(parse_roles(&["Superuser".to_string()]).is_err());
    }

    #[test]
    fn create_request_checks_fields() {
        let request: CreateUserRequest = serde_json::from_str(
            r#"{"firebase_uid": " ", "name": "Budi", "email": "budi-at-example"}"#,
        )
        .unwrap();
        match validate_request(&request) {
            Err(AppError::InvalidInput(fields)) => {
                assert!(fields.contains("firebase_uid"));
                assert!(fields.contains("email"));
                assert!(!fields.contains("name"));
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
        assert!(request.roles.is_empty());
    }
}
