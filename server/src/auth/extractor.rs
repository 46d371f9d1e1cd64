use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;

use crate::auth::rbac::{Capability, Grants, Role};
use crate::models::user::User;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Raw token from an `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::AuthError("Expected 'Bearer <token>' authorization".to_string())
            })?;

        Ok(Self(token.to_string()))
    }
}

/// An authenticated, active user holding the presented session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub grants: Arc<Grants>,
    pub token: String,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.grants.can(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Missing permission: {capability}"
            )))
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.grants.has_role(role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.grants.has_any_role(roles)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let claims = state.sessions.verify(&token)?;
        let user_id = claims.user_id()?;

        let user = state
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::AuthError("Unknown session user".to_string()))?;

        if !user.holds_session(&token, Utc::now()) {
            return Err(AppError::AuthError("Session has been revoked".to_string()));
        }
        if !user.is_active() {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }

        let grants = state.permissions.grants(state.store.as_ref(), user.id).await?;
        Ok(Self {
            user,
            grants,
            token,
        })
    }
}
