use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{AuthUser, Capability, Role};
use crate::models::user::{NewUser, User, UserPatch, UserStatus};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::validation::{not_blank, validate_request};

#[derive(Debug, Deserialize, Validate)]
pub struct FirebaseLoginRequest {
    #[validate(custom(function = "not_blank"), length(max = 8192))]
    pub firebase_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub roles: Vec<Role>,
    pub permissions: Vec<Capability>,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Self-service profile fields. Email and status stay with administrators.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The name may not be greater than 255 characters.")
    )]
    pub name: Option<String>,
    #[validate(length(max = 20, message = "The phone may not be greater than 20 characters."))]
    pub phone: Option<String>,
    #[validate(url(message = "The photo must be a valid URL."))]
    pub photo: Option<String>,
}

impl From<ProfileUpdate> for UserPatch {
    fn from(update: ProfileUpdate) -> Self {
        UserPatch {
            name: update.name,
            phone: update.phone,
            photo: update.photo,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub user: User,
    pub roles: Vec<Role>,
    pub permissions: Vec<Capability>,
}

fn display_name(name: Option<String>, email: &str) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

/// Exchanges a verified identity token for a session, creating the user on first login.
pub async fn login_with_firebase(
    state: &AppState,
    request: FirebaseLoginRequest,
) -> Result<LoginResponse, AppError> {
    validate_request(&request)?;

    let identity = state.identity.verify(request.firebase_token.trim()).await?;
    let now = Utc::now();

    let user = match state
        .store
        .find_user_by_identity(&identity.uid, &identity.email)
        .await?
    {
        Some(user) => {
            if user.firebase_uid.is_none() {
                state.store.link_firebase_uid(user.id, &identity.uid).await?;
            }
            user
        }
        None => {
            let new_user = NewUser {
                name: display_name(identity.name, &identity.email),
                firebase_uid: identity.uid,
                email: identity.email,
                phone: None,
                photo: identity.photo,
                status: UserStatus::Active,
            };
            let user = state.store.create_user(new_user, &[Role::User], now).await?;
            info!(user_id = user.id, "User registered on first login");
            user
        }
    };

    if !user.is_active() {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    let session = state.sessions.issue(user.id, now)?;
    state
        .store
        .set_session_token(user.id, Some(&session.token), Some(session.expires_at))
        .await?;
    let grants = state.permissions.grants(state.store.as_ref(), user.id).await?;

    info!(user_id = user.id, "User logged in");
    Ok(LoginResponse {
        user,
        roles: grants.roles(),
        permissions: grants.capabilities(),
        token: session.token,
        token_type: "Bearer",
        expires_in: session.expires_in,
        expires_at: session.expires_at,
    })
}

pub fn profile(user: &AuthUser) -> Profile {
    Profile {
        user: user.user.clone(),
        roles: user.grants.roles(),
        permissions: user.grants.capabilities(),
    }
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    update: ProfileUpdate,
) -> Result<Profile, AppError> {
    validate_request(&update)?;
    let updated = state
        .store
        .update_user(user.id(), update.into(), Utc::now())
        .await?;
    info!(user_id = updated.id, "Profile updated");
    Ok(Profile {
        user: updated,
        roles: user.grants.roles(),
        permissions: user.grants.capabilities(),
    })
}

pub async fn logout(state: &AppState, user: &AuthUser) -> Result<(), AppError> {
    state.store.set_session_token(user.id(), None, None).await?;
    info!(user_id = user.id(), "User logged out");
    Ok(())
}
