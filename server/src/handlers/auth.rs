use axum::extract::State;
use axum::response::Response;

use crate::auth::AuthUser;
use crate::services::auth::{self, FirebaseLoginRequest, ProfileUpdate};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};
use crate::utils::validation::AppJson;

pub async fn login_firebase(
    State(state): State<AppState>,
    AppJson(request): AppJson<FirebaseLoginRequest>,
) -> Result<Response, AppError> {
    let login = auth::login_with_firebase(&state, request).await?;
    Ok(success(login, "Login successful"))
}

pub async fn me(user: AuthUser) -> Response {
    success(auth::profile(&user), "Profile retrieved")
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<Response, AppError> {
    let profile = auth::update_profile(&state, &user, update).await?;
    Ok(success(profile, "Profile updated"))
}

pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    auth::logout(&state, &user).await?;
    Ok(empty_success("Logged out"))
}
