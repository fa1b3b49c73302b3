use crate::api::response::ApiError;
use crate::api::AppState;
use crate::services::Session;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Extracts the caller's session, rejecting with 401 when there is none.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .current_session(&parts.headers)
            .map(AuthSession)
            .ok_or(ApiError::Unauthorized)
    }
}
