use crate::api::auth::AuthSession;
use crate::api::response::{created, data, paginated, ApiError, ApiResult};
use crate::api::AppState;
use crate::services::model::{
    AiSettings, AppearanceSettings, NewFeedback, NewRun, NotificationSettings, Profile,
};
use crate::services::RunQuery;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

const RUN_NOT_FOUND: &str = "Run not found";

static RUN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{16}$").unwrap());

/// Malformed ids are reported exactly like unknown ones.
fn checked_run_id(id: &str) -> ApiResult<&str> {
    if RUN_ID.is_match(id) {
        Ok(id)
    } else {
        Err(ApiError::NotFound(RUN_NOT_FOUND.into()))
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub async fn list_runs(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    query: Result<Query<RunQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let page = state.store.list_runs(&session.user_id, &query);
    Ok(paginated(page.runs, page.pagination))
}

pub async fn create_run(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<NewRun>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let new_run = body(payload)?;
    new_run.validate().map_err(ApiError::BadRequest)?;

    let run = state.store.create_run(&session.user_id, new_run);
    info!(user = %session.user_id, run = %run.id, "Run created");
    Ok(created(run))
}

pub async fn get_run(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = checked_run_id(&id)?;
    state
        .store
        .get_run(&session.user_id, id)
        .map(data)
        .ok_or_else(|| ApiError::NotFound(RUN_NOT_FOUND.into()))
}

pub async fn delete_run(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = checked_run_id(&id)?;
    if state.store.delete_run(&session.user_id, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(RUN_NOT_FOUND.into()))
    }
}

pub async fn list_feedback(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.list_feedback(&session.user_id))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<NewFeedback>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let feedback = body(payload)?;
    feedback.validate().map_err(ApiError::BadRequest)?;
    Ok(created(state.store.submit_feedback(&session.user_id, feedback)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.profile(&session.user_id))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<Profile>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let profile = body(payload)?;
    profile.validate().map_err(ApiError::BadRequest)?;
    Ok(data(state.store.update_profile(&session.user_id, profile)))
}

pub async fn get_notifications(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.notifications(&session.user_id))
}

pub async fn update_notifications(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<NotificationSettings>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let settings = body(payload)?;
    Ok(data(state.store.update_notifications(&session.user_id, settings)))
}

pub async fn get_appearance(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.appearance(&session.user_id))
}

pub async fn update_appearance(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<AppearanceSettings>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let settings = body(payload)?;
    Ok(data(state.store.update_appearance(&session.user_id, settings)))
}

pub async fn get_ai_settings(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.ai_settings(&session.user_id))
}

pub async fn update_ai_settings(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<AiSettings>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let settings = body(payload)?;
    settings.validate().map_err(ApiError::BadRequest)?;
    Ok(data(state.store.update_ai_settings(&session.user_id, settings)))
}

pub async fn delete_account_data(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    data(state.store.delete_user_data(&session.user_id))
}

/// Prometheus metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
