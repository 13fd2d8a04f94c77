use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{start_session, LoginResponse};
use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::User,
    onboarding,
    roles::RoleSet,
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub user_id: Uuid,
    pub hours: Option<i64>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Serialize)]
pub struct KeyResponse {
    pub key: Uuid,
    pub user_id: Uuid,
    pub expires_at: NaiveDateTime,
    pub roles: Vec<String>,
    pub setup_url: String,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub key: Uuid,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub username: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateKeyRequest>,
) -> AppResult<(StatusCode, Json<KeyResponse>)> {
    user.require_admin()?;
    let roles = RoleSet::parse_all(&payload.roles).map_err(|err| AppError::bad_request(err.to_string()))?;
    let lifetime =
        onboarding::key_lifetime(payload.hours, state.config.onboarding_key_default_hours);

    let mut conn = state.db()?;
    let key = onboarding::issue_key(
        &mut conn,
        payload.user_id,
        lifetime,
        roles,
        Utc::now().naive_utc(),
    )?;
    tracing::info!(
        user_id = %key.user_id,
        expires_at = %key.expires_at,
        issued_by = %user.user_id,
        "onboarding key issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(KeyResponse {
            setup_url: state.public_url(&format!("api/onboarding/{}/password", key.key)),
            key: key.key,
            user_id: key.user_id,
            expires_at: key.expires_at,
            roles: key.roles,
        }),
    ))
}

pub async fn validate_key(
    State(state): State<AppState>,
    Json(payload): Json<ValidateRequest>,
) -> AppResult<Json<ValidateResponse>> {
    let mut conn = state.db()?;
    let key = onboarding::find_valid_key(&mut conn, payload.key, Utc::now().naive_utc())?;
    let owner: User = users::table.find(key.user_id).first(&mut conn)?;
    Ok(Json(ValidateResponse {
        valid: true,
        user_id: owner.id,
        username: owner.username,
        expires_at: key.expires_at,
    }))
}

/// Completes onboarding and logs the new user in.
pub async fn set_password(
    State(state): State<AppState>,
    Path(key): Path<Uuid>,
    Json(payload): Json<SetPasswordRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    if let Some(problem) = password::validate_new_password(&payload.password, &payload.confirm_password)
    {
        return Err(AppError::bad_request(problem));
    }
    let hash = password::hash_password(&payload.password)?;

    let mut conn = state.db()?;
    let user = onboarding::complete(&mut conn, key, hash, Utc::now().naive_utc())?;
    tracing::info!(user_id = %user.id, "onboarding completed");

    start_session(&state, &mut conn, &user)
}
