use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    messaging,
    models::Message,
    schema::messages,
    state::AppState,
};

#[derive(Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
    pub sent_at: NaiveDateTime,
    pub is_read: bool,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            case_id: m.case_id,
            sender_id: m.sender_id,
            recipient_id: m.recipient_id,
            subject: m.subject,
            body: m.body,
            sent_at: m.sent_at,
            is_read: m.is_read,
        }
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub subject: String,
    pub body: String,
}

/// The caller's side of the case conversation. Incoming messages are marked
/// read once fetched.
pub async fn thread(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<Vec<MessageResponse>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let thread = messaging::thread_for(&mut conn, case_id, user.user_id)?;

    diesel::update(
        messages::table
            .filter(messages::case_id.eq(case_id))
            .filter(messages::recipient_id.eq(user.user_id))
            .filter(messages::is_read.eq(false)),
    )
    .set(messages::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(Json(thread.into_iter().map(MessageResponse::from).collect()))
}

pub async fn send(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let subject = payload.subject.trim();
    let body = payload.body.trim();
    if subject.is_empty() || body.is_empty() {
        return Err(AppError::bad_request("subject and body are required"));
    }

    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let message = messaging::send(&mut conn, case_id, user.user_id, subject, body)?;
    info!(
        message_id = %message.id,
        case_id = %case_id,
        recipient_id = %message.recipient_id,
        "message sent"
    );
    Ok((StatusCode::CREATED, Json(message.into())))
}
