use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    consultations::{self, OutboundEmail, ScheduleDetails},
    error::{AppError, AppResult},
    models::{ConsultationRequest, NewConsultationRequest, User},
    roles::{self, Role},
    schema::{consultation_requests, users},
    state::AppState,
};

#[derive(Serialize)]
pub struct ConsultationResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_needed: String,
    pub attorney_id: Option<Uuid>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ConsultationRequest> for ConsultationResponse {
    fn from(c: ConsultationRequest) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            service_needed: c.service_needed,
            attorney_id: c.attorney_id,
            status: c.status,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateConsultationRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_needed: String,
    pub attorney_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ConsultationListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub meeting_type: String,
    pub scheduled_time: Option<NaiveDateTime>,
    pub booking_link: Option<String>,
    pub additional_message: Option<String>,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub consultation: ConsultationResponse,
    pub email: OutboundEmail,
    pub delivered: bool,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The assigned attorney or an admin.
fn load_managed(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
    denied: &str,
) -> AppResult<ConsultationRequest> {
    let consultation: ConsultationRequest = consultation_requests::table.find(id).first(conn)?;
    if !user.is_admin() && consultation.attorney_id != Some(user.user_id) {
        return Err(AppError::forbidden(denied));
    }
    Ok(consultation)
}

/// Public intake form.
pub async fn create_consultation(
    State(state): State<AppState>,
    Json(payload): Json<CreateConsultationRequest>,
) -> AppResult<(StatusCode, Json<ConsultationResponse>)> {
    let name = payload.name.trim().to_string();
    let service_needed = payload.service_needed.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if service_needed.is_empty() {
        return Err(AppError::bad_request("service_needed must not be empty"));
    }
    let email = trimmed(payload.email);
    let phone = trimmed(payload.phone);
    if email.is_none() && phone.is_none() {
        return Err(AppError::bad_request(
            "Please provide an email address or a phone number.",
        ));
    }

    let mut conn = state.db()?;
    if let Some(attorney_id) = payload.attorney_id {
        if !roles::load_for_user(&mut conn, attorney_id)?.contains(Role::Attorney) {
            return Err(AppError::bad_request("Unknown attorney."));
        }
    }

    let id = Uuid::new_v4();
    diesel::insert_into(consultation_requests::table)
        .values(&NewConsultationRequest {
            id,
            name,
            email,
            phone,
            service_needed,
            attorney_id: payload.attorney_id,
            status: consultations::STATUS_PENDING.to_string(),
        })
        .execute(&mut conn)?;
    let created: ConsultationRequest = consultation_requests::table.find(id).first(&mut conn)?;
    info!(consultation_id = %id, attorney_id = ?created.attorney_id, "consultation requested");
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_consultations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ConsultationListQuery>,
) -> AppResult<Json<Vec<ConsultationResponse>>> {
    user.require_staff("Access denied.")?;
    let mut conn = state.db()?;
    let mut select = consultation_requests::table
        .order(consultation_requests::created_at.desc())
        .into_boxed();
    if !user.is_admin() {
        select = select.filter(consultation_requests::attorney_id.eq(user.user_id));
    }
    if let Some(raw) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = consultations::normalize_status(raw)
            .ok_or_else(|| AppError::bad_request(format!("unknown status: {raw}")))?;
        select = select.filter(consultation_requests::status.eq(status));
    }
    let rows: Vec<ConsultationRequest> = select.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ConsultationResponse::from).collect()))
}

pub async fn get_consultation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConsultationResponse>> {
    let mut conn = state.db()?;
    Ok(Json(load_managed(&mut conn, &user, id, "Access denied.")?.into()))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<ConsultationResponse>> {
    let status = consultations::normalize_status(&payload.status).ok_or_else(|| {
        AppError::bad_request(format!(
            "status must be one of: {}",
            consultations::STATUSES.join(", ")
        ))
    })?;
    let mut conn = state.db()?;
    load_managed(&mut conn, &user, id, "You cannot manage this request.")?;
    diesel::update(consultation_requests::table.find(id))
        .set((
            consultation_requests::status.eq(status),
            consultation_requests::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    let updated: ConsultationRequest = consultation_requests::table.find(id).first(&mut conn)?;
    info!(consultation_id = %id, status, "consultation status changed");
    Ok(Json(updated.into()))
}

/// Composes the reply to the requester and, when a time is confirmed,
/// marks the request as scheduled.
pub async fn schedule(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleRequest>,
) -> AppResult<Json<ScheduleResponse>> {
    let meeting_type = payload.meeting_type.trim().to_string();
    if meeting_type.is_empty() {
        return Err(AppError::bad_request("meeting_type must not be empty"));
    }
    let details = ScheduleDetails {
        meeting_type,
        scheduled_time: payload.scheduled_time,
        booking_link: payload.booking_link,
        additional_message: payload.additional_message,
    };

    let mut conn = state.db()?;
    let consultation = load_managed(&mut conn, &user, id, "You cannot manage this request.")?;
    let attorney: User = users::table.find(user.user_id).first(&mut conn)?;

    let email = consultations::schedule_email(
        &consultation.name,
        consultation.email.as_deref(),
        &consultation.service_needed,
        &attorney.full_name(),
        &details,
    );
    let delivered = consultations::deliver(&email);

    let now = Utc::now().naive_utc();
    match details.resulting_status() {
        Some(status) => diesel::update(consultation_requests::table.find(id))
            .set((
                consultation_requests::status.eq(status),
                consultation_requests::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
        None => diesel::update(consultation_requests::table.find(id))
            .set(consultation_requests::updated_at.eq(now))
            .execute(&mut conn)?,
    };
    let updated: ConsultationRequest = consultation_requests::table.find(id).first(&mut conn)?;

    info!(
        consultation_id = %id,
        status = %updated.status,
        delivered,
        "consultation reply composed"
    );
    Ok(Json(ScheduleResponse {
        consultation: updated.into(),
        email,
        delivered,
    }))
}
