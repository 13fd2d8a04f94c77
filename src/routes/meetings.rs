use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::AuthenticatedUser,
    calendar::{self, CalendarEvent},
    error::{AppError, AppResult},
    models::{
        DocumentDueDate, Meeting, MeetingParticipant, NewDocumentDueDate, NewMeeting,
    },
    schema::{case_assignments, document_due_dates, meeting_participants, meetings},
    state::AppState,
    utils::json::{classify_nullable, NullableValue},
};

const MEETING_STAFF_ONLY: &str = "Only admins and attorneys can schedule meetings.";

#[derive(Serialize)]
pub struct MeetingResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub meeting_type: String,
    pub scheduled_time: NaiveDateTime,
    pub duration_minutes: i32,
    pub participant_ids: Vec<Uuid>,
    pub created_at: NaiveDateTime,
}

impl MeetingResponse {
    fn new(meeting: Meeting, participant_ids: Vec<Uuid>) -> Self {
        Self {
            id: meeting.id,
            case_id: meeting.case_id,
            organizer_id: meeting.organizer_id,
            title: meeting.title,
            description: meeting.description,
            meeting_type: meeting.meeting_type,
            scheduled_time: meeting.scheduled_time,
            duration_minutes: meeting.duration_minutes,
            participant_ids,
            created_at: meeting.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateMeetingRequest {
    pub case_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub meeting_type: String,
    pub scheduled_time: NaiveDateTime,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
}

#[derive(AsChangeset)]
#[diesel(table_name = meetings)]
struct MeetingChangeset {
    title: Option<String>,
    description: Option<Option<String>>,
    meeting_type: Option<String>,
    scheduled_time: Option<NaiveDateTime>,
    duration_minutes: Option<i32>,
}

#[derive(Serialize)]
pub struct DueDateResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub document_name: String,
    pub due_date: NaiveDateTime,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
}

impl From<DocumentDueDate> for DueDateResponse {
    fn from(d: DocumentDueDate) -> Self {
        Self {
            id: d.id,
            case_id: d.case_id,
            document_name: d.document_name,
            due_date: d.due_date,
            is_completed: d.is_completed,
            created_at: d.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateDueDateRequest {
    pub document_name: String,
    pub due_date: NaiveDateTime,
}

#[derive(Deserialize)]
pub struct UpdateDueDateRequest {
    pub document_name: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    pub is_completed: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = document_due_dates)]
struct DueDateChangeset {
    document_name: Option<String>,
    due_date: Option<NaiveDateTime>,
    is_completed: Option<bool>,
}

fn participants_of(
    conn: &mut PgConnection,
    meeting_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<Uuid>>> {
    let rows: Vec<MeetingParticipant> = meeting_participants::table
        .filter(meeting_participants::meeting_id.eq_any(meeting_ids))
        .load(conn)?;
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in rows {
        map.entry(row.meeting_id).or_default().push(row.user_id);
    }
    Ok(map)
}

/// Participants must be members of the meeting's case.
fn check_participants(conn: &mut PgConnection, case_id: Uuid, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
    let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    let members: Vec<Uuid> = case_assignments::table
        .filter(case_assignments::case_id.eq(case_id))
        .filter(case_assignments::user_id.eq_any(&unique))
        .select(case_assignments::user_id)
        .load(conn)?;
    if members.len() != unique.len() {
        return Err(AppError::bad_request(
            "Meeting participants must be assigned to the case.",
        ));
    }
    Ok(unique)
}

fn replace_participants(conn: &mut PgConnection, meeting_id: Uuid, ids: &[Uuid]) -> QueryResult<()> {
    diesel::delete(
        meeting_participants::table.filter(meeting_participants::meeting_id.eq(meeting_id)),
    )
    .execute(conn)?;
    let rows: Vec<MeetingParticipant> = ids
        .iter()
        .map(|user_id| MeetingParticipant {
            meeting_id,
            user_id: *user_id,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(meeting_participants::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

fn validate_meeting_type(value: &str) -> AppResult<String> {
    let value = value.trim();
    if !calendar::is_meeting_type(value) {
        return Err(AppError::bad_request(format!(
            "meeting_type must be one of: {}",
            calendar::MEETING_TYPES.join(", ")
        )));
    }
    Ok(value.to_string())
}

fn validate_duration(minutes: i32) -> AppResult<i32> {
    if minutes <= 0 {
        return Err(AppError::bad_request("duration_minutes must be positive"));
    }
    Ok(minutes)
}

fn load_meeting_for_edit(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    meeting_id: Uuid,
) -> AppResult<Meeting> {
    let meeting: Meeting = meetings::table.find(meeting_id).first(conn)?;
    if !user.is_admin() && meeting.organizer_id != user.user_id {
        return Err(AppError::forbidden(
            "Only the organizer or an admin can change this meeting.",
        ));
    }
    Ok(meeting)
}

/// Meetings the user organizes or attends; admins see all of them.
pub async fn list_meetings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MeetingResponse>>> {
    let mut conn = state.db()?;
    let mut query = meetings::table
        .order(meetings::scheduled_time.asc())
        .into_boxed();
    if !user.is_admin() {
        query = query.filter(
            meetings::organizer_id.eq(user.user_id).or(meetings::id.eq_any(
                meeting_participants::table
                    .filter(meeting_participants::user_id.eq(user.user_id))
                    .select(meeting_participants::meeting_id),
            )),
        );
    }
    let rows: Vec<Meeting> = query.load(&mut conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|m| m.id).collect();
    let mut participants = participants_of(&mut conn, &ids)?;
    Ok(Json(
        rows.into_iter()
            .map(|m| {
                let ids = participants.remove(&m.id).unwrap_or_default();
                MeetingResponse::new(m, ids)
            })
            .collect(),
    ))
}

pub async fn create_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateMeetingRequest>,
) -> AppResult<(StatusCode, Json<MeetingResponse>)> {
    user.require_staff(MEETING_STAFF_ONLY)?;
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let meeting_type = validate_meeting_type(&payload.meeting_type)?;
    let duration = validate_duration(
        payload
            .duration_minutes
            .unwrap_or(calendar::DEFAULT_MEETING_MINUTES),
    )?;

    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, payload.case_id)?;
    let participant_ids = check_participants(&mut conn, payload.case_id, &payload.participant_ids)?;

    let id = Uuid::new_v4();
    let meeting: Meeting = conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(meetings::table)
            .values(&NewMeeting {
                id,
                case_id: payload.case_id,
                organizer_id: user.user_id,
                title: title.clone(),
                description: payload.description.clone().filter(|d| !d.trim().is_empty()),
                meeting_type: meeting_type.clone(),
                scheduled_time: payload.scheduled_time,
                duration_minutes: duration,
            })
            .execute(conn)?;
        replace_participants(conn, id, &participant_ids)?;
        Ok(meetings::table.find(id).first(conn)?)
    })?;

    info!(
        meeting_id = %id,
        case_id = %meeting.case_id,
        participants = participant_ids.len(),
        "meeting scheduled"
    );
    Ok((
        StatusCode::CREATED,
        Json(MeetingResponse::new(meeting, participant_ids)),
    ))
}

pub async fn get_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(meeting_id): Path<Uuid>,
) -> AppResult<Json<MeetingResponse>> {
    let mut conn = state.db()?;
    let meeting: Meeting = meetings::table.find(meeting_id).first(&mut conn)?;
    let participants = participants_of(&mut conn, &[meeting_id])?
        .remove(&meeting_id)
        .unwrap_or_default();
    let involved = meeting.organizer_id == user.user_id || participants.contains(&user.user_id);
    if !involved {
        access::require_case_access(&mut conn, &user, meeting.case_id)?;
    }
    Ok(Json(MeetingResponse::new(meeting, participants)))
}

pub async fn update_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(meeting_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<MeetingResponse>> {
    let title = match classify_nullable(body.get("title")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("title cannot be null")),
        NullableValue::String(value) if value.trim().is_empty() => {
            return Err(AppError::bad_request("title must not be empty"))
        }
        NullableValue::String(value) => Some(value.trim().to_string()),
    };
    let description = match classify_nullable(body.get("description")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) => Some((!value.trim().is_empty()).then_some(value)),
    };
    let meeting_type = match classify_nullable(body.get("meeting_type")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("meeting_type cannot be null")),
        NullableValue::String(value) => Some(validate_meeting_type(&value)?),
    };
    let scheduled_time = body
        .get("scheduled_time")
        .map(|value| {
            serde_json::from_value::<NaiveDateTime>(value.clone())
                .map_err(|_| AppError::bad_request("scheduled_time must be YYYY-MM-DDTHH:MM:SS"))
        })
        .transpose()?;
    let duration_minutes = match body.get("duration_minutes") {
        None => None,
        Some(value) => {
            let minutes = value
                .as_i64()
                .and_then(|m| i32::try_from(m).ok())
                .ok_or_else(|| AppError::bad_request("duration_minutes must be an integer"))?;
            Some(validate_duration(minutes)?)
        }
    };
    let participant_ids = body
        .get("participant_ids")
        .map(|value| {
            serde_json::from_value::<Vec<Uuid>>(value.clone())
                .map_err(|_| AppError::bad_request("participant_ids must be a list of ids"))
        })
        .transpose()?;

    let mut conn = state.db()?;
    let meeting = load_meeting_for_edit(&mut conn, &user, meeting_id)?;
    let participant_ids = participant_ids
        .map(|ids| check_participants(&mut conn, meeting.case_id, &ids))
        .transpose()?;

    conn.transaction::<_, AppError, _>(|conn| {
        let changes = MeetingChangeset {
            title,
            description,
            meeting_type,
            scheduled_time,
            duration_minutes,
        };
        if changes.title.is_some()
            || changes.description.is_some()
            || changes.meeting_type.is_some()
            || changes.scheduled_time.is_some()
            || changes.duration_minutes.is_some()
        {
            diesel::update(meetings::table.find(meeting_id))
                .set(&changes)
                .execute(conn)?;
        }
        if let Some(ids) = &participant_ids {
            replace_participants(conn, meeting_id, ids)?;
        }
        Ok(())
    })?;

    let updated: Meeting = meetings::table.find(meeting_id).first(&mut conn)?;
    let participants = participants_of(&mut conn, &[meeting_id])?
        .remove(&meeting_id)
        .unwrap_or_default();
    info!(meeting_id = %meeting_id, updated_by = %user.user_id, "meeting updated");
    Ok(Json(MeetingResponse::new(updated, participants)))
}

pub async fn delete_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(meeting_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    load_meeting_for_edit(&mut conn, &user, meeting_id)?;
    diesel::delete(meetings::table.find(meeting_id)).execute(&mut conn)?;
    info!(meeting_id = %meeting_id, deleted_by = %user.user_id, "meeting cancelled");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_due_dates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<Vec<DueDateResponse>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let rows: Vec<DocumentDueDate> = document_due_dates::table
        .filter(document_due_dates::case_id.eq(case_id))
        .order(document_due_dates::due_date.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(DueDateResponse::from).collect()))
}

pub async fn create_due_date(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CreateDueDateRequest>,
) -> AppResult<(StatusCode, Json<DueDateResponse>)> {
    let name = payload.document_name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("document_name must not be empty"));
    }
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    user.require_staff("Only admins and attorneys can set due dates.")?;

    let id = Uuid::new_v4();
    diesel::insert_into(document_due_dates::table)
        .values(&NewDocumentDueDate {
            id,
            case_id,
            document_name: name.to_string(),
            due_date: payload.due_date,
        })
        .execute(&mut conn)?;
    let created: DocumentDueDate = document_due_dates::table.find(id).first(&mut conn)?;
    info!(due_date_id = %id, case_id = %case_id, "due date added");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Anyone on the case may mark a due date complete; staff may also move it.
pub async fn update_due_date(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(due_id): Path<Uuid>,
    Json(payload): Json<UpdateDueDateRequest>,
) -> AppResult<Json<DueDateResponse>> {
    let mut conn = state.db()?;
    let due: DocumentDueDate = document_due_dates::table.find(due_id).first(&mut conn)?;
    access::require_case_access(&mut conn, &user, due.case_id)?;

    let document_name = match payload.document_name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::bad_request("document_name must not be empty"))
        }
        other => other.map(|name| name.trim().to_string()),
    };
    if document_name.is_some() || payload.due_date.is_some() {
        user.require_staff("Only admins and attorneys can change due dates.")?;
    }
    if document_name.is_none() && payload.due_date.is_none() && payload.is_completed.is_none() {
        return Ok(Json(due.into()));
    }

    diesel::update(document_due_dates::table.find(due_id))
        .set(&DueDateChangeset {
            document_name,
            due_date: payload.due_date,
            is_completed: payload.is_completed,
        })
        .execute(&mut conn)?;
    let updated: DocumentDueDate = document_due_dates::table.find(due_id).first(&mut conn)?;
    info!(due_date_id = %due_id, completed = updated.is_completed, "due date updated");
    Ok(Json(updated.into()))
}

pub async fn calendar_events(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<CalendarEvent>>> {
    let mut conn = state.db()?;
    let events = calendar::events_for_user(&mut conn, user.user_id)?;
    Ok(Json(events))
}
