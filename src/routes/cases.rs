use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{dsl::count_star, pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::users::roles_by_user;
use super::workflows::StageResponse;
use crate::{
    access, assignments,
    auth::AuthenticatedUser,
    consultations,
    error::{AppError, AppResult},
    models::{Case, CaseStage, CaseStageLog, ConsultationRequest, Document, NewCase, User},
    schema::{
        case_assignments, case_stage_logs, case_stages, case_workflows, cases,
        consultation_requests, documents, signature_requests, users,
    },
    signatures,
    state::AppState,
    utils::json::{classify_nullable, NullableValue},
    workflow::{self, AdvanceOutcome},
};

#[derive(Serialize, Clone)]
pub struct MemberResponse {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub roles: Vec<String>,
}

#[derive(Serialize)]
pub struct CaseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date_filed: NaiveDate,
    pub is_archived: bool,
    pub workflow_id: Option<Uuid>,
    pub current_stage: Option<StageResponse>,
    pub members: Vec<MemberResponse>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct CaseDocumentEntry {
    pub id: Uuid,
    pub title: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct CaseDetailResponse {
    #[serde(flatten)]
    pub case: CaseResponse,
    pub stages: Vec<StageResponse>,
    pub next_stage: Option<StageResponse>,
    pub documents: Vec<CaseDocumentEntry>,
}

#[derive(Deserialize)]
pub struct CaseListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Deserialize)]
pub struct CreateCaseRequest {
    pub title: String,
    pub description: Option<String>,
    pub date_filed: Option<NaiveDate>,
    pub workflow_id: Option<Uuid>,
    pub attorney_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct AdvanceResponse {
    pub status: &'static str,
    pub stage: StageResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_stage: Option<StageResponse>,
    pub message: String,
}

#[derive(Serialize)]
pub struct StageLogEntry {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub stage_name: String,
    pub entered_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct StageCount {
    pub label: String,
    pub count: i64,
}

#[derive(Serialize)]
pub struct ConsultationSummary {
    pub id: Uuid,
    pub name: String,
    pub service_needed: String,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct ActivityEntry {
    pub case_id: Uuid,
    pub case_title: String,
    pub stage_name: String,
    pub entered_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub active_case_count: usize,
    pub pending_signature_count: i64,
    pub stages: Vec<StageCount>,
    pub cases: Vec<CaseResponse>,
    pub consultations: Vec<ConsultationSummary>,
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(AsChangeset)]
#[diesel(table_name = cases)]
struct CaseChangeset {
    title: Option<String>,
    description: Option<Option<String>>,
    date_filed: Option<NaiveDate>,
    is_archived: Option<bool>,
    updated_at: NaiveDateTime,
}

fn members_by_case(
    conn: &mut PgConnection,
    case_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<MemberResponse>>> {
    let rows: Vec<(Uuid, User)> = case_assignments::table
        .inner_join(users::table)
        .filter(case_assignments::case_id.eq_any(case_ids))
        .order(case_assignments::created_at.asc())
        .select((case_assignments::case_id, users::all_columns))
        .load(conn)?;
    let user_ids: Vec<Uuid> = rows.iter().map(|(_, u)| u.id).collect();
    let role_map = roles_by_user(conn, &user_ids)?;

    let mut map: HashMap<Uuid, Vec<MemberResponse>> = HashMap::new();
    for (case_id, user) in rows {
        map.entry(case_id).or_default().push(MemberResponse {
            id: user.id,
            name: user.display_name(),
            roles: role_map.get(&user.id).copied().unwrap_or_default().names(),
            username: user.username,
        });
    }
    Ok(map)
}

fn case_responses(conn: &mut PgConnection, list: Vec<Case>) -> QueryResult<Vec<CaseResponse>> {
    let ids: Vec<Uuid> = list.iter().map(|c| c.id).collect();
    let stage_ids: Vec<Uuid> = list.iter().filter_map(|c| c.current_stage_id).collect();
    let stages: HashMap<Uuid, CaseStage> = case_stages::table
        .filter(case_stages::id.eq_any(&stage_ids))
        .load::<CaseStage>(conn)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let mut members = members_by_case(conn, &ids)?;

    Ok(list
        .into_iter()
        .map(|c| CaseResponse {
            current_stage: c
                .current_stage_id
                .and_then(|id| stages.get(&id).cloned())
                .map(StageResponse::from),
            members: members.remove(&c.id).unwrap_or_default(),
            id: c.id,
            title: c.title,
            description: c.description,
            date_filed: c.date_filed,
            is_archived: c.is_archived,
            workflow_id: c.workflow_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
        })
        .collect())
}

fn load_case_response(conn: &mut PgConnection, case: Case) -> AppResult<CaseResponse> {
    case_responses(conn, vec![case])?
        .pop()
        .ok_or_else(AppError::not_found)
}

pub async fn list_cases(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CaseListQuery>,
) -> AppResult<Json<Vec<CaseResponse>>> {
    let mut conn = state.db()?;
    let visible = access::visible_case_ids(&mut conn, &user)?;
    let mut select = cases::table
        .filter(cases::id.eq_any(&visible))
        .order((cases::date_filed.desc(), cases::created_at.desc()))
        .into_boxed();
    if !query.include_archived {
        select = select.filter(cases::is_archived.eq(false));
    }
    let list: Vec<Case> = select.load(&mut conn)?;
    Ok(Json(case_responses(&mut conn, list)?))
}

/// Staff overview: open cases grouped by stage, pending signatures,
/// consultations waiting for an answer and the latest stage changes.
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardResponse>> {
    user.require_staff("Access denied.")?;
    let mut conn = state.db()?;

    let visible = access::visible_case_ids(&mut conn, &user)?;
    let open: Vec<Case> = cases::table
        .filter(cases::id.eq_any(&visible))
        .filter(cases::is_archived.eq(false))
        .order(cases::date_filed.desc())
        .load(&mut conn)?;
    let open_ids: Vec<Uuid> = open.iter().map(|c| c.id).collect();

    let stage_names: HashMap<Uuid, String> = case_stages::table
        .filter(case_stages::id.eq_any(open.iter().filter_map(|c| c.current_stage_id).collect::<Vec<_>>()))
        .select((case_stages::id, case_stages::name))
        .load::<(Uuid, String)>(&mut conn)?
        .into_iter()
        .collect();
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for case in &open {
        let label = case
            .current_stage_id
            .and_then(|id| stage_names.get(&id).cloned())
            .unwrap_or_else(|| "New".to_string());
        *counts.entry(label).or_default() += 1;
    }

    let pending_signature_count: i64 = signature_requests::table
        .inner_join(documents::table)
        .filter(signature_requests::status.eq(signatures::STATUS_PENDING))
        .filter(documents::case_id.eq_any(&visible))
        .select(count_star())
        .first(&mut conn)?;

    let mut pending = consultation_requests::table
        .filter(consultation_requests::status.eq(consultations::STATUS_PENDING))
        .order(consultation_requests::created_at.desc())
        .into_boxed();
    if !user.is_admin() {
        pending = pending.filter(consultation_requests::attorney_id.eq(user.user_id));
    }
    let pending: Vec<ConsultationRequest> = pending.load(&mut conn)?;

    let recent: Vec<(CaseStageLog, String, String)> = case_stage_logs::table
        .inner_join(cases::table)
        .inner_join(case_stages::table)
        .filter(case_stage_logs::case_id.eq_any(&open_ids))
        .order(case_stage_logs::entered_at.desc())
        .limit(5)
        .select((case_stage_logs::all_columns, cases::title, case_stages::name))
        .load(&mut conn)?;

    Ok(Json(DashboardResponse {
        active_case_count: open.len(),
        pending_signature_count,
        stages: counts
            .into_iter()
            .map(|(label, count)| StageCount { label, count })
            .collect(),
        cases: case_responses(&mut conn, open)?,
        consultations: pending
            .into_iter()
            .map(|c| ConsultationSummary {
                id: c.id,
                name: c.name,
                service_needed: c.service_needed,
                created_at: c.created_at,
            })
            .collect(),
        recent_activity: recent
            .into_iter()
            .map(|(log, case_title, stage_name)| ActivityEntry {
                case_id: log.case_id,
                case_title,
                stage_name,
                entered_at: log.entered_at,
            })
            .collect(),
    }))
}

/// Creates the case, puts it on the first stage of its workflow and assigns
/// its people, all in one transaction.
pub async fn create_case(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCaseRequest>,
) -> AppResult<(StatusCode, Json<CaseResponse>)> {
    user.require_staff("Only admins and attorneys can create cases.")?;
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut members: Vec<Uuid> = Vec::new();
    for id in payload
        .attorney_id
        .into_iter()
        .chain(payload.client_id)
        .chain(payload.member_ids.iter().copied())
    {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    if !user.is_admin() && !members.contains(&user.user_id) {
        members.insert(0, user.user_id);
    }

    let mut conn = state.db()?;
    let case_id = Uuid::new_v4();
    let created: Case = conn.transaction::<_, AppError, _>(|conn| {
        if let Some(workflow_id) = payload.workflow_id {
            let exists: bool = diesel::select(diesel::dsl::exists(
                case_workflows::table.filter(case_workflows::id.eq(workflow_id)),
            ))
            .get_result(conn)?;
            if !exists {
                return Err(AppError::bad_request("Unknown workflow."));
            }
        }

        let known: i64 = users::table
            .filter(users::id.eq_any(&members))
            .count()
            .get_result(conn)?;
        if known != members.len() as i64 {
            return Err(AppError::bad_request("Unknown user."));
        }

        diesel::insert_into(cases::table)
            .values(&NewCase {
                id: case_id,
                title: title.clone(),
                description: payload.description.clone().filter(|d| !d.trim().is_empty()),
                date_filed: payload
                    .date_filed
                    .unwrap_or_else(|| Utc::now().date_naive()),
                workflow_id: payload.workflow_id,
            })
            .execute(conn)?;

        if let Some(workflow_id) = payload.workflow_id {
            workflow::start_workflow(conn, case_id, workflow_id)?;
        }
        for member in &members {
            assignments::assign(conn, case_id, *member)?;
        }
        Ok(cases::table.find(case_id).first(conn)?)
    })?;

    tracing::info!(case_id = %case_id, created_by = %user.user_id, members = members.len(), "case created");
    let response = load_case_response(&mut conn, created)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_case(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<CaseDetailResponse>> {
    let mut conn = state.db()?;
    let case = access::require_case_access(&mut conn, &user, case_id)?;

    let stages = match case.workflow_id {
        Some(workflow_id) => workflow::load_stages(&mut conn, workflow_id)?,
        None => Vec::new(),
    };
    let next_stage = case
        .current_stage_id
        .and_then(|id| stages.iter().find(|s| s.id == id))
        .and_then(|current| workflow::next_stage(&stages, current))
        .cloned()
        .map(StageResponse::from);

    let docs: Vec<Document> = documents::table
        .filter(documents::case_id.eq(case_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(CaseDetailResponse {
        case: load_case_response(&mut conn, case)?,
        stages: stages.into_iter().map(StageResponse::from).collect(),
        next_stage,
        documents: docs
            .into_iter()
            .map(|d| CaseDocumentEntry {
                id: d.id,
                title: d.title,
                original_name: d.original_name,
                content_type: d.content_type,
                size_bytes: d.size_bytes,
                created_at: d.created_at,
            })
            .collect(),
    }))
}

pub async fn update_case(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<CaseResponse>> {
    user.require_staff("Only admins and attorneys can edit cases.")?;

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
    let date_filed = match body.get("date_filed") {
        None => None,
        Some(value) => Some(
            serde_json::from_value::<NaiveDate>(value.clone())
                .map_err(|_| AppError::bad_request("date_filed must be YYYY-MM-DD"))?,
        ),
    };
    let is_archived = match body.get("is_archived") {
        None => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => return Err(AppError::bad_request("is_archived must be a boolean")),
    };

    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    diesel::update(cases::table.find(case_id))
        .set(&CaseChangeset {
            title,
            description,
            date_filed,
            is_archived,
            updated_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;
    let updated: Case = cases::table.find(case_id).first(&mut conn)?;
    tracing::info!(case_id = %case_id, updated_by = %user.user_id, "case updated");
    Ok(Json(load_case_response(&mut conn, updated)?))
}

/// Hard delete. Stored document blobs are removed after the rows are gone.
pub async fn delete_case(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let keys: Vec<String> = {
        let mut conn = state.db()?;
        let _case: Case = cases::table.find(case_id).first(&mut conn)?;
        let keys = documents::table
            .filter(documents::case_id.eq(case_id))
            .select(documents::s3_key)
            .load(&mut conn)?;
        diesel::delete(cases::table.find(case_id)).execute(&mut conn)?;
        keys
    };

    for key in &keys {
        if let Err(err) = state.storage.delete_object(key).await {
            tracing::warn!(case_id = %case_id, key = %key, error = %err, "failed to delete stored document");
        }
    }
    tracing::info!(case_id = %case_id, deleted_by = %user.user_id, documents = keys.len(), "case deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn advance_stage(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<AdvanceResponse>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    user.require_staff("Only attorneys can advance a case stage.")?;

    let response = match workflow::advance_stage(&mut conn, case_id)? {
        AdvanceOutcome::Advanced { from, to } => {
            tracing::info!(
                case_id = %case_id,
                from_stage = %from.name,
                to_stage = %to.name,
                user_id = %user.user_id,
                "case stage advanced"
            );
            AdvanceResponse {
                status: "advanced",
                message: format!("Case stage advanced to: {}", to.name),
                stage: to.into(),
                previous_stage: Some(from.into()),
            }
        }
        AdvanceOutcome::FinalStage { current } => AdvanceResponse {
            status: "final_stage",
            message: "This case is already at the final stage.".to_string(),
            stage: current.into(),
            previous_stage: None,
        },
    };
    Ok(Json(response))
}

pub async fn stage_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<Vec<StageLogEntry>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let rows: Vec<(CaseStageLog, String)> = case_stage_logs::table
        .inner_join(case_stages::table)
        .filter(case_stage_logs::case_id.eq(case_id))
        .order(case_stage_logs::entered_at.asc())
        .select((case_stage_logs::all_columns, case_stages::name))
        .load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(log, stage_name)| StageLogEntry {
                id: log.id,
                stage_id: log.stage_id,
                stage_name,
                entered_at: log.entered_at,
                completed_at: log.completed_at,
            })
            .collect(),
    ))
}

pub async fn add_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<(StatusCode, Json<MemberResponse>)> {
    user.require_admin()?;
    let mut conn = state.db()?;
    let _case: Case = cases::table.find(case_id).first(&mut conn)?;
    let member: User = users::table.find(payload.user_id).first(&mut conn)?;

    assignments::assign(&mut conn, case_id, member.id).map_err(|err| match err {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => AppError::conflict("That user is already assigned to this case."),
        other => other.into(),
    })?;
    let roles = crate::roles::load_for_user(&mut conn, member.id)?;

    tracing::info!(case_id = %case_id, user_id = %member.id, "user assigned to case");
    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            id: member.id,
            name: member.display_name(),
            username: member.username,
            roles: roles.names(),
        }),
    ))
}

pub async fn remove_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((case_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let mut conn = state.db()?;
    if assignments::unassign(&mut conn, case_id, user_id)? == 0 {
        return Err(AppError::not_found());
    }
    tracing::info!(case_id = %case_id, user_id = %user_id, "user removed from case");
    Ok(StatusCode::NO_CONTENT)
}

