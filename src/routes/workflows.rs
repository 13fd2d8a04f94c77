use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::max, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{CaseStage, CaseWorkflow, NewCaseStage, NewCaseWorkflow},
    schema::{case_stages, case_workflows},
    state::AppState,
    workflow,
};

const WORKFLOW_STAFF_ONLY: &str = "Only admins and attorneys can manage workflows.";

#[derive(Serialize, Clone)]
pub struct StageResponse {
    pub id: Uuid,
    pub name: String,
    pub order: i32,
}

impl From<CaseStage> for StageResponse {
    fn from(stage: CaseStage) -> Self {
        Self {
            id: stage.id,
            name: stage.name,
            order: stage.stage_order,
        }
    }
}

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub id: Uuid,
    pub name: String,
    pub stages: Vec<StageResponse>,
}

#[derive(Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreateStageRequest {
    pub name: String,
    pub order: Option<i32>,
}

pub async fn list_workflows(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<WorkflowResponse>>> {
    user.require_staff(WORKFLOW_STAFF_ONLY)?;
    let mut conn = state.db()?;

    let workflows: Vec<CaseWorkflow> = case_workflows::table
        .order(case_workflows::name.asc())
        .load(&mut conn)?;
    let stages: Vec<CaseStage> = case_stages::table
        .order((case_stages::workflow_id, case_stages::stage_order.asc()))
        .load(&mut conn)?;

    let mut by_workflow: HashMap<Uuid, Vec<StageResponse>> = HashMap::new();
    for stage in stages {
        by_workflow
            .entry(stage.workflow_id)
            .or_default()
            .push(stage.into());
    }

    Ok(Json(
        workflows
            .into_iter()
            .map(|wf| WorkflowResponse {
                stages: by_workflow.remove(&wf.id).unwrap_or_default(),
                id: wf.id,
                name: wf.name,
            })
            .collect(),
    ))
}

pub async fn create_workflow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateWorkflowRequest>,
) -> AppResult<(StatusCode, Json<WorkflowResponse>)> {
    user.require_admin()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let stage_names: Vec<String> = payload
        .stages
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut conn = state.db()?;
    let workflow_id = Uuid::new_v4();
    let stages = conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(case_workflows::table)
            .values(&NewCaseWorkflow {
                id: workflow_id,
                name: name.to_string(),
            })
            .execute(conn)?;
        let rows: Vec<NewCaseStage> = stage_names
            .iter()
            .zip(1..)
            .map(|(stage_name, order)| NewCaseStage {
                id: Uuid::new_v4(),
                workflow_id,
                name: stage_name.clone(),
                stage_order: order,
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(case_stages::table)
                .values(&rows)
                .execute(conn)?;
        }
        Ok(workflow::load_stages(conn, workflow_id)?)
    })?;

    tracing::info!(workflow_id = %workflow_id, stages = stages.len(), "workflow created");
    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: workflow_id,
            name: name.to_string(),
            stages: stages.into_iter().map(StageResponse::from).collect(),
        }),
    ))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(workflow_id): Path<Uuid>,
) -> AppResult<Json<WorkflowResponse>> {
    user.require_staff(WORKFLOW_STAFF_ONLY)?;
    let mut conn = state.db()?;
    let wf: CaseWorkflow = case_workflows::table.find(workflow_id).first(&mut conn)?;
    let stages = workflow::load_stages(&mut conn, workflow_id)?;
    Ok(Json(WorkflowResponse {
        id: wf.id,
        name: wf.name,
        stages: stages.into_iter().map(StageResponse::from).collect(),
    }))
}

/// Appends a stage. Without an explicit order it goes after the last one.
pub async fn create_stage(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(workflow_id): Path<Uuid>,
    Json(payload): Json<CreateStageRequest>,
) -> AppResult<(StatusCode, Json<StageResponse>)> {
    user.require_admin()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if payload.order.is_some_and(|order| order < 1) {
        return Err(AppError::bad_request("order must be 1 or greater"));
    }

    let mut conn = state.db()?;
    let _wf: CaseWorkflow = case_workflows::table.find(workflow_id).first(&mut conn)?;
    let order = match payload.order {
        Some(order) => order,
        None => {
            let last: Option<i32> = case_stages::table
                .filter(case_stages::workflow_id.eq(workflow_id))
                .select(max(case_stages::stage_order))
                .first(&mut conn)?;
            workflow::appended_order(last).ok_or_else(|| {
                AppError::bad_request("The workflow has no room for another stage after the last one.")
            })?
        }
    };

    let id = Uuid::new_v4();
    diesel::insert_into(case_stages::table)
        .values(&NewCaseStage {
            id,
            workflow_id,
            name: name.to_string(),
            stage_order: order,
        })
        .execute(&mut conn)
        .map_err(|err| match err {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => AppError::conflict(format!("This workflow already has a stage with order {order}.")),
            other => other.into(),
        })?;
    let stage: CaseStage = case_stages::table.find(id).first(&mut conn)?;

    tracing::info!(workflow_id = %workflow_id, stage_id = %id, order, "stage added");
    Ok((StatusCode::CREATED, Json(stage.into())))
}
