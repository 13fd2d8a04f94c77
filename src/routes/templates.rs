use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::documents::{self, DocumentResponse, IncomingDocument};
use crate::{
    access,
    auth::AuthenticatedUser,
    docgen::{
        self,
        contract::{self, ContractFile},
        docx, Participant,
    },
    error::{AppError, AppResult},
    models::{ContractTemplate, NewContractTemplate, NewTemplate, Template},
    pdf::{self, AnalyzedPage},
    schema::{contract_templates, templates},
    state::AppState,
    storage,
    utils::json::{classify_nullable, NullableValue},
};

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Serialize)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub name: String,
    pub original_name: String,
    pub is_public: bool,
    pub context_fields: Value,
    pub uploaded_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

impl From<Template> for TemplateResponse {
    fn from(t: Template) -> Self {
        Self {
            id: t.id,
            name: t.name,
            original_name: t.original_name,
            is_public: t.is_public,
            context_fields: t.context_fields,
            uploaded_by: t.uploaded_by,
            created_at: t.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ContractTemplateResponse {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub is_public: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ContractTemplate> for ContractTemplateResponse {
    fn from(t: ContractTemplate) -> Self {
        Self {
            id: t.id,
            name: t.name,
            content: t.content,
            is_public: t.is_public,
            created_by: t.created_by,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Result of a template upload: `.docx` files become generation templates,
/// PDFs are converted into contract templates.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadedTemplate {
    Docx(TemplateResponse),
    Contract(ContractTemplateResponse),
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub template_id: Uuid,
}

#[derive(Serialize)]
pub struct PlaceholderResponse {
    pub placeholders: std::collections::BTreeMap<String, String>,
    pub participants: Vec<Participant>,
}

#[derive(Deserialize)]
pub struct CreateContractTemplateRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub case_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ContractFileQuery {
    pub file: Option<String>,
}

#[derive(Serialize)]
pub struct ContractFileContent {
    pub file: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub pages: Vec<AnalyzedPage>,
}

#[derive(AsChangeset)]
#[diesel(table_name = contract_templates)]
struct ContractTemplateChangeset {
    name: Option<String>,
    content: Option<String>,
    is_public: Option<bool>,
    updated_at: NaiveDateTime,
}

fn can_see(user: &AuthenticatedUser, is_public: bool, owner: Option<Uuid>) -> bool {
    user.is_admin() || is_public || owner == Some(user.user_id)
}

fn load_visible_contract(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<ContractTemplate> {
    let template: ContractTemplate = contract_templates::table.find(id).first(conn)?;
    if !can_see(user, template.is_public, template.created_by) {
        return Err(AppError::not_found());
    }
    Ok(template)
}

fn load_owned_contract(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<ContractTemplate> {
    let template = load_visible_contract(conn, user, id)?;
    if !user.is_admin() && template.created_by != Some(user.user_id) {
        return Err(AppError::forbidden(
            "Only the author or an admin can change this template.",
        ));
    }
    Ok(template)
}

async fn read_upload_form(multipart: &mut Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                form.file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                form.bytes = Some(data.to_vec());
            }
            Some(other) => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid {other}: {err}")))?;
                match other {
                    "name" => form.name = Some(value.trim().to_string()).filter(|v| !v.is_empty()),
                    "is_public" => {
                        form.is_public = matches!(value.trim(), "1" | "true" | "on" | "yes")
                    }
                    "context_fields" if !value.trim().is_empty() => {
                        form.context_fields = Some(serde_json::from_str(&value).map_err(|err| {
                            AppError::bad_request(format!("context_fields must be valid JSON: {err}"))
                        })?)
                    }
                    _ => {}
                }
            }
            None => {}
        }
    }
    Ok(form)
}

#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Option<Vec<u8>>,
    name: Option<String>,
    is_public: bool,
    context_fields: Option<Value>,
}

fn require_file(form: &mut UploadForm) -> AppResult<(String, Vec<u8>)> {
    let bytes = form
        .bytes
        .take()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::bad_request("file field is required"))?;
    let file_name = form
        .file_name
        .take()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;
    Ok((file_name, bytes))
}

pub async fn list_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TemplateResponse>>> {
    let mut conn = state.db()?;
    let mut query = templates::table.order(templates::name.asc()).into_boxed();
    if !user.is_admin() {
        query = query.filter(
            templates::is_public
                .eq(true)
                .or(templates::uploaded_by.eq(user.user_id)),
        );
    }
    let rows: Vec<Template> = query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(TemplateResponse::from).collect()))
}

pub async fn upload_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadedTemplate>)> {
    user.require_admin()?;
    let mut form = read_upload_form(&mut multipart).await?;
    let (file_name, bytes) = require_file(&mut form)?;
    let lower = file_name.to_ascii_lowercase();

    if lower.ends_with(".pdf") {
        let html = tokio::task::spawn_blocking(move || pdf::pdf_to_html(&bytes))
            .await
            .map_err(AppError::internal)??;
        let mut conn = state.db()?;
        let id = Uuid::new_v4();
        diesel::insert_into(contract_templates::table)
            .values(&NewContractTemplate {
                id,
                name: form.name.unwrap_or_else(|| file_name.clone()),
                content: html,
                is_public: false,
                created_by: Some(user.user_id),
            })
            .execute(&mut conn)?;
        let created: ContractTemplate = contract_templates::table.find(id).first(&mut conn)?;
        info!(template_id = %id, source = %file_name, "pdf converted to contract template");
        return Ok((
            StatusCode::CREATED,
            Json(UploadedTemplate::Contract(created.into())),
        ));
    }

    if !lower.ends_with(".docx") {
        return Err(AppError::bad_request("Templates must be .docx or .pdf files."));
    }
    // Reject anything the generator could not open later.
    docx::fill_docx(&bytes, &[])?;

    let id = Uuid::new_v4();
    let key = storage::template_key(id);
    state
        .storage
        .put_object(
            &key,
            bytes,
            Some(DOCX_CONTENT_TYPE.to_string()),
            storage::content_disposition("attachment", &file_name),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to store template: {err}")))?;

    let inserted = state.db().and_then(|mut conn| {
        diesel::insert_into(templates::table)
            .values(&NewTemplate {
                id,
                name: form.name.clone().unwrap_or_else(|| file_name.clone()),
                s3_key: key.clone(),
                original_name: file_name.clone(),
                is_public: form.is_public,
                context_fields: form.context_fields.clone().unwrap_or_else(|| Value::Array(vec![])),
                uploaded_by: Some(user.user_id),
            })
            .execute(&mut conn)?;
        Ok(templates::table.find(id).first::<Template>(&mut conn)?)
    });
    let created = match inserted {
        Ok(created) => created,
        Err(err) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned template");
            }
            return Err(err);
        }
    };

    info!(template_id = %id, name = %created.name, "docx template uploaded");
    Ok((StatusCode::CREATED, Json(UploadedTemplate::Docx(created.into()))))
}

/// Fills a `.docx` template with the case context and files the result
/// as a new case document.
pub async fn generate_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let (template, context) = {
        let mut conn = state.db()?;
        let case = access::require_case_access(&mut conn, &user, case_id)?;
        let template: Template = templates::table.find(payload.template_id).first(&mut conn)?;
        if !can_see(&user, template.is_public, template.uploaded_by) {
            return Err(AppError::not_found());
        }
        let parties = docgen::load_parties(&mut conn, case_id)?;
        (template, docgen::generation_context(&case, &parties))
    };

    let source = state
        .storage
        .get_object(&template.s3_key)
        .await
        .map_err(|err| AppError::internal(format!("failed to load template: {err}")))?;
    let filled = docx::fill_docx(&source, &context).map_err(|err| {
        warn!(template_id = %template.id, error = %err, "document generation failed");
        AppError::from(err)
    })?;

    let document = documents::store_case_document(
        &state,
        case_id,
        user.user_id,
        IncomingDocument {
            title: format!("Generated: {}", template.name),
            original_name: format!("Generated_{}.docx", template.name.replace(' ', "_")),
            content_type: Some(DOCX_CONTENT_TYPE.to_string()),
            bytes: filled,
            action: documents::ACTION_GENERATED,
            details: Some(format!("Generated from template \"{}\".", template.name)),
        },
    )
    .await?;

    info!(
        document_id = %document.id,
        case_id = %case_id,
        template_id = %template.id,
        "document generated"
    );
    Ok((StatusCode::CREATED, Json(document.into())))
}

pub async fn case_placeholders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<PlaceholderResponse>> {
    let mut conn = state.db()?;
    let case = access::require_case_access(&mut conn, &user, case_id)?;
    let parties = docgen::load_parties(&mut conn, case_id)?;
    Ok(Json(PlaceholderResponse {
        placeholders: docgen::placeholder_map(&case, &parties, Utc::now()),
        participants: parties.participants,
    }))
}

pub async fn list_contract_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ContractTemplateResponse>>> {
    let mut conn = state.db()?;
    let mut query = contract_templates::table
        .order(contract_templates::updated_at.desc())
        .into_boxed();
    if !user.is_admin() {
        query = query.filter(
            contract_templates::is_public
                .eq(true)
                .or(contract_templates::created_by.eq(user.user_id)),
        );
    }
    let rows: Vec<ContractTemplate> = query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ContractTemplateResponse::from).collect()))
}

pub async fn create_contract_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateContractTemplateRequest>,
) -> AppResult<(StatusCode, Json<ContractTemplateResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let mut conn = state.db()?;
    let id = Uuid::new_v4();
    diesel::insert_into(contract_templates::table)
        .values(&NewContractTemplate {
            id,
            name: name.to_string(),
            content: payload.content,
            is_public: payload.is_public,
            created_by: Some(user.user_id),
        })
        .execute(&mut conn)?;
    let created: ContractTemplate = contract_templates::table.find(id).first(&mut conn)?;
    info!(template_id = %id, created_by = %user.user_id, "contract template created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_contract_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ContractTemplateResponse>> {
    let mut conn = state.db()?;
    Ok(Json(load_visible_contract(&mut conn, &user, id)?.into()))
}

pub async fn update_contract_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ContractTemplateResponse>> {
    let name = match classify_nullable(body.get("name")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("name cannot be null")),
        NullableValue::String(value) if value.trim().is_empty() => {
            return Err(AppError::bad_request("name must not be empty"))
        }
        NullableValue::String(value) => Some(value.trim().to_string()),
    };
    let content = match classify_nullable(body.get("content")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(String::new()),
        NullableValue::String(value) => Some(value),
    };
    let is_public = match body.get("is_public") {
        None => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => return Err(AppError::bad_request("is_public must be a boolean")),
    };

    let mut conn = state.db()?;
    load_owned_contract(&mut conn, &user, id)?;
    diesel::update(contract_templates::table.find(id))
        .set(&ContractTemplateChangeset {
            name,
            content,
            is_public,
            updated_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;
    let updated: ContractTemplate = contract_templates::table.find(id).first(&mut conn)?;
    Ok(Json(updated.into()))
}

pub async fn delete_contract_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    load_owned_contract(&mut conn, &user, id)?;
    diesel::delete(contract_templates::table.find(id)).execute(&mut conn)?;
    info!(template_id = %id, deleted_by = %user.user_id, "contract template deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Raw HTML body of a contract template.
pub async fn contract_template_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let template = load_visible_contract(&mut conn, &user, id)?;
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(template.content))
        .map_err(AppError::internal)
}

/// Renders the template as a PDF attachment. With `case_id` the
/// placeholders are filled from that case; otherwise they stay blank.
pub async fn download_contract_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let (template, context) = {
        let mut conn = state.db()?;
        let template = load_visible_contract(&mut conn, &user, id)?;
        let context = match query.case_id {
            Some(case_id) => {
                let case = access::require_case_access(&mut conn, &user, case_id)?;
                let parties = docgen::load_parties(&mut conn, case_id)?;
                docgen::placeholder_map(&case, &parties, Utc::now())
            }
            None => Default::default(),
        };
        (template, context)
    };

    let today = Utc::now().date_naive();
    let rendered = tokio::task::spawn_blocking(move || {
        contract::render_contract(&template.name, &template.content, &context, today)
    })
    .await
    .map_err(AppError::internal)??;

    let mut builder = Response::builder().header(header::CONTENT_TYPE, rendered.content_type);
    if let Some(disposition) = storage::content_disposition("attachment", &rendered.file_name) {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(Body::from(rendered.bytes))
        .map_err(AppError::internal)
}

pub async fn list_contract_files(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<ContractFile>>> {
    Ok(Json(contract::list_contract_files(
        &state.config.contract_templates_dir,
    )?))
}

pub async fn contract_file_content(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ContractFileQuery>,
) -> AppResult<Json<ContractFileContent>> {
    let file = query.file.unwrap_or_default();
    let content = contract::read_contract_file(&state.config.contract_templates_dir, &file)?;
    Ok(Json(ContractFileContent { file, content }))
}

/// Detects fillable fields in an uploaded PDF.
pub async fn analyze_pdf(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<AnalyzeResponse>> {
    let mut form = read_upload_form(&mut multipart).await?;
    let (file_name, bytes) = require_file(&mut form)?;
    let config = state.config.field_detection.clone();

    let pages = tokio::task::spawn_blocking(move || pdf::analyze_pdf(&bytes, &config))
        .await
        .map_err(AppError::internal)??;
    info!(
        file = %file_name,
        pages = pages.len(),
        fields = pages.iter().map(|p| p.fields.len()).sum::<usize>(),
        "pdf analyzed"
    );
    Ok(Json(AnalyzeResponse { pages }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_is_wrapped_in_pages() {
        let response = AnalyzeResponse {
            pages: vec![AnalyzedPage {
                image: String::new(),
                width: 612.0,
                height: 792.0,
                fields: Vec::new(),
            }],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["pages"][0]["width"], 612.0);
        assert!(value["pages"][0]["fields"].as_array().unwrap().is_empty());
    }
}
