use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::{pg::PgConnection, prelude::*};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    access,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Document, DocumentLog, NewDocument, NewDocumentLog},
    schema::{document_logs, documents, users},
    state::{AppState, PRESIGNED_URL_TTL},
    storage,
};

pub const DOCUMENT_DENIED_MESSAGE: &str = "You do not have permission to view that document.";

pub const ACTION_UPLOADED: &str = "Uploaded";
pub const ACTION_VIEWED: &str = "Viewed";
pub const ACTION_GENERATED: &str = "Generated";
pub const ACTION_SIGNATURE_REQUESTED: &str = "SignatureRequested";

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub version_number: i32,
    pub created_at: NaiveDateTime,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            case_id: doc.case_id,
            title: doc.title,
            original_name: doc.original_name,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            uploaded_by: doc.uploaded_by,
            version_number: doc.version_number,
            created_at: doc.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Serialize)]
pub struct DocumentLogResponse {
    pub id: Uuid,
    pub action: String,
    pub details: Option<String>,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A file on its way into a case, plus the log line recorded with it.
pub(crate) struct IncomingDocument {
    pub title: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub action: &'static str,
    pub details: Option<String>,
}

pub(crate) fn write_log(
    conn: &mut PgConnection,
    document_id: Uuid,
    user_id: Uuid,
    action: &str,
    details: Option<String>,
) -> QueryResult<()> {
    diesel::insert_into(document_logs::table)
        .values(&NewDocumentLog {
            id: Uuid::new_v4(),
            document_id,
            user_id: Some(user_id),
            action: action.to_string(),
            details,
        })
        .execute(conn)?;
    Ok(())
}

/// Stores the blob, then writes the document row and its log in one
/// transaction. When the database step fails the blob is removed again.
pub(crate) async fn store_case_document(
    state: &AppState,
    case_id: Uuid,
    user_id: Uuid,
    incoming: IncomingDocument,
) -> AppResult<Document> {
    let document_id = Uuid::new_v4();
    let key = storage::document_key(case_id, document_id);
    let size_bytes = incoming.bytes.len() as i64;

    state
        .storage
        .put_object(
            &key,
            incoming.bytes,
            incoming.content_type.clone(),
            storage::content_disposition("inline", &incoming.original_name),
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %key, "failed to store document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let persisted = state.db().and_then(|mut conn| {
        conn.transaction::<_, AppError, _>(|conn| {
            diesel::insert_into(documents::table)
                .values(&NewDocument {
                    id: document_id,
                    case_id,
                    title: incoming.title.clone(),
                    s3_key: key.clone(),
                    original_name: incoming.original_name.clone(),
                    content_type: incoming.content_type.clone(),
                    size_bytes,
                    uploaded_by: Some(user_id),
                })
                .execute(conn)?;
            write_log(conn, document_id, user_id, incoming.action, incoming.details.clone())?;
            Ok(documents::table.find(document_id).first(conn)?)
        })
    });

    match persisted {
        Ok(document) => Ok(document),
        Err(err) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned object");
            }
            Err(err)
        }
    }
}

fn title_from_file_name(name: &str) -> String {
    let stem = std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .trim();
    if stem.is_empty() {
        name.to_string()
    } else {
        stem.to_string()
    }
}

/// Loads the document and applies the case gate with the document wording.
fn require_document_access(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    document_id: Uuid,
) -> AppResult<Document> {
    let doc: Document = documents::table.find(document_id).first(conn)?;
    let assigned = user.is_admin() || access::is_assigned(conn, doc.case_id, user.user_id)?;
    if !access::permits(user.roles, assigned) {
        info!(document_id = %document_id, user_id = %user.user_id, "document access denied");
        return Err(AppError::forbidden(DOCUMENT_DENIED_MESSAGE));
    }
    Ok(doc)
}

pub async fn list_case_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let docs: Vec<Document> = documents::table
        .filter(documents::case_id.eq(case_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(docs.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn upload_case_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    {
        let mut conn = state.db()?;
        access::require_case_access(&mut conn, &user, case_id)?;
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        match field.name() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid title: {err}")))?;
                let value = value.trim();
                if !value.is_empty() {
                    title = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let original_name = original_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;
    let content_type = content_type.or_else(|| {
        mime_guess::from_path(&original_name)
            .first()
            .map(|mime| mime.essence_str().to_string())
    });

    let document = store_case_document(
        &state,
        case_id,
        user.user_id,
        IncomingDocument {
            title: title.unwrap_or_else(|| title_from_file_name(&original_name)),
            original_name,
            content_type,
            bytes,
            action: ACTION_UPLOADED,
            details: None,
        },
    )
    .await?;

    info!(
        document_id = %document.id,
        case_id = %case_id,
        size_bytes = document.size_bytes,
        "document uploaded"
    );
    Ok((StatusCode::CREATED, Json(document.into())))
}

/// Records the view and hands out a short-lived download link.
pub async fn view_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<ViewResponse>> {
    let doc = {
        let mut conn = state.db()?;
        let doc = require_document_access(&mut conn, &user, document_id)?;
        write_log(&mut conn, doc.id, user.user_id, ACTION_VIEWED, None)?;
        doc
    };

    let url = state.presigned_url(&doc.s3_key).await?;
    Ok(Json(ViewResponse {
        url,
        expires_in: PRESIGNED_URL_TTL.as_secs(),
    }))
}

pub async fn document_logs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentLogResponse>>> {
    let mut conn = state.db()?;
    require_document_access(&mut conn, &user, document_id)?;

    let rows: Vec<(DocumentLog, Option<String>)> = document_logs::table
        .left_join(users::table)
        .filter(document_logs::document_id.eq(document_id))
        .order(document_logs::created_at.desc())
        .select((document_logs::all_columns, users::username.nullable()))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(log, username)| DocumentLogResponse {
                id: log.id,
                action: log.action,
                details: log.details,
                user_id: log.user_id,
                username,
                created_at: log.created_at,
            })
            .collect(),
    ))
}
