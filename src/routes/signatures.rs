use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::documents::{self, DocumentResponse};
use crate::{
    access,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Document, NewSignatureRequest, SignatureRequest, User},
    schema::{documents as documents_table, signature_requests, users},
    signatures::{self, Decision, SignatureError},
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateSignatureRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct SignBody {
    #[serde(default)]
    pub agree: bool,
}

#[derive(Serialize)]
pub struct SignatureRequestResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub token: Uuid,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

impl From<SignatureRequest> for SignatureRequestResponse {
    fn from(r: SignatureRequest) -> Self {
        Self {
            id: r.id,
            document_id: r.document_id,
            signer_id: r.signer_id,
            requested_by: r.requested_by,
            token: r.token,
            status: r.status,
            created_at: r.created_at,
            responded_at: r.responded_at,
        }
    }
}

#[derive(Serialize)]
pub struct CreatedSignatureResponse {
    #[serde(flatten)]
    pub request: SignatureRequestResponse,
    pub signing_url: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct SigningPageResponse {
    #[serde(flatten)]
    pub request: SignatureRequestResponse,
    pub document: DocumentResponse,
}

pub async fn create_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<CreateSignatureRequest>,
) -> AppResult<(StatusCode, Json<CreatedSignatureResponse>)> {
    let mut conn = state.db()?;
    let doc: Document = documents_table::table.find(document_id).first(&mut conn)?;
    access::require_case_access(&mut conn, &user, doc.case_id)?;
    user.require_staff("Only attorneys can send signature requests.")?;

    let signer_id = payload
        .user_id
        .ok_or_else(|| AppError::bad_request("Please select a user to send the request to."))?;
    let signer: User = users::table.find(signer_id).first(&mut conn)?;
    if !access::is_assigned(&mut conn, doc.case_id, signer.id)? {
        return Err(AppError::bad_request(
            "The signer must be assigned to this case.",
        ));
    }

    let token = Uuid::new_v4();
    let request: SignatureRequest = conn.transaction::<_, AppError, _>(|conn| {
        let id = Uuid::new_v4();
        diesel::insert_into(signature_requests::table)
            .values(&NewSignatureRequest {
                id,
                document_id,
                signer_id: signer.id,
                requested_by: Some(user.user_id),
                token,
                status: signatures::STATUS_PENDING.to_string(),
            })
            .execute(conn)?;
        documents::write_log(
            conn,
            document_id,
            user.user_id,
            documents::ACTION_SIGNATURE_REQUESTED,
            Some(format!("Signature requested from {}.", signer.username)),
        )?;
        Ok(signature_requests::table.find(id).first(conn)?)
    })?;

    info!(
        document_id = %document_id,
        signer_id = %signer.id,
        requested_by = %user.user_id,
        "signature requested"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreatedSignatureResponse {
            signing_url: state.public_url(&format!("api/signatures/{token}")),
            message: format!("Signature request sent to {}.", signer.username),
            request: request.into(),
        }),
    ))
}

/// The signing page data. Only the designated signer may open it, and only
/// while the request is pending.
pub async fn get_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(token): Path<Uuid>,
) -> AppResult<Json<SigningPageResponse>> {
    let mut conn = state.db()?;
    let request = signatures::find_by_token(&mut conn, token)?;
    signatures::check_actor(&request, user.user_id)?;
    let doc: Document = documents_table::table
        .find(request.document_id)
        .first(&mut conn)?;
    Ok(Json(SigningPageResponse {
        request: request.into(),
        document: doc.into(),
    }))
}

pub async fn sign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(token): Path<Uuid>,
    Json(body): Json<SignBody>,
) -> AppResult<Json<SignatureRequestResponse>> {
    if !body.agree {
        return Err(AppError::bad_request("You must agree to the terms to sign."));
    }
    respond(&state, &user, token, Decision::Sign)
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(token): Path<Uuid>,
) -> AppResult<Json<SignatureRequestResponse>> {
    respond(&state, &user, token, Decision::Reject)
}

fn respond(
    state: &AppState,
    user: &AuthenticatedUser,
    token: Uuid,
    decision: Decision,
) -> AppResult<Json<SignatureRequestResponse>> {
    let mut conn = state.db()?;
    let updated = signatures::respond(
        &mut conn,
        token,
        user.user_id,
        decision,
        Utc::now().naive_utc(),
    )
    .map_err(|err| {
        if matches!(err, SignatureError::AlreadyResolved | SignatureError::NotSigner) {
            info!(token = %token, user_id = %user.user_id, error = %err, "signature response refused");
        }
        AppError::from(err)
    })?;
    info!(
        request_id = %updated.id,
        document_id = %updated.document_id,
        status = %updated.status,
        "signature request resolved"
    );
    Ok(Json(updated.into()))
}
