//! E-signature requests. A request moves from `pending` to `signed` or
//! `rejected` exactly once, and only for the designated signer.

use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewDocumentLog, SignatureRequest};
use crate::schema::{document_logs, signature_requests};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SIGNED: &str = "signed";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature request not found")]
    NotFound,
    #[error("You are not authorized to sign this document.")]
    NotSigner,
    #[error("This document has already been signed or the request was cancelled.")]
    AlreadyResolved,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Sign,
    Reject,
}

impl Decision {
    pub fn status(self) -> &'static str {
        match self {
            Decision::Sign => STATUS_SIGNED,
            Decision::Reject => STATUS_REJECTED,
        }
    }

    pub fn log_action(self) -> &'static str {
        match self {
            Decision::Sign => "Signed",
            Decision::Reject => "Rejected",
        }
    }

    pub fn log_details(self) -> &'static str {
        match self {
            Decision::Sign => "Signed via e-signature workflow.",
            Decision::Reject => "Signature request rejected by signer.",
        }
    }
}

/// Checks who may act on a request before any write happens.
pub fn check_actor(request: &SignatureRequest, user_id: Uuid) -> Result<(), SignatureError> {
    if request.signer_id != user_id {
        return Err(SignatureError::NotSigner);
    }
    if request.status != STATUS_PENDING {
        return Err(SignatureError::AlreadyResolved);
    }
    Ok(())
}

pub fn find_by_token(conn: &mut PgConnection, token: Uuid) -> Result<SignatureRequest, SignatureError> {
    signature_requests::table
        .filter(signature_requests::token.eq(token))
        .first(conn)
        .optional()?
        .ok_or(SignatureError::NotFound)
}

/// Applies `decision` with a conditional update on `status = 'pending'`, so a
/// concurrent second attempt finds no row and reports a conflict.
pub fn respond(
    conn: &mut PgConnection,
    token: Uuid,
    user_id: Uuid,
    decision: Decision,
    now: NaiveDateTime,
) -> Result<SignatureRequest, SignatureError> {
    conn.transaction(|conn| {
        let request = find_by_token(conn, token)?;
        check_actor(&request, user_id)?;

        let updated = diesel::update(
            signature_requests::table
                .filter(signature_requests::id.eq(request.id))
                .filter(signature_requests::signer_id.eq(user_id))
                .filter(signature_requests::status.eq(STATUS_PENDING)),
        )
        .set((
            signature_requests::status.eq(decision.status()),
            signature_requests::responded_at.eq(Some(now)),
        ))
        .execute(conn)?;
        if updated == 0 {
            return Err(SignatureError::AlreadyResolved);
        }

        diesel::insert_into(document_logs::table)
            .values(&NewDocumentLog {
                id: Uuid::new_v4(),
                document_id: request.document_id,
                user_id: Some(user_id),
                action: decision.log_action().to_string(),
                details: Some(decision.log_details().to_string()),
            })
            .execute(conn)?;

        Ok(signature_requests::table.find(request.id).first(conn)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(signer: Uuid, status: &str) -> SignatureRequest {
        SignatureRequest {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            signer_id: signer,
            requested_by: None,
            token: Uuid::new_v4(),
            status: status.into(),
            created_at: Utc::now().naive_utc(),
            responded_at: None,
        }
    }

    #[test]
    fn only_the_signer_may_act() {
        let signer = Uuid::new_v4();
        let pending = request(signer, STATUS_PENDING);
        assert!(check_actor(&pending, signer).is_ok());
        assert!(matches!(
            check_actor(&pending, Uuid::new_v4()),
            Err(SignatureError::NotSigner)
        ));
    }

    #[test]
    fn resolved_requests_are_final() {
        let signer = Uuid::new_v4();
        for status in [STATUS_SIGNED, STATUS_REJECTED] {
            assert!(matches!(
                check_actor(&request(signer, status), signer),
                Err(SignatureError::AlreadyResolved)
            ));
        }
    }

    #[test]
    fn decisions_map_to_statuses_and_log_actions() {
        assert_eq!(Decision::Sign.status(), "signed");
        assert_eq!(Decision::Sign.log_action(), "Signed");
        assert_eq!(Decision::Sign.log_details(), "Signed via e-signature workflow.");
        assert_eq!(Decision::Reject.status(), "rejected");
        assert_eq!(Decision::Reject.log_action(), "Rejected");
    }
}
