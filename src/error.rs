use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::billing::BillingError;
use crate::docgen::TemplateError;
use crate::onboarding::OnboardingError;
use crate::pdf::PdfError;
use crate::signatures::SignatureError;
use crate::workflow::WorkflowError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.message, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match value {
            Error::NotFound => AppError::not_found(),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::conflict(info.message().to_string())
            }
            _ => AppError::internal(value),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::NoWorkflow => AppError::bad_request(value.to_string()),
            WorkflowError::Database(err) => err.into(),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(value: BillingError) -> Self {
        match value {
            BillingError::NothingToBill => AppError::bad_request(value.to_string()),
            BillingError::Database(err) => err.into(),
        }
    }
}

impl From<OnboardingError> for AppError {
    fn from(value: OnboardingError) -> Self {
        match value {
            OnboardingError::UnknownKey => AppError::not_found(),
            OnboardingError::Expired => AppError::bad_request(value.to_string()),
            OnboardingError::AlreadyOnboarded => AppError::conflict(value.to_string()),
            OnboardingError::Database(err) => err.into(),
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(value: SignatureError) -> Self {
        match value {
            SignatureError::NotFound => AppError::not_found(),
            SignatureError::NotSigner => AppError::forbidden(value.to_string()),
            SignatureError::AlreadyResolved => AppError::conflict(value.to_string()),
            SignatureError::Database(err) => err.into(),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(value: TemplateError) -> Self {
        match value {
            TemplateError::InvalidName | TemplateError::OutsideDirectory => {
                AppError::bad_request(value.to_string())
            }
            TemplateError::Missing => AppError::not_found(),
            other => AppError::unprocessable(other.to_string()),
        }
    }
}

impl From<PdfError> for AppError {
    fn from(value: PdfError) -> Self {
        AppError::unprocessable(value.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value".to_string()),
        );
        let app: AppError = err.into();
        assert_eq!(app.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let app: AppError = diesel::result::Error::NotFound.into();
        assert_eq!(app.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn workflow_without_stages_is_a_bad_request() {
        let app: AppError = WorkflowError::NoWorkflow.into();
        assert_eq!(app.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.message(), "This case has no workflow to advance.");
    }

    #[test]
    fn second_signature_attempt_conflicts() {
        let app: AppError = SignatureError::AlreadyResolved.into();
        assert_eq!(app.status(), StatusCode::CONFLICT);
        let app: AppError = SignatureError::NotSigner.into();
        assert_eq!(app.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn expired_setup_link_is_a_bad_request() {
        let app: AppError = OnboardingError::Expired.into();
        assert_eq!(app.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            app.message(),
            "This setup link has expired or has already been used."
        );
    }

    #[test]
    fn template_engine_failures_are_unprocessable() {
        let app: AppError = TemplateError::Corrupt("bad zip".into()).into();
        assert_eq!(app.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
