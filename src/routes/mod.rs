use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod billing;
pub mod cases;
pub mod consultations;
pub mod documents;
pub mod health;
pub mod meetings;
pub mod messages;
pub mod onboarding;
pub mod signatures;
pub mod templates;
pub mod users;
pub mod workflows;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

fn cors_layer(allowed: Option<&str>) -> Result<CorsLayer> {
    let allow_origin = match allowed {
        Some(origins) => {
            let mut headers = Vec::new();
            for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                headers.push(
                    origin
                        .parse::<HeaderValue>()
                        .with_context(|| format!("invalid CORS allowed origin: {origin}"))?,
                );
            }
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn create_router(state: AppState) -> Result<Router<()>> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref())?;

    // Handlers here that need a user extract it themselves.
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let public_routes = Router::new()
        .route("/api/onboarding/validate", post(onboarding::validate_key))
        .route("/api/onboarding/:key/password", post(onboarding::set_password))
        .route(
            "/api/consultations",
            post(consultations::create_consultation).get(consultations::list_consultations),
        )
        .route("/api/health", get(health::health_check));

    let user_routes = Router::new()
        .route("/api/onboarding/keys", post(onboarding::create_key))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/:id", get(users::get_user).patch(users::update_user))
        .route("/api/users/:id/toggle-active", post(users::toggle_active))
        .route("/api/users/:id/reset-password", post(users::reset_password))
        .route("/api/users/:id/profile", get(users::profile))
        .route("/api/management/reassign", post(users::reassign_client));

    let case_routes = Router::new()
        .route(
            "/api/workflows",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route("/api/workflows/:id", get(workflows::get_workflow))
        .route("/api/workflows/:id/stages", post(workflows::create_stage))
        .route("/api/cases", get(cases::list_cases).post(cases::create_case))
        .route("/api/cases/dashboard", get(cases::dashboard))
        .route(
            "/api/cases/:id",
            get(cases::get_case)
                .patch(cases::update_case)
                .delete(cases::delete_case),
        )
        .route("/api/cases/:id/advance-stage", post(cases::advance_stage))
        .route("/api/cases/:id/stage-log", get(cases::stage_log))
        .route("/api/cases/:id/assignments", post(cases::add_assignment))
        .route(
            "/api/cases/:id/assignments/:user_id",
            axum::routing::delete(cases::remove_assignment),
        )
        .route(
            "/api/cases/:id/messages",
            get(messages::thread).post(messages::send),
        );

    let document_routes = Router::new()
        .route(
            "/api/cases/:id/documents",
            get(documents::list_case_documents).post(documents::upload_case_document),
        )
        .route("/api/documents/:id/view", get(documents::view_document))
        .route("/api/documents/:id/logs", get(documents::document_logs))
        .route(
            "/api/documents/:id/signature-requests",
            post(signatures::create_request),
        )
        .route("/api/signatures/:token", get(signatures::get_request))
        .route("/api/signatures/:token/sign", post(signatures::sign))
        .route("/api/signatures/:token/reject", post(signatures::reject))
        .route(
            "/api/templates",
            get(templates::list_templates).post(templates::upload_template),
        )
        .route("/api/cases/:id/generate", post(templates::generate_document))
        .route("/api/cases/:id/placeholders", get(templates::case_placeholders))
        .route(
            "/api/contract-templates",
            get(templates::list_contract_templates).post(templates::create_contract_template),
        )
        .route(
            "/api/contract-templates/:id",
            get(templates::get_contract_template)
                .patch(templates::update_contract_template)
                .delete(templates::delete_contract_template),
        )
        .route(
            "/api/contract-templates/:id/content",
            get(templates::contract_template_content),
        )
        .route(
            "/api/contract-templates/:id/download",
            get(templates::download_contract_template),
        )
        .route("/api/contract-files", get(templates::list_contract_files))
        .route("/api/contract-files/content", get(templates::contract_file_content))
        .route("/api/pdf/analyze", post(templates::analyze_pdf));

    let schedule_routes = Router::new()
        .route(
            "/api/cases/:id/time-entries",
            get(billing::list_time_entries).post(billing::create_time_entry),
        )
        .route(
            "/api/cases/:id/invoices",
            get(billing::list_invoices).post(billing::create_invoice),
        )
        .route("/api/invoices/:id", get(billing::get_invoice))
        .route(
            "/api/meetings",
            get(meetings::list_meetings).post(meetings::create_meeting),
        )
        .route(
            "/api/meetings/:id",
            get(meetings::get_meeting)
                .patch(meetings::update_meeting)
                .delete(meetings::delete_meeting),
        )
        .route(
            "/api/cases/:id/due-dates",
            get(meetings::list_due_dates).post(meetings::create_due_date),
        )
        .route(
            "/api/due-dates/:id",
            axum::routing::patch(meetings::update_due_date),
        )
        .route("/api/calendar/events", get(meetings::calendar_events))
        .route("/api/consultations/:id", get(consultations::get_consultation))
        .route(
            "/api/consultations/:id/status",
            post(consultations::update_status),
        )
        .route(
            "/api/consultations/:id/schedule",
            post(consultations::schedule),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .merge(user_routes)
        .merge(case_routes)
        .merge(document_routes)
        .merge(schedule_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Ok(Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .nest("/api/auth", auth_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
}

#[cfg(test)]
mod tests {
    use super::cors_layer;

    #[test]
    fn rejects_malformed_cors_origin() {
        assert!(cors_layer(Some("https://app.example.com, http://localhost:5173")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
        assert!(cors_layer(None).is_ok());
    }
}
