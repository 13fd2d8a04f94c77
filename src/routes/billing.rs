use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    auth::AuthenticatedUser,
    billing,
    error::{AppError, AppResult},
    models::{Invoice, InvoiceItem, NewTimeEntry, TimeEntry},
    schema::{invoice_items, invoices, time_entries},
    state::AppState,
};

const BILLING_STAFF_ONLY: &str = "Only admins and attorneys can manage billing.";

#[derive(Serialize)]
pub struct TimeEntryResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub entry_date: NaiveDate,
    pub hours: Decimal,
    pub hourly_rate: Decimal,
    pub amount: Decimal,
    pub description: String,
    pub is_billable: bool,
    pub created_at: NaiveDateTime,
}

impl From<TimeEntry> for TimeEntryResponse {
    fn from(e: TimeEntry) -> Self {
        Self {
            amount: (e.hours * e.hourly_rate).round_dp(2),
            id: e.id,
            case_id: e.case_id,
            user_id: e.user_id,
            entry_date: e.entry_date,
            hours: e.hours,
            hourly_rate: e.hourly_rate,
            description: e.description,
            is_billable: e.is_billable,
            created_at: e.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateTimeEntryRequest {
    pub entry_date: Option<NaiveDate>,
    pub hours: Decimal,
    pub hourly_rate: Option<Decimal>,
    pub description: String,
    #[serde(default = "default_billable")]
    pub is_billable: bool,
}

fn default_billable() -> bool {
    true
}

#[derive(Serialize)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub time_entry_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(i: InvoiceItem) -> Self {
        Self {
            id: i.id,
            time_entry_id: i.time_entry_id,
            description: i.description,
            quantity: i.quantity,
            rate: i.rate,
            amount: i.amount,
        }
    }
}

#[derive(Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub issued_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub total: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<InvoiceItemResponse>>,
}

impl InvoiceResponse {
    fn new(invoice: Invoice, items: Option<Vec<InvoiceItem>>) -> Self {
        Self {
            id: invoice.id,
            case_id: invoice.case_id,
            issued_date: invoice.issued_date,
            due_date: invoice.due_date,
            status: invoice.status,
            total: invoice.total,
            created_by: invoice.created_by,
            created_at: invoice.created_at,
            items: items.map(|items| items.into_iter().map(InvoiceItemResponse::from).collect()),
        }
    }
}

#[derive(Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateInvoiceRequest {
    pub issued_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

pub async fn list_time_entries(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<Vec<TimeEntryResponse>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    let entries: Vec<TimeEntry> = time_entries::table
        .filter(time_entries::case_id.eq(case_id))
        .order((time_entries::entry_date.desc(), time_entries::created_at.desc()))
        .load(&mut conn)?;
    Ok(Json(entries.into_iter().map(TimeEntryResponse::from).collect()))
}

/// Logs time against a case. The rate defaults to the configured hourly rate.
pub async fn create_time_entry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CreateTimeEntryRequest>,
) -> AppResult<(StatusCode, Json<TimeEntryResponse>)> {
    if payload.hours <= Decimal::ZERO {
        return Err(AppError::bad_request("hours must be greater than zero"));
    }
    let hourly_rate = payload
        .hourly_rate
        .unwrap_or(state.config.default_hourly_rate);
    if hourly_rate < Decimal::ZERO {
        return Err(AppError::bad_request("hourly_rate must not be negative"));
    }
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }

    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    user.require_staff(BILLING_STAFF_ONLY)?;

    let id = Uuid::new_v4();
    diesel::insert_into(time_entries::table)
        .values(&NewTimeEntry {
            id,
            case_id,
            user_id: user.user_id,
            entry_date: payload.entry_date.unwrap_or_else(|| Utc::now().date_naive()),
            hours: payload.hours.round_dp(2),
            hourly_rate: hourly_rate.round_dp(2),
            description: description.to_string(),
            is_billable: payload.is_billable,
        })
        .execute(&mut conn)?;
    let entry: TimeEntry = time_entries::table.find(id).first(&mut conn)?;

    info!(time_entry_id = %id, case_id = %case_id, hours = %entry.hours, "time logged");
    Ok((StatusCode::CREATED, Json(entry.into())))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Query(query): Query<InvoiceListQuery>,
) -> AppResult<Json<Vec<InvoiceResponse>>> {
    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;

    let mut select = invoices::table
        .filter(invoices::case_id.eq(case_id))
        .order(invoices::issued_date.desc())
        .into_boxed();
    if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if !billing::is_valid_status(status) {
            return Err(AppError::bad_request(format!("unknown invoice status: {status}")));
        }
        select = select.filter(invoices::status.eq(status.to_string()));
    }
    let rows: Vec<Invoice> = select.load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|invoice| InvoiceResponse::new(invoice, None))
            .collect(),
    ))
}

/// Bills every unbilled billable time entry of the case on a new draft.
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> AppResult<(StatusCode, Json<InvoiceResponse>)> {
    let issued_date = payload.issued_date.unwrap_or_else(|| Utc::now().date_naive());
    if payload.due_date.is_some_and(|due| due < issued_date) {
        return Err(AppError::bad_request("due_date must not be before issued_date"));
    }

    let mut conn = state.db()?;
    access::require_case_access(&mut conn, &user, case_id)?;
    user.require_staff(BILLING_STAFF_ONLY)?;

    let (invoice, items) =
        billing::create_invoice(&mut conn, case_id, user.user_id, issued_date, payload.due_date)?;
    info!(
        invoice_id = %invoice.id,
        case_id = %case_id,
        total = %invoice.total,
        lines = items.len(),
        "invoice created"
    );
    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::new(invoice, Some(items))),
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceResponse>> {
    let mut conn = state.db()?;
    let invoice: Invoice = invoices::table.find(invoice_id).first(&mut conn)?;
    access::require_case_access(&mut conn, &user, invoice.case_id)?;
    let items: Vec<InvoiceItem> = invoice_items::table
        .filter(invoice_items::invoice_id.eq(invoice_id))
        .order(invoice_items::description.asc())
        .load(&mut conn)?;
    Ok(Json(InvoiceResponse::new(invoice, Some(items))))
}
