use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub phone: String,
    pub firm_role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn display_name(&self) -> String {
        let full = self.full_name();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub phone: String,
    pub firm_role: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = user_roles)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = onboarding_keys)]
#[diesel(belongs_to(User))]
pub struct OnboardingKey {
    pub id: Uuid,
    pub key: Uuid,
    pub user_id: Uuid,
    pub is_used: bool,
    pub expires_at: NaiveDateTime,
    pub roles: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl OnboardingKey {
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        !self.is_used && self.expires_at > now
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = onboarding_keys)]
pub struct NewOnboardingKey {
    pub id: Uuid,
    pub key: Uuid,
    pub user_id: Uuid,
    pub expires_at: NaiveDateTime,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = case_workflows)]
pub struct CaseWorkflow {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_workflows)]
pub struct NewCaseWorkflow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations)]
#[diesel(table_name = case_stages)]
#[diesel(belongs_to(CaseWorkflow, foreign_key = workflow_id))]
pub struct CaseStage {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub stage_order: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_stages)]
pub struct NewCaseStage {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub stage_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = cases)]
pub struct Case {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date_filed: NaiveDate,
    pub is_archived: bool,
    pub workflow_id: Option<Uuid>,
    pub current_stage_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cases)]
pub struct NewCase {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date_filed: NaiveDate,
    pub workflow_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = case_assignments)]
#[diesel(belongs_to(Case))]
#[diesel(belongs_to(User))]
pub struct CaseAssignment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_assignments)]
pub struct NewCaseAssignment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = case_stage_logs)]
#[diesel(belongs_to(Case))]
#[diesel(belongs_to(CaseStage, foreign_key = stage_id))]
pub struct CaseStageLog {
    pub id: Uuid,
    pub case_id: Uuid,
    pub stage_id: Uuid,
    pub entered_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_stage_logs)]
pub struct NewCaseStageLog {
    pub id: Uuid,
    pub case_id: Uuid,
    pub stage_id: Uuid,
    pub entered_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Case))]
pub struct Document {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub s3_key: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub version_number: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub s3_key: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_logs)]
#[diesel(belongs_to(Document))]
pub struct DocumentLog {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_logs)]
pub struct NewDocumentLog {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = templates)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub s3_key: String,
    pub original_name: String,
    pub is_public: bool,
    pub context_fields: serde_json::Value,
    pub uploaded_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = templates)]
pub struct NewTemplate {
    pub id: Uuid,
    pub name: String,
    pub s3_key: String,
    pub original_name: String,
    pub is_public: bool,
    pub context_fields: serde_json::Value,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = contract_templates)]
pub struct ContractTemplate {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub is_public: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contract_templates)]
pub struct NewContractTemplate {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub is_public: bool,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = signature_requests)]
#[diesel(belongs_to(Document))]
pub struct SignatureRequest {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub token: Uuid,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = signature_requests)]
pub struct NewSignatureRequest {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub token: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = time_entries)]
#[diesel(belongs_to(Case))]
pub struct TimeEntry {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub entry_date: NaiveDate,
    pub hours: Decimal,
    pub hourly_rate: Decimal,
    pub description: String,
    pub is_billable: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = time_entries)]
pub struct NewTimeEntry {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub entry_date: NaiveDate,
    pub hours: Decimal,
    pub hourly_rate: Decimal,
    pub description: String,
    pub is_billable: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = invoices)]
#[diesel(belongs_to(Case))]
pub struct Invoice {
    pub id: Uuid,
    pub case_id: Uuid,
    pub issued_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub total: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoice {
    pub id: Uuid,
    pub case_id: Uuid,
    pub issued_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub total: Decimal,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = invoice_items)]
#[diesel(belongs_to(Invoice))]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub time_entry_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoice_items)]
pub struct NewInvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub time_entry_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = meetings)]
#[diesel(belongs_to(Case))]
pub struct Meeting {
    pub id: Uuid,
    pub case_id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub meeting_type: String,
    pub scheduled_time: NaiveDateTime,
    pub duration_minutes: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = meetings)]
pub struct NewMeeting {
    pub id: Uuid,
    pub case_id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub meeting_type: String,
    pub scheduled_time: NaiveDateTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = meeting_participants)]
pub struct MeetingParticipant {
    pub meeting_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_due_dates)]
#[diesel(belongs_to(Case))]
pub struct DocumentDueDate {
    pub id: Uuid,
    pub case_id: Uuid,
    pub document_name: String,
    pub due_date: NaiveDateTime,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_due_dates)]
pub struct NewDocumentDueDate {
    pub id: Uuid,
    pub case_id: Uuid,
    pub document_name: String,
    pub due_date: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = consultation_requests)]
pub struct ConsultationRequest {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_needed: String,
    pub attorney_id: Option<Uuid>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = consultation_requests)]
pub struct NewConsultationRequest {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_needed: String,
    pub attorney_id: Option<Uuid>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = messages)]
#[diesel(belongs_to(Case))]
pub struct Message {
    pub id: Uuid,
    pub case_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
    pub sent_at: NaiveDateTime,
    pub is_read: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub case_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
}
