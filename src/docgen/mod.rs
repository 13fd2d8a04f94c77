//! Document generation: `.docx` placeholder filling, HTML contract
//! rendering and the placeholder context built from a case.

pub mod contract;
pub mod docx;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Case, User};
use crate::pdf::PdfError;
use crate::roles::Role;
use crate::schema::{case_assignments, user_roles, users};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid file parameter.")]
    InvalidName,
    #[error("Invalid file path.")]
    OutsideDirectory,
    #[error("File not found.")]
    Missing,
    #[error("template is not a valid .docx file: {0}")]
    Corrupt(String),
    #[error("template XML could not be processed: {0}")]
    Xml(String),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error("template I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Ordered `(key, value)` pairs; keys are substituted in this order.
pub type Context = Vec<(String, String)>;

#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
}

/// The people on a case that templates refer to.
#[derive(Debug, Clone, Default)]
pub struct CaseParties {
    pub client: Option<User>,
    pub attorney: Option<User>,
    pub participants: Vec<Participant>,
}

/// First assigned client and attorney, in assignment order.
pub fn load_parties(conn: &mut PgConnection, case_id: Uuid) -> QueryResult<CaseParties> {
    let assigned: Vec<User> = case_assignments::table
        .inner_join(users::table)
        .filter(case_assignments::case_id.eq(case_id))
        .order(case_assignments::created_at.asc())
        .select(users::all_columns)
        .load(conn)?;

    let first_with = |conn: &mut PgConnection, role: Role| -> QueryResult<Option<User>> {
        for user in &assigned {
            let holds: bool = diesel::select(diesel::dsl::exists(
                user_roles::table
                    .filter(user_roles::user_id.eq(user.id))
                    .filter(user_roles::role.eq(role.as_str())),
            ))
            .get_result(conn)?;
            if holds {
                return Ok(Some(user.clone()));
            }
        }
        Ok(None)
    };

    let client = first_with(conn, Role::Client)?;
    let attorney = first_with(conn, Role::Attorney)?;
    let participants = assigned
        .iter()
        .map(|user| Participant {
            id: user.id,
            name: user.display_name(),
        })
        .collect();

    Ok(CaseParties {
        client,
        attorney,
        participants,
    })
}

/// Keys available to `.docx` templates generated for a case.
pub fn generation_context(case: &Case, parties: &CaseParties) -> Context {
    let mut context = Vec::new();
    if let Some(client) = &parties.client {
        context.push(("client_name".to_string(), client.full_name()));
        context.push((
            "client_email".to_string(),
            client.email.clone().unwrap_or_default(),
        ));
    }
    if let Some(attorney) = &parties.attorney {
        context.push(("attorney_name".to_string(), attorney.full_name()));
    }
    context.push(("case_title".to_string(), case.title.clone()));
    context.push((
        "case_description".to_string(),
        case.description.clone().unwrap_or_default(),
    ));
    context
}

/// Upper-case keys used by contract templates and client-side autofill.
pub fn placeholder_map(
    case: &Case,
    parties: &CaseParties,
    now: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(client) = &parties.client {
        let name = client.full_name();
        map.insert("CLIENT".to_string(), name.clone());
        map.insert("CLIENT_NAME".to_string(), name);
        map.insert(
            "CLIENT_EMAIL".to_string(),
            client.email.clone().unwrap_or_default(),
        );
    }
    if let Some(attorney) = &parties.attorney {
        let name = attorney.full_name();
        map.insert("ATTORNEY".to_string(), name.clone());
        map.insert("ATTORNEY_NAME".to_string(), name);
    }
    map.insert("CASE_TITLE".to_string(), case.title.clone());
    map.insert(
        "CASE_DESCRIPTION".to_string(),
        case.description.clone().unwrap_or_default(),
    );
    map.insert("DAY".to_string(), now.format("%-d").to_string());
    map.insert("MONTH".to_string(), now.format("%B").to_string());
    map.insert("YEAR".to_string(), now.format("%Y").to_string());
    map.insert("TIME".to_string(), now.format("%H:%M").to_string());

    if let Some(client) = &parties.client {
        let name = client.full_name();
        for alias in ["LESSOR", "LESSEE", "SELLER", "BUYERS"] {
            map.entry(alias.to_string()).or_insert_with(|| name.clone());
        }
    }
    map
}

/// `<name with spaces as underscores>_<YYYYMMDD>.<ext>`
pub fn output_file_name(name: &str, date: NaiveDate, ext: &str) -> String {
    format!("{}_{}.{}", name.replace(' ', "_"), date.format("%Y%m%d"), ext)
}
