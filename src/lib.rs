pub mod access;
pub mod assignments;
pub mod auth;
pub mod billing;
pub mod calendar;
pub mod config;
pub mod consultations;
pub mod db;
pub mod docgen;
pub mod error;
pub mod messaging;
pub mod models;
pub mod onboarding;
pub mod pdf;
pub mod roles;
pub mod routes;
pub mod schema;
pub mod signatures;
pub mod state;
pub mod storage;
pub mod workflow;

pub mod utils {
    pub mod json;
}
