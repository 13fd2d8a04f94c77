use chrono::{Duration, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewOnboardingKey, OnboardingKey, User, UserRole};
use crate::roles::RoleSet;
use crate::schema::{onboarding_keys, user_roles, users};

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("onboarding key not found")]
    UnknownKey,
    #[error("This setup link has expired or has already been used.")]
    Expired,
    #[error("This user has already completed onboarding.")]
    AlreadyOnboarded,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type OnboardingResult<T> = Result<T, OnboardingError>;

/// Keys live at least one hour.
pub fn key_lifetime(requested_hours: Option<i64>, default_hours: i64) -> Duration {
    Duration::hours(requested_hours.unwrap_or(default_hours).max(1))
}

/// Issues a fresh key for `user_id`, replacing any unused one.
pub fn issue_key(
    conn: &mut PgConnection,
    user_id: Uuid,
    lifetime: Duration,
    roles: RoleSet,
    now: NaiveDateTime,
) -> OnboardingResult<OnboardingKey> {
    conn.transaction(|conn| {
        let _user: User = users::table.find(user_id).first(conn)?;

        diesel::delete(
            onboarding_keys::table
                .filter(onboarding_keys::user_id.eq(user_id))
                .filter(onboarding_keys::is_used.eq(false)),
        )
        .execute(conn)?;

        let used: bool = diesel::select(diesel::dsl::exists(
            onboarding_keys::table.filter(onboarding_keys::user_id.eq(user_id)),
        ))
        .get_result(conn)?;
        if used {
            return Err(OnboardingError::AlreadyOnboarded);
        }

        let new_key = NewOnboardingKey {
            id: Uuid::new_v4(),
            key: Uuid::new_v4(),
            user_id,
            expires_at: now + lifetime,
            roles: roles.names(),
        };
        diesel::insert_into(onboarding_keys::table)
            .values(&new_key)
            .execute(conn)?;

        Ok(onboarding_keys::table.find(new_key.id).first(conn)?)
    })
}

pub fn find_valid_key(
    conn: &mut PgConnection,
    key: Uuid,
    now: NaiveDateTime,
) -> OnboardingResult<OnboardingKey> {
    let found: Option<OnboardingKey> = onboarding_keys::table
        .filter(onboarding_keys::key.eq(key))
        .first(conn)
        .optional()?;
    match found {
        None => Err(OnboardingError::UnknownKey),
        Some(found) if !found.is_valid_at(now) => Err(OnboardingError::Expired),
        Some(found) => Ok(found),
    }
}

/// Sets the password, activates the user, grants the key's roles and burns
/// the key, all or nothing.
pub fn complete(
    conn: &mut PgConnection,
    key: Uuid,
    password_hash: String,
    now: NaiveDateTime,
) -> OnboardingResult<User> {
    conn.transaction(|conn| {
        let found: Option<OnboardingKey> = onboarding_keys::table
            .filter(onboarding_keys::key.eq(key))
            .for_update()
            .first(conn)
            .optional()?;
        let found = found.ok_or(OnboardingError::UnknownKey)?;
        if !found.is_valid_at(now) {
            return Err(OnboardingError::Expired);
        }

        diesel::update(users::table.find(found.user_id))
            .set((
                users::password_hash.eq(Some(password_hash)),
                users::is_active.eq(true),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;

        let grants: Vec<UserRole> = RoleSet::from_names(&found.roles)
            .iter()
            .map(|role| UserRole {
                user_id: found.user_id,
                role: role.as_str().to_string(),
            })
            .collect();
        if !grants.is_empty() {
            diesel::insert_into(user_roles::table)
                .values(&grants)
                .on_conflict_do_nothing()
                .execute(conn)?;
        }

        diesel::update(onboarding_keys::table.find(found.id))
            .set(onboarding_keys::is_used.eq(true))
            .execute(conn)?;

        Ok(users::table.find(found.user_id).first(conn)?)
    })
}

/// Deletes unused keys that have expired. Returns how many were removed.
pub fn purge_expired(conn: &mut PgConnection, now: NaiveDateTime) -> QueryResult<usize> {
    diesel::delete(
        onboarding_keys::table
            .filter(onboarding_keys::is_used.eq(false))
            .filter(onboarding_keys::expires_at.le(now)),
    )
    .execute(conn)
}
