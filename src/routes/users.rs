use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    assignments,
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{Case, NewUser, User},
    roles::{self, Role, RoleSet},
    schema::{case_assignments, cases, refresh_tokens, user_roles, users},
    state::AppState,
    utils::json::{classify_nullable, NullableValue},
};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub firm_role: String,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl UserResponse {
    pub fn new(user: User, roles: RoleSet) -> Self {
        Self {
            full_name: user.full_name(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            firm_role: user.firm_role,
            is_active: user.is_active,
            roles: roles.names(),
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.display_name(),
        }
    }
}

#[derive(Deserialize)]
pub struct UserListQuery {
    pub q: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub firm_role: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub client_id: Uuid,
    pub from_attorney_id: Uuid,
    pub to_attorney_id: Uuid,
}

#[derive(Serialize)]
pub struct ReassignResponse {
    pub cases_updated: usize,
}

#[derive(Serialize)]
pub struct ProfileCase {
    pub id: Uuid,
    pub title: String,
    pub is_archived: bool,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub cases: Vec<ProfileCase>,
    pub related_title: Option<&'static str>,
    pub related_people: Vec<UserSummary>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UserChangeset {
    email: Option<Option<String>>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    firm_role: Option<String>,
    updated_at: Option<NaiveDateTime>,
}

pub(crate) fn roles_by_user(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, RoleSet>> {
    let rows: Vec<(Uuid, String)> = user_roles::table
        .filter(user_roles::user_id.eq_any(ids))
        .select((user_roles::user_id, user_roles::role))
        .load(conn)?;
    let mut map: HashMap<Uuid, RoleSet> = HashMap::new();
    for (user_id, name) in rows {
        if let Ok(role) = name.parse::<Role>() {
            map.entry(user_id).or_default().insert(role);
        }
    }
    Ok(map)
}

fn parse_roles(names: &[String]) -> AppResult<RoleSet> {
    RoleSet::parse_all(names).map_err(|err| AppError::bad_request(err.to_string()))
}

fn string_field(body: &Value, key: &str) -> AppResult<Option<String>> {
    match classify_nullable(body.get(key)).map_err(|err| AppError::bad_request(format!("{key}: {err}")))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(AppError::bad_request(format!("{key} cannot be null"))),
        NullableValue::String(value) => Ok(Some(value.trim().to_string())),
    }
}

/// Staff directory. `role` narrows to one role and sorts by last name;
/// `q` matches username, names and email.
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    user.require_staff("You do not have permission to perform this action.")?;
    let mut conn = state.db()?;

    let mut select = users::table.into_boxed();
    if let Some(term) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{term}%");
        select = select.filter(
            users::username
                .ilike(pattern.clone())
                .or(users::first_name.ilike(pattern.clone()))
                .or(users::last_name.ilike(pattern.clone()))
                .or(users::email.ilike(pattern)),
        );
    }
    if let Some(name) = query.role.as_deref().filter(|r| !r.trim().is_empty()) {
        let role: Role = name
            .parse()
            .map_err(|err: roles::UnknownRole| AppError::bad_request(err.to_string()))?;
        select = select
            .filter(
                users::id.eq_any(
                    user_roles::table
                        .filter(user_roles::role.eq(role.as_str()))
                        .select(user_roles::user_id),
                ),
            )
            .order((users::last_name.asc(), users::first_name.asc()));
    } else {
        select = select.order(users::created_at.desc());
    }

    let records: Vec<User> = select.load(&mut conn)?;
    let ids: Vec<Uuid> = records.iter().map(|u| u.id).collect();
    let mut role_map = roles_by_user(&mut conn, &ids)?;
    Ok(Json(
        records
            .into_iter()
            .map(|u| {
                let roles = role_map.remove(&u.id).unwrap_or_default();
                UserResponse::new(u, roles)
            })
            .collect(),
    ))
}

/// Users created with a password are active at once; the rest wait for an
/// onboarding key.
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    user.require_admin()?;
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("username must not be empty"));
    }
    let role_set = parse_roles(&payload.roles)?;
    let password_hash = match payload.password.as_deref() {
        Some(pw) => {
            if let Some(problem) = password::validate_new_password(pw, pw) {
                return Err(AppError::bad_request(problem));
            }
            Some(password::hash_password(pw)?)
        }
        None => None,
    };

    let mut conn = state.db()?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: payload.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        is_active: password_hash.is_some(),
        password_hash,
        phone: payload.phone.trim().to_string(),
        firm_role: payload.firm_role.trim().to_string(),
    };

    let created: User = conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)
            .map_err(|err| match err {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => AppError::conflict("A user with that username already exists."),
                other => other.into(),
            })?;
        roles::replace_for_user(conn, new_user.id, role_set)?;
        Ok(users::table.find(new_user.id).first(conn)?)
    })?;

    tracing::info!(user_id = %created.id, created_by = %user.user_id, roles = ?role_set.names(), "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::new(created, role_set))))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    if user.user_id != user_id {
        user.require_staff("You do not have permission to perform this action.")?;
    }
    let mut conn = state.db()?;
    let record: User = users::table.find(user_id).first(&mut conn)?;
    let roles = roles::load_for_user(&mut conn, user_id)?;
    Ok(Json(UserResponse::new(record, roles)))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<UserResponse>> {
    user.require_admin()?;

    let email = match classify_nullable(body.get("email")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) => {
            let trimmed = value.trim().to_string();
            Some((!trimmed.is_empty()).then_some(trimmed))
        }
    };
    let mut changes = UserChangeset {
        email,
        first_name: string_field(&body, "first_name")?,
        last_name: string_field(&body, "last_name")?,
        phone: string_field(&body, "phone")?,
        firm_role: string_field(&body, "firm_role")?,
        updated_at: None,
    };
    let new_roles = match body.get("roles") {
        None => None,
        Some(value) => {
            let names: Vec<String> = serde_json::from_value(value.clone())
                .map_err(|_| AppError::bad_request("roles must be a list of role names"))?;
            Some(parse_roles(&names)?)
        }
    };

    let mut conn = state.db()?;
    let (record, role_set) = conn.transaction::<_, AppError, _>(|conn| {
        let _existing: User = users::table.find(user_id).first(conn)?;
        changes.updated_at = Some(Utc::now().naive_utc());
        diesel::update(users::table.find(user_id))
            .set(&changes)
            .execute(conn)?;
        if let Some(role_set) = new_roles {
            roles::replace_for_user(conn, user_id, role_set)?;
        }
        let record: User = users::table.find(user_id).first(conn)?;
        let role_set = roles::load_for_user(conn, user_id)?;
        Ok((record, role_set))
    })?;

    tracing::info!(user_id = %user_id, updated_by = %user.user_id, "user updated");
    Ok(Json(UserResponse::new(record, role_set)))
}

pub async fn toggle_active(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    user.require_admin()?;
    if user.user_id == user_id {
        return Err(AppError::bad_request("You cannot deactivate your own account."));
    }

    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let record: User = conn.transaction::<_, AppError, _>(|conn| {
        let current: User = users::table.find(user_id).for_update().first(conn)?;
        diesel::update(users::table.find(user_id))
            .set((users::is_active.eq(!current.is_active), users::updated_at.eq(now)))
            .execute(conn)?;
        if current.is_active {
            diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::user_id.eq(user_id))
                    .filter(refresh_tokens::revoked_at.is_null()),
            )
            .set(refresh_tokens::revoked_at.eq(now))
            .execute(conn)?;
        }
        Ok(users::table.find(user_id).first(conn)?)
    })?;
    let roles = roles::load_for_user(&mut conn, user_id)?;

    tracing::info!(user_id = %user_id, is_active = record.is_active, "user activation toggled");
    Ok(Json(UserResponse::new(record, roles)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    if let Some(problem) = password::validate_new_password(&payload.password, &payload.confirm_password)
    {
        return Err(AppError::bad_request(problem));
    }
    let hash = password::hash_password(&payload.password)?;

    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    conn.transaction::<_, AppError, _>(|conn| {
        let updated = diesel::update(users::table.find(user_id))
            .set((users::password_hash.eq(Some(hash)), users::updated_at.eq(now)))
            .execute(conn)?;
        if updated == 0 {
            return Err(AppError::not_found());
        }
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(now))
        .execute(conn)?;
        Ok(())
    })?;

    tracing::info!(user_id = %user_id, reset_by = %user.user_id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

/// Cases of a user plus the people on the other side: clients for an
/// attorney, attorneys for a client.
pub async fn profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ProfileResponse>> {
    if user.user_id != user_id {
        user.require_staff("You do not have permission to perform this action.")?;
    }
    let mut conn = state.db()?;
    let record: User = users::table.find(user_id).first(&mut conn)?;
    let role_set = roles::load_for_user(&mut conn, user_id)?;

    let assigned: Vec<Case> = case_assignments::table
        .inner_join(cases::table)
        .filter(case_assignments::user_id.eq(user_id))
        .order(cases::date_filed.desc())
        .select(cases::all_columns)
        .load(&mut conn)?;
    let case_ids: Vec<Uuid> = assigned.iter().map(|c| c.id).collect();

    let related_role = if role_set.contains(Role::Attorney) {
        Some((Role::Client, "Clients"))
    } else if role_set.contains(Role::Client) {
        Some((Role::Attorney, "Attorneys"))
    } else {
        None
    };

    let related_people = match related_role {
        Some((role, _)) => users::table
            .filter(
                users::id.eq_any(
                    case_assignments::table
                        .filter(case_assignments::case_id.eq_any(&case_ids))
                        .select(case_assignments::user_id),
                ),
            )
            .filter(
                users::id.eq_any(
                    user_roles::table
                        .filter(user_roles::role.eq(role.as_str()))
                        .select(user_roles::user_id),
                ),
            )
            .order(users::last_name.asc())
            .load::<User>(&mut conn)?
            .iter()
            .map(UserSummary::from)
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(ProfileResponse {
        user: UserResponse::new(record, role_set),
        cases: assigned
            .into_iter()
            .map(|c| ProfileCase {
                id: c.id,
                title: c.title,
                is_archived: c.is_archived,
            })
            .collect(),
        related_title: related_role.map(|(_, title)| title),
        related_people,
    }))
}

pub async fn reassign_client(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ReassignRequest>,
) -> AppResult<Json<ReassignResponse>> {
    user.require_admin()?;
    if payload.from_attorney_id == payload.to_attorney_id {
        return Err(AppError::bad_request("Choose two different attorneys."));
    }

    let mut conn = state.db()?;
    let attorney_ids = roles::users_with_role(&mut conn, Role::Attorney)?;
    if !attorney_ids.contains(&payload.to_attorney_id) {
        return Err(AppError::bad_request("The new attorney must hold the Attorney role."));
    }
    let client_roles = roles::load_for_user(&mut conn, payload.client_id)?;
    if !client_roles.contains(Role::Client) {
        return Err(AppError::bad_request("The selected user is not a client."));
    }

    let cases_updated = assignments::reassign_client(
        &mut conn,
        payload.client_id,
        payload.from_attorney_id,
        payload.to_attorney_id,
    )?;
    tracing::info!(
        client_id = %payload.client_id,
        from_attorney_id = %payload.from_attorney_id,
        to_attorney_id = %payload.to_attorney_id,
        cases_updated,
        "client reassigned"
    );
    Ok(Json(ReassignResponse { cases_updated }))
}
