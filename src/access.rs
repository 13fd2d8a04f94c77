//! Case-level access gate.
//!
//! Every handler that touches a case (or something owned by a case) goes
//! through [`require_case_access`]. Admins see everything; everyone else
//! only sees cases they are assigned to.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::Case,
    roles::RoleSet,
    schema::{case_assignments, cases},
};

pub const CASE_DENIED_MESSAGE: &str = "You do not have permission to view that case.";

pub fn permits(roles: RoleSet, is_assigned: bool) -> bool {
    roles.is_admin() || is_assigned
}

pub fn is_assigned(conn: &mut PgConnection, case_id: Uuid, user_id: Uuid) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        case_assignments::table
            .filter(case_assignments::case_id.eq(case_id))
            .filter(case_assignments::user_id.eq(user_id)),
    ))
    .get_result(conn)
}

/// Loads the case or fails with 404, then applies the gate (403).
pub fn require_case_access(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    case_id: Uuid,
) -> AppResult<Case> {
    let case: Case = cases::table.find(case_id).first(conn)?;
    let assigned = if user.is_admin() {
        true
    } else {
        is_assigned(conn, case_id, user.user_id)?
    };
    if !permits(user.roles, assigned) {
        tracing::info!(
            case_id = %case_id,
            user_id = %user.user_id,
            "case access denied"
        );
        return Err(AppError::forbidden(CASE_DENIED_MESSAGE));
    }
    Ok(case)
}

/// Ids of the cases visible to `user`.
pub fn visible_case_ids(conn: &mut PgConnection, user: &AuthenticatedUser) -> QueryResult<Vec<Uuid>> {
    if user.is_admin() {
        cases::table.select(cases::id).load(conn)
    } else {
        case_assignments::table
            .filter(case_assignments::user_id.eq(user.user_id))
            .select(case_assignments::case_id)
            .load(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::permits;
    use crate::roles::{Role, RoleSet};

    #[test]
    fn admin_is_always_permitted() {
        let admin: RoleSet = [Role::Admin].into_iter().collect();
        assert!(permits(admin, false));
        assert!(permits(admin, true));
    }

    #[test]
    fn non_admin_needs_assignment() {
        for role in [Role::Attorney, Role::Client] {
            let roles: RoleSet = [role].into_iter().collect();
            assert!(!permits(roles, false));
            assert!(permits(roles, true));
        }
    }

    #[test]
    fn user_without_roles_follows_assignment() {
        assert!(!permits(RoleSet::empty(), false));
        assert!(permits(RoleSet::empty(), true));
    }
}
