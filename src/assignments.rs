//! Case membership: who is on a case, and moving a client's cases from one
//! attorney to another.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{CaseAssignment, NewCaseAssignment, User};
use crate::schema::{case_assignments, users};

pub fn assign(conn: &mut PgConnection, case_id: Uuid, user_id: Uuid) -> QueryResult<CaseAssignment> {
    let id = Uuid::new_v4();
    diesel::insert_into(case_assignments::table)
        .values(&NewCaseAssignment {
            id,
            case_id,
            user_id,
        })
        .execute(conn)?;
    case_assignments::table.find(id).first(conn)
}

pub fn unassign(conn: &mut PgConnection, case_id: Uuid, user_id: Uuid) -> QueryResult<usize> {
    diesel::delete(
        case_assignments::table
            .filter(case_assignments::case_id.eq(case_id))
            .filter(case_assignments::user_id.eq(user_id)),
    )
    .execute(conn)
}

/// Assigned users in assignment order.
pub fn members(conn: &mut PgConnection, case_id: Uuid) -> QueryResult<Vec<User>> {
    case_assignments::table
        .inner_join(users::table)
        .filter(case_assignments::case_id.eq(case_id))
        .order(case_assignments::created_at.asc())
        .select(users::all_columns)
        .load(conn)
}

/// Cases where `from` should be swapped for `to`, and the subset where `to`
/// is already present and only `from` needs removing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReassignmentPlan {
    pub swap: Vec<Uuid>,
    pub drop_only: Vec<Uuid>,
}

pub fn plan_reassignment(cases_with_from: &[Uuid], cases_with_to: &[Uuid]) -> ReassignmentPlan {
    let mut plan = ReassignmentPlan::default();
    for case_id in cases_with_from {
        if cases_with_to.contains(case_id) {
            plan.drop_only.push(*case_id);
        } else {
            plan.swap.push(*case_id);
        }
    }
    plan
}

/// On every case the client is assigned to, replaces `from_attorney` with
/// `to_attorney`. Returns the number of cases touched.
pub fn reassign_client(
    conn: &mut PgConnection,
    client_id: Uuid,
    from_attorney: Uuid,
    to_attorney: Uuid,
) -> QueryResult<usize> {
    conn.transaction(|conn| {
        let client_cases: Vec<Uuid> = case_assignments::table
            .filter(case_assignments::user_id.eq(client_id))
            .select(case_assignments::case_id)
            .load(conn)?;

        let with_from: Vec<Uuid> = case_assignments::table
            .filter(case_assignments::case_id.eq_any(&client_cases))
            .filter(case_assignments::user_id.eq(from_attorney))
            .select(case_assignments::case_id)
            .for_update()
            .load(conn)?;
        let with_to: Vec<Uuid> = case_assignments::table
            .filter(case_assignments::case_id.eq_any(&with_from))
            .filter(case_assignments::user_id.eq(to_attorney))
            .select(case_assignments::case_id)
            .load(conn)?;

        let plan = plan_reassignment(&with_from, &with_to);

        if !plan.swap.is_empty() {
            diesel::update(
                case_assignments::table
                    .filter(case_assignments::case_id.eq_any(&plan.swap))
                    .filter(case_assignments::user_id.eq(from_attorney)),
            )
            .set(case_assignments::user_id.eq(to_attorney))
            .execute(conn)?;
        }
        if !plan.drop_only.is_empty() {
            diesel::delete(
                case_assignments::table
                    .filter(case_assignments::case_id.eq_any(&plan.drop_only))
                    .filter(case_assignments::user_id.eq(from_attorney)),
            )
            .execute(conn)?;
        }

        Ok(plan.swap.len() + plan.drop_only.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cases_already_staffed_by_target_only_drop_the_old_attorney() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let plan = plan_reassignment(&[a, b, c], &[b]);
        assert_eq!(plan.swap, vec![a, c]);
        assert_eq!(plan.drop_only, vec![b]);
    }

    #[test]
    fn nothing_to_move_without_the_old_attorney() {
        assert_eq!(plan_reassignment(&[], &[Uuid::new_v4()]), ReassignmentPlan::default());
    }
}
