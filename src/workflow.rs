use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Case, CaseStage, NewCaseStageLog};
use crate::schema::{case_stage_logs, case_stages, cases};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("This case has no workflow to advance.")]
    NoWorkflow,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { from: CaseStage, to: CaseStage },
    FinalStage { current: CaseStage },
}

/// Where a case should go from `current`: the stage ordered directly after it
/// in the same workflow, or `None` when it is already last.
pub fn next_stage<'a>(stages: &'a [CaseStage], current: &CaseStage) -> Option<&'a CaseStage> {
    stages
        .iter()
        .find(|stage| {
            stage.workflow_id == current.workflow_id
                && current.stage_order.checked_add(1) == Some(stage.stage_order)
        })
}

/// Order for a stage appended after `last`, or `None` when it would overflow.
pub fn appended_order(last: Option<i32>) -> Option<i32> {
    last.unwrap_or(0).checked_add(1)
}

pub fn first_stage(stages: &[CaseStage]) -> Option<&CaseStage> {
    stages.iter().find(|stage| stage.stage_order == 1)
}

pub fn load_stages(conn: &mut PgConnection, workflow_id: Uuid) -> QueryResult<Vec<CaseStage>> {
    case_stages::table
        .filter(case_stages::workflow_id.eq(workflow_id))
        .order(case_stages::stage_order.asc())
        .load(conn)
}

/// Puts a freshly created case on the first stage of its workflow and opens
/// the stage log. Does nothing when the workflow has no stage with order 1.
pub fn start_workflow(
    conn: &mut PgConnection,
    case_id: Uuid,
    workflow_id: Uuid,
) -> QueryResult<Option<CaseStage>> {
    let stages = load_stages(conn, workflow_id)?;
    let Some(first) = first_stage(&stages).cloned() else {
        return Ok(None);
    };

    let now = Utc::now().naive_utc();
    diesel::update(cases::table.find(case_id))
        .set((
            cases::current_stage_id.eq(Some(first.id)),
            cases::updated_at.eq(now),
        ))
        .execute(conn)?;
    diesel::insert_into(case_stage_logs::table)
        .values(&NewCaseStageLog {
            id: Uuid::new_v4(),
            case_id,
            stage_id: first.id,
            entered_at: now,
        })
        .execute(conn)?;

    Ok(Some(first))
}

/// Moves the case one stage forward.
///
/// The case row is locked for the duration of the transaction so concurrent
/// advances serialize; the partial unique index on open log rows backs this up.
pub fn advance_stage(conn: &mut PgConnection, case_id: Uuid) -> WorkflowResult<AdvanceOutcome> {
    conn.transaction(|conn| {
        let case: Case = cases::table.find(case_id).for_update().first(conn)?;

        let (Some(workflow_id), Some(current_stage_id)) = (case.workflow_id, case.current_stage_id)
        else {
            return Err(WorkflowError::NoWorkflow);
        };

        let stages = load_stages(conn, workflow_id)?;
        let Some(current) = stages.iter().find(|stage| stage.id == current_stage_id).cloned() else {
            return Err(WorkflowError::NoWorkflow);
        };

        let Some(next) = next_stage(&stages, &current).cloned() else {
            return Ok(AdvanceOutcome::FinalStage { current });
        };

        let now = Utc::now().naive_utc();

        diesel::update(
            case_stage_logs::table
                .filter(case_stage_logs::case_id.eq(case_id))
                .filter(case_stage_logs::stage_id.eq(current.id))
                .filter(case_stage_logs::completed_at.is_null()),
        )
        .set(case_stage_logs::completed_at.eq(Some(now)))
        .execute(conn)?;

        diesel::update(cases::table.find(case_id))
            .set((
                cases::current_stage_id.eq(Some(next.id)),
                cases::updated_at.eq(now),
            ))
            .execute(conn)?;

        diesel::insert_into(case_stage_logs::table)
            .values(&NewCaseStageLog {
                id: Uuid::new_v4(),
                case_id,
                stage_id: next.id,
                entered_at: now,
            })
            .execute(conn)?;

        Ok(AdvanceOutcome::Advanced {
            from: current,
            to: next,
        })
    })
}

/// Case ids whose log does not have exactly one open row for the current stage.
pub fn inconsistent_cases(conn: &mut PgConnection) -> QueryResult<Vec<Uuid>> {
    let staged: Vec<(Uuid, Option<Uuid>)> = cases::table
        .filter(cases::workflow_id.is_not_null())
        .select((cases::id, cases::current_stage_id))
        .load(conn)?;

    let mut broken = Vec::new();
    for (case_id, current) in staged {
        let open: Vec<Uuid> = case_stage_logs::table
            .filter(case_stage_logs::case_id.eq(case_id))
            .filter(case_stage_logs::completed_at.is_null())
            .select(case_stage_logs::stage_id)
            .load(conn)?;
        let consistent = match current {
            Some(stage_id) => open == [stage_id],
            None => open.is_empty(),
        };
        if !consistent {
            broken.push(case_id);
        }
    }
    Ok(broken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(workflow_id: Uuid, order: i32) -> CaseStage {
        CaseStage {
            id: Uuid::new_v4(),
            workflow_id,
            name: format!("Stage {order}"),
            stage_order: order,
        }
    }

    #[test]
    fn next_stage_follows_order() {
        let wf = Uuid::new_v4();
        let stages = vec![stage(wf, 1), stage(wf, 2), stage(wf, 3)];
        assert_eq!(next_stage(&stages, &stages[0]), Some(&stages[1]));
        assert_eq!(next_stage(&stages, &stages[1]), Some(&stages[2]));
    }

    #[test]
    fn last_stage_has_no_successor() {
        let wf = Uuid::new_v4();
        let stages = vec![stage(wf, 1), stage(wf, 2)];
        assert_eq!(next_stage(&stages, &stages[1]), None);
    }

    #[test]
    fn gap_in_ordering_stops_progression() {
        let wf = Uuid::new_v4();
        let stages = vec![stage(wf, 1), stage(wf, 3)];
        assert_eq!(next_stage(&stages, &stages[0]), None);
    }

    #[test]
    fn never_crosses_into_another_workflow() {
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let stages = vec![stage(ours, 1), stage(theirs, 2)];
        assert_eq!(next_stage(&stages, &stages[0]), None);
    }

    #[test]
    fn walking_n_stages_takes_n_minus_one_steps() {
        let wf = Uuid::new_v4();
        let stages: Vec<CaseStage> = (1..=5).map(|order| stage(wf, order)).collect();
        let mut current = first_stage(&stages).unwrap();
        let mut steps = 0;
        while let Some(next) = next_stage(&stages, current) {
            assert_eq!(next.stage_order, current.stage_order + 1);
            current = next;
            steps += 1;
        }
        assert_eq!(steps, 4);
        assert_eq!(current.stage_order, 5);
    }

    #[test]
    fn appended_order_follows_last_and_stops_at_i32_max() {
        assert_eq!(appended_order(None), Some(1));
        assert_eq!(appended_order(Some(4)), Some(5));
        assert_eq!(appended_order(Some(i32::MAX)), None);

        let wf = Uuid::new_v4();
        let stages = vec![stage(wf, i32::MAX)];
        assert_eq!(next_stage(&stages, &stages[0]), None);
    }

    #[test]
    fn first_stage_requires_order_one() {
        let wf = Uuid::new_v4();
        assert!(first_stage(&[stage(wf, 2)]).is_none());
        assert!(first_stage(&[]).is_none());
    }
}
