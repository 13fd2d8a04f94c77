use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{Message, NewMessage};
use crate::schema::{case_assignments, messages};

/// The first other member of the case, or the sender when nobody else is
/// assigned.
pub fn pick_recipient(members: &[Uuid], sender: Uuid) -> Uuid {
    members
        .iter()
        .copied()
        .find(|member| *member != sender)
        .unwrap_or(sender)
}

pub fn send(
    conn: &mut PgConnection,
    case_id: Uuid,
    sender_id: Uuid,
    subject: &str,
    body: &str,
) -> QueryResult<Message> {
    let members: Vec<Uuid> = case_assignments::table
        .filter(case_assignments::case_id.eq(case_id))
        .order(case_assignments::created_at.asc())
        .select(case_assignments::user_id)
        .load(conn)?;

    let id = Uuid::new_v4();
    diesel::insert_into(messages::table)
        .values(&NewMessage {
            id,
            case_id,
            sender_id,
            recipient_id: pick_recipient(&members, sender_id),
            subject: subject.to_string(),
            body: body.to_string(),
        })
        .execute(conn)?;
    messages::table.find(id).first(conn)
}

/// Messages on the case the user sent or received, oldest first.
pub fn thread_for(conn: &mut PgConnection, case_id: Uuid, user_id: Uuid) -> QueryResult<Vec<Message>> {
    messages::table
        .filter(messages::case_id.eq(case_id))
        .filter(
            messages::sender_id
                .eq(user_id)
                .or(messages::recipient_id.eq(user_id)),
        )
        .order(messages::sent_at.asc())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::pick_recipient;
    use uuid::Uuid;

    #[test]
    fn first_other_member_receives() {
        let sender = Uuid::new_v4();
        let attorney = Uuid::new_v4();
        let paralegal = Uuid::new_v4();
        assert_eq!(pick_recipient(&[sender, attorney, paralegal], sender), attorney);
    }

    #[test]
    fn lone_sender_writes_to_self() {
        let sender = Uuid::new_v4();
        assert_eq!(pick_recipient(&[sender], sender), sender);
        assert_eq!(pick_recipient(&[], sender), sender);
    }
}
