use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{DocumentDueDate, Meeting, User};
use crate::schema::{case_assignments, cases, document_due_dates, meeting_participants, meetings, users};

pub const MEETING_COLOR: &str = "#c4a24c";
pub const DUE_OPEN_COLOR: &str = "#ff6b6b";
pub const DUE_DONE_COLOR: &str = "#51cf66";

pub const MEETING_TYPES: &[&str] = &["in_person", "phone", "video"];
pub const DEFAULT_MEETING_MINUTES: i32 = 60;

pub fn is_meeting_type(value: &str) -> bool {
    MEETING_TYPES.contains(&value)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "backgroundColor")]
    pub background_color: &'static str,
    #[serde(rename = "borderColor")]
    pub border_color: &'static str,
    #[serde(rename = "extendedProps")]
    pub extended_props: Value,
}

pub struct MeetingEntry {
    pub meeting: Meeting,
    pub case_title: String,
    pub organizer: User,
    pub participants: Vec<User>,
}

fn iso(ts: NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339()
}

pub fn meeting_event(entry: &MeetingEntry) -> CalendarEvent {
    let meeting = &entry.meeting;
    let end = meeting.scheduled_time + Duration::minutes(i64::from(meeting.duration_minutes));
    let participants: Vec<String> = entry.participants.iter().map(User::display_name).collect();

    CalendarEvent {
        id: format!("meeting-{}", meeting.id),
        title: format!("📞 {}", meeting.title),
        start: iso(meeting.scheduled_time),
        end: Some(iso(end)),
        kind: "meeting",
        background_color: MEETING_COLOR,
        border_color: MEETING_COLOR,
        extended_props: json!({
            "meetingId": meeting.id,
            "caseTitle": entry.case_title,
            "caseId": meeting.case_id,
            "meetingType": meeting.meeting_type,
            "description": meeting
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "No description provided".to_string()),
            "duration": meeting.duration_minutes,
            "organizer": entry.organizer.display_name(),
            "participants": participants.join(", "),
            "scheduledTime": meeting.scheduled_time.format("%B %d, %Y at %I:%M %p").to_string(),
        }),
    }
}

pub fn due_date_event(due: &DocumentDueDate, case_title: &str) -> CalendarEvent {
    let color = if due.is_completed {
        DUE_DONE_COLOR
    } else {
        DUE_OPEN_COLOR
    };
    CalendarEvent {
        id: format!("document-{}", due.id),
        title: format!("📄 {}", due.document_name),
        start: iso(due.due_date),
        end: None,
        kind: "document",
        background_color: color,
        border_color: color,
        extended_props: json!({ "caseTitle": case_title }),
    }
}

/// Meetings the user takes part in followed by due dates on the user's cases.
pub fn events_for_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<CalendarEvent>> {
    let rows: Vec<(Meeting, String)> = meetings::table
        .inner_join(meeting_participants::table)
        .inner_join(cases::table)
        .filter(meeting_participants::user_id.eq(user_id))
        .order(meetings::scheduled_time.asc())
        .select((meetings::all_columns, cases::title))
        .load(conn)?;

    let meeting_ids: Vec<Uuid> = rows.iter().map(|(meeting, _)| meeting.id).collect();
    let attendees: Vec<(Uuid, User)> = meeting_participants::table
        .inner_join(users::table)
        .filter(meeting_participants::meeting_id.eq_any(&meeting_ids))
        .order(users::last_name.asc())
        .select((meeting_participants::meeting_id, users::all_columns))
        .load(conn)?;
    let mut by_meeting: HashMap<Uuid, Vec<User>> = HashMap::new();
    for (meeting_id, user) in attendees {
        by_meeting.entry(meeting_id).or_default().push(user);
    }

    let mut events = Vec::with_capacity(rows.len());
    for (meeting, case_title) in rows {
        let organizer: User = users::table.find(meeting.organizer_id).first(conn)?;
        let participants = by_meeting.remove(&meeting.id).unwrap_or_default();
        events.push(meeting_event(&MeetingEntry {
            meeting,
            case_title,
            organizer,
            participants,
        }));
    }

    let due: Vec<(DocumentDueDate, String)> = document_due_dates::table
        .inner_join(cases::table)
        .filter(
            document_due_dates::case_id.eq_any(
                case_assignments::table
                    .filter(case_assignments::user_id.eq(user_id))
                    .select(case_assignments::case_id),
            ),
        )
        .order(document_due_dates::due_date.asc())
        .select((document_due_dates::all_columns, cases::title))
        .load(conn)?;
    events.extend(due.iter().map(|(due, title)| due_date_event(due, title)));

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn user(first: &str, last: &str, username: &str) -> User {
        let now = Utc::now().naive_utc();
        User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: None,
            first_name: first.into(),
            last_name: last.into(),
            password_hash: None,
            is_active: true,
            phone: String::new(),
            firm_role: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_known_meeting_types_are_accepted() {
        assert!(is_meeting_type("video"));
        assert!(is_meeting_type("in_person"));
        assert!(!is_meeting_type("In Person"));
        assert!(!is_meeting_type(""));
    }

    #[test]
    fn meeting_event_ends_after_duration() {
        let entry = MeetingEntry {
            meeting: Meeting {
                id: Uuid::new_v4(),
                case_id: Uuid::new_v4(),
                organizer_id: Uuid::new_v4(),
                title: "Deposition prep".into(),
                description: None,
                meeting_type: "video".into(),
                scheduled_time: at(14, 30),
                duration_minutes: 45,
                created_at: at(9, 0),
            },
            case_title: "Smith v. Jones".into(),
            organizer: user("", "", "afinch"),
            participants: vec![user("Ada", "Smith", "ada"), user("", "", "bob")],
        };
        let event = meeting_event(&entry);
        assert!(event.id.starts_with("meeting-"));
        assert_eq!(event.title, "📞 Deposition prep");
        assert_eq!(event.end.as_deref(), Some("2024-06-03T15:15:00+00:00"));
        assert_eq!(event.background_color, MEETING_COLOR);
        assert_eq!(event.extended_props["organizer"], "afinch");
        assert_eq!(event.extended_props["participants"], "Ada Smith, bob");
        assert_eq!(event.extended_props["description"], "No description provided");
        assert_eq!(event.extended_props["scheduledTime"], "June 03, 2024 at 02:30 PM");
    }

    #[test]
    fn due_dates_are_colored_by_completion() {
        let mut due = DocumentDueDate {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            document_name: "Signed retainer".into(),
            due_date: at(17, 0),
            is_completed: false,
            created_at: at(8, 0),
        };
        let open = due_date_event(&due, "Estate of Smith");
        assert_eq!(open.background_color, DUE_OPEN_COLOR);
        assert_eq!(open.title, "📄 Signed retainer");
        assert!(open.end.is_none());

        due.is_completed = true;
        let done = due_date_event(&due, "Estate of Smith");
        assert_eq!(done.background_color, DUE_DONE_COLOR);
        assert_eq!(done.border_color, DUE_DONE_COLOR);
    }

    #[test]
    fn due_date_event_serializes_without_end() {
        let due = DocumentDueDate {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            document_name: "W-2".into(),
            due_date: at(12, 0),
            is_completed: false,
            created_at: at(8, 0),
        };
        let value = serde_json::to_value(due_date_event(&due, "Tax")).unwrap();
        assert!(value.get("end").is_none());
        assert_eq!(value["type"], "document");
        assert_eq!(value["extendedProps"]["caseTitle"], "Tax");
    }
}
