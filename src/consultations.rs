//! Consultation intake: status rules and the scheduling email sent back to
//! the person who asked for a consultation.

use chrono::NaiveDateTime;
use serde::Serialize;

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_SCHEDULED: &str = "Scheduled";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_DECLINED: &str = "Declined";

pub const STATUSES: [&str; 4] = [
    STATUS_PENDING,
    STATUS_SCHEDULED,
    STATUS_COMPLETED,
    STATUS_DECLINED,
];

const SUBJECT_SERVICE_CHARS: usize = 30;

/// Canonical spelling of `status`, matched case-insensitively.
pub fn normalize_status(status: &str) -> Option<&'static str> {
    let trimmed = status.trim();
    STATUSES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(trimmed))
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleDetails {
    pub meeting_type: String,
    pub scheduled_time: Option<NaiveDateTime>,
    pub booking_link: Option<String>,
    pub additional_message: Option<String>,
}

impl ScheduleDetails {
    /// A confirmed time moves the request to `Scheduled`.
    pub fn resulting_status(&self) -> Option<&'static str> {
        self.scheduled_time.map(|_| STATUS_SCHEDULED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

pub fn schedule_email(
    requester_name: &str,
    requester_email: Option<&str>,
    service_needed: &str,
    attorney_name: &str,
    details: &ScheduleDetails,
) -> OutboundEmail {
    let service: String = service_needed.chars().take(SUBJECT_SERVICE_CHARS).collect();
    let subject = format!("Update on your Consultation Request: {service}...");

    let mut body = format!("Dear {requester_name},\n\n");
    body.push_str(&format!(
        "Attorney {attorney_name} has reviewed your request.\n\n"
    ));
    body.push_str(&format!("Meeting Type: {}\n", details.meeting_type));
    if let Some(time) = details.scheduled_time {
        body.push_str(&format!(
            "Confirmed Time: {}\n",
            time.format("%B %d, %Y at %I:%M %p")
        ));
    }
    if let Some(link) = non_blank(details.booking_link.as_deref()) {
        body.push_str(&format!("Please schedule your time here: {link}\n"));
    }
    if let Some(message) = non_blank(details.additional_message.as_deref()) {
        body.push_str(&format!("\nMessage from Attorney:\n{message}\n"));
    }
    body.push_str("\nBest regards,\nThe Owlery Legal Team");

    OutboundEmail {
        to: non_blank(requester_email).map(str::to_string),
        subject,
        body,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Mail is not delivered; the composed message goes to the log.
pub fn deliver(email: &OutboundEmail) -> bool {
    match &email.to {
        Some(to) => {
            tracing::info!(to = %to, subject = %email.subject, body = %email.body, "consultation email composed");
            true
        }
        None => {
            tracing::warn!(subject = %email.subject, "consultation has no email address, nothing sent");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn statuses_are_matched_case_insensitively() {
        assert_eq!(normalize_status("scheduled"), Some(STATUS_SCHEDULED));
        assert_eq!(normalize_status(" Declined "), Some(STATUS_DECLINED));
        assert_eq!(normalize_status("archived"), None);
    }

    #[test]
    fn confirmed_time_schedules_the_request() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let details = ScheduleDetails {
            meeting_type: "Video Call".into(),
            scheduled_time: Some(time),
            booking_link: None,
            additional_message: Some("Bring your lease.".into()),
        };
        assert_eq!(details.resulting_status(), Some(STATUS_SCHEDULED));

        let email = schedule_email(
            "Ada Smith",
            Some("ada@example.com"),
            "Landlord dispute over deposit and repairs",
            "Atticus Finch",
            &details,
        );
        assert_eq!(
            email.subject,
            "Update on your Consultation Request: Landlord dispute over deposit ..."
        );
        assert_eq!(
            email.body,
            "Dear Ada Smith,\n\n\
             Attorney Atticus Finch has reviewed your request.\n\n\
             Meeting Type: Video Call\n\
             Confirmed Time: March 07, 2024 at 09:05 AM\n\
             \nMessage from Attorney:\nBring your lease.\n\
             \nBest regards,\nThe Owlery Legal Team"
        );
        assert_eq!(email.to.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn booking_link_without_time_keeps_status() {
        let details = ScheduleDetails {
            meeting_type: "Phone".into(),
            scheduled_time: None,
            booking_link: Some("https://cal.example.com/finch".into()),
            additional_message: Some("   ".into()),
        };
        assert_eq!(details.resulting_status(), None);
        let email = schedule_email("Bo", None, "Wills", "A F", &details);
        assert!(email
            .body
            .contains("Please schedule your time here: https://cal.example.com/finch\n"));
        assert!(!email.body.contains("Message from Attorney"));
        assert!(email.to.is_none());
        assert!(!deliver(&email));
    }
}
