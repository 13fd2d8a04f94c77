mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use owlery::roles::Role;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct Case {
    id: Uuid,
}

#[derive(Deserialize)]
struct Meeting {
    id: Uuid,
    title: String,
    duration_minutes: i32,
    participant_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct DueDate {
    id: Uuid,
    is_completed: bool,
}

#[derive(Deserialize)]
struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    end: Option<String>,
}

#[tokio::test]
async fn meetings_and_due_dates_reach_the_calendar() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (attorney_id, attorney) = app.user_with_token("atty", &[Role::Attorney]).await?;
    let (client_id, client) = app.user_with_token("client", &[Role::Client]).await?;
    let (stranger_id, stranger) = app.user_with_token("stranger", &[Role::Client]).await?;

    let response = app
        .post_json(
            "/api/cases",
            &json!({ "title": "Custody", "client_id": client_id }),
            Some(&attorney),
        )
        .await?;
    let case: Case = json_body(response).await?;

    let response = app
        .post_json(
            "/api/meetings",
            &json!({
                "case_id": case.id,
                "title": "Kickoff",
                "meeting_type": "teleport",
                "scheduled_time": "2030-03-04T10:00:00",
            }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/meetings",
            &json!({
                "case_id": case.id,
                "title": "Kickoff",
                "meeting_type": "video",
                "scheduled_time": "2030-03-04T10:00:00",
                "participant_ids": [stranger_id],
            }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/meetings",
            &json!({
                "case_id": case.id,
                "title": "Kickoff",
                "meeting_type": "video",
                "scheduled_time": "2030-03-04T10:00:00",
                "participant_ids": [client_id, attorney_id, client_id],
            }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let meeting: Meeting = json_body(response).await?;
    assert_eq!(meeting.duration_minutes, 60);
    assert_eq!(meeting.participant_ids.len(), 2);

    let response = app
        .post_json(
            "/api/meetings",
            &json!({
                "case_id": case.id,
                "title": "Client-run",
                "meeting_type": "phone",
                "scheduled_time": "2030-03-05T10:00:00",
            }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch_json(
            &format!("/api/meetings/{}", meeting.id),
            &json!({ "title": "Hijack" }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch_json(
            &format!("/api/meetings/{}", meeting.id),
            &json!({ "title": "Kickoff call", "duration_minutes": 30 }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Meeting = json_body(response).await?;
    assert_eq!(updated.title, "Kickoff call");
    assert_eq!(updated.duration_minutes, 30);

    let response = app.get("/api/meetings", Some(&client)).await?;
    let mine: Vec<Meeting> = json_body(response).await?;
    assert_eq!(mine.len(), 1);
    let response = app.get("/api/meetings", Some(&stranger)).await?;
    let none: Vec<Meeting> = json_body(response).await?;
    assert!(none.is_empty());
    let response = app
        .get(&format!("/api/meetings/{}", meeting.id), Some(&stranger))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let due_path = format!("/api/cases/{}/due-dates", case.id);
    let response = app
        .post_json(
            &due_path,
            &json!({ "document_name": "Financial affidavit", "due_date": "2030-03-10T17:00:00" }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .post_json(
            &due_path,
            &json!({ "document_name": "Financial affidavit", "due_date": "2030-03-10T17:00:00" }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let due: DueDate = json_body(response).await?;
    assert!(!due.is_completed);

    let response = app
        .patch_json(
            &format!("/api/due-dates/{}", due.id),
            &json!({ "due_date": "2030-04-01T17:00:00" }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .patch_json(
            &format!("/api/due-dates/{}", due.id),
            &json!({ "is_completed": true }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let done: DueDate = json_body(response).await?;
    assert!(done.is_completed);

    let response = app.get("/api/calendar/events", Some(&client)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let events: Vec<Event> = json_body(response).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, "meeting");
    assert_eq!(events[0].id, format!("meeting-{}", meeting.id));
    assert_eq!(
        events[0].end.as_deref(),
        Some("2030-03-04T10:30:00+00:00")
    );
    assert_eq!(events[1].kind, "document");
    assert!(events[1].end.is_none());

    let response = app.get("/api/calendar/events", Some(&stranger)).await?;
    let empty: Vec<Event> = json_body(response).await?;
    assert!(empty.is_empty());

    let response = app
        .delete(&format!("/api/meetings/{}", meeting.id), Some(&attorney))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.cleanup().await?;
    Ok(())
}
