mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use owlery::roles::Role;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct Stage {
    id: Uuid,
    name: String,
    order: i32,
}

#[derive(Deserialize)]
struct Workflow {
    id: Uuid,
    stages: Vec<Stage>,
}

#[derive(Deserialize)]
struct Member {
    id: Uuid,
}

#[derive(Deserialize)]
struct Case {
    id: Uuid,
    title: String,
    current_stage: Option<Stage>,
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct CaseDetail {
    id: Uuid,
    stages: Vec<Stage>,
    next_stage: Option<Stage>,
}

#[derive(Deserialize)]
struct Advance {
    status: String,
    stage: Stage,
    message: String,
}

#[derive(Deserialize)]
struct LogEntry {
    stage_name: String,
    completed_at: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[tokio::test]
async fn case_moves_through_workflow_stages() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, admin) = app.user_with_token("admin", &[Role::Admin]).await?;
    let (attorney_id, attorney) = app.user_with_token("atty", &[Role::Attorney]).await?;
    let (client_id, client) = app.user_with_token("client", &[Role::Client]).await?;

    let response = app
        .post_json(
            "/api/workflows",
            &json!({ "name": "Litigation", "stages": ["Intake", "Discovery", "Trial"] }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let workflow: Workflow = json_body(response).await?;
    let orders: Vec<i32> = workflow.stages.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let response = app
        .post_json("/api/workflows", &json!({ "name": "Sparse" }), Some(&admin))
        .await?;
    let sparse: Workflow = json_body(response).await?;
    let stages_path = format!("/api/workflows/{}/stages", sparse.id);
    let response = app
        .post_json(
            &stages_path,
            &json!({ "name": "Far away", "order": i32::MAX }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app
        .post_json(&stages_path, &json!({ "name": "After" }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/cases",
            &json!({
                "title": "Smith v. Jones",
                "workflow_id": workflow.id,
                "attorney_id": attorney_id,
                "client_id": client_id,
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let case: Case = json_body(response).await?;
    assert_eq!(case.title, "Smith v. Jones");
    assert_eq!(
        case.current_stage.as_ref().map(|s| s.name.as_str()),
        Some("Intake")
    );
    assert_eq!(case.members.len(), 2);

    let response = app
        .get(&format!("/api/cases/{}", case.id), Some(&client))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let detail: CaseDetail = json_body(response).await?;
    assert_eq!(detail.id, case.id);
    assert_eq!(detail.stages.len(), 3);
    assert_eq!(
        detail.next_stage.map(|s| s.id),
        Some(workflow.stages[1].id)
    );

    let response = app
        .post_json(
            &format!("/api/cases/{}/advance-stage", case.id),
            &json!({}),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: ErrorBody = json_body(response).await?;
    assert_eq!(error.error, "Only attorneys can advance a case stage.");

    for expected in ["Discovery", "Trial"] {
        let response = app
            .post_json(
                &format!("/api/cases/{}/advance-stage", case.id),
                &json!({}),
                Some(&attorney),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let advance: Advance = json_body(response).await?;
        assert_eq!(advance.status, "advanced");
        assert_eq!(advance.stage.name, expected);
        assert_eq!(advance.message, format!("Case stage advanced to: {expected}"));
    }

    let response = app
        .post_json(
            &format!("/api/cases/{}/advance-stage", case.id),
            &json!({}),
            Some(&attorney),
        )
        .await?;
    let advance: Advance = json_body(response).await?;
    assert_eq!(advance.status, "final_stage");
    assert_eq!(advance.stage.name, "Trial");

    let response = app
        .get(&format!("/api/cases/{}/stage-log", case.id), Some(&client))
        .await?;
    let log: Vec<LogEntry> = json_body(response).await?;
    let names: Vec<&str> = log.iter().map(|e| e.stage_name.as_str()).collect();
    assert_eq!(names, vec!["Intake", "Discovery", "Trial"]);
    let open: Vec<bool> = log.iter().map(|e| e.completed_at.is_none()).collect();
    assert_eq!(open, vec![false, false, true]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn case_access_follows_assignments() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, admin) = app.user_with_token("admin", &[Role::Admin]).await?;
    let (attorney_id, attorney) = app.user_with_token("atty", &[Role::Attorney]).await?;
    let (outsider_id, outsider) = app.user_with_token("outsider", &[Role::Client]).await?;

    let response = app
        .post_json("/api/cases", &json!({ "title": "Estate" }), Some(&attorney))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let case: Case = json_body(response).await?;
    assert!(case.current_stage.is_none());
    assert!(case.members.iter().any(|m| m.id == attorney_id));

    let response = app
        .post_json("/api/cases", &json!({ "title": "Nope" }), Some(&outsider))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/cases",
            &json!({ "title": "Ghost client", "client_id": Uuid::new_v4() }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorBody = json_body(response).await?;
    assert_eq!(error.error, "Unknown user.");

    let response = app
        .post_json(
            &format!("/api/cases/{}/advance-stage", case.id),
            &json!({}),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorBody = json_body(response).await?;
    assert_eq!(error.error, "This case has no workflow to advance.");

    let response = app
        .get(&format!("/api/cases/{}/stage-log", case.id), Some(&attorney))
        .await?;
    let log: Vec<LogEntry> = json_body(response).await?;
    assert!(log.is_empty());
    let response = app
        .get(&format!("/api/cases/{}", case.id), Some(&attorney))
        .await?;
    let unchanged: Case = json_body(response).await?;
    assert!(unchanged.current_stage.is_none());

    let response = app
        .get(&format!("/api/cases/{}", case.id), Some(&outsider))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.get("/api/cases", Some(&outsider)).await?;
    let visible: Vec<Case> = json_body(response).await?;
    assert!(visible.is_empty());

    let response = app
        .get(&format!("/api/cases/{}", Uuid::new_v4()), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let path = format!("/api/cases/{}/assignments", case.id);
    let response = app
        .post_json(&path, &json!({ "user_id": outsider_id }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app
        .post_json(&path, &json!({ "user_id": outsider_id }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .get(&format!("/api/cases/{}", case.id), Some(&outsider))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .delete(&format!("{path}/{outsider_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app
        .delete(&format!("{path}/{outsider_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .patch_json(
            &format!("/api/cases/{}", case.id),
            &json!({ "is_archived": true }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/api/cases", Some(&attorney)).await?;
    let active: Vec<Case> = json_body(response).await?;
    assert!(active.is_empty());
    let response = app
        .get("/api/cases?include_archived=true", Some(&attorney))
        .await?;
    let all: Vec<Case> = json_body(response).await?;
    assert_eq!(all.len(), 1);

    let response = app.get("/api/cases/dashboard", Some(&outsider)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .delete(&format!("/api/cases/{}", case.id), Some(&attorney))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .delete(&format!("/api/cases/{}", case.id), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.cleanup().await?;
    Ok(())
}
