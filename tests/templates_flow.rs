mod common;

use std::io::{Cursor, Read, Write};

use anyhow::Result;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use common::{acquire_db_lock, body_to_vec, json_body, TestApp};
use owlery::roles::Role;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Deserialize)]
struct Case {
    id: Uuid,
}

#[derive(Deserialize)]
struct Uploaded {
    kind: String,
    id: Uuid,
}

#[derive(Deserialize)]
struct Document {
    id: Uuid,
    title: String,
    original_name: String,
}

#[derive(Deserialize)]
struct LogEntry {
    action: String,
}

#[derive(Deserialize)]
struct ContractTemplate {
    id: Uuid,
    name: String,
    is_public: bool,
}

fn docx_with_body(text: &str) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("[Content_Types].xml", SimpleFileOptions::default())?;
    writer.write_all(b"<?xml version=\"1.0\"?><Types/>")?;
    writer.start_file("word/document.xml", SimpleFileOptions::default())?;
    writer.write_all(
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"
        )
        .as_bytes(),
    )?;
    Ok(writer.finish()?.into_inner())
}

fn document_xml(docx: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;
    Ok(xml)
}

#[tokio::test]
async fn docx_template_generates_case_document() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, admin) = app.user_with_token("admin", &[Role::Admin]).await?;
    let (_, attorney) = app.user_with_token("atty", &[Role::Attorney]).await?;

    let template = docx_with_body("Re: {{case_title}}")?;
    let response = app
        .upload_multipart(
            "/api/templates",
            "engagement.docx",
            DOCX,
            &template,
            &[("name", "Engagement letter"), ("is_public", "true")],
            &attorney,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .upload_multipart(
            "/api/templates",
            "notes.txt",
            "text/plain",
            b"plain text",
            &[],
            &admin,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .upload_multipart(
            "/api/templates",
            "engagement.docx",
            DOCX,
            &template,
            &[("name", "Engagement letter"), ("is_public", "true")],
            &admin,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let uploaded: Uploaded = json_body(response).await?;
    assert_eq!(uploaded.kind, "docx");

    let response = app
        .post_json("/api/cases", &json!({ "title": "Acme merger" }), Some(&attorney))
        .await?;
    let case: Case = json_body(response).await?;

    let response = app
        .post_json(
            &format!("/api/cases/{}/generate", case.id),
            &json!({ "template_id": uploaded.id }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let document: Document = json_body(response).await?;
    assert_eq!(document.title, "Generated: Engagement letter");
    assert_eq!(document.original_name, "Generated_Engagement_letter.docx");

    let stored = app
        .storage()
        .get(&format!("cases/{}/documents/{}", case.id, document.id))
        .await;
    let stored = stored.expect("generated document is stored");
    let xml = document_xml(&stored.bytes)?;
    assert!(xml.contains("Re: Acme merger"));

    let response = app
        .get(&format!("/api/documents/{}/logs", document.id), Some(&attorney))
        .await?;
    let logs: Vec<LogEntry> = json_body(response).await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "Generated");

    let response = app
        .post_json(
            &format!("/api/cases/{}/generate", case.id),
            &json!({ "template_id": Uuid::new_v4() }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn contract_templates_respect_visibility_and_ownership() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, author) = app.user_with_token("author", &[Role::Attorney]).await?;
    let (_, colleague) = app.user_with_token("colleague", &[Role::Attorney]).await?;

    let response = app
        .post_json(
            "/api/contract-templates",
            &json!({ "name": "Lease", "content": "<p>Between {{LESSOR}} and {{LESSEE}}</p>" }),
            Some(&author),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: ContractTemplate = json_body(response).await?;
    assert!(!created.is_public);
    let path = format!("/api/contract-templates/{}", created.id);

    let response = app.get(&path, Some(&colleague)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.get("/api/contract-templates", Some(&colleague)).await?;
    let visible: Vec<ContractTemplate> = json_body(response).await?;
    assert!(visible.is_empty());

    let response = app
        .patch_json(&path, &json!({ "is_public": true }), Some(&author))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&path, Some(&colleague)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .patch_json(&path, &json!({ "name": "Mine now" }), Some(&colleague))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get(&format!("{path}/content"), Some(&colleague))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let body = body_to_vec(response.into_body()).await?;
    assert_eq!(body, b"<p>Between {{LESSOR}} and {{LESSEE}}</p>");

    let response = app
        .patch_json(&path, &json!({ "name": "Residential lease" }), Some(&author))
        .await?;
    let renamed: ContractTemplate = json_body(response).await?;
    assert_eq!(renamed.name, "Residential lease");

    let response = app.delete(&path, Some(&colleague)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.delete(&path, Some(&author)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.get(&path, Some(&author)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}
