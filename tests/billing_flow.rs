mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use owlery::roles::Role;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct Case {
    id: Uuid,
}

#[derive(Deserialize)]
struct TimeEntry {
    hours: Decimal,
    hourly_rate: Decimal,
    amount: Decimal,
}

#[derive(Deserialize)]
struct InvoiceItem {
    quantity: Decimal,
    amount: Decimal,
}

#[derive(Deserialize)]
struct Invoice {
    id: Uuid,
    status: String,
    total: Decimal,
    #[serde(default)]
    items: Option<Vec<InvoiceItem>>,
}

#[tokio::test]
async fn invoices_bill_each_entry_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, attorney) = app.user_with_token("atty", &[Role::Attorney]).await?;
    let (client_id, client) = app.user_with_token("client", &[Role::Client]).await?;

    let response = app
        .post_json(
            "/api/cases",
            &json!({ "title": "Lease review", "client_id": client_id }),
            Some(&attorney),
        )
        .await?;
    let case: Case = json_body(response).await?;
    let entries = format!("/api/cases/{}/time-entries", case.id);
    let invoices = format!("/api/cases/{}/invoices", case.id);

    let response = app
        .post_json(
            &entries,
            &json!({ "hours": "1.5", "description": "Drafting" }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry: TimeEntry = json_body(response).await?;
    assert_eq!(entry.hours, Decimal::new(15, 1));
    assert_eq!(entry.hourly_rate, Decimal::new(250, 0));
    assert_eq!(entry.amount, Decimal::new(375, 0));

    let response = app
        .post_json(
            &entries,
            &json!({ "hours": "2", "hourly_rate": "100", "description": "Call" }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post_json(
            &entries,
            &json!({ "hours": "3", "description": "Research", "is_billable": false }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post_json(
            &entries,
            &json!({ "hours": "0", "description": "Nothing" }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &entries,
            &json!({ "hours": "1", "description": "Self-billing" }),
            Some(&client),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get(&entries, Some(&client)).await?;
    let listed: Vec<TimeEntry> = json_body(response).await?;
    assert_eq!(listed.len(), 3);

    let response = app
        .post_json(
            &invoices,
            &json!({ "issued_date": "2024-05-01", "due_date": "2024-04-01" }),
            Some(&attorney),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(&invoices, &json!({ "due_date": "2999-01-01" }), Some(&attorney))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let invoice: Invoice = json_body(response).await?;
    assert_eq!(invoice.status, "draft");
    assert_eq!(invoice.total, Decimal::new(575, 0));
    let items = invoice.items.unwrap_or_default();
    assert_eq!(items.len(), 2);
    let total: Decimal = items.iter().map(|item| item.amount).sum();
    assert_eq!(total, Decimal::new(575, 0));
    assert!(items.iter().all(|item| item.quantity > Decimal::ZERO));

    let response = app.post_json(&invoices, &json!({}), Some(&attorney)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/api/invoices/{}", invoice.id), Some(&client))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Invoice = json_body(response).await?;
    assert_eq!(fetched.items.map(|items| items.len()), Some(2));

    let response = app
        .get(&format!("{invoices}?status=draft"), Some(&client))
        .await?;
    let drafts: Vec<Invoice> = json_body(response).await?;
    assert_eq!(drafts.len(), 1);
    let response = app
        .get(&format!("{invoices}?status=overdue"), Some(&client))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
