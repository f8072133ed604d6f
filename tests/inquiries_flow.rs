mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_json, TestApp};
use serde_json::{json, Value};

fn contact(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "phone": "0917 555 0101",
        "company": "Acme Foods",
        "service_type": "garbage_collection",
        "message": "Need weekly pickups"
    })
}

#[tokio::test]
async fn public_inquiries_are_numbered_sequentially() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let first = app
        .post_json("/api/inquiries", &contact("Ana Cruz", "ana@example.com"), None)
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await?;
    assert_eq!(first["inquiry_number"], "INQ-0001");
    assert_eq!(first["source"], "website");
    assert_eq!(first["status"], "new");

    let second = body_json(
        app.post_json("/api/inquiries", &contact("Ben Reyes", "ben@example.com"), None)
            .await?,
    )
    .await?;
    assert_eq!(second["inquiry_number"], "INQ-0002");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_public_inquiry_reports_every_field() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json("/api/inquiries", &json!({ "name": " ", "email": "bad" }), None)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Validation error:"));
    assert!(message.contains("name: Name is required"));
    assert!(message.contains("email: Invalid email format"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn staff_can_list_search_and_paginate() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, token) = app.user_with_token("sam", "sales").await?;

    for (name, email) in [
        ("Ana Cruz", "ana@example.com"),
        ("Ben Reyes", "ben@example.com"),
        ("Cora 100%", "cora@example.com"),
    ] {
        let response = app
            .post_json("/api/inquiries/manual", &contact(name, email), Some(&token))
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await?;
        assert_eq!(created["source"], "phone");
    }

    let page = body_json(app.get("/api/inquiries?limit=2", Some(&token)).await?).await?;
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);

    let page = body_json(app.get("/api/inquiries?page=2&limit=2", Some(&token)).await?).await?;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);

    let response = app
        .get("/api/inquiries?page=9223372036854775807", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await?;
    assert_eq!(page["total"], 3);
    assert!(page["data"].as_array().unwrap().is_empty());

    let found = body_json(app.get("/api/inquiries?search=ben", Some(&token)).await?).await?;
    assert_eq!(found["total"], 1);
    assert_eq!(found["data"][0]["name"], "Ben Reyes");

    // wildcard characters match literally
    let found = body_json(app.get("/api/inquiries?search=100%25", Some(&token)).await?).await?;
    assert_eq!(found["total"], 1);

    let response = app.get("/api/inquiries?status=bogus", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/inquiries", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn notes_update_and_convert_to_lead() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, token) = app.user_with_token("sam", "sales").await?;

    let inquiry = body_json(
        app.post_json("/api/inquiries", &contact("Ana Cruz", "ana@example.com"), None)
            .await?,
    )
    .await?;
    let id = inquiry["id"].as_str().unwrap().to_string();

    let response = app
        .patch_json(
            &format!("/api/inquiries/{id}"),
            &json!({ "status": "contacted", "company": null }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await?;
    assert_eq!(updated["status"], "contacted");
    assert!(updated["company"].is_null());
    assert_eq!(updated["name"], "Ana Cruz");

    let response = app
        .post_json(
            &format!("/api/inquiries/{id}/notes"),
            &json!({ "content": "Called, wants a quote" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let notes = body_json(app.get(&format!("/api/inquiries/{id}/notes"), Some(&token)).await?)
        .await?;
    assert_eq!(notes.as_array().unwrap().len(), 1);

    let response = app
        .post(&format!("/api/inquiries/{id}/convert-to-lead"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let lead = body_json(response).await?;
    assert_eq!(lead["inquiry_id"], id.as_str());
    assert_eq!(lead["client_name"], "Ana Cruz");

    let again = app
        .post(&format!("/api/inquiries/{id}/convert-to-lead"), Some(&token))
        .await?;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let inquiry = body_json(app.get(&format!("/api/inquiries/{id}"), Some(&token)).await?).await?;
    assert_eq!(inquiry["status"], "converted");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn delete_requires_manager_and_cleans_children() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, sales) = app.user_with_token("sam", "sales").await?;
    let (_, manager) = app.user_with_token("mia", "manager").await?;

    let inquiry = body_json(
        app.post_json("/api/inquiries", &contact("Ana Cruz", "ana@example.com"), None)
            .await?,
    )
    .await?;
    let id = inquiry["id"].as_str().unwrap().to_string();
    app.post_json(
        &format!("/api/inquiries/{id}/notes"),
        &json!({ "content": "first call" }),
        Some(&sales),
    )
    .await?;
    let event = app
        .post_json(
            "/api/calendar-events",
            &json!({
                "title": "Site visit",
                "starts_at": "2025-06-01T09:00:00Z",
                "inquiry_id": id,
            }),
            Some(&sales),
        )
        .await?;
    assert_eq!(event.status(), StatusCode::CREATED);

    let response = app.delete(&format!("/api/inquiries/{id}"), Some(&sales)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.delete(&format!("/api/inquiries/{id}"), Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/api/inquiries/{id}"), Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let events = body_json(app.get("/api/calendar-events", Some(&sales)).await?).await?;
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert!(events[0]["inquiry_id"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn delete_is_refused_while_proposals_exist() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, sales) = app.user_with_token("sam", "sales").await?;
    let (_, admin) = app.user_with_token("ada", "admin").await?;

    let inquiry = body_json(
        app.post_json("/api/inquiries", &contact("Ana Cruz", "ana@example.com"), None)
            .await?,
    )
    .await?;
    let id = inquiry["id"].as_str().unwrap().to_string();
    let response = app
        .post_json(
            "/api/proposals",
            &json!({ "inquiry_id": id, "title": "Weekly collection" }),
            Some(&sales),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.delete(&format!("/api/inquiries/{id}"), Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}
