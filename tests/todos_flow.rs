mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::{json, Value};
use taskboard::jobs::JOB_SEND_NOTIFICATION_EMAIL;
use uuid::Uuid;

#[derive(Deserialize)]
struct TodoInfo {
    id: Uuid,
    description: String,
    due_date: Option<String>,
    completed: bool,
}

async fn create_todo(app: &TestApp, token: &str, body: &Value) -> Result<TodoInfo> {
    let response = app.post_json("/api/todos", body, Some(token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn todos_are_private_to_their_owner() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    app.insert_user("other@example.com", "pw-other").await?;
    let owner_token = app.login_token("owner@example.com", "pw-owner").await?;
    let other_token = app.login_token("other@example.com", "pw-other").await?;

    let todo = create_todo(&app, &owner_token, &json!({ "description": "Water the plants" }))
        .await?;
    assert!(!todo.completed);
    assert_eq!(todo.due_date, None);

    // Another user sees neither the listing entry nor the row itself.
    let listing = app.get("/api/todos", Some(&other_token)).await?;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_to_vec(listing.into_body()).await?;
    let foreign: Vec<TodoInfo> = serde_json::from_slice(&body)?;
    assert!(foreign.is_empty());

    let peek = app
        .get(&format!("/api/todos/{}", todo.id), Some(&other_token))
        .await?;
    assert_eq!(peek.status(), StatusCode::NOT_FOUND);

    let foreign_done = app
        .post_json(
            &format!("/api/todos/{}/mark_done", todo.id),
            &json!({}),
            Some(&other_token),
        )
        .await?;
    assert_eq!(foreign_done.status(), StatusCode::NOT_FOUND);

    let owned = app
        .get(&format!("/api/todos/{}", todo.id), Some(&owner_token))
        .await?;
    assert_eq!(owned.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn todo_lifecycle_with_completion_toggles() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner = app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;

    let empty = app
        .post_json("/api/todos", &json!({ "description": "   " }), Some(&token))
        .await?;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let oversized = app
        .post_json(
            "/api/todos",
            &json!({ "description": "x".repeat(201) }),
            Some(&token),
        )
        .await?;
    assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);

    let todo = create_todo(
        &app,
        &token,
        &json!({ "description": "File expense report", "due_date": "2026-09-01T09:00:00" }),
    )
    .await?;
    assert_eq!(todo.description, "File expense report");
    assert!(todo.due_date.as_deref().unwrap().starts_with("2026-09-01"));

    let done = app
        .post_json(
            &format!("/api/todos/{}/mark_done", todo.id),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(done.status(), StatusCode::OK);
    let body = body_to_vec(done.into_body()).await?;
    let parsed: TodoInfo = serde_json::from_slice(&body)?;
    assert!(parsed.completed);

    // Repeating the action is a no-op, not an error.
    let again = app
        .post_json(
            &format!("/api/todos/{}/mark_done", todo.id),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(again.status(), StatusCode::OK);

    let undone = app
        .post_json(
            &format!("/api/todos/{}/mark_undone", todo.id),
            &json!({}),
            Some(&token),
        )
        .await?;
    let body = body_to_vec(undone.into_body()).await?;
    let parsed: TodoInfo = serde_json::from_slice(&body)?;
    assert!(!parsed.completed);

    let null_description = app
        .patch_json(
            &format!("/api/todos/{}", todo.id),
            &json!({ "description": null }),
            Some(&token),
        )
        .await?;
    assert_eq!(null_description.status(), StatusCode::BAD_REQUEST);

    let patched = app
        .patch_json(
            &format!("/api/todos/{}", todo.id),
            &json!({ "description": "File Q3 expense report", "due_date": null, "completed": true }),
            Some(&token),
        )
        .await?;
    assert_eq!(patched.status(), StatusCode::OK);
    let body = body_to_vec(patched.into_body()).await?;
    let parsed: TodoInfo = serde_json::from_slice(&body)?;
    assert_eq!(parsed.description, "File Q3 expense report");
    assert_eq!(parsed.due_date, None);
    assert!(parsed.completed);

    let deleted = app
        .delete(&format!("/api/todos/{}", todo.id), Some(&token))
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = app
        .get(&format!("/api/todos/{}", todo.id), Some(&token))
        .await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    // Todos never touch the activity or notification pipeline.
    assert!(app.notifications_for(owner).await?.is_empty());
    assert!(app.jobs_by_type(JOB_SEND_NOTIFICATION_EMAIL).await?.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn todos_list_soonest_due_first() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;

    create_todo(&app, &token, &json!({ "description": "No deadline" })).await?;
    create_todo(
        &app,
        &token,
        &json!({ "description": "Later", "due_date": "2026-10-01T12:00:00" }),
    )
    .await?;
    create_todo(
        &app,
        &token,
        &json!({ "description": "Soon", "due_date": "2026-09-01T12:00:00" }),
    )
    .await?;

    let listing = app.get("/api/todos", Some(&token)).await?;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_to_vec(listing.into_body()).await?;
    let listed: Vec<TodoInfo> = serde_json::from_slice(&body)?;

    let order: Vec<&str> = listed.iter().map(|todo| todo.description.as_str()).collect();
    assert_eq!(order, vec!["Soon", "Later", "No deadline"]);

    app.cleanup().await?;
    Ok(())
}
