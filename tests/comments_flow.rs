mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
struct ItemInfo {
    id: Uuid,
}

#[derive(Deserialize)]
struct CommentInfo {
    id: Uuid,
    #[allow(dead_code)]
    body: String,
    is_updated: bool,
}

#[derive(Deserialize)]
struct AttachmentInfo {
    id: Uuid,
    file_name: String,
    description: String,
}

#[derive(Deserialize)]
struct ActivityInfo {
    action: String,
    description: Vec<ChangeInfo>,
}

#[derive(Deserialize)]
struct ChangeInfo {
    field: String,
    verbose_name: String,
    old_value: Value,
    new_value: Value,
}

async fn setup_task(app: &TestApp, token: &str) -> Result<Uuid> {
    let response = app
        .post_json("/api/domains", &json!({ "title": "Engineering" }), Some(token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let domain: ItemInfo = serde_json::from_slice(&body)?;

    let response = app
        .post_json(
            "/api/projects",
            &json!({ "domain_id": domain.id, "title": "Apollo" }),
            Some(token),
        )
        .await?;
    let body = body_to_vec(response.into_body()).await?;
    let project: ItemInfo = serde_json::from_slice(&body)?;

    let response = app
        .post_json(
            "/api/tasks",
            &json!({ "project_id": project.id, "title": "Design" }),
            Some(token),
        )
        .await?;
    let body = body_to_vec(response.into_body()).await?;
    let task: ItemInfo = serde_json::from_slice(&body)?;
    Ok(task.id)
}

async fn task_activities(app: &TestApp, token: &str, task_id: Uuid) -> Result<Vec<ActivityInfo>> {
    let response = app
        .get(
            &format!("/api/activities?content_type=task&object_id={task_id}"),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn comment_lifecycle_is_logged_on_the_parent() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner = app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;
    let task_id = setup_task(&app, &token).await?;

    let missing_parent = app
        .post_json(
            "/api/comments",
            &json!({ "content_type": "task", "object_id": Uuid::new_v4(), "body": "hello" }),
            Some(&token),
        )
        .await?;
    assert_eq!(missing_parent.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/comments",
            &json!({ "content_type": "task", "object_id": task_id, "body": "First pass done" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let comment: CommentInfo = serde_json::from_slice(&body)?;
    assert!(!comment.is_updated);

    // The comment shows up as an Update on its parent task.
    let activities = task_activities(&app, &token, task_id).await?;
    assert_eq!(activities[0].action, "U");
    let change = &activities[0].description[0];
    assert_eq!(change.field, "comments");
    assert_eq!(change.verbose_name, "Comments");
    assert_eq!(change.old_value, json!([]));
    assert_eq!(change.new_value, json!(["First pass done"]));

    // Project creation, task creation, and the comment each fanned out to
    // the creator.
    assert_eq!(app.notifications_for(owner).await?.len(), 3);

    // Saving the same text again marks the comment edited without logging.
    let unchanged = app
        .patch_json(
            &format!("/api/comments/{}", comment.id),
            &json!({ "body": "First pass done" }),
            Some(&token),
        )
        .await?;
    assert_eq!(unchanged.status(), StatusCode::OK);
    let body = body_to_vec(unchanged.into_body()).await?;
    let parsed: CommentInfo = serde_json::from_slice(&body)?;
    assert!(parsed.is_updated);
    assert_eq!(task_activities(&app, &token, task_id).await?.len(), 2);

    let edited = app
        .patch_json(
            &format!("/api/comments/{}", comment.id),
            &json!({ "body": "Second pass done" }),
            Some(&token),
        )
        .await?;
    assert_eq!(edited.status(), StatusCode::OK);
    let activities = task_activities(&app, &token, task_id).await?;
    assert_eq!(activities.len(), 3);
    let change = &activities[0].description[0];
    assert_eq!(change.old_value, json!(["First pass done"]));
    assert_eq!(change.new_value, json!(["Second pass done"]));

    let deleted = app
        .delete(&format!("/api/comments/{}", comment.id), Some(&token))
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let activities = task_activities(&app, &token, task_id).await?;
    assert_eq!(activities.len(), 4);
    let change = &activities[0].description[0];
    assert_eq!(change.old_value, json!(["Second pass done"]));
    assert_eq!(change.new_value, json!([]));

    // Listing needs the full parent filter.
    let unfiltered = app.get("/api/comments", Some(&token)).await?;
    assert_eq!(unfiltered.status(), StatusCode::OK);
    let body = body_to_vec(unfiltered.into_body()).await?;
    let listed: Vec<CommentInfo> = serde_json::from_slice(&body)?;
    assert!(listed.is_empty());

    let filtered = app
        .get(
            &format!("/api/comments?content_type=task&object_id={task_id}"),
            Some(&token),
        )
        .await?;
    let body = body_to_vec(filtered.into_body()).await?;
    let listed: Vec<CommentInfo> = serde_json::from_slice(&body)?;
    assert!(listed.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn attachment_metadata_is_logged_by_display_name() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;
    let task_id = setup_task(&app, &token).await?;

    let response = app
        .post_json(
            "/api/attachments",
            &json!({
                "content_type": "task",
                "object_id": task_id,
                "file_name": "spec.pdf",
                "file_size": 2048,
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let attachment: AttachmentInfo = serde_json::from_slice(&body)?;
    assert_eq!(attachment.file_name, "spec.pdf");
    assert_eq!(attachment.description, "");

    let activities = task_activities(&app, &token, task_id).await?;
    let change = &activities[0].description[0];
    assert_eq!(change.field, "attachments");
    assert_eq!(change.verbose_name, "Attachments");
    assert_eq!(change.old_value, json!([]));
    assert_eq!(change.new_value, json!(["spec.pdf"]));

    let null_name = app
        .patch_json(
            &format!("/api/attachments/{}", attachment.id),
            &json!({ "file_name": null }),
            Some(&token),
        )
        .await?;
    assert_eq!(null_name.status(), StatusCode::BAD_REQUEST);

    // Description edits never produce a change entry, renames do.
    let described = app
        .patch_json(
            &format!("/api/attachments/{}", attachment.id),
            &json!({ "description": "final draft" }),
            Some(&token),
        )
        .await?;
    assert_eq!(described.status(), StatusCode::OK);
    assert_eq!(task_activities(&app, &token, task_id).await?.len(), 2);

    let renamed = app
        .patch_json(
            &format!("/api/attachments/{}", attachment.id),
            &json!({ "file_name": "spec-v2.pdf" }),
            Some(&token),
        )
        .await?;
    assert_eq!(renamed.status(), StatusCode::OK);
    let activities = task_activities(&app, &token, task_id).await?;
    assert_eq!(activities.len(), 3);
    let change = &activities[0].description[0];
    assert_eq!(change.old_value, json!(["spec.pdf"]));
    assert_eq!(change.new_value, json!(["spec-v2.pdf"]));

    let deleted = app
        .delete(&format!("/api/attachments/{}", attachment.id), Some(&token))
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let activities = task_activities(&app, &token, task_id).await?;
    assert_eq!(activities.len(), 4);
    let change = &activities[0].description[0];
    assert_eq!(change.old_value, json!(["spec-v2.pdf"]));
    assert_eq!(change.new_value, json!([]));

    app.cleanup().await?;
    Ok(())
}
