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
    title: String,
}

#[derive(Deserialize)]
struct ActivityInfo {
    action: String,
}

async fn setup_hierarchy(app: &TestApp, token: &str) -> Result<(Uuid, Uuid, Uuid, Uuid)> {
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
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let project: ItemInfo = serde_json::from_slice(&body)?;

    let response = app
        .post_json(
            "/api/tasks",
            &json!({ "project_id": project.id, "title": "Design" }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let task: ItemInfo = serde_json::from_slice(&body)?;

    let response = app
        .post_json(
            "/api/subtasks",
            &json!({ "task_id": task.id, "title": "Wireframes" }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let subtask: ItemInfo = serde_json::from_slice(&body)?;

    Ok((domain.id, project.id, task.id, subtask.id))
}

async fn activities_for(
    app: &TestApp,
    token: &str,
    content_type: &str,
    object_id: Uuid,
) -> Result<Vec<ActivityInfo>> {
    let response = app
        .get(
            &format!("/api/activities?content_type={content_type}&object_id={object_id}"),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn task_hierarchy_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;

    let (_domain_id, project_id, task_id, _subtask_id) = setup_hierarchy(&app, &token).await?;

    // Parent must exist and be active.
    let orphan = app
        .post_json(
            "/api/tasks",
            &json!({ "project_id": Uuid::new_v4(), "title": "Orphan" }),
            Some(&token),
        )
        .await?;
    assert_eq!(orphan.status(), StatusCode::BAD_REQUEST);

    let listing = app
        .get(&format!("/api/projects/{project_id}/tasks"), Some(&token))
        .await?;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_to_vec(listing.into_body()).await?;
    let tasks: Vec<ItemInfo> = serde_json::from_slice(&body)?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Design");

    let listing = app
        .get(&format!("/api/tasks/{task_id}/subtasks"), Some(&token))
        .await?;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_to_vec(listing.into_body()).await?;
    let subtasks: Vec<ItemInfo> = serde_json::from_slice(&body)?;
    assert_eq!(subtasks.len(), 1);

    // Moving a task under a missing project is rejected.
    let bad_move = app
        .patch_json(
            &format!("/api/tasks/{task_id}"),
            &json!({ "project_id": Uuid::new_v4() }),
            Some(&token),
        )
        .await?;
    assert_eq!(bad_move.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn archiving_a_project_cascades_without_child_delete_activities() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;

    let (_domain_id, project_id, task_id, subtask_id) = setup_hierarchy(&app, &token).await?;

    let delete = app
        .delete(&format!("/api/projects/{project_id}"), Some(&token))
        .await?;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    // Everything underneath is archived...
    let task = app.get(&format!("/api/tasks/{task_id}"), Some(&token)).await?;
    assert_eq!(task.status(), StatusCode::NOT_FOUND);
    let subtask = app
        .get(&format!("/api/subtasks/{subtask_id}"), Some(&token))
        .await?;
    assert_eq!(subtask.status(), StatusCode::NOT_FOUND);

    // ...but only the project itself carries a Delete entry.
    let project_log = activities_for(&app, &token, "project", project_id).await?;
    assert_eq!(project_log[0].action, "D");
    let task_log = activities_for(&app, &token, "task", task_id).await?;
    assert!(task_log.iter().all(|activity| activity.action != "D"));
    let subtask_log = activities_for(&app, &token, "subtask", subtask_id).await?;
    assert!(subtask_log.iter().all(|activity| activity.action != "D"));

    // Child listings under an archived parent 404 rather than leak.
    let listing = app
        .get(&format!("/api/projects/{project_id}/tasks"), Some(&token))
        .await?;
    assert_eq!(listing.status(), StatusCode::NOT_FOUND);

    // Rows survive archiving; only visibility changes.
    let archived: (bool, bool) = app
        .with_conn(move |conn| {
            use diesel::prelude::*;
            use taskboard::schema::{subtasks, tasks};
            let task: bool = tasks::table
                .find(task_id)
                .select(tasks::is_archived)
                .first(conn)?;
            let subtask: bool = subtasks::table
                .find(subtask_id)
                .select(subtasks::is_archived)
                .first(conn)?;
            Ok((task, subtask))
        })
        .await?;
    assert!(archived.0);
    assert!(archived.1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn archived_parents_reject_new_children() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner@example.com", "pw-owner").await?;
    let token = app.login_token("owner@example.com", "pw-owner").await?;

    let (_domain_id, project_id, task_id, _subtask_id) = setup_hierarchy(&app, &token).await?;

    let delete = app
        .delete(&format!("/api/tasks/{task_id}"), Some(&token))
        .await?;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let under_archived_task = app
        .post_json(
            "/api/subtasks",
            &json!({ "task_id": task_id, "title": "Too late" }),
            Some(&token),
        )
        .await?;
    assert_eq!(under_archived_task.status(), StatusCode::BAD_REQUEST);
    let body = body_to_vec(under_archived_task.into_body()).await?;
    let parsed: Value = serde_json::from_slice(&body)?;
    assert_eq!(parsed["error"], "parent task is archived");

    let delete = app
        .delete(&format!("/api/projects/{project_id}"), Some(&token))
        .await?;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let under_archived_project = app
        .post_json(
            "/api/tasks",
            &json!({ "project_id": project_id, "title": "Too late" }),
            Some(&token),
        )
        .await?;
    assert_eq!(under_archived_project.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
