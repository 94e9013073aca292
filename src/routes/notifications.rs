use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::Notification,
    schema::notifications,
    state::AppState,
};

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub viewed: bool,
    pub created_at: NaiveDateTime,
}

/// Unviewed notifications for the current user, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Notification> = notifications::table
        .filter(notifications::user_id.eq(user.user_id))
        .filter(notifications::viewed.eq(false))
        .order(notifications::created_at.desc())
        .load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|notification| NotificationResponse {
            id: notification.id,
            content_type: notification.content_type,
            object_id: notification.object_id,
            viewed: notification.viewed,
            created_at: notification.created_at,
        })
        .collect();

    Ok(Json(response))
}

pub async fn mark_viewed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<NotificationResponse>> {
    let mut conn = state.db()?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user.user_id)),
    )
    .set(notifications::viewed.eq(true))
    .execute(&mut conn)?;

    if updated == 0 {
        return Err(AppError::not_found());
    }

    let notification: Notification = notifications::table
        .find(notification_id)
        .first(&mut conn)?;

    Ok(Json(NotificationResponse {
        id: notification.id,
        content_type: notification.content_type,
        object_id: notification.object_id,
        viewed: notification.viewed,
        created_at: notification.created_at,
    }))
}

pub async fn mark_all_viewed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user.user_id))
            .filter(notifications::viewed.eq(false)),
    )
    .set(notifications::viewed.eq(true))
    .execute(&mut conn)?;

    Ok(Json(json!({ "updated": updated })))
}
