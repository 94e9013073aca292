use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    activity::{load_tracked_item, record_generic_change},
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Comment, NewComment},
    schema::comments,
    state::AppState,
};

#[derive(Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub body: String,
    pub is_updated: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn to_response(comment: Comment) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        content_type: comment.content_type,
        object_id: comment.object_id,
        body: comment.body,
        is_updated: comment.is_updated,
        created_by: comment.created_by,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    }
}

#[derive(Deserialize)]
pub struct CommentListQuery {
    pub content_type: Option<String>,
    pub object_id: Option<Uuid>,
}

/// Comments only make sense against a parent item; without the full filter
/// the result is an empty list rather than the whole table.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> AppResult<Json<Vec<CommentResponse>>> {
    let (Some(content_type), Some(object_id)) = (query.content_type, query.object_id) else {
        return Ok(Json(Vec::new()));
    };

    let mut conn = state.db()?;
    let rows: Vec<Comment> = comments::table
        .filter(comments::content_type.eq(content_type))
        .filter(comments::object_id.eq(object_id))
        .order(comments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_response).collect()))
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content_type: String,
    pub object_id: Uuid,
    pub body: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<Json<CommentResponse>> {
    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("body must not be empty"));
    }

    let mut conn = state.db()?;

    let response = conn.transaction::<_, AppError, _>(|conn| {
        let parent = load_tracked_item(conn, &payload.content_type, payload.object_id)?
            .ok_or_else(|| AppError::bad_request("parent item does not exist"))?;

        let new_comment = NewComment {
            id: Uuid::new_v4(),
            content_type: parent.content_type.to_string(),
            object_id: payload.object_id,
            body: payload.body.clone(),
            created_by: Some(user.user_id),
        };
        diesel::insert_into(comments::table)
            .values(&new_comment)
            .execute(conn)?;

        record_generic_change(
            conn,
            &parent,
            user.user_id,
            "comments",
            "Comments",
            Vec::new(),
            vec![payload.body.clone()],
        )?;

        let comment: Comment = comments::table.find(new_comment.id).first(conn)?;
        Ok(to_response(comment))
    })?;

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub body: String,
}

pub async fn update_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<UpdateCommentRequest>,
) -> AppResult<Json<CommentResponse>> {
    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("body must not be empty"));
    }

    let mut conn = state.db()?;

    let response = conn.transaction::<_, AppError, _>(|conn| {
        let existing: Comment = comments::table
            .find(comment_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        diesel::update(comments::table.find(comment_id))
            .set((
                comments::body.eq(&payload.body),
                comments::is_updated.eq(true),
                comments::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        if existing.body != payload.body {
            if let Some(parent) =
                load_tracked_item(conn, &existing.content_type, existing.object_id)?
            {
                record_generic_change(
                    conn,
                    &parent,
                    user.user_id,
                    "comments",
                    "Comments",
                    vec![existing.body.clone()],
                    vec![payload.body.clone()],
                )?;
            }
        }

        let comment: Comment = comments::table.find(comment_id).first(conn)?;
        Ok(to_response(comment))
    })?;

    Ok(Json(response))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(comment_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;

    conn.transaction::<_, AppError, _>(|conn| {
        let existing: Comment = comments::table
            .find(comment_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        diesel::delete(comments::table.find(comment_id)).execute(conn)?;

        if let Some(parent) = load_tracked_item(conn, &existing.content_type, existing.object_id)? {
            record_generic_change(
                conn,
                &parent,
                user.user_id,
                "comments",
                "Comments",
                vec![existing.body.clone()],
                Vec::new(),
            )?;
        }

        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
