use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    activity::{load_tracked_item, record_generic_change},
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Attachment, NewAttachment},
    schema::attachments,
    state::AppState,
    utils::json::{classify_nullable_string, NullableValue},
};

#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub description: String,
    pub is_updated: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn to_response(attachment: Attachment) -> AttachmentResponse {
    AttachmentResponse {
        id: attachment.id,
        content_type: attachment.content_type,
        object_id: attachment.object_id,
        file_name: attachment.file_name,
        file_size: attachment.file_size,
        description: attachment.description,
        is_updated: attachment.is_updated,
        created_by: attachment.created_by,
        created_at: attachment.created_at,
        updated_at: attachment.updated_at,
    }
}

#[derive(Deserialize)]
pub struct AttachmentListQuery {
    pub content_type: Option<String>,
    pub object_id: Option<Uuid>,
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Query(query): Query<AttachmentListQuery>,
) -> AppResult<Json<Vec<AttachmentResponse>>> {
    let (Some(content_type), Some(object_id)) = (query.content_type, query.object_id) else {
        return Ok(Json(Vec::new()));
    };

    let mut conn = state.db()?;
    let rows: Vec<Attachment> = attachments::table
        .filter(attachments::content_type.eq(content_type))
        .filter(attachments::object_id.eq(object_id))
        .order(attachments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_response).collect()))
}

/// Attachment blobs live elsewhere; only metadata is recorded here.
#[derive(Deserialize)]
pub struct CreateAttachmentRequest {
    pub content_type: String,
    pub object_id: Uuid,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub description: Option<String>,
}

pub async fn create_attachment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAttachmentRequest>,
) -> AppResult<Json<AttachmentResponse>> {
    if payload.file_name.trim().is_empty() {
        return Err(AppError::bad_request("file_name must not be empty"));
    }

    let mut conn = state.db()?;

    let response = conn.transaction::<_, AppError, _>(|conn| {
        let parent = load_tracked_item(conn, &payload.content_type, payload.object_id)?
            .ok_or_else(|| AppError::bad_request("parent item does not exist"))?;

        let new_attachment = NewAttachment {
            id: Uuid::new_v4(),
            content_type: parent.content_type.to_string(),
            object_id: payload.object_id,
            file_name: payload.file_name.trim().to_string(),
            file_size: payload.file_size,
            description: payload.description.clone().unwrap_or_default(),
            created_by: Some(user.user_id),
        };
        diesel::insert_into(attachments::table)
            .values(&new_attachment)
            .execute(conn)?;

        record_generic_change(
            conn,
            &parent,
            user.user_id,
            "attachments",
            "Attachments",
            Vec::new(),
            vec![new_attachment.file_name.clone()],
        )?;

        let attachment: Attachment = attachments::table.find(new_attachment.id).first(conn)?;
        Ok(to_response(attachment))
    })?;

    Ok(Json(response))
}

pub async fn update_attachment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(attachment_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<AttachmentResponse>> {
    let mut new_file_name: Option<String> = None;
    match classify_nullable_string(body.get("file_name")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => return Err(AppError::bad_request("file_name cannot be null")),
        NullableValue::Value(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("file_name must not be empty"));
            }
            new_file_name = Some(trimmed.to_string());
        }
    }

    let mut new_description: Option<String> = None;
    match classify_nullable_string(body.get("description")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => new_description = Some(String::new()),
        NullableValue::Value(value) => new_description = Some(value),
    }

    let mut conn = state.db()?;

    let response = conn.transaction::<_, AppError, _>(|conn| {
        let existing: Attachment = attachments::table
            .find(attachment_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        let file_name = new_file_name
            .clone()
            .unwrap_or_else(|| existing.file_name.clone());
        let description = new_description
            .clone()
            .unwrap_or_else(|| existing.description.clone());

        diesel::update(attachments::table.find(attachment_id))
            .set((
                attachments::file_name.eq(&file_name),
                attachments::description.eq(&description),
                attachments::is_updated.eq(true),
                attachments::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        // The change entry tracks the attachment's display name only.
        if existing.file_name != file_name {
            if let Some(parent) =
                load_tracked_item(conn, &existing.content_type, existing.object_id)?
            {
                record_generic_change(
                    conn,
                    &parent,
                    user.user_id,
                    "attachments",
                    "Attachments",
                    vec![existing.file_name.clone()],
                    vec![file_name.clone()],
                )?;
            }
        }

        let attachment: Attachment = attachments::table.find(attachment_id).first(conn)?;
        Ok(to_response(attachment))
    })?;

    Ok(Json(response))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(attachment_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;

    conn.transaction::<_, AppError, _>(|conn| {
        let existing: Attachment = attachments::table
            .find(attachment_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        diesel::delete(attachments::table.find(attachment_id)).execute(conn)?;

        if let Some(parent) = load_tracked_item(conn, &existing.content_type, existing.object_id)? {
            record_generic_change(
                conn,
                &parent,
                user.user_id,
                "attachments",
                "Attachments",
                vec![existing.file_name.clone()],
                Vec::new(),
            )?;
        }

        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
