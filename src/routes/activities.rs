use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{
    activity::action_display,
    changes::ChangeRecord,
    error::AppResult,
    models::Activity,
    render::render_description,
    schema::activities,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub content_type: Option<String>,
    pub object_id: Option<Uuid>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub action: String,
    pub action_display: &'static str,
    pub content_type: String,
    pub object_id: Uuid,
    pub description: Vec<ChangeRecord>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

/// Reverse-chronological activity feed. Filtering by a specific entity
/// returns the complete unpaginated history; the global feed is paginated.
pub async fn list_activities(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;

    if let (Some(content_type), Some(object_id)) = (query.content_type.as_ref(), query.object_id) {
        let rows: Vec<Activity> = activities::table
            .filter(activities::content_type.eq(content_type))
            .filter(activities::object_id.eq(object_id))
            .order(activities::created_at.desc())
            .load(&mut conn)?;

        let results: Vec<ActivityResponse> = rows
            .into_iter()
            .map(|activity| to_response(&mut conn, activity))
            .collect();

        return Ok(Json(serde_json::to_value(results)?));
    }

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let count: i64 = activities::table.count().get_result(&mut conn)?;
    let num_pages = ((count + page_size - 1) / page_size).max(1);

    let rows: Vec<Activity> = activities::table
        .order(activities::created_at.desc())
        .offset((page - 1) * page_size)
        .limit(page_size)
        .load(&mut conn)?;

    let results: Vec<ActivityResponse> = rows
        .into_iter()
        .map(|activity| to_response(&mut conn, activity))
        .collect();

    let next = (page < num_pages).then_some(page + 1);
    let previous = (page > 1).then_some(page - 1);

    Ok(Json(json!({
        "count": count,
        "num_pages": num_pages,
        "number": page,
        "next": next,
        "previous": previous,
        "results": serde_json::to_value(results)?,
    })))
}

fn to_response(conn: &mut PgConnection, activity: Activity) -> ActivityResponse {
    // Stored content is always the raw change list; ids are resolved to
    // display strings on every read.
    let records: Vec<ChangeRecord> = match serde_json::from_value(activity.content.clone()) {
        Ok(records) => records,
        Err(err) => {
            warn!(activity_id = %activity.id, error = %err, "malformed activity content");
            Vec::new()
        }
    };

    ActivityResponse {
        id: activity.id,
        action_display: action_display(&activity.action),
        action: activity.action,
        content_type: activity.content_type,
        object_id: activity.object_id,
        description: render_description(conn, &records),
        created_by: activity.created_by,
        created_at: activity.created_at,
    }
}
