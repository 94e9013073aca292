use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    activity::{record_changed, record_created, record_deleted, TrackedItem},
    auth::AuthenticatedUser,
    changes::compute_changes,
    error::{AppError, AppResult},
    models::{
        priority_label, status_label, NewSubtask, NewSubtaskAssignee, Subtask, Task, CT_SUBTASK,
        PRIORITY_CHOICES, STATUS_CHOICES,
    },
    schema::{subtask_assignees, subtasks, tasks},
    state::AppState,
    utils::json::{
        classify_nullable_choice, classify_nullable_date, classify_nullable_string, parse_uuid,
        parse_uuid_array, NullableValue,
    },
};

#[derive(Serialize)]
pub struct SubtaskResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub status_label: Option<&'static str>,
    pub priority: Option<i16>,
    pub priority_label: Option<&'static str>,
    pub is_archived: bool,
    pub assigned_to: Vec<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn to_response(subtask: Subtask, assignees: &BTreeSet<Uuid>) -> SubtaskResponse {
    SubtaskResponse {
        id: subtask.id,
        task_id: subtask.task_id,
        title: subtask.title,
        description: subtask.description,
        start_date: subtask.start_date,
        end_date: subtask.end_date,
        status_label: status_label(subtask.status),
        status: subtask.status,
        priority_label: priority_label(subtask.priority),
        priority: subtask.priority,
        is_archived: subtask.is_archived,
        assigned_to: assignees.iter().copied().collect(),
        created_by: subtask.created_by,
        created_at: subtask.created_at,
        updated_at: subtask.updated_at,
    }
}

fn load_assignees(conn: &mut PgConnection, subtask_id: Uuid) -> QueryResult<BTreeSet<Uuid>> {
    let ids: Vec<Uuid> = subtask_assignees::table
        .filter(subtask_assignees::subtask_id.eq(subtask_id))
        .select(subtask_assignees::user_id)
        .load(conn)?;
    Ok(ids.into_iter().collect())
}

fn replace_assignees(
    conn: &mut PgConnection,
    subtask_id: Uuid,
    assignees: &BTreeSet<Uuid>,
) -> QueryResult<()> {
    diesel::delete(
        subtask_assignees::table.filter(subtask_assignees::subtask_id.eq(subtask_id)),
    )
    .execute(conn)?;

    for user_id in assignees {
        diesel::insert_into(subtask_assignees::table)
            .values(&NewSubtaskAssignee {
                subtask_id,
                user_id: *user_id,
            })
            .execute(conn)?;
    }
    Ok(())
}

fn find_active(conn: &mut PgConnection, subtask_id: Uuid) -> AppResult<Subtask> {
    let subtask: Subtask = subtasks::table
        .find(subtask_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if subtask.is_archived {
        return Err(AppError::not_found());
    }
    Ok(subtask)
}

fn require_active_task(conn: &mut PgConnection, task_id: Uuid) -> AppResult<()> {
    let task: Option<Task> = tasks::table.find(task_id).first(conn).optional()?;
    match task {
        Some(task) if !task.is_archived => Ok(()),
        Some(_) => Err(AppError::bad_request("parent task is archived")),
        None => Err(AppError::bad_request("task does not exist")),
    }
}

fn collect_responses(
    conn: &mut PgConnection,
    subtask_list: Vec<Subtask>,
) -> QueryResult<Vec<SubtaskResponse>> {
    let ids: Vec<Uuid> = subtask_list.iter().map(|subtask| subtask.id).collect();
    let assignee_rows: Vec<(Uuid, Uuid)> = subtask_assignees::table
        .filter(subtask_assignees::subtask_id.eq_any(&ids))
        .select((subtask_assignees::subtask_id, subtask_assignees::user_id))
        .load(conn)?;

    let mut by_subtask: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for (subtask_id, user_id) in assignee_rows {
        by_subtask.entry(subtask_id).or_default().insert(user_id);
    }

    Ok(subtask_list
        .into_iter()
        .map(|subtask| {
            let assignees = by_subtask.remove(&subtask.id).unwrap_or_default();
            to_response(subtask, &assignees)
        })
        .collect())
}

pub async fn list_subtasks(State(state): State<AppState>) -> AppResult<Json<Vec<SubtaskResponse>>> {
    let mut conn = state.db()?;

    let subtask_list: Vec<Subtask> = subtasks::table
        .filter(subtasks::is_archived.eq(false))
        .order(subtasks::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(collect_responses(&mut conn, subtask_list)?))
}

/// Active subtasks belonging to one task.
pub async fn list_task_subtasks(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Vec<SubtaskResponse>>> {
    let mut conn = state.db()?;

    let task: Task = tasks::table
        .find(task_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if task.is_archived {
        return Err(AppError::not_found());
    }

    let subtask_list: Vec<Subtask> = subtasks::table
        .filter(subtasks::task_id.eq(task_id))
        .filter(subtasks::is_archived.eq(false))
        .order(subtasks::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(collect_responses(&mut conn, subtask_list)?))
}

#[derive(Deserialize)]
pub struct CreateSubtaskRequest {
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
}

pub async fn create_subtask(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateSubtaskRequest>,
) -> AppResult<Json<SubtaskResponse>> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    if payload.status.is_some() && status_label(payload.status).is_none() {
        return Err(AppError::bad_request("invalid status"));
    }
    if payload.priority.is_some() && priority_label(payload.priority).is_none() {
        return Err(AppError::bad_request("invalid priority"));
    }

    let assignees: BTreeSet<Uuid> = payload.assigned_to.iter().copied().collect();
    let mut conn = state.db()?;

    let response = conn.transaction::<_, AppError, _>(|conn| {
        require_active_task(conn, payload.task_id)?;

        let new_subtask = NewSubtask {
            id: Uuid::new_v4(),
            task_id: payload.task_id,
            title: payload.title.trim().to_string(),
            description: payload.description.clone(),
            start_date: payload.start_date,
            end_date: payload.end_date,
            status: payload.status,
            priority: payload.priority,
            created_by: Some(user.user_id),
        };

        match diesel::insert_into(subtasks::table)
            .values(&new_subtask)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "subtask title already exists in this task",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        replace_assignees(conn, new_subtask.id, &assignees)?;

        let subtask: Subtask = subtasks::table.find(new_subtask.id).first(conn)?;
        let item = TrackedItem {
            content_type: CT_SUBTASK,
            object_id: subtask.id,
            created_by: subtask.created_by,
            assignees: assignees.clone(),
        };
        record_created(conn, &item, user.user_id)?;

        Ok(to_response(subtask, &assignees))
    })?;

    Ok(Json(response))
}

pub async fn get_subtask(
    State(state): State<AppState>,
    Path(subtask_id): Path<Uuid>,
) -> AppResult<Json<SubtaskResponse>> {
    let mut conn = state.db()?;
    let subtask = find_active(&mut conn, subtask_id)?;
    let assignees = load_assignees(&mut conn, subtask_id)?;
    Ok(Json(to_response(subtask, &assignees)))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = subtasks)]
struct UpdateSubtaskChangeset {
    task_id: Option<Uuid>,
    title: Option<String>,
    description: Option<Option<String>>,
    start_date: Option<Option<NaiveDate>>,
    end_date: Option<Option<NaiveDate>>,
    status: Option<Option<i16>>,
    priority: Option<Option<i16>>,
    updated_at: Option<NaiveDateTime>,
}

pub async fn update_subtask(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(subtask_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<SubtaskResponse>> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, subtask_id)?;
    let before_assignees = load_assignees(&mut conn, subtask_id)?;
    let before = existing.snapshot(&before_assignees);

    let mut changeset = UpdateSubtaskChangeset {
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };

    match classify_nullable_string(body.get("title")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => return Err(AppError::bad_request("title cannot be null")),
        NullableValue::Value(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("title must not be empty"));
            }
            changeset.title = Some(trimmed.to_string());
        }
    }

    match classify_nullable_string(body.get("description")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.description = Some(None),
        NullableValue::Value(value) => changeset.description = Some(Some(value)),
    }

    match classify_nullable_date(body.get("start_date")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.start_date = Some(None),
        NullableValue::Value(date) => changeset.start_date = Some(Some(date)),
    }

    match classify_nullable_date(body.get("end_date")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.end_date = Some(None),
        NullableValue::Value(date) => changeset.end_date = Some(Some(date)),
    }

    match classify_nullable_choice(body.get("status"), STATUS_CHOICES)
        .map_err(AppError::bad_request)?
    {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.status = Some(None),
        NullableValue::Value(value) => changeset.status = Some(Some(value)),
    }

    match classify_nullable_choice(body.get("priority"), PRIORITY_CHOICES)
        .map_err(AppError::bad_request)?
    {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.priority = Some(None),
        NullableValue::Value(value) => changeset.priority = Some(Some(value)),
    }

    if let Some(task_id) = parse_uuid(body.get("task_id")).map_err(AppError::bad_request)? {
        changeset.task_id = Some(task_id);
    }

    let new_assignees: Option<BTreeSet<Uuid>> =
        parse_uuid_array(body.get("assigned_to"))
            .map_err(AppError::bad_request)?
            .map(|ids| ids.into_iter().collect());

    let response = conn.transaction::<_, AppError, _>(|conn| {
        if let Some(task_id) = changeset.task_id {
            require_active_task(conn, task_id)?;
        }

        match diesel::update(subtasks::table.find(subtask_id))
            .set(&changeset)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "subtask title already exists in this task",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        if let Some(assignees) = &new_assignees {
            replace_assignees(conn, subtask_id, assignees)?;
        }

        let updated: Subtask = subtasks::table.find(subtask_id).first(conn)?;
        let after_assignees = new_assignees.clone().unwrap_or_else(|| before_assignees.clone());
        let after = updated.snapshot(&after_assignees);

        let changes = compute_changes(&before, &after);
        if !changes.is_empty() {
            let item = TrackedItem {
                content_type: CT_SUBTASK,
                object_id: updated.id,
                created_by: updated.created_by,
                assignees: after_assignees.clone(),
            };
            record_changed(conn, &item, user.user_id, &changes)?;
        }

        Ok(to_response(updated, &after_assignees))
    })?;

    Ok(Json(response))
}

pub async fn delete_subtask(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(subtask_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, subtask_id)?;
    let assignees = load_assignees(&mut conn, subtask_id)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let item = TrackedItem {
            content_type: CT_SUBTASK,
            object_id: existing.id,
            created_by: existing.created_by,
            assignees,
        };
        record_deleted(conn, &item, user.user_id)?;

        diesel::update(subtasks::table.find(subtask_id))
            .set((
                subtasks::is_archived.eq(true),
                subtasks::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
