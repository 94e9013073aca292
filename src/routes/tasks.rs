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
        priority_label, status_label, NewTask, NewTaskAssignee, Project, Task, CT_TASK,
        PRIORITY_CHOICES, STATUS_CHOICES,
    },
    schema::{projects, subtasks, task_assignees, tasks},
    state::AppState,
    utils::json::{
        classify_nullable_choice, classify_nullable_date, classify_nullable_string, parse_uuid,
        parse_uuid_array, NullableValue,
    },
};

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub project_id: Uuid,
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

fn to_response(task: Task, assignees: &BTreeSet<Uuid>) -> TaskResponse {
    TaskResponse {
        id: task.id,
        project_id: task.project_id,
        title: task.title,
        description: task.description,
        start_date: task.start_date,
        end_date: task.end_date,
        status_label: status_label(task.status),
        status: task.status,
        priority_label: priority_label(task.priority),
        priority: task.priority,
        is_archived: task.is_archived,
        assigned_to: assignees.iter().copied().collect(),
        created_by: task.created_by,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

fn load_assignees(conn: &mut PgConnection, task_id: Uuid) -> QueryResult<BTreeSet<Uuid>> {
    let ids: Vec<Uuid> = task_assignees::table
        .filter(task_assignees::task_id.eq(task_id))
        .select(task_assignees::user_id)
        .load(conn)?;
    Ok(ids.into_iter().collect())
}

fn replace_assignees(
    conn: &mut PgConnection,
    task_id: Uuid,
    assignees: &BTreeSet<Uuid>,
) -> QueryResult<()> {
    diesel::delete(task_assignees::table.filter(task_assignees::task_id.eq(task_id)))
        .execute(conn)?;

    for user_id in assignees {
        diesel::insert_into(task_assignees::table)
            .values(&NewTaskAssignee {
                task_id,
                user_id: *user_id,
            })
            .execute(conn)?;
    }
    Ok(())
}

fn find_active(conn: &mut PgConnection, task_id: Uuid) -> AppResult<Task> {
    let task: Task = tasks::table
        .find(task_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if task.is_archived {
        return Err(AppError::not_found());
    }
    Ok(task)
}

fn require_active_project(conn: &mut PgConnection, project_id: Uuid) -> AppResult<()> {
    let project: Option<Project> = projects::table
        .find(project_id)
        .first(conn)
        .optional()?;
    match project {
        Some(project) if !project.is_archived => Ok(()),
        Some(_) => Err(AppError::bad_request("parent project is archived")),
        None => Err(AppError::bad_request("project does not exist")),
    }
}

fn collect_responses(conn: &mut PgConnection, task_list: Vec<Task>) -> QueryResult<Vec<TaskResponse>> {
    let ids: Vec<Uuid> = task_list.iter().map(|task| task.id).collect();
    let assignee_rows: Vec<(Uuid, Uuid)> = task_assignees::table
        .filter(task_assignees::task_id.eq_any(&ids))
        .select((task_assignees::task_id, task_assignees::user_id))
        .load(conn)?;

    let mut by_task: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for (task_id, user_id) in assignee_rows {
        by_task.entry(task_id).or_default().insert(user_id);
    }

    Ok(task_list
        .into_iter()
        .map(|task| {
            let assignees = by_task.remove(&task.id).unwrap_or_default();
            to_response(task, &assignees)
        })
        .collect())
}

pub async fn list_tasks(State(state): State<AppState>) -> AppResult<Json<Vec<TaskResponse>>> {
    let mut conn = state.db()?;

    let task_list: Vec<Task> = tasks::table
        .filter(tasks::is_archived.eq(false))
        .order(tasks::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(collect_responses(&mut conn, task_list)?))
}

/// Active tasks belonging to one project.
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let mut conn = state.db()?;

    let project: Project = projects::table
        .find(project_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if project.is_archived {
        return Err(AppError::not_found());
    }

    let task_list: Vec<Task> = tasks::table
        .filter(tasks::project_id.eq(project_id))
        .filter(tasks::is_archived.eq(false))
        .order(tasks::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(collect_responses(&mut conn, task_list)?))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<Json<TaskResponse>> {
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
        require_active_project(conn, payload.project_id)?;

        let new_task = NewTask {
            id: Uuid::new_v4(),
            project_id: payload.project_id,
            title: payload.title.trim().to_string(),
            description: payload.description.clone(),
            start_date: payload.start_date,
            end_date: payload.end_date,
            status: payload.status,
            priority: payload.priority,
            created_by: Some(user.user_id),
        };

        match diesel::insert_into(tasks::table)
            .values(&new_task)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "task title already exists in this project",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        replace_assignees(conn, new_task.id, &assignees)?;

        let task: Task = tasks::table.find(new_task.id).first(conn)?;
        let item = TrackedItem {
            content_type: CT_TASK,
            object_id: task.id,
            created_by: task.created_by,
            assignees: assignees.clone(),
        };
        record_created(conn, &item, user.user_id)?;

        Ok(to_response(task, &assignees))
    })?;

    Ok(Json(response))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskResponse>> {
    let mut conn = state.db()?;
    let task = find_active(&mut conn, task_id)?;
    let assignees = load_assignees(&mut conn, task_id)?;
    Ok(Json(to_response(task, &assignees)))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = tasks)]
struct UpdateTaskChangeset {
    project_id: Option<Uuid>,
    title: Option<String>,
    description: Option<Option<String>>,
    start_date: Option<Option<NaiveDate>>,
    end_date: Option<Option<NaiveDate>>,
    status: Option<Option<i16>>,
    priority: Option<Option<i16>>,
    updated_at: Option<NaiveDateTime>,
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<TaskResponse>> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, task_id)?;
    let before_assignees = load_assignees(&mut conn, task_id)?;
    let before = existing.snapshot(&before_assignees);

    let mut changeset = UpdateTaskChangeset {
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

    if let Some(project_id) = parse_uuid(body.get("project_id")).map_err(AppError::bad_request)? {
        changeset.project_id = Some(project_id);
    }

    let new_assignees: Option<BTreeSet<Uuid>> =
        parse_uuid_array(body.get("assigned_to"))
            .map_err(AppError::bad_request)?
            .map(|ids| ids.into_iter().collect());

    let response = conn.transaction::<_, AppError, _>(|conn| {
        if let Some(project_id) = changeset.project_id {
            require_active_project(conn, project_id)?;
        }

        match diesel::update(tasks::table.find(task_id))
            .set(&changeset)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "task title already exists in this project",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        if let Some(assignees) = &new_assignees {
            replace_assignees(conn, task_id, assignees)?;
        }

        let updated: Task = tasks::table.find(task_id).first(conn)?;
        let after_assignees = new_assignees.clone().unwrap_or_else(|| before_assignees.clone());
        let after = updated.snapshot(&after_assignees);

        let changes = compute_changes(&before, &after);
        if !changes.is_empty() {
            let item = TrackedItem {
                content_type: CT_TASK,
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

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, task_id)?;
    let assignees = load_assignees(&mut conn, task_id)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let item = TrackedItem {
            content_type: CT_TASK,
            object_id: existing.id,
            created_by: existing.created_by,
            assignees,
        };
        record_deleted(conn, &item, user.user_id)?;

        let now = Utc::now().naive_utc();
        diesel::update(tasks::table.find(task_id))
            .set((tasks::is_archived.eq(true), tasks::updated_at.eq(now)))
            .execute(conn)?;

        diesel::update(subtasks::table.filter(subtasks::task_id.eq(task_id)))
            .set((subtasks::is_archived.eq(true), subtasks::updated_at.eq(now)))
            .execute(conn)?;

        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
