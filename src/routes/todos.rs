use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewTodo, Todo},
    schema::todos,
    state::AppState,
    utils::json::{classify_nullable_datetime, classify_nullable_string, NullableValue},
};

const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Serialize)]
pub struct TodoResponse {
    pub id: Uuid,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Todo> for TodoResponse {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id,
            description: todo.description,
            due_date: todo.due_date,
            completed: todo.completed,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

fn validate_description(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::bad_request("description is too long"));
    }
    Ok(trimmed.to_string())
}

/// Todos are private: a row someone else owns reads as absent.
fn find_owned(conn: &mut PgConnection, owner: Uuid, todo_id: Uuid) -> AppResult<Todo> {
    todos::table
        .find(todo_id)
        .filter(todos::created_by.eq(owner))
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)
}

pub async fn list_todos(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TodoResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Todo> = todos::table
        .filter(todos::created_by.eq(user.user_id))
        .order((todos::due_date.asc(), todos::created_at.desc()))
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(TodoResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateTodoRequest {
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
}

pub async fn create_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTodoRequest>,
) -> AppResult<Json<TodoResponse>> {
    let description = validate_description(&payload.description)?;
    let mut conn = state.db()?;

    let new_todo = NewTodo {
        id: Uuid::new_v4(),
        description,
        due_date: payload.due_date,
        created_by: Some(user.user_id),
    };

    let todo: Todo = diesel::insert_into(todos::table)
        .values(&new_todo)
        .get_result(&mut conn)?;

    Ok(Json(todo.into()))
}

pub async fn get_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(todo_id): Path<Uuid>,
) -> AppResult<Json<TodoResponse>> {
    let mut conn = state.db()?;
    let todo = find_owned(&mut conn, user.user_id, todo_id)?;
    Ok(Json(todo.into()))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = todos)]
struct UpdateTodoChangeset {
    description: Option<String>,
    due_date: Option<Option<NaiveDateTime>>,
    completed: Option<bool>,
    updated_at: Option<NaiveDateTime>,
}

pub async fn update_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(todo_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<TodoResponse>> {
    let mut conn = state.db()?;
    find_owned(&mut conn, user.user_id, todo_id)?;

    let mut changeset = UpdateTodoChangeset {
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };

    match classify_nullable_string(body.get("description")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => {
            return Err(AppError::bad_request("description cannot be null"));
        }
        NullableValue::Value(value) => changeset.description = Some(validate_description(&value)?),
    }

    match classify_nullable_datetime(body.get("due_date")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => changeset.due_date = Some(None),
        NullableValue::Value(stamp) => changeset.due_date = Some(Some(stamp)),
    }

    match body.get("completed") {
        None => {}
        Some(Value::Bool(flag)) => changeset.completed = Some(*flag),
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "expected boolean, got {other}"
            )));
        }
    }

    let todo: Todo = diesel::update(todos::table.find(todo_id))
        .set(&changeset)
        .get_result(&mut conn)?;

    Ok(Json(todo.into()))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(todo_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    find_owned(&mut conn, user.user_id, todo_id)?;

    diesel::delete(todos::table.find(todo_id)).execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_done(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(todo_id): Path<Uuid>,
) -> AppResult<Json<TodoResponse>> {
    set_completed(state, user, todo_id, true)
}

pub async fn mark_undone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(todo_id): Path<Uuid>,
) -> AppResult<Json<TodoResponse>> {
    set_completed(state, user, todo_id, false)
}

fn set_completed(
    state: AppState,
    user: AuthenticatedUser,
    todo_id: Uuid,
    completed: bool,
) -> AppResult<Json<TodoResponse>> {
    let mut conn = state.db()?;
    let todo = find_owned(&mut conn, user.user_id, todo_id)?;

    // Toggling to the current state is a no-op and keeps updated_at intact.
    if todo.completed == completed {
        return Ok(Json(todo.into()));
    }

    let todo: Todo = diesel::update(todos::table.find(todo_id))
        .set((
            todos::completed.eq(completed),
            todos::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;

    Ok(Json(todo.into()))
}
