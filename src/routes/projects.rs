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
        priority_label, status_label, NewProject, NewProjectAssignee, Project, CT_PROJECT,
        PRIORITY_CHOICES, STATUS_CHOICES,
    },
    schema::{domains, project_assignees, projects, subtasks, tasks},
    state::AppState,
    utils::json::{
        classify_nullable_choice, classify_nullable_date, classify_nullable_string, parse_uuid,
        parse_uuid_array, NullableValue,
    },
};

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub domain_id: Uuid,
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

fn to_response(project: Project, assignees: &BTreeSet<Uuid>) -> ProjectResponse {
    ProjectResponse {
        id: project.id,
        domain_id: project.domain_id,
        title: project.title,
        description: project.description,
        start_date: project.start_date,
        end_date: project.end_date,
        status_label: status_label(project.status),
        status: project.status,
        priority_label: priority_label(project.priority),
        priority: project.priority,
        is_archived: project.is_archived,
        assigned_to: assignees.iter().copied().collect(),
        created_by: project.created_by,
        created_at: project.created_at,
        updated_at: project.updated_at,
    }
}

fn load_assignees(conn: &mut PgConnection, project_id: Uuid) -> QueryResult<BTreeSet<Uuid>> {
    let ids: Vec<Uuid> = project_assignees::table
        .filter(project_assignees::project_id.eq(project_id))
        .select(project_assignees::user_id)
        .load(conn)?;
    Ok(ids.into_iter().collect())
}

fn replace_assignees(
    conn: &mut PgConnection,
    project_id: Uuid,
    assignees: &BTreeSet<Uuid>,
) -> QueryResult<()> {
    diesel::delete(
        project_assignees::table.filter(project_assignees::project_id.eq(project_id)),
    )
    .execute(conn)?;

    for user_id in assignees {
        diesel::insert_into(project_assignees::table)
            .values(&NewProjectAssignee {
                project_id,
                user_id: *user_id,
            })
            .execute(conn)?;
    }
    Ok(())
}

fn find_active(conn: &mut PgConnection, project_id: Uuid) -> AppResult<Project> {
    let project: Project = projects::table
        .find(project_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if project.is_archived {
        return Err(AppError::not_found());
    }
    Ok(project)
}

pub async fn list_projects(State(state): State<AppState>) -> AppResult<Json<Vec<ProjectResponse>>> {
    let mut conn = state.db()?;

    let project_list: Vec<Project> = projects::table
        .filter(projects::is_archived.eq(false))
        .order(projects::created_at.desc())
        .load(&mut conn)?;

    let ids: Vec<Uuid> = project_list.iter().map(|project| project.id).collect();
    let assignee_rows: Vec<(Uuid, Uuid)> = project_assignees::table
        .filter(project_assignees::project_id.eq_any(&ids))
        .select((project_assignees::project_id, project_assignees::user_id))
        .load(&mut conn)?;

    let mut by_project: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for (project_id, user_id) in assignee_rows {
        by_project.entry(project_id).or_default().insert(user_id);
    }

    let response = project_list
        .into_iter()
        .map(|project| {
            let assignees = by_project.remove(&project.id).unwrap_or_default();
            to_response(project, &assignees)
        })
        .collect();

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub domain_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
}

pub async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<Json<ProjectResponse>> {
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
        let domain_exists: i64 = domains::table
            .filter(domains::id.eq(payload.domain_id))
            .count()
            .get_result(conn)?;
        if domain_exists == 0 {
            return Err(AppError::bad_request("domain does not exist"));
        }

        let new_project = NewProject {
            id: Uuid::new_v4(),
            domain_id: payload.domain_id,
            title: payload.title.trim().to_string(),
            description: payload.description.clone(),
            start_date: payload.start_date,
            end_date: payload.end_date,
            status: payload.status,
            priority: payload.priority,
            created_by: Some(user.user_id),
        };

        match diesel::insert_into(projects::table)
            .values(&new_project)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "project title already exists in this domain",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        replace_assignees(conn, new_project.id, &assignees)?;

        let project: Project = projects::table.find(new_project.id).first(conn)?;
        let item = TrackedItem {
            content_type: CT_PROJECT,
            object_id: project.id,
            created_by: project.created_by,
            assignees: assignees.clone(),
        };
        record_created(conn, &item, user.user_id)?;

        Ok(to_response(project, &assignees))
    })?;

    Ok(Json(response))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<ProjectResponse>> {
    let mut conn = state.db()?;
    let project = find_active(&mut conn, project_id)?;
    let assignees = load_assignees(&mut conn, project_id)?;
    Ok(Json(to_response(project, &assignees)))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = projects)]
struct UpdateProjectChangeset {
    domain_id: Option<Uuid>,
    title: Option<String>,
    description: Option<Option<String>>,
    start_date: Option<Option<NaiveDate>>,
    end_date: Option<Option<NaiveDate>>,
    status: Option<Option<i16>>,
    priority: Option<Option<i16>>,
    updated_at: Option<NaiveDateTime>,
}

pub async fn update_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ProjectResponse>> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, project_id)?;
    let before_assignees = load_assignees(&mut conn, project_id)?;
    let before = existing.snapshot(&before_assignees);

    let mut changeset = UpdateProjectChangeset {
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

    if let Some(domain_id) = parse_uuid(body.get("domain_id")).map_err(AppError::bad_request)? {
        changeset.domain_id = Some(domain_id);
    }

    let new_assignees: Option<BTreeSet<Uuid>> =
        parse_uuid_array(body.get("assigned_to"))
            .map_err(AppError::bad_request)?
            .map(|ids| ids.into_iter().collect());

    let response = conn.transaction::<_, AppError, _>(|conn| {
        if let Some(domain_id) = changeset.domain_id {
            let domain_exists: i64 = domains::table
                .filter(domains::id.eq(domain_id))
                .count()
                .get_result(conn)?;
            if domain_exists == 0 {
                return Err(AppError::bad_request("domain does not exist"));
            }
        }

        match diesel::update(projects::table.find(project_id))
            .set(&changeset)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(AppError::bad_request(
                    "project title already exists in this domain",
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        if let Some(assignees) = &new_assignees {
            replace_assignees(conn, project_id, assignees)?;
        }

        let updated: Project = projects::table.find(project_id).first(conn)?;
        let after_assignees = new_assignees.clone().unwrap_or_else(|| before_assignees.clone());
        let after = updated.snapshot(&after_assignees);

        let changes = compute_changes(&before, &after);
        if !changes.is_empty() {
            let item = TrackedItem {
                content_type: CT_PROJECT,
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

/// Archives the project and all of its descendants; only the project itself
/// gets a Delete activity.
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let existing = find_active(&mut conn, project_id)?;
    let assignees = load_assignees(&mut conn, project_id)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let item = TrackedItem {
            content_type: CT_PROJECT,
            object_id: existing.id,
            created_by: existing.created_by,
            assignees,
        };
        record_deleted(conn, &item, user.user_id)?;

        let now = Utc::now().naive_utc();
        diesel::update(projects::table.find(project_id))
            .set((projects::is_archived.eq(true), projects::updated_at.eq(now)))
            .execute(conn)?;

        let task_ids: Vec<Uuid> = tasks::table
            .filter(tasks::project_id.eq(project_id))
            .select(tasks::id)
            .load(conn)?;

        diesel::update(tasks::table.filter(tasks::project_id.eq(project_id)))
            .set((tasks::is_archived.eq(true), tasks::updated_at.eq(now)))
            .execute(conn)?;

        diesel::update(subtasks::table.filter(subtasks::task_id.eq_any(&task_ids)))
            .set((subtasks::is_archived.eq(true), subtasks::updated_at.eq(now)))
            .execute(conn)?;

        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
