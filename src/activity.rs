use std::collections::BTreeSet;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::changes::ChangeRecord;
use crate::jobs::{enqueue_job, JobQueueError, JOB_SEND_NOTIFICATION_EMAIL};
use crate::models::{
    Activity, NewActivity, NewNotification, Notification, Project, Subtask, Task, CT_ACTIVITY,
    CT_PROJECT, CT_SUBTASK, CT_TASK,
};
use crate::schema::{
    activities, notifications, project_assignees, projects, subtask_assignees, subtasks,
    task_assignees, tasks,
};

pub const ACTION_CREATE: &str = "C";
pub const ACTION_UPDATE: &str = "U";
pub const ACTION_DELETE: &str = "D";

pub fn action_display(action: &str) -> &'static str {
    match action {
        ACTION_CREATE => "Create",
        ACTION_UPDATE => "Update",
        ACTION_DELETE => "Delete",
        _ => "Unknown",
    }
}

/// The slice of a tracked entity the ledger needs: its polymorphic identity
/// plus the relations that drive notification fan-out.
#[derive(Debug, Clone)]
pub struct TrackedItem {
    pub content_type: &'static str,
    pub object_id: Uuid,
    pub created_by: Option<Uuid>,
    pub assignees: BTreeSet<Uuid>,
}

/// Record a Create event and notify the current assignees plus the actor.
pub fn record_created(
    conn: &mut PgConnection,
    item: &TrackedItem,
    actor: Uuid,
) -> QueryResult<Activity> {
    let activity = insert_activity(conn, item, ACTION_CREATE, Value::Array(vec![]), actor)?;

    let mut recipients = item.assignees.clone();
    recipients.insert(actor);
    fan_out(conn, &activity, &recipients)?;

    Ok(activity)
}

/// Record an Update event carrying a non-empty change list, and notify the
/// current assignees plus the entity's original creator. The creator is
/// notified even when someone else made the edit; the editor only hears
/// about it if they are assigned or own the entity.
pub fn record_changed(
    conn: &mut PgConnection,
    item: &TrackedItem,
    actor: Uuid,
    changes: &[ChangeRecord],
) -> QueryResult<Activity> {
    let content = serde_json::to_value(changes)
        .map_err(|err| diesel::result::Error::SerializationError(Box::new(err)))?;
    let activity = insert_activity(conn, item, ACTION_UPDATE, content, actor)?;

    let mut recipients = item.assignees.clone();
    if let Some(owner) = item.created_by {
        recipients.insert(owner);
    }
    fan_out(conn, &activity, &recipients)?;

    Ok(activity)
}

/// Record a Delete event. Deletions are logged but never fan out.
pub fn record_deleted(
    conn: &mut PgConnection,
    item: &TrackedItem,
    actor: Uuid,
) -> QueryResult<Activity> {
    insert_activity(conn, item, ACTION_DELETE, Value::Array(vec![]), actor)
}

/// Comment and attachment mutations are logged against their parent item as
/// an Update with a single synthetic change entry (string representations
/// before and after).
pub fn record_generic_change(
    conn: &mut PgConnection,
    parent: &TrackedItem,
    actor: Uuid,
    field: &str,
    verbose_name: &str,
    old: Vec<String>,
    new: Vec<String>,
) -> QueryResult<Activity> {
    let change = ChangeRecord {
        field: field.to_string(),
        verbose_name: verbose_name.to_string(),
        old_value: Value::from(old),
        new_value: Value::from(new),
        model: None,
    };
    record_changed(conn, parent, actor, &[change])
}

/// Resolve a polymorphic (content_type, object_id) pair to the tracked item
/// it points at, including the relations fan-out needs. Unknown type tags
/// and missing rows both come back as None.
pub fn load_tracked_item(
    conn: &mut PgConnection,
    content_type: &str,
    object_id: Uuid,
) -> QueryResult<Option<TrackedItem>> {
    match content_type {
        CT_PROJECT => {
            let Some(project) = projects::table
                .find(object_id)
                .first::<Project>(conn)
                .optional()?
            else {
                return Ok(None);
            };
            let assignees: Vec<Uuid> = project_assignees::table
                .filter(project_assignees::project_id.eq(object_id))
                .select(project_assignees::user_id)
                .load(conn)?;
            Ok(Some(TrackedItem {
                content_type: CT_PROJECT,
                object_id,
                created_by: project.created_by,
                assignees: assignees.into_iter().collect(),
            }))
        }
        CT_TASK => {
            let Some(task) = tasks::table.find(object_id).first::<Task>(conn).optional()? else {
                return Ok(None);
            };
            let assignees: Vec<Uuid> = task_assignees::table
                .filter(task_assignees::task_id.eq(object_id))
                .select(task_assignees::user_id)
                .load(conn)?;
            Ok(Some(TrackedItem {
                content_type: CT_TASK,
                object_id,
                created_by: task.created_by,
                assignees: assignees.into_iter().collect(),
            }))
        }
        CT_SUBTASK => {
            let Some(subtask) = subtasks::table
                .find(object_id)
                .first::<Subtask>(conn)
                .optional()?
            else {
                return Ok(None);
            };
            let assignees: Vec<Uuid> = subtask_assignees::table
                .filter(subtask_assignees::subtask_id.eq(object_id))
                .select(subtask_assignees::user_id)
                .load(conn)?;
            Ok(Some(TrackedItem {
                content_type: CT_SUBTASK,
                object_id,
                created_by: subtask.created_by,
                assignees: assignees.into_iter().collect(),
            }))
        }
        _ => Ok(None),
    }
}

fn insert_activity(
    conn: &mut PgConnection,
    item: &TrackedItem,
    action: &str,
    content: Value,
    actor: Uuid,
) -> QueryResult<Activity> {
    let new_activity = NewActivity {
        id: Uuid::new_v4(),
        action: action.to_string(),
        content,
        content_type: item.content_type.to_string(),
        object_id: item.object_id,
        created_by: Some(actor),
    };

    diesel::insert_into(activities::table)
        .values(&new_activity)
        .execute(conn)?;

    activities::table.find(new_activity.id).first(conn)
}

/// Create one Notification per recipient for the given activity and enqueue
/// an email-dispatch job for each, all inside the caller's transaction.
fn fan_out(
    conn: &mut PgConnection,
    activity: &Activity,
    recipients: &BTreeSet<Uuid>,
) -> QueryResult<Vec<Notification>> {
    let mut created = Vec::with_capacity(recipients.len());
    for user_id in recipients {
        created.push(create_notification(conn, *user_id, CT_ACTIVITY, activity.id)?);
    }
    Ok(created)
}

/// Insert a notification pointing at a subject and enqueue its dispatch job.
/// The dispatch call site is explicit so delivery is traceable by reading
/// code, not inferred from hook registration.
pub fn create_notification(
    conn: &mut PgConnection,
    user_id: Uuid,
    content_type: &str,
    object_id: Uuid,
) -> QueryResult<Notification> {
    let new_notification = NewNotification {
        id: Uuid::new_v4(),
        user_id,
        content_type: content_type.to_string(),
        object_id,
    };

    diesel::insert_into(notifications::table)
        .values(&new_notification)
        .execute(conn)?;

    enqueue_job(
        conn,
        JOB_SEND_NOTIFICATION_EMAIL,
        json!({ "notification_id": new_notification.id }),
        None,
    )
    .map_err(|JobQueueError::Database(err)| err)?;

    notifications::table.find(new_notification.id).first(conn)
}
