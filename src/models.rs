use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::changes::{FieldValue, Snapshot, SnapshotField};
use crate::schema::*;

/// Type tags used in polymorphic (content_type, object_id) references.
pub const CT_PROJECT: &str = "project";
pub const CT_TASK: &str = "task";
pub const CT_SUBTASK: &str = "subtask";
pub const CT_COMMENT: &str = "comment";
pub const CT_ATTACHMENT: &str = "attachment";
pub const CT_ACTIVITY: &str = "activity";
pub const CT_SINGLE_USE_CODE: &str = "single_use_code";

pub const STATUS_CHOICES: &[(i16, &str)] = &[(0, "To Do"), (1, "In Progress"), (2, "Done")];
pub const PRIORITY_CHOICES: &[(i16, &str)] = &[(0, "Low"), (1, "Medium"), (2, "High")];

pub const MODEL_USER: &str = "user";

pub fn status_label(value: Option<i16>) -> Option<&'static str> {
    let value = value?;
    STATUS_CHOICES
        .iter()
        .find(|(candidate, _)| *candidate == value)
        .map(|(_, label)| *label)
}

pub fn priority_label(value: Option<i16>) -> Option<&'static str> {
    let value = value?;
    PRIORITY_CHOICES
        .iter()
        .find(|(candidate, _)| *candidate == value)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email_notification: bool,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Human-readable form used wherever a user id is resolved for display.
    pub fn display_name(&self) -> String {
        if self.first_name.is_empty() && self.last_name.is_empty() {
            self.email.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string()
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = access_list)]
pub struct AccessListEntry {
    pub id: Uuid,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = access_list)]
pub struct NewAccessListEntry {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = single_use_codes)]
#[diesel(belongs_to(User))]
pub struct SingleUseCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: Uuid,
    pub is_used: bool,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SingleUseCode {
    /// A code can be redeemed only while unused and unexpired.
    pub fn is_redeemable(&self) -> bool {
        !self.is_used && self.expires_at > Utc::now().naive_utc()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = single_use_codes)]
pub struct NewSingleUseCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: Uuid,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = domains)]
pub struct Domain {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = domains)]
pub struct NewDomain {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = domain_members)]
pub struct NewDomainMember {
    pub domain_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = projects)]
#[diesel(belongs_to(Domain))]
pub struct Project {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub is_archived: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Project {
    pub fn snapshot(&self, assignees: &BTreeSet<Uuid>) -> Snapshot {
        item_snapshot(
            ("domain", "Parent Domain", self.domain_id),
            &self.title,
            self.description.as_deref(),
            self.start_date,
            self.end_date,
            self.status,
            self.priority,
            assignees,
        )
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_assignees)]
pub struct NewProjectAssignee {
    pub project_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Project))]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub is_archived: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Task {
    pub fn snapshot(&self, assignees: &BTreeSet<Uuid>) -> Snapshot {
        item_snapshot(
            ("project", "Parent Project", self.project_id),
            &self.title,
            self.description.as_deref(),
            self.start_date,
            self.end_date,
            self.status,
            self.priority,
            assignees,
        )
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_assignees)]
pub struct NewTaskAssignee {
    pub task_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = subtasks)]
#[diesel(belongs_to(Task))]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub is_archived: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Subtask {
    pub fn snapshot(&self, assignees: &BTreeSet<Uuid>) -> Snapshot {
        item_snapshot(
            ("task", "Parent Task", self.task_id),
            &self.title,
            self.description.as_deref(),
            self.start_date,
            self.end_date,
            self.status,
            self.priority,
            assignees,
        )
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = subtasks)]
pub struct NewSubtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<i16>,
    pub priority: Option<i16>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = subtask_assignees)]
pub struct NewSubtaskAssignee {
    pub subtask_id: Uuid,
    pub user_id: Uuid,
}

/// Canonical field ordering shared by the three hierarchical item types.
/// Stable order keeps change output deterministic across reads.
#[allow(clippy::too_many_arguments)]
fn item_snapshot(
    parent: (&'static str, &'static str, Uuid),
    title: &str,
    description: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    status: Option<i16>,
    priority: Option<i16>,
    assignees: &BTreeSet<Uuid>,
) -> Snapshot {
    let (parent_field, parent_verbose, parent_id) = parent;
    Snapshot::new(vec![
        SnapshotField::new("title", "title", FieldValue::Text(Some(title.to_string()))),
        SnapshotField::new(
            "description",
            "description",
            FieldValue::MultilineText(description.map(|text| text.to_string())),
        ),
        SnapshotField::new("start_date", "start date", FieldValue::Date(start_date)),
        SnapshotField::new("end_date", "end date", FieldValue::Date(end_date)),
        SnapshotField::new(
            "status",
            "status",
            FieldValue::Choice {
                value: status,
                labels: STATUS_CHOICES,
            },
        ),
        SnapshotField::new(
            "priority",
            "priority",
            FieldValue::Choice {
                value: priority,
                labels: PRIORITY_CHOICES,
            },
        ),
        SnapshotField::new(
            parent_field,
            parent_verbose,
            FieldValue::Reference(Some(parent_id)),
        ),
        SnapshotField::new(
            "assigned_to",
            "assigned to",
            FieldValue::ManyToMany {
                model: MODEL_USER,
                ids: assignees.clone(),
            },
        ),
    ])
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub body: String,
    pub is_updated: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub body: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = attachments)]
pub struct Attachment {
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

#[derive(Debug, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub description: String,
    pub created_by: Option<Uuid>,
}

/// Personal reminder owned by a single user. Todos live outside the change
/// ledger: no activities, no notifications.
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = todos)]
pub struct Todo {
    pub id: Uuid,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
    pub completed: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = todos)]
pub struct NewTodo {
    pub id: Uuid,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activities)]
pub struct Activity {
    pub id: Uuid,
    pub action: String,
    pub content: serde_json::Value,
    pub content_type: String,
    pub object_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activities)]
pub struct NewActivity {
    pub id: Uuid,
    pub action: String,
    pub content: serde_json::Value,
    pub content_type: String,
    pub object_id: Uuid,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = notifications)]
#[diesel(belongs_to(User))]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
    pub viewed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: String,
    pub object_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = email_logs)]
pub struct EmailLog {
    pub id: Uuid,
    pub email: String,
    pub subject: Option<String>,
    pub status: i16,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = email_logs)]
pub struct NewEmailLog {
    pub id: Uuid,
    pub email: String,
    pub subject: Option<String>,
    pub status: i16,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
