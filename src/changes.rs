use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Administrative fields that never show up as user-facing changes.
pub const EXCLUDED_FIELDS: &[&str] = &["is_archived", "created_by", "updated_by"];

/// Diff lines of a description change are cut to this many characters,
/// ellipsis included.
pub const DIFF_LINE_MAX_CHARS: usize = 80;

pub const DATE_PLACEHOLDER: &str = "___ __, ____";

/// One field of a tracked entity, captured before or after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Single-line text, compared as-is.
    Text(Option<String>),
    /// Free-form text diffed line by line on change.
    MultilineText(Option<String>),
    Date(Option<NaiveDate>),
    /// Enumerated value with a display-label mapping.
    Choice {
        value: Option<i16>,
        labels: &'static [(i16, &'static str)],
    },
    /// Foreign reference recorded by id.
    Reference(Option<Uuid>),
    /// Many-to-many relation compared by set equality of ids. The `model`
    /// tag defers display-string resolution to the renderer.
    ManyToMany {
        model: &'static str,
        ids: BTreeSet<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotField {
    pub name: &'static str,
    pub verbose_name: &'static str,
    pub value: FieldValue,
}

impl SnapshotField {
    pub fn new(name: &'static str, verbose_name: &'static str, value: FieldValue) -> Self {
        Self {
            name,
            verbose_name,
            value,
        }
    }
}

/// An ordered field-name -> value capture of a tracked entity. Field order is
/// fixed per entity type so change output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    fields: Vec<SnapshotField>,
}

impl Snapshot {
    pub fn new(fields: Vec<SnapshotField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[SnapshotField] {
        &self.fields
    }

    fn get(&self, name: &str) -> Option<&SnapshotField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// One field-level delta within an Update activity. Stored as raw JSON in
/// `activities.content`; `model`-tagged id lists are resolved to display
/// strings at read time, never at write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeRecord {
    pub field: String,
    pub verbose_name: String,
    pub old_value: Value,
    pub new_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Compare two snapshots of the same entity and describe every differing
/// field. An empty result means the update was a no-op and callers must not
/// record an Activity for it.
pub fn compute_changes(before: &Snapshot, after: &Snapshot) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    for field in after.fields() {
        if EXCLUDED_FIELDS.contains(&field.name) {
            continue;
        }
        let Some(old_field) = before.get(field.name) else {
            continue;
        };
        if old_field.value == field.value {
            continue;
        }

        let record = match (&old_field.value, &field.value) {
            (FieldValue::MultilineText(old), FieldValue::MultilineText(new)) => {
                let (old_lines, new_lines) =
                    diff_lines(old.as_deref().unwrap_or(""), new.as_deref().unwrap_or(""));
                ChangeRecord {
                    field: field.name.to_string(),
                    verbose_name: field.verbose_name.to_string(),
                    old_value: Value::from(old_lines),
                    new_value: Value::from(new_lines),
                    model: None,
                }
            }
            (
                FieldValue::ManyToMany { ids: old, .. },
                FieldValue::ManyToMany { model, ids: new },
            ) => {
                let removed: Vec<String> =
                    old.difference(new).map(|id| id.to_string()).collect();
                let added: Vec<String> = new.difference(old).map(|id| id.to_string()).collect();
                ChangeRecord {
                    field: field.name.to_string(),
                    verbose_name: field.verbose_name.to_string(),
                    old_value: Value::from(removed),
                    new_value: Value::from(added),
                    model: Some((*model).to_string()),
                }
            }
            (FieldValue::Choice { value: old, labels }, FieldValue::Choice { value: new, .. }) => {
                ChangeRecord {
                    field: field.name.to_string(),
                    verbose_name: field.verbose_name.to_string(),
                    old_value: choice_display(*old, labels),
                    new_value: choice_display(*new, labels),
                    model: None,
                }
            }
            (FieldValue::Date(old), FieldValue::Date(new)) => ChangeRecord {
                field: field.name.to_string(),
                verbose_name: field.verbose_name.to_string(),
                old_value: Value::from(format_date_us(*old)),
                new_value: Value::from(format_date_us(*new)),
                model: None,
            },
            (old, new) => ChangeRecord {
                field: field.name.to_string(),
                verbose_name: field.verbose_name.to_string(),
                old_value: scalar_value(old),
                new_value: scalar_value(new),
                model: None,
            },
        };

        changes.push(record);
    }

    changes
}

fn scalar_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) | FieldValue::MultilineText(text) => match text {
            Some(text) => Value::from(text.clone()),
            None => Value::Null,
        },
        FieldValue::Reference(id) => match id {
            Some(id) => Value::from(id.to_string()),
            None => Value::Null,
        },
        FieldValue::Date(date) => Value::from(format_date_us(*date)),
        FieldValue::Choice { value, labels } => choice_display(*value, labels),
        FieldValue::ManyToMany { ids, .. } => {
            Value::from(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>())
        }
    }
}

fn choice_display(value: Option<i16>, labels: &[(i16, &str)]) -> Value {
    match value {
        Some(raw) => labels
            .iter()
            .find(|(candidate, _)| *candidate == raw)
            .map(|(_, label)| Value::from(*label))
            .unwrap_or_else(|| Value::from(raw)),
        None => Value::Null,
    }
}

/// Format a date the way activity descriptions show it: `Jul 10, 2024`.
/// A missing date renders as the fixed placeholder.
pub fn format_date_us(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%b %d, %Y").to_string(),
        None => DATE_PLACEHOLDER.to_string(),
    }
}

/// Line-level diff of a free-text field. Returns the removed and added lines
/// in diff order, each truncated to [`DIFF_LINE_MAX_CHARS`]. Blank lines are
/// dropped, unchanged lines never appear.
fn diff_lines(old: &str, new: &str) -> (Vec<String>, Vec<String>) {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    // dp[i][j] = length of the longest common subsequence of
    // old_lines[i..] and new_lines[j..].
    let mut dp = vec![vec![0usize; new_lines.len() + 1]; old_lines.len() + 1];
    for i in (0..old_lines.len()).rev() {
        for j in (0..new_lines.len()).rev() {
            dp[i][j] = if old_lines[i] == new_lines[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut push = |target: &mut Vec<String>, line: &str| {
        if !line.is_empty() {
            target.push(truncate_chars(line, DIFF_LINE_MAX_CHARS));
        }
    };

    let (mut i, mut j) = (0, 0);
    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            push(&mut removed, old_lines[i]);
            i += 1;
        } else {
            push(&mut added, new_lines[j]);
            j += 1;
        }
    }
    for line in &old_lines[i..] {
        push(&mut removed, line);
    }
    for line in &new_lines[j..] {
        push(&mut added, line);
    }

    (removed, added)
}

/// Truncate to at most `max_chars` characters, the last one being an
/// ellipsis when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
