use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::changes::ChangeRecord;
use crate::models::{User, MODEL_USER};
use crate::schema::users;

type ResolverFn = fn(&mut PgConnection, &[Uuid]) -> QueryResult<Vec<String>>;

/// Static registry mapping a `model` tag to its display-string lookup.
/// Built at compile time; no hidden global state.
const RESOLVERS: &[(&str, ResolverFn)] = &[(MODEL_USER, resolve_users)];

fn resolve_users(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<Vec<String>> {
    let matched: Vec<User> = users::table
        .filter(users::id.eq_any(ids))
        .load(conn)?;
    // Preserve the incoming id order; ids with no row are silently dropped.
    Ok(ids
        .iter()
        .filter_map(|id| matched.iter().find(|user| user.id == *id))
        .map(User::display_name)
        .collect())
}

/// Expand `model`-tagged id lists in a persisted change list into current
/// display strings. Called at read time so a renamed user shows the new name
/// in old activities. Untagged records pass through unchanged; an unknown
/// model tag yields a diagnostic string instead of an error.
pub fn render_description(conn: &mut PgConnection, records: &[ChangeRecord]) -> Vec<ChangeRecord> {
    records
        .iter()
        .map(|record| match record.model.as_deref() {
            Some(model) => render_tagged(conn, record, model),
            None => record.clone(),
        })
        .collect()
}

fn render_tagged(conn: &mut PgConnection, record: &ChangeRecord, model: &str) -> ChangeRecord {
    let Some((_, resolver)) = RESOLVERS.iter().find(|(tag, _)| *tag == model) else {
        let diagnostic = Value::from(format!("unknown reference type: {model}"));
        return ChangeRecord {
            old_value: diagnostic.clone(),
            new_value: diagnostic,
            model: record.model.clone(),
            ..record.clone()
        };
    };

    ChangeRecord {
        old_value: resolve_id_list(conn, *resolver, &record.old_value),
        new_value: resolve_id_list(conn, *resolver, &record.new_value),
        model: record.model.clone(),
        ..record.clone()
    }
}

fn resolve_id_list(conn: &mut PgConnection, resolver: ResolverFn, value: &Value) -> Value {
    let Some(entries) = value.as_array() else {
        return value.clone();
    };

    let ids: Vec<Uuid> = entries
        .iter()
        .filter_map(|entry| entry.as_str())
        .filter_map(|raw| Uuid::parse_str(raw).ok())
        .collect();

    match resolver(conn, &ids) {
        Ok(names) => Value::from(names),
        Err(err) => {
            tracing::warn!(error = %err, "failed to resolve change references");
            Value::from(Vec::<String>::new())
        }
    }
}
