use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

/// Distinguishes an absent PATCH field from an explicit `null`. Omitted
/// leaves the column untouched; Null clears it.
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

pub fn classify_nullable_string(
    optional_value: Option<&Value>,
) -> Result<NullableValue<String>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::Value(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

pub fn classify_nullable_date(
    optional_value: Option<&Value>,
) -> Result<NullableValue<NaiveDate>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(NullableValue::Value)
            .map_err(|_| format!("expected YYYY-MM-DD date, got {s:?}")),
        Some(other) => Err(format!("expected date string or null, got {other}")),
    }
}

pub fn classify_nullable_datetime(
    optional_value: Option<&Value>,
) -> Result<NullableValue<NaiveDateTime>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(NullableValue::Value)
            .map_err(|_| format!("expected YYYY-MM-DDTHH:MM:SS timestamp, got {s:?}")),
        Some(other) => Err(format!("expected timestamp string or null, got {other}")),
    }
}

/// Choice fields accept only the values present in the label table.
pub fn classify_nullable_choice(
    optional_value: Option<&Value>,
    labels: &[(i16, &str)],
) -> Result<NullableValue<i16>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::Number(n)) => {
            let value = n
                .as_i64()
                .and_then(|raw| i16::try_from(raw).ok())
                .ok_or_else(|| format!("expected small integer, got {n}"))?;
            if labels.iter().any(|(candidate, _)| *candidate == value) {
                Ok(NullableValue::Value(value))
            } else {
                Err(format!("{value} is not a valid choice"))
            }
        }
        Some(other) => Err(format!("expected integer or null, got {other}")),
    }
}

pub fn parse_uuid(optional_value: Option<&Value>) -> Result<Option<Uuid>, String> {
    match optional_value {
        None => Ok(None),
        Some(Value::String(s)) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| format!("expected UUID, got {s:?}")),
        Some(other) => Err(format!("expected UUID string, got {other}")),
    }
}

pub fn parse_uuid_array(optional_value: Option<&Value>) -> Result<Option<Vec<Uuid>>, String> {
    match optional_value {
        None => Ok(None),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(s) => {
                    Uuid::parse_str(s).map_err(|_| format!("expected UUID, got {s:?}"))
                }
                other => Err(format!("expected UUID string, got {other}")),
            })
            .collect::<Result<Vec<Uuid>, String>>()
            .map(Some),
        Some(other) => Err(format!("expected array of UUIDs, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distinguishes_omitted_null_and_value() {
        assert!(matches!(
            classify_nullable_string(None),
            Ok(NullableValue::Omitted)
        ));
        assert!(matches!(
            classify_nullable_string(Some(&Value::Null)),
            Ok(NullableValue::Null)
        ));
        assert!(matches!(
            classify_nullable_string(Some(&json!("hello"))),
            Ok(NullableValue::Value(ref s)) if s == "hello"
        ));
        assert!(classify_nullable_string(Some(&json!(5))).is_err());
    }

    #[test]
    fn parses_iso_dates() {
        let parsed = classify_nullable_date(Some(&json!("2024-03-15"))).unwrap();
        assert!(matches!(
            parsed,
            NullableValue::Value(date) if date.to_string() == "2024-03-15"
        ));
        assert!(classify_nullable_date(Some(&json!("15/03/2024"))).is_err());
    }

    #[test]
    fn parses_iso_timestamps() {
        let parsed = classify_nullable_datetime(Some(&json!("2024-03-15T09:30:00"))).unwrap();
        assert!(matches!(
            parsed,
            NullableValue::Value(stamp) if stamp.to_string() == "2024-03-15 09:30:00"
        ));
        assert!(matches!(
            classify_nullable_datetime(Some(&Value::Null)),
            Ok(NullableValue::Null)
        ));
        assert!(classify_nullable_datetime(Some(&json!("2024-03-15"))).is_err());
    }

    #[test]
    fn rejects_out_of_range_choices() {
        let labels: &[(i16, &str)] = &[(0, "Low"), (1, "High")];
        assert!(matches!(
            classify_nullable_choice(Some(&json!(1)), labels),
            Ok(NullableValue::Value(1))
        ));
        assert!(classify_nullable_choice(Some(&json!(7)), labels).is_err());
        assert!(classify_nullable_choice(Some(&json!("1")), labels).is_err());
    }

    #[test]
    fn parses_uuid_arrays() {
        let id = Uuid::new_v4();
        let parsed = parse_uuid_array(Some(&json!([id.to_string()]))).unwrap();
        assert_eq!(parsed, Some(vec![id]));
        assert!(parse_uuid_array(Some(&json!(["nope"]))).is_err());
        assert_eq!(parse_uuid_array(None).unwrap(), None);
    }
}
