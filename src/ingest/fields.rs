//! Lookups over loosely-shaped upstream JSON.
//!
//! Exports spell the same fact several ways and leave fields null or empty, so
//! every probe goes through [`first_present`] instead of ad-hoc `get` chains.

use serde_json::Value;

/// Follow a dotted path (`"league.id"`) through nested objects.
pub fn path_value<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = root;
    for part in path.split('.') {
        cursor = cursor.get(part)?;
    }
    Some(cursor)
}

/// A value counts as present unless it is missing, `null`, or a blank string.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Return the first present value among `paths`, in order.
pub fn first_present<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| path_value(root, path))
        .find(|value| is_present(value))
}

/// Render an id-like scalar as a string. Objects and arrays are not ids.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce integers, integral floats and numeric strings to `i64`.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn first_string(root: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| path_value(root, path))
        .find_map(scalar_string)
}

pub fn first_integer(root: &Value, paths: &[&str]) -> Option<i64> {
    paths
        .iter()
        .filter_map(|path| path_value(root, path))
        .find_map(as_integer)
}

/// First element of a top-level list field, when it is a non-empty array.
pub fn first_list_item<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    root.get(field)?.as_array()?.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_present_skips_null_and_blank() {
        let doc = json!({"a": null, "b": "  ", "c": 0, "nested": {"id": 7}});
        assert_eq!(first_present(&doc, &["a", "b", "c"]), Some(&json!(0)));
        assert_eq!(first_present(&doc, &["missing", "nested.id"]), Some(&json!(7)));
        assert_eq!(first_present(&doc, &["a", "b"]), None);
    }

    #[test]
    fn integers_coerce_from_strings_and_floats() {
        assert_eq!(as_integer(&json!("12")), Some(12));
        assert_eq!(as_integer(&json!(3.0)), Some(3));
        assert_eq!(as_integer(&json!(3.5)), None);
        assert_eq!(as_integer(&json!("three")), None);
    }

    #[test]
    fn first_string_falls_through_non_scalars() {
        let doc = json!({"leagueId": {"x": 1}, "league": {"id": 17287266}});
        assert_eq!(
            first_string(&doc, &["leagueId", "league.id"]).as_deref(),
            Some("17287266")
        );
    }
}
