//! Field projection of query results.

use serde_json::{Map, Value};

/// Fields always included in query results.
pub const BASE_FIELDS: [&str; 2] = ["firstName", "lastName"];

/// Base fields followed by the suggested ones, first occurrence wins.
pub fn projection_fields(suggested: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::with_capacity(BASE_FIELDS.len() + suggested.len());
    for field in BASE_FIELDS
        .iter()
        .copied()
        .chain(suggested.iter().map(String::as_str))
    {
        let field = field.trim();
        if !field.is_empty() && !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
    fields
}

/// Pick `fields` out of `doc`. Dotted paths walk nested objects and are
/// keyed by their last segment; missing values are left out.
pub fn project(doc: &Value, fields: &[String]) -> Map<String, Value> {
    let mut row = Map::new();
    for field in fields {
        let mut current = Some(doc);
        for segment in field.split('.') {
            current = current.and_then(|value| value.get(segment));
        }
        if let Some(value) = current {
            let key = field.rsplit('.').next().unwrap_or(field);
            row.insert(key.to_string(), value.clone());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_projection_fields_dedup_preserves_order() {
        assert_eq!(
            projection_fields(&fields(&["email", "lastName", "company.industry", "email"])),
            fields(&["firstName", "lastName", "email", "company.industry"])
        );
        assert_eq!(projection_fields(&[]), fields(&["firstName", "lastName"]));
    }

    #[test]
    fn test_project_nested_field_keyed_by_last_segment() {
        let doc = json!({
            "firstName": "John",
            "lastName": "Smith",
            "company": {"name": "Acme", "industry": "Technology"}
        });
        let row = project(&doc, &fields(&["firstName", "company.industry"]));
        assert_eq!(row["industry"], "Technology");
        assert_eq!(row["firstName"], "John");
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_project_omits_missing_values() {
        let doc = json!({"firstName": "John", "company": "Acme", "phone": null});
        let row = project(&doc, &fields(&["firstName", "lastName", "company.industry", "phone"]));
        assert!(!row.contains_key("lastName"));
        assert!(!row.contains_key("industry"));
        assert_eq!(row["phone"], Value::Null);
    }
}
