//! Mongo-style filter evaluation over lead documents.
//!
//! Filters arrive from the classifier as JSON objects in MongoDB query
//! syntax. [`LeadFilter::parse`] compiles one into a small condition tree,
//! rejecting unknown operators up front, and [`LeadFilter::matches`] tests a
//! document against it.
//!
//! Supported: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$in`, `$nin`, `$exists`, `$regex` (with `$options`), `$not`, `$and`,
//! `$or`, `$nor`. Dotted paths walk nested objects and fan out over arrays.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crm_core::error::CrmError;

/// Errors raised while compiling a filter.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("filter must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("invalid operand for {op}: {reason}")]
    InvalidOperand { op: String, reason: String },

    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

impl From<FilterError> for CrmError {
    fn from(err: FilterError) -> Self {
        CrmError::Query(err.to_string())
    }
}

/// A compiled lead filter.
#[derive(Debug, Clone)]
pub struct LeadFilter {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Nor(Vec<Node>),
    Field { path: Vec<String>, ops: Vec<FieldOp> },
}

#[derive(Debug, Clone)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    Cmp(Ordering, bool, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Not(Vec<FieldOp>),
}

impl LeadFilter {
    /// Compile a filter document.
    pub fn parse(filter: &Value) -> Result<Self, FilterError> {
        let map = filter
            .as_object()
            .ok_or_else(|| FilterError::NotAnObject(kind_of(filter).to_string()))?;
        Ok(Self {
            root: parse_document(map)?,
        })
    }

    /// Test a document against the filter.
    pub fn matches(&self, doc: &Value) -> bool {
        self.root.matches(doc)
    }
}

// =============================================================================
// Compilation
// =============================================================================

fn parse_document(map: &Map<String, Value>) -> Result<Node, FilterError> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Node::And(parse_clause_list(key, value)?),
            "$or" => Node::Or(parse_clause_list(key, value)?),
            "$nor" => Node::Nor(parse_clause_list(key, value)?),
            op if op.starts_with('$') => {
                return Err(FilterError::UnsupportedOperator(op.to_string()))
            }
            field => Node::Field {
                path: field.split('.').map(str::to_string).collect(),
                ops: parse_condition(value)?,
            },
        };
        clauses.push(clause);
    }
    Ok(Node::And(clauses))
}

fn parse_clause_list(op: &str, value: &Value) -> Result<Vec<Node>, FilterError> {
    let items = value.as_array().ok_or_else(|| FilterError::InvalidOperand {
        op: op.to_string(),
        reason: "expected an array of filter objects".into(),
    })?;
    if items.is_empty() {
        return Err(FilterError::InvalidOperand {
            op: op.to_string(),
            reason: "array must not be empty".into(),
        });
    }
    items
        .iter()
        .map(|item| match item.as_object() {
            Some(map) => parse_document(map),
            None => Err(FilterError::InvalidOperand {
                op: op.to_string(),
                reason: format!("expected an object, got {}", kind_of(item)),
            }),
        })
        .collect()
}

/// Parse the right-hand side of `field: <condition>`.
fn parse_condition(value: &Value) -> Result<Vec<FieldOp>, FilterError> {
    let map = match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        other => return Ok(vec![FieldOp::Eq(unwrap_extended(other))]),
    };

    if let Some(plain) = map.keys().find(|k| !k.starts_with('$')) {
        return Err(FilterError::InvalidOperand {
            op: plain.clone(),
            reason: "cannot mix operators and plain fields".into(),
        });
    }

    let options = match map.get("$options") {
        Some(Value::String(opts)) => Some(opts.as_str()),
        Some(other) => {
            return Err(FilterError::InvalidOperand {
                op: "$options".into(),
                reason: format!("expected a string, got {}", kind_of(other)),
            })
        }
        None => None,
    };
    if options.is_some() && !map.contains_key("$regex") {
        return Err(FilterError::InvalidOperand {
            op: "$options".into(),
            reason: "requires $regex".into(),
        });
    }

    let mut ops = Vec::with_capacity(map.len());
    for (op, operand) in map {
        let parsed = match op.as_str() {
            "$options" => continue,
            "$eq" => FieldOp::Eq(unwrap_extended(operand)),
            "$ne" => FieldOp::Ne(unwrap_extended(operand)),
            "$gt" => FieldOp::Cmp(Ordering::Greater, false, comparable(op, operand)?),
            "$gte" => FieldOp::Cmp(Ordering::Greater, true, comparable(op, operand)?),
            "$lt" => FieldOp::Cmp(Ordering::Less, false, comparable(op, operand)?),
            "$lte" => FieldOp::Cmp(Ordering::Less, true, comparable(op, operand)?),
            "$in" => FieldOp::In(value_list(op, operand)?),
            "$nin" => FieldOp::Nin(value_list(op, operand)?),
            "$exists" => FieldOp::Exists(truthy(operand)),
            "$regex" => FieldOp::Regex(compile_regex(operand, options)?),
            "$not" => FieldOp::Not(parse_not(operand)?),
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        };
        ops.push(parsed);
    }
    Ok(ops)
}

fn parse_not(operand: &Value) -> Result<Vec<FieldOp>, FilterError> {
    match operand {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            parse_condition(operand)
        }
        Value::String(_) => Ok(vec![FieldOp::Regex(compile_regex(operand, None)?)]),
        other => Err(FilterError::InvalidOperand {
            op: "$not".into(),
            reason: format!("expected an operator object or regex, got {}", kind_of(other)),
        }),
    }
}

fn comparable(op: &str, operand: &Value) -> Result<Value, FilterError> {
    let operand = unwrap_extended(operand);
    match operand {
        Value::Number(_) | Value::String(_) => Ok(operand),
        other => Err(FilterError::InvalidOperand {
            op: op.to_string(),
            reason: format!("expected a number, string, or date, got {}", kind_of(&other)),
        }),
    }
}

fn value_list(op: &str, operand: &Value) -> Result<Vec<Value>, FilterError> {
    match operand {
        Value::Array(items) => Ok(items.iter().map(unwrap_extended).collect()),
        other => Err(FilterError::InvalidOperand {
            op: op.to_string(),
            reason: format!("expected an array, got {}", kind_of(other)),
        }),
    }
}

fn compile_regex(pattern: &Value, options: Option<&str>) -> Result<Regex, FilterError> {
    let pattern = pattern.as_str().ok_or_else(|| FilterError::InvalidOperand {
        op: "$regex".into(),
        reason: format!("expected a string, got {}", kind_of(pattern)),
    })?;

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.unwrap_or("").chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(FilterError::InvalidOperand {
                    op: "$options".into(),
                    reason: format!("unknown regex flag '{}'", other),
                })
            }
        };
    }
    builder.build().map_err(|e| FilterError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Collapse Extended JSON wrappers (`{"$date": "..."}`) to their payload.
fn unwrap_extended(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => match map.get("$date") {
            Some(Value::String(date)) => Value::String(date.clone()),
            Some(Value::Number(millis)) => millis
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Evaluation
// =============================================================================

impl Node {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Node::And(nodes) => nodes.iter().all(|n| n.matches(doc)),
            Node::Or(nodes) => nodes.iter().any(|n| n.matches(doc)),
            Node::Nor(nodes) => !nodes.iter().any(|n| n.matches(doc)),
            Node::Field { path, ops } => {
                let mut found = Vec::new();
                lookup(doc, path, &mut found);
                ops.iter().all(|op| op.matches(&found))
            }
        }
    }
}

impl FieldOp {
    fn matches(&self, found: &[&Value]) -> bool {
        match self {
            FieldOp::Eq(operand) => eq_any(found, operand),
            FieldOp::Ne(operand) => !eq_any(found, operand),
            FieldOp::Cmp(wanted, inclusive, operand) => found.iter().any(|value| {
                each_scalar(value).any(|v| match compare(v, operand) {
                    Some(Ordering::Equal) => *inclusive,
                    Some(ordering) => ordering == *wanted,
                    None => false,
                })
            }),
            FieldOp::In(options) => options.iter().any(|operand| eq_any(found, operand)),
            FieldOp::Nin(options) => !options.iter().any(|operand| eq_any(found, operand)),
            FieldOp::Exists(expected) => found.is_empty() != *expected,
            FieldOp::Regex(re) => found.iter().any(|value| {
                each_scalar(value).any(|v| v.as_str().is_some_and(|s| re.is_match(s)))
            }),
            FieldOp::Not(inner) => !inner.iter().all(|op| op.matches(found)),
        }
    }
}

/// Collect every value reachable by `path`. Arrays met on the way are
/// traversed element-wise unless the segment is a numeric index.
fn lookup<'a>(doc: &'a Value, path: &[String], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(doc);
        return;
    };
    match doc {
        Value::Object(map) => {
            if let Some(child) = map.get(head) {
                lookup(child, rest, out);
            }
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(child) = items.get(index) {
                    lookup(child, rest, out);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| item.is_object()) {
                    lookup(item, path, out);
                }
            }
        },
        _ => {}
    }
}

/// A value plus, for arrays, each of its elements.
fn each_scalar<'a>(value: &'a Value) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
    match value {
        Value::Array(items) => Box::new(std::iter::once(value).chain(items.iter())),
        _ => Box::new(std::iter::once(value)),
    }
}

/// Equality with Mongo semantics: `null` matches a missing field, and an
/// array field matches if any element equals the operand.
fn eq_any(found: &[&Value], operand: &Value) -> bool {
    if found.is_empty() {
        return operand.is_null();
    }
    found
        .iter()
        .any(|value| each_scalar(value).any(|v| values_equal(v, operand)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Order two scalars of the same kind. Strings that both parse as dates are
/// compared chronologically, other strings lexically.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_date(x), parse_date(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.as_str().cmp(y.as_str())),
        },
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead() -> Value {
        json!({
            "firstName": "John",
            "lastName": "Smith",
            "email": "j@x.com",
            "status": "new",
            "temperature": "cold",
            "leadScore": 72,
            "tags": ["enterprise", "priority"],
            "company": {"name": "Acme", "industry": "Technology", "size": "51-200"},
            "location": {"city": "Berlin", "country": "Germany"},
            "contacts": [{"channel": "phone"}, {"channel": "email"}],
            "createdAt": "2024-03-15T10:00:00Z"
        })
    }

    fn check(filter: Value) -> bool {
        LeadFilter::parse(&filter).unwrap().matches(&lead())
    }

    #[test]
    fn test_implicit_equality_and_nested_path() {
        assert!(check(json!({"temperature": "cold"})));
        assert!(check(json!({"company.industry": "Technology"})));
        assert!(!check(json!({"company.industry": "Finance"})));
        assert!(check(json!({"temperature": "cold", "status": "new"})));
        assert!(!check(json!({"temperature": "cold", "status": "won"})));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(check(json!({})));
        let empty = LeadFilter::parse(&json!({})).unwrap();
        assert!(empty.matches(&json!({"anything": 1})));
    }

    #[test]
    fn test_array_field_contains() {
        assert!(check(json!({"tags": "priority"})));
        assert!(check(json!({"tags": {"$in": ["smb", "enterprise"]}})));
        assert!(check(json!({"contacts.channel": "email"})));
        assert!(check(json!({"contacts.0.channel": "phone"})));
        assert!(!check(json!({"contacts.0.channel": "email"})));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check(json!({"leadScore": {"$gt": 50}})));
        assert!(check(json!({"leadScore": {"$gte": 72, "$lte": 72}})));
        assert!(!check(json!({"leadScore": {"$lt": 72}})));
        assert!(check(json!({"leadScore": {"$eq": 72.0}})));
        assert!(check(json!({"leadScore": {"$ne": 10}})));
    }

    #[test]
    fn test_date_comparisons() {
        assert!(check(json!({"createdAt": {"$gte": "2024-01-01"}})));
        assert!(!check(json!({"createdAt": {"$gte": "2024-06-01T00:00:00Z"}})));
        assert!(check(json!({"createdAt": {"$lt": {"$date": "2024-04-01T00:00:00Z"}}})));
    }

    #[test]
    fn test_in_nin_exists() {
        assert!(check(json!({"status": {"$in": ["new", "contacted"]}})));
        assert!(!check(json!({"status": {"$nin": ["new"]}})));
        assert!(check(json!({"location.city": {"$exists": true}})));
        assert!(check(json!({"phone": {"$exists": false}})));
        assert!(check(json!({"phone": null})));
    }

    #[test]
    fn test_regex_with_options() {
        assert!(check(json!({"company.name": {"$regex": "^ac", "$options": "i"}})));
        assert!(!check(json!({"company.name": {"$regex": "^ac"}})));
        assert!(check(json!({"firstName": {"$not": {"$regex": "^Z"}}})));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(json!({"$or": [{"status": "won"}, {"temperature": "cold"}]})));
        assert!(!check(json!({"$and": [{"status": "new"}, {"temperature": "hot"}]})));
        assert!(check(json!({"$nor": [{"status": "won"}, {"status": "lost"}]})));
    }

    #[test]
    fn test_unsupported_operators_are_rejected() {
        let err = LeadFilter::parse(&json!({"$where": "this.a > 1"})).unwrap_err();
        assert_eq!(err, FilterError::UnsupportedOperator("$where".into()));

        let err = LeadFilter::parse(&json!({"tags": {"$elemMatch": {"a": 1}}})).unwrap_err();
        assert_eq!(err, FilterError::UnsupportedOperator("$elemMatch".into()));
    }

    #[test]
    fn test_invalid_operands() {
        assert!(matches!(
            LeadFilter::parse(&json!({"status": {"$in": "new"}})),
            Err(FilterError::InvalidOperand { .. })
        ));
        assert!(matches!(
            LeadFilter::parse(&json!({"$or": []})),
            Err(FilterError::InvalidOperand { .. })
        ));
        assert!(matches!(
            LeadFilter::parse(&json!({"name": {"$regex": "("}})),
            Err(FilterError::InvalidRegex { .. })
        ));
        assert!(matches!(
            LeadFilter::parse(&json!(["not", "an", "object"])),
            Err(FilterError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_filter_error_maps_to_query_error() {
        let err: CrmError = FilterError::UnsupportedOperator("$text".into()).into();
        assert!(matches!(err, CrmError::Query(_)));
        assert!(err.to_string().contains("$text"));
    }
}
