//! Labeled model output: JSON extraction and tag dispatch.
//!
//! The model is asked for exactly one JSON object but often wraps it in
//! markdown fences or prose, and occasionally emits typographic quotes.
//! [`extract_json_block`] pulls out the first balanced object and
//! [`parse_classifier_output`] validates it against the declared `type`.

use std::borrow::Cow;

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ClassifierError;

/// A validated classifier response, one variant per tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierResult {
    Smalltalk(SmalltalkReply),
    Email(EmailIntent),
    Query(QueryPlan),
}

/// What the classifier made of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Recognized(ClassifierResult),
    /// Well-formed JSON with a `type` the router has no branch for.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmalltalkReply {
    #[serde(default = "default_category")]
    pub category: String,
    pub reply: String,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailIntent {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    pub subject: String,
    pub body: String,
    /// Assistant text to show with the draft. May contain `<recipientName>`.
    #[serde(default)]
    pub reply: String,
}

impl EmailIntent {
    pub fn recipient_name(&self) -> &str {
        self.recipient_name.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn recipient_email(&self) -> &str {
        self.recipient_email.as_deref().map(str::trim).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub mongo_query: Map<String, Value>,
    pub explanation: String,
    pub suggested_fields: Vec<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub estimated_results: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Return the first balanced top-level `{...}` block in `text`.
///
/// Braces inside JSON strings are ignored, so `"body": "use {{name}}"`
/// does not confuse the scan.
pub fn extract_json_block(text: &str) -> Result<&str, ClassifierError> {
    let start = text.find('{').ok_or(ClassifierError::NoJson)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    Err(ClassifierError::Unbalanced)
}

/// Replace typographic quotes with their ASCII forms.
pub fn normalize_quotes(text: &str) -> Cow<'_, str> {
    const CURLY: [char; 4] = ['\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}'];
    if !text.contains(CURLY) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| match c {
                '\u{2018}' | '\u{2019}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                c => c,
            })
            .collect(),
    )
}

/// Extract and parse the JSON object in `raw`.
///
/// The text is tried as-is first; typographic quotes are only normalized
/// when that fails, since they are legal inside JSON strings.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, ClassifierError> {
    match parse_block(raw) {
        Ok(map) => Ok(map),
        Err(first) => match normalize_quotes(raw) {
            Cow::Owned(normalized) => parse_block(&normalized).map_err(|_| first),
            Cow::Borrowed(_) => Err(first),
        },
    }
}

fn parse_block(text: &str) -> Result<Map<String, Value>, ClassifierError> {
    let block = extract_json_block(text)?;
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ClassifierError::InvalidJson("expected an object".into())),
        Err(e) => Err(ClassifierError::InvalidJson(e.to_string())),
    }
}

/// Deserialize a tagged payload, reporting failures as shape errors.
pub(crate) fn from_object<T: DeserializeOwned>(
    tag: &str,
    map: Map<String, Value>,
) -> Result<T, ClassifierError> {
    serde_json::from_value(Value::Object(map)).map_err(|e| ClassifierError::shape(tag, e.to_string()))
}

// =============================================================================
// Classifier output
// =============================================================================

/// Parse raw classifier text into an outcome.
pub fn parse_classifier_output(raw: &str) -> Result<ClassifierOutcome, ClassifierError> {
    let map = parse_object(raw)?;
    let tag = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ClassifierError::MissingType)?
        .trim()
        .to_lowercase();

    let result = match tag.as_str() {
        "smalltalk" => {
            let reply: SmalltalkReply = from_object(&tag, map)?;
            if reply.reply.trim().is_empty() {
                return Err(ClassifierError::shape(&tag, "reply is empty"));
            }
            ClassifierResult::Smalltalk(reply)
        }
        "email" => {
            let intent: EmailIntent = from_object(&tag, map)?;
            if intent.subject.trim().is_empty() || intent.body.trim().is_empty() {
                return Err(ClassifierError::shape(&tag, "subject and body are required"));
            }
            if intent.recipient_name().is_empty() && intent.recipient_email().is_empty() {
                return Err(ClassifierError::shape(&tag, "no recipient name or email"));
            }
            ClassifierResult::Email(intent)
        }
        "query" => ClassifierResult::Query(from_object(&tag, map)?),
        _ => return Ok(ClassifierOutcome::Unrecognized(tag)),
    };
    Ok(ClassifierOutcome::Recognized(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json_block(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_from_markdown_fence() {
        let raw = "```json\n{\"type\": \"smalltalk\", \"reply\": \"Hi\"}\n```";
        assert_eq!(
            extract_json_block(raw).unwrap(),
            "{\"type\": \"smalltalk\", \"reply\": \"Hi\"}"
        );
    }

    #[test]
    fn test_extract_ignores_surrounding_prose() {
        let raw = "Sure! Here you go: {\"a\": {\"b\": 2}} Let me know if you need more.";
        assert_eq!(extract_json_block(raw).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_extract_braces_inside_strings() {
        let raw = r#"{"body": "Hi {{name}}, see } and {", "x": "\"}"} trailing }"#;
        assert_eq!(
            extract_json_block(raw).unwrap(),
            r#"{"body": "Hi {{name}}, see } and {", "x": "\"}"}"#
        );
    }

    #[test]
    fn test_extract_takes_first_of_two_objects() {
        let raw = r#"{"type": "query"} {"type": "email"}"#;
        assert_eq!(extract_json_block(raw).unwrap(), r#"{"type": "query"}"#);
    }

    #[test]
    fn test_extract_failures() {
        assert!(matches!(
            extract_json_block("I cannot help with that."),
            Err(ClassifierError::NoJson)
        ));
        assert!(matches!(
            extract_json_block(r#"{"type": "query", "mongoQuery": {"#),
            Err(ClassifierError::Unbalanced)
        ));
        assert!(matches!(extract_json_block(""), Err(ClassifierError::NoJson)));
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(
            normalize_quotes("\u{201C}type\u{201D}: \u{201C}it\u{2019}s\u{201D}"),
            "\"type\": \"it's\""
        );
        assert!(matches!(normalize_quotes("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_parse_object_retries_with_normalized_quotes() {
        let raw = "{\u{201C}type\u{201D}: \u{201C}smalltalk\u{201D}, \u{201C}reply\u{201D}: \u{201C}Hi\u{201D}}";
        let map = parse_object(raw).unwrap();
        assert_eq!(map["type"], "smalltalk");
    }

    #[test]
    fn test_parse_object_keeps_curly_quotes_inside_valid_strings() {
        let raw = "{\"type\": \"smalltalk\", \"reply\": \"She said \u{201C}hello\u{201D}\"}";
        let map = parse_object(raw).unwrap();
        assert_eq!(map["reply"], "She said \u{201C}hello\u{201D}");
    }

    #[test]
    fn test_parse_object_invalid_json() {
        assert!(matches!(
            parse_object(r#"{"type": "query", }"#),
            Err(ClassifierError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_object("{type: query}"),
            Err(ClassifierError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_smalltalk() {
        let outcome = parse_classifier_output(
            r#"{"type": "smalltalk", "category": "greeting", "reply": "Hello! 👋"}"#,
        )
        .unwrap();
        match outcome {
            ClassifierOutcome::Recognized(ClassifierResult::Smalltalk(s)) => {
                assert_eq!(s.category, "greeting");
                assert_eq!(s.reply, "Hello! 👋");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_parse_smalltalk_requires_reply() {
        assert!(matches!(
            parse_classifier_output(r#"{"type": "smalltalk", "reply": "  "}"#),
            Err(ClassifierError::Shape { .. })
        ));
        assert!(matches!(
            parse_classifier_output(r#"{"type": "smalltalk"}"#),
            Err(ClassifierError::Shape { .. })
        ));
    }

    #[test]
    fn test_parse_email() {
        let raw = r#"Draft below:
```json
{"type": "email", "recipientName": "John Smith", "recipientEmail": "", "subject": "Intro",
 "body": "Hi John,\nNice to meet you.", "drafted": true, "reply": "Draft ready for <recipientName>"}
```"#;
        match parse_classifier_output(raw).unwrap() {
            ClassifierOutcome::Recognized(ClassifierResult::Email(e)) => {
                assert_eq!(e.recipient_name(), "John Smith");
                assert_eq!(e.recipient_email(), "");
                assert_eq!(e.body, "Hi John,\nNice to meet you.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_parse_email_null_recipient_email() {
        let raw = r#"{"type": "email", "recipientName": "Emily", "recipientEmail": null, "subject": "s", "body": "b"}"#;
        assert!(matches!(
            parse_classifier_output(raw).unwrap(),
            ClassifierOutcome::Recognized(ClassifierResult::Email(_))
        ));
    }

    #[test]
    fn test_parse_email_shape_failures() {
        let no_subject = r#"{"type": "email", "recipientName": "John", "body": "b"}"#;
        assert!(matches!(
            parse_classifier_output(no_subject),
            Err(ClassifierError::Shape { .. })
        ));
        let no_recipient = r#"{"type": "email", "subject": "s", "body": "b"}"#;
        assert!(matches!(
            parse_classifier_output(no_recipient),
            Err(ClassifierError::Shape { .. })
        ));
    }

    #[test]
    fn test_parse_query() {
        let raw = r#"{"type": "query", "mongoQuery": {"temperature": "cold"}, "explanation": "Cold leads",
                      "suggestedFields": ["email", "company.industry"], "estimatedResults": 12}"#;
        match parse_classifier_output(raw).unwrap() {
            ClassifierOutcome::Recognized(ClassifierResult::Query(q)) => {
                assert_eq!(q.mongo_query["temperature"], "cold");
                assert_eq!(q.suggested_fields, vec!["email", "company.industry"]);
                assert_eq!(q.estimated_results, "12");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_parse_query_shape_failures() {
        let string_query = r#"{"type": "query", "mongoQuery": "db.leads.find()", "explanation": "",
                               "suggestedFields": [], "estimatedResults": "few"}"#;
        assert!(matches!(
            parse_classifier_output(string_query),
            Err(ClassifierError::Shape { .. })
        ));
        let missing_fields = r#"{"type": "query", "mongoQuery": {}}"#;
        assert!(matches!(
            parse_classifier_output(missing_fields),
            Err(ClassifierError::Shape { .. })
        ));
        let bad_estimate = r#"{"type": "query", "mongoQuery": {}, "explanation": "",
                               "suggestedFields": [], "estimatedResults": [1]}"#;
        assert!(matches!(
            parse_classifier_output(bad_estimate),
            Err(ClassifierError::Shape { .. })
        ));
    }

    #[test]
    fn test_missing_or_non_string_type() {
        assert!(matches!(
            parse_classifier_output(r#"{"reply": "hi"}"#),
            Err(ClassifierError::MissingType)
        ));
        assert!(matches!(
            parse_classifier_output(r#"{"type": 3}"#),
            Err(ClassifierError::MissingType)
        ));
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        assert_eq!(
            parse_classifier_output(r#"{"type": "Calendar", "when": "tomorrow"}"#).unwrap(),
            ClassifierOutcome::Unrecognized("calendar".into())
        );
    }
}
