use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response to one chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<QueryResultSet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftView>,
}

impl ChatReply {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(text.into()),
            data: None,
            draft: None,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::message(text)
        }
    }

    pub fn query(result: QueryResultSet) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(vec![result]),
            draft: None,
        }
    }

    pub fn draft(text: impl Into<String>, draft: DraftView) -> Self {
        Self {
            draft: Some(draft),
            ..Self::message(text)
        }
    }
}

/// Results of one executed lead query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultSet {
    /// The user's message as received.
    pub original: String,
    pub total: usize,
    pub explanation: String,
    pub mongo_query: Map<String, Value>,
    pub estimated_results: String,
    pub results: Vec<Map<String, Value>>,
}

/// The staged draft as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    pub recipient_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_omits_absent_fields() {
        let value = serde_json::to_value(ChatReply::message("Hello")).unwrap();
        assert_eq!(value, json!({"success": true, "message": "Hello"}));

        let value = serde_json::to_value(ChatReply::failure("nope")).unwrap();
        assert_eq!(value["success"], false);
    }

    #[test]
    fn test_query_reply_uses_camel_case() {
        let reply = ChatReply::query(QueryResultSet {
            original: "cold leads".into(),
            total: 0,
            explanation: "Cold leads".into(),
            mongo_query: Map::new(),
            estimated_results: "few".into(),
            results: vec![],
        });
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["data"][0]["mongoQuery"], json!({}));
        assert_eq!(value["data"][0]["estimatedResults"], "few");
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_draft_reply() {
        let reply = ChatReply::draft(
            "Here is your draft",
            DraftView {
                subject: "Hi".into(),
                body: "Body".into(),
                to: vec!["j@x.com".into()],
                recipient_name: "John Smith".into(),
            },
        );
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["draft"]["recipientName"], "John Smith");
        assert_eq!(value["draft"]["to"], json!(["j@x.com"]));
        assert_eq!(value["success"], true);
    }
}
