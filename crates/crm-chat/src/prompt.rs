//! Prompt construction for the classifier and the email composer.

use chrono::{DateTime, Datelike, Utc};

use crm_core::types::{Lead, Message};

/// Bumped whenever the instruction text changes in a way that alters the
/// response contract.
pub const PROMPT_VERSION: &str = "crm-router/3";

/// System instructions for intent classification.
pub const CLASSIFIER_INSTRUCTIONS: &str = r#"You are an expert CRM AI assistant working over a collection of sales leads.

Interpret the user's message and RETURN ONLY ONE JSON OBJECT in one of these formats:

For smalltalk (greetings, thanks, questions about you):
  {"type": "smalltalk", "category": "greeting", "reply": "Hello! How can I help with your leads today?"}

For a request to write or send an email to a person:
  {"type": "email", "recipientName": "First Last", "recipientEmail": "", "subject": "...", "body": "...", "reply": "Here is a draft for <recipientName>."}
  Leave recipientEmail empty unless the user gave an address.

For a question about leads, produce a MongoDB find() filter:
  {"type": "query", "mongoQuery": {}, "explanation": "...", "suggestedFields": ["email", "company.name"], "estimatedResults": "..."}

LEAD SCHEMA:
{
  "firstName": String, "lastName": String, "email": String, "phone": String,
  "temperature": "cold" | "warm" | "hot",
  "status": "new" | "contacted" | "qualified" | "proposal" | "negotiation" | "closed-won" | "closed-lost",
  "company": {"name": String, "industry": String, "size": "1-10" | "11-50" | "51-200" | "201-500" | "501-1000" | "1000+", "website": String},
  "source": String, "campaign": String, "estimatedValue": Number, "budget": Number,
  "location": {"country": String, "state": String, "city": String, "zipCode": String},
  "tags": [String], "isQualified": Boolean, "isActive": Boolean,
  "createdAt": Date, "updatedAt": Date
}

QUERY RULES:
1. Use operators $eq, $ne, $gt, $gte, $lt, $lte, $in, $nin, $exists, $regex (with $options "i"), $and, $or, $nor only.
2. Use case-insensitive $regex for free-text matches such as company names or industries.
3. Month references without a year mean the current year. "recent" means the last 30 days.
4. For date ranges use the start and end of the period, formatted as ISO 8601 strings like "2025-07-01T00:00:00Z".
5. Never emit JavaScript such as new Date() or ObjectId(); mongoQuery must be plain JSON.
6. suggestedFields lists the fields worth showing; nested fields use dot notation.

Return ONLY the JSON object, with no markdown, notes, or extra text."#;

/// System instructions for composing an email from an enriched request.
pub const COMPOSE_INSTRUCTIONS: &str = r#"You are an AI CRM assistant. The user wants to write and/or send an email. You must:
- Understand the user's intent.
- Use the recipient email addresses given in the request.
- Write a professional, context-appropriate subject and body.
- Reply with a JSON object ONLY, in this format:
{
  "intent": "send_welcome_email",
  "recipients": ["foo@example.com"],
  "subject": "Your Subject Here",
  "body": "Your email body here. Use {{name}} as a placeholder if you are addressing multiple people."
}

Only respond with the JSON object. Do not include explanation, markdown, code blocks, or commentary."#;

/// One line per message, oldest first. Structured content is summarized.
pub fn summarize_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content.summarize()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn date_context(now: DateTime<Utc>) -> String {
    format!(
        "Current date context:\n- Current year: {}\n- Current month: {}\n- Current date: {}",
        now.year(),
        now.month(),
        now.format("%Y-%m-%d")
    )
}

/// The user-facing part of the classification request.
pub fn classifier_prompt(message: &str, history: &[Message], now: DateTime<Utc>) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&summarize_history(history));
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("User message: \"{}\"\n\n", message));
    prompt.push_str(&date_context(now));
    prompt
}

/// Request text for the composer, with the resolved lead spelled out.
pub fn enriched_compose_request(lead: &Lead, message: &str) -> String {
    format!(
        "Send an email to:\nName: {}\nEmail: {}\nCompany: {}\nUser's message: {}",
        lead.full_name(),
        lead.email,
        lead.company_name(),
        message
    )
}

pub fn compose_prompt(request: &str) -> String {
    format!("User message: \"{}\"", request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_date_context() {
        let ctx = date_context(fixed_now());
        assert!(ctx.contains("Current year: 2025"));
        assert!(ctx.contains("Current month: 7"));
        assert!(ctx.contains("Current date: 2025-07-04"));
    }

    #[test]
    fn test_history_summary_collapses_structured_content() {
        let history = vec![
            Message::user("cold leads please"),
            Message::assistant(json!([{"firstName": "A"}, {"firstName": "B"}])),
        ];
        assert_eq!(
            summarize_history(&history),
            "user: cold leads please\nassistant: [structured content: 2 item(s)]"
        );
    }

    #[test]
    fn test_classifier_prompt_sections() {
        let prompt = classifier_prompt("hi", &[Message::user("earlier")], fixed_now());
        assert!(prompt.starts_with("Recent conversation:\nuser: earlier"));
        assert!(prompt.contains("User message: \"hi\""));
        assert!(prompt.ends_with("Current date: 2025-07-04"));

        let bare = classifier_prompt("hi", &[], fixed_now());
        assert!(bare.starts_with("User message:"));
    }

    #[test]
    fn test_enriched_compose_request() {
        let lead: Lead = serde_json::from_value(json!({
            "firstName": "John", "lastName": "Smith", "email": "j@x.com",
            "company": {"name": "Acme"}
        }))
        .unwrap();
        let text = enriched_compose_request(&lead, "email to John Smith about pricing");
        assert!(text.contains("Name: John Smith"));
        assert!(text.contains("Email: j@x.com"));
        assert!(text.contains("Company: Acme"));
        assert!(text.ends_with("User's message: email to John Smith about pricing"));
    }

    #[test]
    fn test_instructions_name_every_tag() {
        for tag in ["\"smalltalk\"", "\"email\"", "\"query\""] {
            assert!(CLASSIFIER_INSTRUCTIONS.contains(tag));
        }
        assert!(!PROMPT_VERSION.is_empty());
    }
}
