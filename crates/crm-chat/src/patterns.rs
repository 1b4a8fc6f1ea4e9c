//! Text patterns used by the router.

use std::sync::LazyLock;

use regex::Regex;

/// Loose signal that a message is about email.
static EMAIL_TRIGGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)email|mail|send").unwrap());

/// "email to John Smith ...", any case. Captures the next one or two words,
/// so the second word may not be part of the name.
static RECIPIENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:send mail to|write mail to|write email to|mail to|email to)\s+(\p{L}+(?:\s+\p{L}+)?)",
    )
    .unwrap()
});

static EMAIL_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_email_request(message: &str) -> bool {
    EMAIL_TRIGGER_RE.is_match(message)
}

/// The one or two words following a "mail to"-style phrase, if any.
pub fn extract_recipient_name(message: &str) -> Option<String> {
    RECIPIENT_NAME_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Syntactic address check.
pub fn is_email_address(text: &str) -> bool {
    EMAIL_ADDRESS_RE.is_match(text.trim())
}
