use serde::{Deserialize, Serialize};

/// A fully rendered message for a single recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    /// Plain-text alternative.
    pub text: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

/// An attachment with its content loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Set for inline parts referenced from the HTML body as `cid:<id>`.
    pub content_id: Option<String>,
}

impl MailAttachment {
    pub fn is_inline(&self) -> bool {
        self.content_id.is_some()
    }
}

/// What the transport reported for one accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    pub message_id: String,
    pub recipient: String,
    pub response: String,
}
