//! Mail transports.
//!
//! [`SmtpMailTransport`] delivers through an SMTP relay with lettre.
//! [`LogTransport`] only logs, for running without mail credentials.
//! [`MemoryTransport`] records messages and can be told to reject chosen
//! recipients.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};
use uuid::Uuid;

use crm_core::config::MailConfig;

use crate::error::MailError;
use crate::types::{DeliveryInfo, MailAttachment, OutgoingEmail};

/// Delivers one rendered message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryInfo, MailError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// SMTP
// =============================================================================

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailTransport {
    /// Build a relay transport. `secure` selects implicit TLS, otherwise
    /// STARTTLS is required.
    pub fn from_config(config: &MailConfig, from: &str) -> Result<Self, MailError> {
        if config.smtp_host.trim().is_empty() {
            return Err(MailError::Config("SMTP host is not configured".into()));
        }

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| MailError::Config(format!("invalid SMTP relay: {}", e)))?;

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ));
        }

        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            secure = config.secure,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryInfo, MailError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain());
        let message = build_message(&self.from, email, &message_id)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let text: Vec<&str> = response.message().collect();
        Ok(DeliveryInfo {
            message_id,
            recipient: email.to.clone(),
            response: format!("{} {}", response.code(), text.join(" ")),
        })
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Assemble the MIME tree: mixed[ related[ alternative[text, html], inline* ], attachment* ].
fn build_message(
    from: &Mailbox,
    email: &OutgoingEmail,
    message_id: &str,
) -> Result<Message, MailError> {
    let mut related = MultiPart::related().multipart(MultiPart::alternative_plain_html(
        email.text.clone(),
        email.html.clone(),
    ));
    for attachment in email.attachments.iter().filter(|a| a.is_inline()) {
        related = related.singlepart(attachment_part(attachment)?);
    }

    let mut body = MultiPart::mixed().multipart(related);
    for attachment in email.attachments.iter().filter(|a| !a.is_inline()) {
        body = body.singlepart(attachment_part(attachment)?);
    }

    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.clone())
        .message_id(Some(message_id.to_string()))
        .multipart(body)
        .map_err(|e| MailError::Build(e.to_string()))
}

fn attachment_part(attachment: &MailAttachment) -> Result<SinglePart, MailError> {
    let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
        MailError::Build(format!(
            "invalid content type '{}' for {}: {}",
            attachment.content_type, attachment.filename, e
        ))
    })?;
    let builder = match &attachment.content_id {
        Some(cid) => Attachment::new_inline(cid.clone()),
        None => Attachment::new(attachment.filename.clone()),
    };
    Ok(builder.body(attachment.content.clone(), content_type))
}

// =============================================================================
// Logging
// =============================================================================

/// Transport used when SMTP is disabled. Accepts every message.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryInfo, MailError> {
        let message_id = format!("<{}@localhost>", Uuid::new_v4());
        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            message_id = %message_id,
            "Mail delivery disabled, logging message instead"
        );
        debug!(body = %email.text, "Logged message body");
        Ok(DeliveryInfo {
            message_id,
            recipient: email.to.clone(),
            response: "250 logged".into(),
        })
    }

    fn name(&self) -> &str {
        "log"
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Records every message it accepts.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send to `address` fail.
    pub fn reject(&self, address: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(address.to_lowercase());
        }
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Recipients of accepted messages, in send order.
    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryInfo, MailError> {
        let rejected = self
            .rejected
            .lock()
            .map(|r| r.contains(&email.to.to_lowercase()))
            .unwrap_or(false);
        if rejected {
            return Err(MailError::Transport(format!(
                "550 mailbox unavailable: {}",
                email.to
            )));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|e| MailError::Transport(format!("transport lock poisoned: {}", e)))?;
        sent.push(email.clone());
        Ok(DeliveryInfo {
            message_id: format!("<memory-{}@localhost>", sent.len()),
            recipient: email.to.clone(),
            response: "250 queued".into(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
