//! Per-recipient dispatch of a confirmed draft.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crm_core::config::MailConfig;
use crm_core::types::AttachmentRef;

use crate::error::MailError;
use crate::render::{render_html, SIGNATURE_CID};
use crate::transport::MailTransport;
use crate::types::{DeliveryInfo, MailAttachment, OutgoingEmail};

/// A recipient the transport did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDelivery {
    pub recipient: String,
    pub error: String,
}

/// Outcome of sending one draft to every recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: Vec<DeliveryInfo>,
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn sent_recipients(&self) -> Vec<&str> {
        self.sent.iter().map(|d| d.recipient.as_str()).collect()
    }

    pub fn failed_recipients(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.recipient.as_str()).collect()
    }
}

/// Renders a draft and sends it to each recipient separately.
pub struct EmailDispatcher {
    transport: Arc<dyn MailTransport>,
    signature: Option<MailAttachment>,
    timeout: Duration,
}

impl EmailDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            signature: None,
            timeout,
        }
    }

    /// Build a dispatcher from config, loading the signature image if the
    /// configured file exists.
    pub fn from_config(transport: Arc<dyn MailTransport>, config: &MailConfig) -> Self {
        let dispatcher = Self::new(transport, Duration::from_secs(config.timeout_secs));
        match load_signature(Path::new(&config.signature_path)) {
            Ok(signature) => dispatcher.with_signature(signature),
            Err(e) => {
                warn!(error = %e, "Signature image unavailable, emails will be sent without it");
                dispatcher
            }
        }
    }

    pub fn with_signature(mut self, signature: MailAttachment) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Send one message to `to`.
    pub async fn dispatch(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[AttachmentRef],
    ) -> Result<DeliveryInfo, MailError> {
        let loaded = load_attachments(attachments).await?;
        self.send_rendered(to, subject, body, &loaded).await
    }

    /// Send the draft to every recipient in order, continuing past failures.
    pub async fn dispatch_all(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        attachments: &[AttachmentRef],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let loaded = match load_attachments(attachments).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Could not load attachments, nothing sent");
                report.failed = recipients
                    .iter()
                    .map(|r| FailedDelivery {
                        recipient: r.clone(),
                        error: e.to_string(),
                    })
                    .collect();
                return report;
            }
        };

        for recipient in recipients {
            match self.send_rendered(recipient, subject, body, &loaded).await {
                Ok(info) => report.sent.push(info),
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "Email delivery failed");
                    report.failed.push(FailedDelivery {
                        recipient: recipient.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            transport = self.transport.name(),
            sent = report.sent.len(),
            failed = report.failed.len(),
            "Draft dispatched"
        );
        report
    }

    async fn send_rendered(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[MailAttachment],
    ) -> Result<DeliveryInfo, MailError> {
        let mut parts = attachments.to_vec();
        if let Some(signature) = &self.signature {
            parts.push(signature.clone());
        }
        let email = OutgoingEmail {
            to: to.trim().to_string(),
            subject: subject.to_string(),
            text: body.to_string(),
            html: render_html(body, self.signature.as_ref().map(|_| SIGNATURE_CID)),
            attachments: parts,
        };

        match tokio::time::timeout(self.timeout, self.transport.send(&email)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// Read the signature image for inline use.
pub fn load_signature(path: &Path) -> Result<MailAttachment, MailError> {
    let content = std::fs::read(path).map_err(|source| MailError::Attachment {
        path: path.display().to_string(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "signature".to_string());
    Ok(MailAttachment {
        content_type: guess_content_type(&filename).to_string(),
        filename,
        content,
        content_id: Some(SIGNATURE_CID.to_string()),
    })
}

async fn load_attachments(refs: &[AttachmentRef]) -> Result<Vec<MailAttachment>, MailError> {
    let mut loaded = Vec::with_capacity(refs.len());
    for attachment in refs {
        let content =
            tokio::fs::read(&attachment.path)
                .await
                .map_err(|source| MailError::Attachment {
                    path: attachment.path.clone(),
                    source,
                })?;
        let content_type = if attachment.mimetype.is_empty() {
            guess_content_type(&attachment.filename).to_string()
        } else {
            attachment.mimetype.clone()
        };
        loaded.push(MailAttachment {
            filename: attachment.filename.clone(),
            content_type,
            content,
            content_id: None,
        });
    }
    Ok(loaded)
}

fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
