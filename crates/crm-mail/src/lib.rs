//! CRM mail crate - outgoing email rendering and delivery.
//!
//! The dispatcher turns a confirmed draft into one message per recipient,
//! adds the inline signature image, and hands each message to a
//! [`MailTransport`]. SMTP delivery goes through lettre; a logging transport
//! stands in when mail is disabled.

pub mod dispatcher;
pub mod error;
pub mod render;
pub mod transport;
pub mod types;

pub use dispatcher::{DispatchReport, EmailDispatcher};
pub use error::MailError;
pub use transport::{LogTransport, MailTransport, MemoryTransport, SmtpMailTransport};
pub use types::{DeliveryInfo, MailAttachment, OutgoingEmail};
