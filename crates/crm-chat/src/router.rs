//! Conversation router.
//!
//! One call to [`ChatRouter::handle_message`] is one turn: load the session,
//! append the user message, then either settle the pending email or
//! classify the message and run the matching flow, and persist.
//!
//! While a draft is pending no classification happens. The reply is read
//! as a confirmation: "yes" sends, "no" or "cancel" discards, anything else
//! leaves the draft in place and repeats the question.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crm_core::config::{ChatConfig, LlmConfig};
use crm_core::error::CrmError;
use crm_core::types::{AttachmentRef, ChatSession, Lead, Message, PendingEmail};
use crm_mail::{DispatchReport, EmailDispatcher};
use crm_storage::{LeadDirectory, SessionStore};

use crate::classifier::IntentClassifier;
use crate::composer::{ComposedDraft, EmailComposer};
use crate::error::ChatError;
use crate::labeled::{ClassifierOutcome, ClassifierResult, EmailIntent, QueryPlan};
use crate::llm::LanguageModel;
use crate::patterns::{extract_recipient_name, is_email_address, is_email_request};
use crate::projection::{project, projection_fields};
use crate::prompt::enriched_compose_request;
use crate::recipient::RecipientResolver;
use crate::types::{ChatReply, DraftView, QueryResultSet};

pub const CLASSIFIER_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't process that request right now. Please try rephrasing it.";
pub const UNRECOGNIZED_MESSAGE: &str = "I couldn't understand your request.";
pub const CANCEL_MESSAGE: &str = "❌ Email sending canceled.";
pub const REMINDER_MESSAGE: &str =
    "You have an email draft waiting. Please reply YES to send it or NO to cancel.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Yes,
    No,
    Other,
}

fn parse_confirmation(text: &str) -> Confirmation {
    match text.trim().to_lowercase().as_str() {
        "yes" => Confirmation::Yes,
        "no" | "cancel" => Confirmation::No,
        _ => Confirmation::Other,
    }
}

/// Everything needed to stage a draft, whichever flow produced it.
struct DraftParts {
    subject: String,
    body: String,
    recipients: Vec<String>,
    intent: String,
    recipient_name: String,
    /// Assistant text shown before the draft. May contain `<recipientName>`.
    lead_in: String,
}

pub struct ChatRouter {
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn LeadDirectory>,
    resolver: RecipientResolver,
    classifier: IntentClassifier,
    composer: EmailComposer,
    dispatcher: Arc<EmailDispatcher>,
    config: ChatConfig,
}

impl ChatRouter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn LeadDirectory>,
        model: Arc<dyn LanguageModel>,
        dispatcher: Arc<EmailDispatcher>,
        llm: &LlmConfig,
        config: ChatConfig,
    ) -> Self {
        Self {
            sessions,
            resolver: RecipientResolver::new(directory.clone()),
            directory,
            classifier: IntentClassifier::new(model.clone(), llm),
            composer: EmailComposer::new(model, llm),
            dispatcher,
            config,
        }
    }

    /// Handle one user message for `session_key`. An empty key selects the
    /// configured default session.
    pub async fn handle_message(
        &self,
        session_key: &str,
        message: &str,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ChatReply, ChatError> {
        let text = message.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let key = self.session_key(session_key);
        let mut session = self.sessions.load_or_create(key).await?;
        session.push(Message::user(text));

        if let Some(pending) = session.awaiting_confirmation().cloned() {
            return self.settle_pending(session, pending, text).await;
        }
        if session.pending_email.take().is_some() {
            warn!(session = %key, "Discarding pending email without recipients");
        }

        let context = session
            .recent(self.config.context_window.saturating_add(1))
            .split_last()
            .map(|(_, prior)| prior)
            .unwrap_or_default();
        let outcome = self.classifier.classify(text, context).await;

        match outcome {
            Err(e) => {
                warn!(session = %key, error = %e, "Classification failed");
                self.persist(&session).await?;
                Ok(ChatReply::failure(CLASSIFIER_FAILURE_MESSAGE))
            }
            Ok(ClassifierOutcome::Unrecognized(tag)) => {
                info!(session = %key, tag = %tag, "Unrecognized classifier tag");
                session.push(Message::assistant(UNRECOGNIZED_MESSAGE));
                self.persist(&session).await?;
                Ok(ChatReply::failure(UNRECOGNIZED_MESSAGE))
            }
            Ok(ClassifierOutcome::Recognized(ClassifierResult::Smalltalk(smalltalk))) => {
                session.push(Message::assistant(smalltalk.reply.as_str()));
                self.persist(&session).await?;
                Ok(ChatReply::message(smalltalk.reply))
            }
            Ok(ClassifierOutcome::Recognized(ClassifierResult::Email(intent))) => {
                self.handle_email_intent(session, intent, attachments).await
            }
            Ok(ClassifierOutcome::Recognized(ClassifierResult::Query(plan))) => {
                self.handle_query(session, text, plan, attachments).await
            }
        }
    }

    /// Stored history for `session_key`, empty for an unknown session.
    pub async fn history(&self, session_key: &str) -> Result<Vec<Message>, ChatError> {
        let key = self.session_key(session_key);
        Ok(self
            .sessions
            .load(key)
            .await?
            .map(|session| session.history)
            .unwrap_or_default())
    }

    fn session_key<'a>(&'a self, requested: &'a str) -> &'a str {
        let requested = requested.trim();
        if requested.is_empty() {
            &self.config.default_session_key
        } else {
            requested
        }
    }

    // =========================================================================
    // Pending confirmation
    // =========================================================================

    async fn settle_pending(
        &self,
        mut session: ChatSession,
        pending: PendingEmail,
        text: &str,
    ) -> Result<ChatReply, ChatError> {
        match parse_confirmation(text) {
            Confirmation::Yes => {
                let report = self
                    .dispatcher
                    .dispatch_all(
                        &pending.recipients,
                        &pending.subject,
                        &pending.body,
                        &pending.attachments,
                    )
                    .await;
                let summary = dispatch_summary(&report);
                session.pending_email = None;
                session.push(Message::assistant(summary.as_str()));
                self.persist(&session).await?;
                info!(
                    session = %session.session_id,
                    sent = report.sent_count(),
                    failed = report.failed.len(),
                    "Pending email confirmed"
                );
                if report.sent_count() > 0 {
                    Ok(ChatReply::message(summary))
                } else {
                    Ok(ChatReply::failure(summary))
                }
            }
            Confirmation::No => {
                session.pending_email = None;
                session.push(Message::assistant(CANCEL_MESSAGE));
                self.persist(&session).await?;
                info!(session = %session.session_id, "Pending email canceled");
                Ok(ChatReply::message(CANCEL_MESSAGE))
            }
            Confirmation::Other => {
                session.push(Message::assistant(REMINDER_MESSAGE));
                self.persist(&session).await?;
                Ok(ChatReply::message(REMINDER_MESSAGE))
            }
        }
    }

    // =========================================================================
    // Email
    // =========================================================================

    async fn handle_email_intent(
        &self,
        mut session: ChatSession,
        intent: EmailIntent,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ChatReply, ChatError> {
        let given = intent.recipient_email();
        let resolved = if is_email_address(given) {
            Ok(Some(given.to_string()))
        } else {
            self.resolver.resolve(intent.recipient_name()).await
        };
        let address = match resolved {
            Ok(address) => address,
            Err(e) => return Err(self.fail_directory(&session, e).await),
        };

        let Some(address) = address else {
            let who = if intent.recipient_name().is_empty() {
                given
            } else {
                intent.recipient_name()
            };
            let text = format!(
                "I could not find an email address for {}. Please check the name or include their email address.",
                who
            );
            info!(session = %session.session_id, recipient = %who, "Recipient not found");
            session.push(Message::assistant(text.as_str()));
            self.persist(&session).await?;
            return Ok(ChatReply::failure(text));
        };

        let recipient_name = if intent.recipient_name().is_empty() {
            address.clone()
        } else {
            intent.recipient_name().to_string()
        };
        let parts = DraftParts {
            subject: intent.subject,
            body: intent.body,
            recipients: vec![address],
            intent: "email".to_string(),
            recipient_name,
            lead_in: intent.reply,
        };
        self.stage_draft(session, parts, attachments).await
    }

    /// Resolve the name in an email-like message and compose a draft for it.
    /// `None` means the caller should treat the message as a query instead.
    async fn compose_from_message(
        &self,
        text: &str,
    ) -> Result<Option<(ComposedDraft, Lead)>, CrmError> {
        let Some(name) = extract_recipient_name(text) else {
            return Ok(None);
        };
        let Some(lead) = self.resolver.lookup_mentioned(&name).await? else {
            info!(recipient = %name, "No lead matches recipient name");
            return Ok(None);
        };
        match self
            .composer
            .compose(&enriched_compose_request(&lead, text))
            .await
        {
            Ok(draft) => Ok(Some((draft, lead))),
            Err(e) => {
                warn!(error = %e, "Email composition failed, answering as a query");
                Ok(None)
            }
        }
    }

    async fn stage_draft(
        &self,
        mut session: ChatSession,
        parts: DraftParts,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ChatReply, ChatError> {
        let pending = PendingEmail {
            subject: parts.subject,
            body: parts.body,
            recipients: parts.recipients,
            intent: parts.intent,
            attachments,
            created_at: Utc::now(),
        };

        let prompt = draft_prompt(&pending);
        let text = match parts.lead_in.trim() {
            "" => prompt,
            lead_in => format!(
                "{}\n\n{}",
                lead_in.replace("<recipientName>", &parts.recipient_name),
                prompt
            ),
        };
        let view = DraftView {
            subject: pending.subject.clone(),
            body: pending.body.clone(),
            to: pending.recipients.clone(),
            recipient_name: parts.recipient_name,
        };

        info!(
            session = %session.session_id,
            recipients = ?pending.recipients,
            attachments = pending.attachments.len(),
            "Email draft staged"
        );
        session.pending_email = Some(pending);
        session.push(Message::assistant(text.as_str()));
        self.persist(&session).await?;
        Ok(ChatReply::draft(text, view))
    }

    // =========================================================================
    // Query
    // =========================================================================

    async fn handle_query(
        &self,
        mut session: ChatSession,
        text: &str,
        plan: QueryPlan,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ChatReply, ChatError> {
        if is_email_request(text) {
            match self.compose_from_message(text).await {
                Ok(Some((draft, lead))) => {
                    let parts = DraftParts {
                        subject: draft.subject,
                        body: draft.body,
                        recipients: draft.recipients,
                        intent: draft.intent,
                        recipient_name: lead.full_name(),
                        lead_in: String::new(),
                    };
                    return self.stage_draft(session, parts, attachments).await;
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail_directory(&session, e).await),
            }
        }

        let fields = projection_fields(&plan.suggested_fields);
        let filter = Value::Object(plan.mongo_query.clone());
        let rows = match self
            .directory
            .find(&filter, self.config.query_result_cap)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(session = %session.session_id, filter = %filter, error = %e, "Lead query failed");
                return Err(self.fail_directory(&session, e).await);
            }
        };

        let results: Vec<Map<String, Value>> =
            rows.iter().map(|doc| project(doc, &fields)).collect();
        session.push(Message::assistant(Value::Array(
            results.iter().cloned().map(Value::Object).collect(),
        )));
        self.persist(&session).await?;
        info!(session = %session.session_id, total = results.len(), "Lead query answered");

        Ok(ChatReply::query(QueryResultSet {
            original: text.to_string(),
            total: results.len(),
            explanation: plan.explanation,
            mongo_query: plan.mongo_query,
            estimated_results: plan.estimated_results,
            results,
        }))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn persist(&self, session: &ChatSession) -> Result<(), ChatError> {
        self.sessions.save(session).await.map_err(ChatError::from)
    }

    /// Persist what the turn appended so far, then report the directory error.
    async fn fail_directory(&self, session: &ChatSession, err: CrmError) -> ChatError {
        if let Err(save_err) = self.persist(session).await {
            error!(session = %session.session_id, error = %save_err, "Failed to persist session");
        }
        ChatError::directory(err)
    }
}

fn draft_prompt(pending: &PendingEmail) -> String {
    format!(
        "Here is your draft email to {}:\nSubject: {}\n\n{}\n\nWould you like to send this email now? Reply YES to confirm.",
        pending.recipients.join(", "),
        pending.subject,
        pending.body
    )
}

fn dispatch_summary(report: &DispatchReport) -> String {
    let failed = report.failed_recipients();
    if report.sent_count() == 0 {
        return format!("❌ Email could not be sent to: {}.", failed.join(", "));
    }
    let mut summary = format!(
        "✅ Email sent to {} recipient(s): {}.",
        report.sent_count(),
        report.sent_recipients().join(", ")
    );
    if !failed.is_empty() {
        summary.push_str(&format!(" ⚠️ Failed to send to: {}.", failed.join(", ")));
    }
    summary
}
