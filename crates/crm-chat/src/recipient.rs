//! Recipient resolution against the lead directory.

use std::sync::Arc;

use crm_core::error::CrmError;
use crm_core::types::Lead;
use crm_storage::LeadDirectory;

use crate::patterns::is_email_address;

/// Turns a name or address into a deliverable address.
pub struct RecipientResolver {
    directory: Arc<dyn LeadDirectory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn LeadDirectory>) -> Self {
        Self { directory }
    }

    /// An address is returned as-is; anything else is looked up as a name.
    pub async fn resolve(&self, name_or_email: &str) -> Result<Option<String>, CrmError> {
        let target = name_or_email.trim();
        if target.is_empty() {
            return Ok(None);
        }
        if is_email_address(target) {
            return Ok(Some(target.to_string()));
        }
        Ok(self.lookup_lead(target).await?.map(|lead| lead.email))
    }

    /// Find a lead by "First" or "First Last".
    pub async fn lookup_lead(&self, name: &str) -> Result<Option<Lead>, CrmError> {
        match split_name(name) {
            Some((first, last)) => self.directory.find_by_name(first, last.as_deref()).await,
            None => Ok(None),
        }
    }

    /// Look up a name taken from free text. A two-word capture that matches
    /// no lead is retried with its first word ("John about").
    pub async fn lookup_mentioned(&self, mention: &str) -> Result<Option<Lead>, CrmError> {
        if let Some(lead) = self.lookup_lead(mention).await? {
            return Ok(Some(lead));
        }
        match split_name(mention) {
            Some((first, Some(_))) => self.directory.find_by_name(first, None).await,
            _ => Ok(None),
        }
    }
}

/// First token, and the remaining tokens joined as the last name.
pub fn split_name(name: &str) -> Option<(&str, Option<String>)> {
    let mut tokens = name.split_whitespace();
    let first = tokens.next()?;
    let rest: Vec<&str> = tokens.collect();
    let last = (!rest.is_empty()).then(|| rest.join(" "));
    Some((first, last))
}
