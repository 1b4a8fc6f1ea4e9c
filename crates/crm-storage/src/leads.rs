//! Lead directory backed by the `leads` table.
//!
//! Each lead is stored as its full JSON document with lowercased name and
//! email columns pulled out for lookups. Filtered queries scan the documents and
//! evaluate a [`LeadFilter`] in process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crm_core::error::CrmError;
use crm_core::types::Lead;

use crate::db::Database;
use crate::filter::LeadFilter;

/// Read access to leads, as used by the conversation router.
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    /// Documents matching a Mongo-style `filter`, at most `limit` of them,
    /// in insertion order.
    async fn find(&self, filter: &Value, limit: usize) -> Result<Vec<Value>, CrmError>;

    /// First lead whose first name matches case-insensitively and, when
    /// `last` is given, whose last name matches too.
    async fn find_by_name(&self, first: &str, last: Option<&str>)
        -> Result<Option<Lead>, CrmError>;
}

/// SQLite-backed lead directory.
pub struct LeadRepository {
    db: Arc<Database>,
}

impl LeadRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new lead. Fails if the email address is already taken.
    pub fn insert(&self, lead: &Lead) -> Result<(), CrmError> {
        let lead = normalize(lead.clone());
        self.db.with_conn(|conn| insert_lead(conn, &lead))
    }

    /// Number of stored leads.
    pub fn count(&self) -> Result<u64, CrmError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM leads", [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(|e| CrmError::Storage(e.to_string()))
        })
    }

    /// Replace the whole collection with `leads` in one transaction.
    pub fn seed(&self, leads: Vec<Lead>) -> Result<usize, CrmError> {
        let leads: Vec<Lead> = leads.into_iter().map(normalize).collect();
        self.db.with_transaction(|tx| {
            tx.execute("DELETE FROM leads", [])
                .map_err(|e| CrmError::Storage(format!("Failed to clear leads: {}", e)))?;
            leads.iter().try_for_each(|lead| insert_lead(tx, lead))
        })?;

        tracing::info!(count = leads.len(), "Seeded leads");
        for (temperature, count) in breakdown(&leads, "temperature") {
            tracing::info!("  {}: {} leads", temperature, count);
        }
        Ok(leads.len())
    }

    /// Load a JSON array of leads from `path` and [`seed`](Self::seed) them.
    pub fn seed_from_file(&self, path: &Path) -> Result<usize, CrmError> {
        let content = std::fs::read_to_string(path)?;
        let leads: Vec<Lead> = serde_json::from_str(&content)?;
        self.seed(leads)
    }

    fn all_documents(&self) -> Result<Vec<Value>, CrmError> {
        let documents: Vec<String> = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT document FROM leads ORDER BY rowid")
                .map_err(|e| CrmError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| CrmError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CrmError::Storage(e.to_string()))
        })?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(CrmError::from))
            .collect()
    }
}

#[async_trait]
impl LeadDirectory for LeadRepository {
    async fn find(&self, filter: &Value, limit: usize) -> Result<Vec<Value>, CrmError> {
        let filter = LeadFilter::parse(filter)?;
        let matched: Vec<Value> = self
            .all_documents()?
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .take(limit)
            .collect();
        tracing::debug!(matched = matched.len(), limit, "Lead query executed");
        Ok(matched)
    }

    async fn find_by_name(
        &self,
        first: &str,
        last: Option<&str>,
    ) -> Result<Option<Lead>, CrmError> {
        let first = fold(first);
        let last = last.map(fold).filter(|l| !l.is_empty());
        let document: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT document FROM leads
                 WHERE first_name_folded = ?1
                   AND (?2 IS NULL OR last_name_folded = ?2)
                 ORDER BY rowid
                 LIMIT 1",
                rusqlite::params![first, last],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CrmError::Storage(format!("Failed to find lead by name: {}", e)))
        })?;
        document
            .map(|doc| serde_json::from_str(&doc).map_err(CrmError::from))
            .transpose()
    }
}

fn normalize(mut lead: Lead) -> Lead {
    lead.first_name = lead.first_name.trim().to_string();
    lead.last_name = lead.last_name.trim().to_string();
    lead.email = lead.email.trim().to_lowercase();
    lead
}

/// Name form used by the lookup columns. SQLite's NOCASE only folds ASCII.
fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

fn insert_lead(conn: &Connection, lead: &Lead) -> Result<(), CrmError> {
    let document = serde_json::to_string(lead)?;
    conn.execute(
        "INSERT INTO leads (id, first_name_folded, last_name_folded, email, document)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            lead.id.to_string(),
            fold(&lead.first_name),
            fold(&lead.last_name),
            lead.email,
            document,
        ],
    )
    .map_err(|e| CrmError::Storage(format!("Failed to insert lead {}: {}", lead.email, e)))?;
    Ok(())
}

/// Count leads by the string value of a top-level extra field.
fn breakdown(leads: &[Lead], field: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for lead in leads {
        let key = lead
            .extra
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead(first: &str, last: &str, email: &str, extra: Value) -> Lead {
        let mut doc = json!({"firstName": first, "lastName": last, "email": email});
        if let (Some(doc), Value::Object(extra)) = (doc.as_object_mut(), extra) {
            doc.extend(extra);
        }
        serde_json::from_value(doc).unwrap()
    }

    fn by_email(repo: &LeadRepository, email: &str) -> Option<Lead> {
        repo.db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT document FROM leads WHERE email = ?1",
                    rusqlite::params![email],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(|e| CrmError::Storage(e.to_string()))
            })
            .unwrap()
            .map(|doc| serde_json::from_str(&doc).unwrap())
    }

    fn repo() -> LeadRepository {
        let repo = LeadRepository::new(Arc::new(Database::in_memory().unwrap()));
        repo.insert(&lead(
            "John",
            "Smith",
            "j@x.com",
            json!({"temperature": "cold", "company": {"name": "Acme", "industry": "Technology"}}),
        ))
        .unwrap();
        repo.insert(&lead(
            "John",
            "Doe",
            "jd@x.com",
            json!({"temperature": "hot", "company": {"name": "Beta", "industry": "Finance"}}),
        ))
        .unwrap();
        repo.insert(&lead("Emily", "Davis", "Emily@StartupX.io", json!({"temperature": "warm"})))
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_find_with_filter() {
        let repo = repo();
        let rows = repo.find(&json!({"temperature": "cold"}), 100).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], "j@x.com");
        assert_eq!(rows[0]["company"]["industry"], "Technology");
    }

    #[tokio::test]
    async fn test_find_respects_limit_and_order() {
        let repo = repo();
        let rows = repo.find(&json!({}), 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["lastName"], "Smith");
        assert_eq!(rows[1]["lastName"], "Doe");
    }

    #[tokio::test]
    async fn test_find_rejects_unsupported_operator() {
        let repo = repo();
        let err = repo
            .find(&json!({"$where": "1 == 1"}), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Query(_)));
    }

    #[tokio::test]
    async fn test_find_by_name_case_insensitive() {
        let repo = repo();
        let found = repo.find_by_name("john", Some("SMITH")).await.unwrap().unwrap();
        assert_eq!(found.email, "j@x.com");

        let any_last = repo.find_by_name("JOHN", None).await.unwrap().unwrap();
        assert_eq!(any_last.last_name, "Smith");

        assert!(repo.find_by_name("John", Some("Nobody")).await.unwrap().is_none());
        assert!(repo.find_by_name("Jo", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_name_folds_non_ascii() {
        let repo = repo();
        repo.insert(&lead("Émile", "Zola", "e@z.fr", json!({}))).unwrap();
        repo.insert(&lead("Jürgen", "Özdemir", "jo@x.de", json!({}))).unwrap();

        let exact = repo.find_by_name("Émile", Some("Zola")).await.unwrap().unwrap();
        assert_eq!(exact.email, "e@z.fr");
        let lower = repo.find_by_name("émile", Some("zola")).await.unwrap().unwrap();
        assert_eq!(lower.email, "e@z.fr");
        let upper = repo.find_by_name("ÉMILE", None).await.unwrap().unwrap();
        assert_eq!(upper.email, "e@z.fr");

        let mixed = repo.find_by_name("JÜRGEN", None).await.unwrap().unwrap();
        assert_eq!(mixed.email, "jo@x.de");
        // The stored document keeps the original casing.
        assert_eq!(mixed.first_name, "Jürgen");
    }

    #[test]
    fn test_insert_normalizes_email_and_rejects_duplicates() {
        let repo = repo();
        let found = by_email(&repo, "emily@startupx.io").unwrap();
        assert_eq!(found.email, "emily@startupx.io");

        let dup = repo.insert(&lead("Other", "Person", "J@X.COM", json!({})));
        assert!(matches!(dup, Err(CrmError::Storage(_))));
        assert_eq!(repo.count().unwrap(), 3);
    }

    #[test]
    fn test_seed_replaces_collection() {
        let repo = repo();
        let seeded = repo
            .seed(vec![
                lead("Ada", "Lovelace", "ada@example.com", json!({"temperature": "hot"})),
                lead("Alan", "Turing", "alan@example.com", json!({"temperature": "hot"})),
            ])
            .unwrap();
        assert_eq!(seeded, 2);
        assert_eq!(repo.count().unwrap(), 2);
        assert!(by_email(&repo, "j@x.com").is_none());
    }

    #[test]
    fn test_seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.json");
        std::fs::write(
            &path,
            json!([
                {"firstName": "Grace", "lastName": "Hopper", "email": "grace@navy.mil",
                 "temperature": "warm", "tags": ["vip"]}
            ])
            .to_string(),
        )
        .unwrap();

        let repo = LeadRepository::new(Arc::new(Database::in_memory().unwrap()));
        assert_eq!(repo.seed_from_file(&path).unwrap(), 1);
        let grace = by_email(&repo, "grace@navy.mil").unwrap();
        assert_eq!(grace.extra["tags"], json!(["vip"]));
    }

    #[test]
    fn test_seed_from_missing_file_is_io_error() {
        let repo = LeadRepository::new(Arc::new(Database::in_memory().unwrap()));
        let err = repo.seed_from_file(Path::new("/nonexistent/leads.json")).unwrap_err();
        assert!(matches!(err, CrmError::Io(_)));
    }

    #[test]
    fn test_breakdown_counts_by_field() {
        let leads = vec![
            lead("A", "A", "a@x.com", json!({"temperature": "hot"})),
            lead("B", "B", "b@x.com", json!({"temperature": "hot"})),
            lead("C", "C", "c@x.com", json!({})),
        ];
        let counts = breakdown(&leads, "temperature");
        assert_eq!(counts["hot"], 2);
        assert_eq!(counts["unknown"], 1);
    }
}
