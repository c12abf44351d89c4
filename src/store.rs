use crate::error::AuthError;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use urlencoding::encode as urlencode;

/// Tokens for one signed-in user, keyed by the Google subject id.
///
/// `expires_in` is the access token's expiry as epoch milliseconds (what the
/// frontend consumes), `expires_at` the same instant as epoch seconds (what
/// drives automatic record expiry). Both are derived from a single issuance
/// instant and never mutated independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub expires_at: i64,
}

impl SessionRecord {
    pub fn issued(
        user_id: String,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            access_token,
            refresh_token,
            expires_in: now.timestamp_millis() + expires_in_secs as i64 * 1000,
            expires_at: now.timestamp() + expires_in_secs as i64,
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Key-value store for session records. Upsert fully overwrites; get returns
/// None for absent OR expired records (the store's expiry attribute, not the
/// authorizer, decides record lifetime).
#[async_trait]
pub trait SessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), AuthError>;
    async fn get(&self, user_id: &str) -> Result<Option<SessionRecord>, AuthError>;
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), AuthError> {
        let mut records = self.records.write().await;
        records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<SessionRecord>, AuthError> {
        let records = self.records.read().await;
        Ok(records
            .get(user_id)
            .filter(|r| !r.expired(Utc::now()))
            .cloned())
    }
}

/// CouchDB document wrapper around a session record. `_rev` is only present
/// on documents read back from the server.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(flatten)]
    record: SessionRecord,
}

/// Session store backed by a CouchDB database, one document per user.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: String,
    database: String,
    auth_header: String,
}

impl CouchSessionStore {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let auth = format!("{}:{}", username, password);
        let auth_header = format!("Basic {}", BASE64.encode(auth.as_bytes()));

        Self {
            client: Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            auth_header,
        }
    }

    fn doc_url(&self, user_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database, urlencode(user_id))
    }

    pub async fn test_connection(&self) -> Result<(), AuthError> {
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Persistence(format!(
                "failed to reach session database: {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn current_rev(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        let response = self
            .client
            .get(&self.doc_url(user_id))
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AuthError::Persistence(format!(
                "failed to read session {}: {}",
                user_id,
                response.status()
            )));
        }

        let doc: SessionDoc = response
            .json()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;
        Ok(doc.rev)
    }
}

#[async_trait]
impl SessionStore for CouchSessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), AuthError> {
        // carry over _rev so a re-login fully overwrites the existing doc
        let rev = self.current_rev(&record.user_id).await?;
        let doc = SessionDoc {
            id: record.user_id.clone(),
            rev,
            record: record.clone(),
        };

        let response = self
            .client
            .put(self.doc_url(&record.user_id))
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(&doc)
            .send()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Persistence(format!(
                "failed to save session: {} - {}",
                status, body
            )));
        }

        tracing::debug!("Saved session record for user {}", record.user_id);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<SessionRecord>, AuthError> {
        let response = self
            .client
            .get(&self.doc_url(user_id))
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AuthError::Persistence(format!(
                "failed to read session {}: {}",
                user_id,
                response.status()
            )));
        }

        let doc: SessionDoc = response
            .json()
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        Ok(Some(doc.record).filter(|r| !r.expired(Utc::now())))
    }
}
