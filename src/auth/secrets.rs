use super::traits::{SecretFetcher, Secrets};
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Identifiers for the three secrets the flow needs. Any of them may be
/// absent at startup; that only becomes an error on the first cold `get()`.
#[derive(Debug, Clone, Default)]
pub struct SecretIds {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Fetch-once cache in front of a [`SecretFetcher`].
///
/// The first `get()` per process fetches all three secrets concurrently and
/// pins them for the remainder of the process lifetime. There is no
/// invalidation; rotated secrets need a restart.
#[derive(Clone)]
pub struct SecretCache {
    fetcher: Arc<dyn SecretFetcher + Send + Sync>,
    ids: SecretIds,
    cached: Arc<OnceCell<Secrets>>,
}

impl SecretCache {
    pub fn new(fetcher: Arc<dyn SecretFetcher + Send + Sync>, ids: SecretIds) -> Self {
        Self {
            fetcher,
            ids,
            cached: Arc::new(OnceCell::new()),
        }
    }

    pub async fn get(&self) -> Result<Secrets, AuthError> {
        let secrets = self
            .cached
            .get_or_try_init(|| self.fetch_all())
            .await?;
        Ok(secrets.clone())
    }

    async fn fetch_all(&self) -> Result<Secrets, AuthError> {
        let (Some(client_id_id), Some(client_secret_id), Some(redirect_uri_id)) = (
            self.ids.client_id.as_deref(),
            self.ids.client_secret.as_deref(),
            self.ids.redirect_uri.as_deref(),
        ) else {
            return Err(AuthError::MissingSecretId);
        };

        let (client_id, client_secret, redirect_uri) = tokio::try_join!(
            self.fetch_one(client_id_id),
            self.fetch_one(client_secret_id),
            self.fetch_one(redirect_uri_id),
        )?;

        tracing::info!("OAuth client secrets fetched and cached for process lifetime");

        Ok(Secrets {
            client_id,
            client_secret,
            redirect_uri,
        })
    }

    async fn fetch_one(&self, id: &str) -> Result<String, AuthError> {
        let value = self.fetcher.fetch(id).await?;
        if value.is_empty() {
            return Err(AuthError::EmptySecret(id.to_string()));
        }
        Ok(value)
    }
}

/// Secret identifiers are environment variable names. Good enough for
/// deployments where the orchestrator injects secrets into the environment.
pub struct EnvSecretFetcher;

#[async_trait]
impl SecretFetcher for EnvSecretFetcher {
    async fn fetch(&self, id: &str) -> Result<String, AuthError> {
        std::env::var(id).map_err(|_| AuthError::EmptySecret(id.to_string()))
    }
}
