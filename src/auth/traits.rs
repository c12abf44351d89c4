use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// async_trait my beloved. this shit rocks

/// OAuth client configuration, fetched once per process from the secret
/// provider and cached for the rest of the process lifetime.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// What Google's token endpoint hands back for an authorization code.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    /// Absent on repeat consent unless prompt=consent forces re-issuance
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub id_token: String,
}

/// Claims we care about from a verified Google ID token. `sub` is optional
/// at the type level so a missing subject is its own failure downstream,
/// distinct from signature problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdClaims {
    #[serde(default)]
    pub sub: Option<String>,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Fetches a single plaintext secret by opaque identifier.
/// Production uses whatever secret manager the deployment has; tests stub it.
#[async_trait]
pub trait SecretFetcher {
    async fn fetch(&self, id: &str) -> Result<String, AuthError>;
}

/// Exchanges an authorization code at the provider's token endpoint.
#[async_trait]
pub trait CodeExchanger {
    async fn exchange(&self, code: &str, secrets: &Secrets) -> Result<TokenExchange, AuthError>;
}

/// Cryptographically verifies an ID token (signature, audience, issuer, expiry).
#[async_trait]
pub trait IdTokenVerifier {
    async fn verify(&self, id_token: &str, audience: &str) -> Result<IdClaims, AuthError>;
}
