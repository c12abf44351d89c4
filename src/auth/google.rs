use super::traits::{CodeExchanger, IdClaims, IdTokenVerifier, Secrets, TokenExchange};
use crate::error::AuthError;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const JWKS_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// openid gets us the id_token, the fitness scope is what the dashboard reads
const SCOPES: &str = "openid https://www.googleapis.com/auth/fitness.activity.read";

/// Google rotates its signing keys on the order of days; an hour of caching
/// is well inside that window.
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Builds the consent-screen URL the initiate-auth handler redirects to.
/// access_type=offline + prompt=consent so Google re-issues a refresh token
/// even for users who already granted access once.
pub fn authorization_url(client_id: &str, redirect_uri: &str) -> String {
    let mut url = Url::parse(AUTH_ENDPOINT).expect("auth endpoint constant should parse");
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPES)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    url.into()
}

/// Pulls the subject claim out of an ID token WITHOUT verifying the
/// signature. The callback handler only needs a storage key at this point;
/// the token is cryptographically verified on every protected request by
/// the authorizer.
pub fn decode_subject(id_token: &str) -> Result<String, AuthError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or(AuthError::MissingSubject)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::MissingSubject)?;
    let claims: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|_| AuthError::MissingSubject)?;

    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or(AuthError::MissingSubject)
}

/// Talks to Google's token endpoint.
pub struct GoogleCodeExchanger {
    client: Client,
    token_endpoint: String,
}

impl GoogleCodeExchanger {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }
}

impl Default for GoogleCodeExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeExchanger for GoogleCodeExchanger {
    async fn exchange(&self, code: &str, secrets: &Secrets) -> Result<TokenExchange, AuthError> {
        let params = [
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", secrets.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Token endpoint returned {}: {}", status, body);
            return Err(AuthError::TokenExchange(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let tokens: TokenExchange = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        Ok(tokens)
    }
}

struct JwksCache {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies Google ID tokens against Google's published JWKS.
///
/// The key set is cached for [`JWKS_TTL`] and refreshed on expiry or when a
/// token references an unknown kid. This is transport plumbing only: every
/// authorizer invocation still fully verifies signature, audience, issuer
/// and expiry.
pub struct GoogleTokenVerifier {
    client: Client,
    jwks_endpoint: String,
    cache: RwLock<Option<JwksCache>>,
}

impl GoogleTokenVerifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            jwks_endpoint: JWKS_ENDPOINT.to_string(),
            cache: RwLock::new(None),
        }
    }

    async fn cached_keys(&self) -> Option<JwkSet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < JWKS_TTL)
            .map(|c| c.keys.clone())
    }

    async fn refresh_keys(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_endpoint)
            .send()
            .await
            .map_err(|e| AuthError::InvalidToken(format!("JWKS fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidToken(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidToken(format!("JWKS parse failed: {}", e)))?;

        let mut cache = self.cache.write().await;
        *cache = Some(JwksCache {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        tracing::debug!("Refreshed Google JWKS ({} keys)", keys.keys.len());
        Ok(keys)
    }

    fn decoding_key_for(keys: &JwkSet, kid: &str) -> Option<Result<DecodingKey, AuthError>> {
        keys.find(kid).map(|jwk| {
            DecodingKey::from_jwk(jwk)
                .map_err(|e| AuthError::InvalidToken(format!("bad JWK: {}", e)))
        })
    }
}

impl Default for GoogleTokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str, audience: &str) -> Result<IdClaims, AuthError> {
        let header =
            decode_header(id_token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no kid".to_string()))?;

        // try the cached set first, refresh if the kid is unknown (rotation)
        let mut keys = match self.cached_keys().await {
            Some(keys) => keys,
            None => self.refresh_keys().await?,
        };
        if keys.find(&kid).is_none() {
            keys = self.refresh_keys().await?;
        }

        let decoding_key = Self::decoding_key_for(&keys, &kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("no JWK for kid {}", kid)))??;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&["accounts.google.com", "https://accounts.google.com"]);

        let data = decode::<IdClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(data.claims)
    }
}
