use super::handlers::AppState;
use super::traits::IdTokenVerifier as _;
use crate::error::AuthError;
use crate::store::SessionStore as _;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Outcome of the per-request access check. The reason on the deny side is
/// for logs and tests only; callers of the HTTP surface see a bare 401.
#[derive(Debug)]
pub enum Decision {
    Allow { user_id: String },
    Deny { reason: AuthError },
}

impl From<AuthError> for Decision {
    fn from(reason: AuthError) -> Self {
        Decision::Deny { reason }
    }
}

fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Full fresh check on every request, no result caching:
/// cookie header -> id_token cookie -> signature/audience verification ->
/// subject -> session record exists. Any miss is a deny.
pub async fn authorize(state: &AppState, headers: &HeaderMap) -> Decision {
    let Some(cookie_header) = headers.get(header::COOKIE).and_then(|h| h.to_str().ok()) else {
        return AuthError::MissingCookie.into();
    };

    let Some(id_token) = cookie_value(cookie_header, "id_token") else {
        return AuthError::MissingToken.into();
    };

    let secrets = match state.secrets.get().await {
        Ok(secrets) => secrets,
        Err(e) => return e.into(),
    };

    let claims = match state.verifier.verify(id_token, &secrets.client_id).await {
        Ok(claims) => claims,
        Err(e) => return e.into(),
    };

    let Some(user_id) = claims.sub.filter(|s| !s.is_empty()) else {
        return AuthError::InvalidPayload.into();
    };

    match state.store.get(&user_id).await {
        Ok(Some(_)) => Decision::Allow { user_id },
        Ok(None) => AuthError::UnknownUser.into(),
        Err(e) => e.into(),
    }
}

/// Gate in front of protected routes. Allow passes the request through,
/// deny becomes a 401 with no body so the reason never reaches the caller.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    match authorize(&state, req.headers()).await {
        Decision::Allow { user_id } => {
            tracing::debug!("Authorized user {} for {}", user_id, req.uri().path());
            next.run(req).await
        }
        Decision::Deny { reason } => {
            tracing::warn!(
                kind = reason.kind(),
                "Denied request to {}: {}",
                req.uri().path(),
                reason
            );
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::handlers::LandingPages;
    use crate::auth::secrets::{SecretCache, SecretIds};
    use crate::auth::traits::{
        CodeExchanger, IdClaims, IdTokenVerifier, SecretFetcher, Secrets, TokenExchange,
    };
    use crate::store::{MemorySessionStore, SessionRecord, SessionStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    struct StaticFetcher;

    #[async_trait]
    impl SecretFetcher for StaticFetcher {
        async fn fetch(&self, id: &str) -> Result<String, AuthError> {
            Ok(format!("{}-value", id))
        }
    }

    struct NoExchanger;

    #[async_trait]
    impl CodeExchanger for NoExchanger {
        async fn exchange(
            &self,
            _code: &str,
            _secrets: &Secrets,
        ) -> Result<TokenExchange, AuthError> {
            panic!("authorizer must not exchange codes");
        }
    }

    /// Accepts exactly one token string, returning fixed claims.
    struct StubVerifier {
        expected_token: String,
        sub: Option<String>,
    }

    #[async_trait]
    impl IdTokenVerifier for StubVerifier {
        async fn verify(&self, id_token: &str, audience: &str) -> Result<IdClaims, AuthError> {
            if id_token != self.expected_token {
                return Err(AuthError::InvalidToken("bad signature".to_string()));
            }
            Ok(IdClaims {
                sub: self.sub.clone(),
                aud: audience.to_string(),
                iss: "accounts.google.com".to_string(),
                exp: Utc::now().timestamp() + 300,
                email: None,
            })
        }
    }

    async fn state_with(verifier: StubVerifier, known_user: Option<&str>) -> AppState {
        let store = Arc::new(MemorySessionStore::new());
        if let Some(user_id) = known_user {
            let record = SessionRecord::issued(
                user_id.to_string(),
                "AT1".to_string(),
                None,
                3600,
                Utc::now(),
            );
            store.put(&record).await.unwrap();
        }

        AppState {
            secrets: SecretCache::new(
                Arc::new(StaticFetcher),
                SecretIds {
                    client_id: Some("CID".to_string()),
                    client_secret: Some("CSECRET".to_string()),
                    redirect_uri: Some("RURI".to_string()),
                },
            ),
            store,
            exchanger: Arc::new(NoExchanger),
            verifier: Arc::new(verifier),
            pages: LandingPages {
                success_url: "https://app.example/welcome".to_string(),
                error_url: "https://app.example/error".to_string(),
            },
        }
    }

    fn good_verifier() -> StubVerifier {
        StubVerifier {
            expected_token: "good-jwt".to_string(),
            sub: Some("u-42".to_string()),
        }
    }

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_allow_when_all_checks_pass() {
        let state = state_with(good_verifier(), Some("u-42")).await;
        let headers = headers_with_cookie("id_token=good-jwt");

        match authorize(&state, &headers).await {
            Decision::Allow { user_id } => assert_eq!(user_id, "u-42"),
            other => panic!("expected allow, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deny_missing_cookie_header() {
        let state = state_with(good_verifier(), Some("u-42")).await;

        match authorize(&state, &HeaderMap::new()).await {
            Decision::Deny { reason } => assert!(matches!(reason, AuthError::MissingCookie)),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deny_missing_id_token_cookie() {
        let state = state_with(good_verifier(), Some("u-42")).await;
        let headers = headers_with_cookie("session=abc; theme=dark");

        match authorize(&state, &headers).await {
            Decision::Deny { reason } => assert!(matches!(reason, AuthError::MissingToken)),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deny_failed_verification() {
        let state = state_with(good_verifier(), Some("u-42")).await;
        let headers = headers_with_cookie("id_token=forged-jwt");

        match authorize(&state, &headers).await {
            Decision::Deny { reason } => assert!(matches!(reason, AuthError::InvalidToken(_))),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deny_missing_subject_in_verified_payload() {
        let verifier = StubVerifier {
            expected_token: "good-jwt".to_string(),
            sub: None,
        };
        let state = state_with(verifier, Some("u-42")).await;
        let headers = headers_with_cookie("id_token=good-jwt");

        match authorize(&state, &headers).await {
            Decision::Deny { reason } => assert!(matches!(reason, AuthError::InvalidPayload)),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deny_unknown_user() {
        let state = state_with(good_verifier(), None).await;
        let headers = headers_with_cookie("id_token=good-jwt");

        match authorize(&state, &headers).await {
            Decision::Deny { reason } => assert!(matches!(reason, AuthError::UnknownUser)),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cookie_parsing_tolerates_spacing() {
        let state = state_with(good_verifier(), Some("u-42")).await;
        let headers = headers_with_cookie("theme=dark;  id_token=good-jwt ; other=1");

        match authorize(&state, &headers).await {
            Decision::Allow { user_id } => assert_eq!(user_id, "u-42"),
            other => panic!("expected allow, got {:?}", other),
        }
    }
}
