use super::google;
use super::secrets::SecretCache;
use super::traits::{CodeExchanger, IdTokenVerifier};
use crate::error::AuthError;
use crate::store::{SessionRecord, SessionStore};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the callback sends the browser after the flow finishes.
#[derive(Clone)]
pub struct LandingPages {
    pub success_url: String,
    pub error_url: String,
}

/// Shared state for all handlers. Collaborators sit behind traits so tests
/// can swap in stubs; the secret cache is built once at startup and shared.
#[derive(Clone)]
pub struct AppState {
    pub secrets: SecretCache,
    pub store: Arc<dyn SessionStore + Send + Sync>,
    pub exchanger: Arc<dyn CodeExchanger + Send + Sync>,
    pub verifier: Arc<dyn IdTokenVerifier + Send + Sync>,
    pub pages: LandingPages,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Plain 302 with a Location header. axum's Redirect helpers pick 303/307;
/// the browser side of this flow expects a classic 302.
fn found(location: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        location
            .parse()
            .expect("redirect target should be a valid header value"),
    );
    (StatusCode::FOUND, headers).into_response()
}

/// Handler for GET /initiate-auth - bounce the browser to the consent screen.
pub async fn initiate_auth_handler(State(state): State<AppState>) -> Response {
    let secrets = match state.secrets.get().await {
        Ok(secrets) => secrets,
        Err(e) => {
            tracing::error!(kind = e.kind(), "Failed to load OAuth secrets: {}", e);
            // nothing sensitive in the body, details stay in the logs
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to initiate authentication",
            );
        }
    };

    let url = google::authorization_url(&secrets.client_id, &secrets.redirect_uri);
    tracing::info!("Redirecting browser to Google consent screen");
    found(&url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

/// Handler for GET /handle-callback - the back half of the OAuth dance.
///
/// Missing `code` is the one failure that answers directly (400 JSON);
/// everything after that point redirects to the error landing page with the
/// failure message in the query string, matching the contract the frontend
/// was built against.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("Callback invoked without an authorization code");
        return error_json(StatusCode::BAD_REQUEST, &AuthError::MissingCode.to_string());
    };

    match run_callback(&state, &code).await {
        Ok(id_token) => {
            tracing::info!("Callback complete, session persisted");
            success_redirect(&state.pages.success_url, &id_token)
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), "Callback failed: {}", e);
            error_redirect(&state.pages.error_url, &e.to_string())
        }
    }
}

/// The single-pass sequence: exchange the code, pull the subject out of the
/// id_token (unverified - the authorizer verifies on every later request),
/// persist the session record. First failure wins, nothing is retried.
async fn run_callback(state: &AppState, code: &str) -> Result<String, AuthError> {
    let secrets = state.secrets.get().await?;

    let tokens = state.exchanger.exchange(code, &secrets).await?;

    let user_id = google::decode_subject(&tokens.id_token)?;

    let record = SessionRecord::issued(
        user_id,
        tokens.access_token,
        tokens.refresh_token,
        tokens.expires_in,
        Utc::now(),
    );
    state.store.put(&record).await?;

    Ok(tokens.id_token)
}

fn success_redirect(success_url: &str, id_token: &str) -> Response {
    let cookie = format!("id_token={}; HttpOnly; Secure; SameSite=None", id_token);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        success_url
            .parse()
            .expect("success URL should be a valid header value"),
    );
    headers.insert(
        header::SET_COOKIE,
        cookie
            .parse()
            .expect("id_token cookie should be a valid header value"),
    );
    (StatusCode::FOUND, headers).into_response()
}

fn error_redirect(error_url: &str, message: &str) -> Response {
    let mut url = error_url.to_string();
    url.push_str(if url.contains('?') { "&" } else { "?" });
    url.push_str(&format!("error={}", urlencoding::encode(message)));
    found(&url)
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub message: String,
}

/// Handler for GET /user. Only reachable through the authorizer middleware,
/// so by the time we're here the caller holds a verified session.
pub async fn user_data_handler() -> Json<UserData> {
    Json(UserData {
        message: "You are authorized".to_string(),
    })
}
