use thiserror::Error;

/// Everything that can go wrong between the consent screen and a session.
///
/// The callback handler turns these into redirects, the authorizer turns
/// them into a bare deny. Neither path exposes the variant to the caller
/// beyond what the original contract requires.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Code is required")]
    MissingCode,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("ID token payload has no subject")]
    MissingSubject,

    #[error("Failed to persist session: {0}")]
    Persistence(String),

    #[error("Unauthorized: Missing Cookie header")]
    MissingCookie,

    #[error("Unauthorized: Missing id_token cookie")]
    MissingToken,

    #[error("Unauthorized: Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: Invalid token payload")]
    InvalidPayload,

    #[error("Unauthorized: User not found")]
    UnknownUser,

    #[error("Secret identifiers must be provided")]
    MissingSecretId,

    #[error("Secret '{0}' does not contain a value")]
    EmptySecret(String),
}

impl AuthError {
    /// Stable tag for logs, so operators can grep without matching on
    /// human-readable messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCode => "missing_code",
            AuthError::TokenExchange(_) => "token_exchange",
            AuthError::MissingSubject => "missing_subject",
            AuthError::Persistence(_) => "persistence",
            AuthError::MissingCookie => "missing_cookie",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::InvalidPayload => "invalid_payload",
            AuthError::UnknownUser => "unknown_user",
            AuthError::MissingSecretId => "missing_secret_id",
            AuthError::EmptySecret(_) => "empty_secret",
        }
    }
}
