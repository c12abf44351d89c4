mod authorizer;
mod google;
mod handlers;
mod secrets;
mod traits;

pub use authorizer::{Decision, authorize, session_auth_middleware};
pub use google::{GoogleCodeExchanger, GoogleTokenVerifier, authorization_url, decode_subject};
pub use handlers::{
    AppState, LandingPages, callback_handler, initiate_auth_handler, user_data_handler,
};
pub use secrets::{EnvSecretFetcher, SecretCache, SecretIds};
pub use traits::{CodeExchanger, IdClaims, IdTokenVerifier, SecretFetcher, Secrets, TokenExchange};
