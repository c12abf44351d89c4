mod auth;
mod error;
mod store;

use anyhow::Result;
use axum::{Router, middleware, routing::get};
use clap::Parser;
use std::sync::Arc;
use store::SessionStore;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fitgate")]
#[command(about = "sign-in-with-google backend for the fitness dashboard")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "FITGATE_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "FITGATE_PORT", default_value = "3000")]
    port: u16,

    /// Secret identifier for the Google OAuth client id
    #[arg(long, env = "GOOGLE_CLIENT_ID_SECRET_ID")]
    client_id_secret: Option<String>,

    /// Secret identifier for the Google OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET_SECRET_ID")]
    client_secret_secret: Option<String>,

    /// Secret identifier for the OAuth redirect URI
    #[arg(long, env = "GOOGLE_REDIRECT_URI_SECRET_ID")]
    redirect_uri_secret: Option<String>,

    /// CouchDB URL for the session store
    #[arg(long, env = "COUCHDB_URL", default_value = "http://localhost:5984")]
    couchdb_url: String,

    /// CouchDB database holding session records
    #[arg(long, env = "COUCHDB_DATABASE", default_value = "sessions")]
    couchdb_database: String,

    /// CouchDB username (omit to run with the in-memory store)
    #[arg(long, env = "COUCHDB_USER")]
    couchdb_user: Option<String>,

    /// CouchDB password
    #[arg(long, env = "COUCHDB_PASSWORD")]
    couchdb_password: Option<String>,

    /// Where the browser lands after a successful sign-in
    #[arg(
        long,
        env = "AUTH_SUCCESS_URL",
        default_value = "https://localhost:3000/welcome"
    )]
    success_url: String,

    /// Where the browser lands when the callback fails
    #[arg(
        long,
        env = "AUTH_ERROR_URL",
        default_value = "https://localhost:3000/auth-error"
    )]
    error_url: String,

    /// Frontend origin allowed to call /user with credentials
    #[arg(long, env = "FRONTEND_ORIGIN", default_value = "https://localhost:3000")]
    frontend_origin: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let session_store = build_session_store(&args).await?;

    let secrets = auth::SecretCache::new(
        Arc::new(auth::EnvSecretFetcher),
        auth::SecretIds {
            client_id: args.client_id_secret.clone(),
            client_secret: args.client_secret_secret.clone(),
            redirect_uri: args.redirect_uri_secret.clone(),
        },
    );

    let state = auth::AppState {
        secrets,
        store: session_store,
        exchanger: Arc::new(auth::GoogleCodeExchanger::new()),
        verifier: Arc::new(auth::GoogleTokenVerifier::new()),
        pages: auth::LandingPages {
            success_url: args.success_url.clone(),
            error_url: args.error_url.clone(),
        },
    };

    // the frontend sends the session cookie cross-origin, so credentials
    // must be allowed and the origin pinned (wildcard + credentials is
    // rejected by browsers anyway)
    let cors = CorsLayer::new()
        .allow_origin(args.frontend_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([axum::http::Method::GET])
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/initiate-auth", get(auth::initiate_auth_handler))
        .route("/handle-callback", get(auth::callback_handler));

    let protected_routes = Router::new()
        .route("/user", get(auth::user_data_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_auth_middleware,
        ));

    let app = public_routes
        .merge(protected_routes)
        .layer(cors)
        .with_state(state);

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("fitgate listening on http://{}", bind_addr);
    tracing::info!("Initiate auth: http://{}/initiate-auth", bind_addr);
    tracing::info!("OAuth callback: http://{}/handle-callback", bind_addr);
    tracing::info!("Protected resource: http://{}/user", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_session_store(args: &Args) -> Result<Arc<dyn SessionStore + Send + Sync>> {
    match (&args.couchdb_user, &args.couchdb_password) {
        (Some(user), Some(password)) => {
            tracing::info!(
                "Connecting to session store at {}/{}",
                args.couchdb_url,
                args.couchdb_database
            );
            let couch = store::CouchSessionStore::new(
                &args.couchdb_url,
                &args.couchdb_database,
                user,
                password,
            );
            couch
                .test_connection()
                .await
                .map_err(|e| anyhow::anyhow!("session store unreachable: {}", e))?;
            Ok(Arc::new(couch))
        }
        _ => {
            tracing::warn!("No CouchDB credentials - sessions held in memory, lost on restart");
            Ok(Arc::new(store::MemorySessionStore::new()))
        }
    }
}
