mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::state::{AppState, AppStateInner};
use parley_chat::{Chat, JwtIdentity};
use parley_db::Database;
use parley_gateway::connection;

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct GatewayParams {
    /// Lets browser clients authenticate the upgrade, since they can't set headers.
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    subscriptions: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let db = Arc::new(Database::open(&config.db_path)?);
    let state = build_state(db, &config);

    let addr = config.addr()?;
    info!("Parley server listening on {}", addr);
    info!("Database: {}", config.db_path.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_state(db: Arc<Database>, config: &Config) -> AppState {
    Arc::new(AppStateInner {
        chat: Arc::new(Chat::new(db.clone(), config.message_limit)),
        db,
        identity: JwtIdentity::new(config.jwt_secret.clone(), config.token_ttl_days),
    })
}

fn app(state: AppState) -> Router {
    let server_routes = Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state.clone());

    Router::new()
        .merge(parley_api::routes(state))
        .merge(server_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let caller = state.identity.resolve_caller(params.token.as_deref());
    let chat = state.chat.clone();
    let identity = state.identity.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, chat, identity, caller))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        subscriptions: state.chat.subscription_count(),
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
