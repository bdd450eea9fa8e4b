pub mod auth;
pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use parley_chat::ChatError;

use crate::error::ApiError;
use crate::state::AppState;

/// REST routes. Caller resolution runs on every route except register/login;
/// operations themselves decide whether an anonymous caller is acceptable.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let caller_routes = Router::new()
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/defaults", post(channels::ensure_defaults))
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_caller,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(caller_routes)
}

/// Run blocking store work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
