use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::state::AppState;

/// Resolve the `Authorization: Bearer` token into a `Caller` extension.
/// Missing or invalid tokens resolve to an anonymous caller instead of
/// short-circuiting, so each operation reports `Unauthenticated` itself.
pub async fn resolve_caller(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string());

    let caller = state.identity.resolve_caller(token.as_deref());
    req.extensions_mut().insert(caller);
    next.run(req).await
}
