use axum::{Extension, Json, extract::State, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::info;

use parley_chat::identity::{Profile, author_label};
use parley_chat::{Caller, ChatError};
use parley_db::models::UserRow;
use parley_types::api::{ProfileResponse, UpdateProfileRequest};

use crate::auth::normalize_display_name;
use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

/// GET /users/me
pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = caller.require()?;
    let db = state.db.clone();

    let user = run_blocking(move || {
        db.get_user_by_id(&actor.user_id.to_string())?
            .ok_or_else(|| ChatError::NotFound("User".into()))
    })
    .await?;

    Ok(Json(profile_response(user)?))
}

/// PATCH /users/me: only affects messages sent afterwards.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = caller.require()?;
    let name = normalize_display_name(req.name)?;
    let db = state.db.clone();

    let user = run_blocking(move || {
        let id = actor.user_id.to_string();
        if !db.update_user_name(&id, name.as_deref())? {
            return Err(ChatError::NotFound("User".into()));
        }
        db.get_user_by_id(&id)?
            .ok_or_else(|| ChatError::NotFound("User".into()))
    })
    .await?;

    info!("User {} updated their display name", actor.user_id);
    Ok(Json(profile_response(user)?))
}

fn profile_response(user: UserRow) -> Result<ProfileResponse, ChatError> {
    let id = user
        .id
        .parse()
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;
    let label = author_label(Some(&Profile {
        name: user.name.clone(),
        email: Some(user.email.clone()),
    }));

    Ok(ProfileResponse {
        id,
        email: user.email,
        name: user.name,
        label,
    })
}
