use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use parley_chat::Caller;
use parley_types::api::{CreateChannelRequest, EnsureDefaultsResponse};

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

/// GET /channels: creation order.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let channels = run_blocking(move || chat.list_channels(&caller)).await?;
    Ok(Json(channels))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    WithRejection(Json(req), _): WithRejection<Json<CreateChannelRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let channel = run_blocking(move || chat.create_channel(&caller, &req.name)).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    WithRejection(Path(channel_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let channel = run_blocking(move || chat.get_channel(&caller, channel_id)).await?;
    Ok(Json(channel))
}

/// POST /channels/defaults: 201 when this call seeded the directory, 200 otherwise.
pub async fn ensure_defaults(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let created = run_blocking(move || chat.ensure_default_channels(&caller)).await?;

    let status = if created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(EnsureDefaultsResponse { created })))
}
