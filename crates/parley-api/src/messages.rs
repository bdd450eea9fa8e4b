use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use parley_chat::Caller;
use parley_types::api::SendMessageRequest;

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Falls back to the configured default; capped server-side.
    pub limit: Option<u32>,
}

/// All authenticated users can read and post in every channel.
pub async fn send_message(
    State(state): State<AppState>,
    WithRejection(Path(channel_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(caller): Extension<Caller>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let message = run_blocking(move || chat.send_message(&caller, channel_id, &req.body)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    WithRejection(Path(channel_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let messages = run_blocking(move || chat.list_messages(&caller, channel_id, query.limit)).await?;
    Ok(Json(messages))
}
