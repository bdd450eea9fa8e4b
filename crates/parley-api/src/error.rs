use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parley_chat::ChatError;
use parley_types::api::{ErrorBody, ErrorKind};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Chat(err) => {
                if let ChatError::Storage(inner) = err {
                    error!("Storage failure: {:#}", inner);
                }
                err.to_body()
            }
            ApiError::Join(err) => {
                error!("spawn_blocking join error: {}", err);
                ErrorBody {
                    kind: ErrorKind::Internal,
                    message: "Internal error".into(),
                }
            }
        };

        (status_for(body.kind), Json(body)).into_response()
    }
}

// Extractor rejections become `invalid_input` so every error body has the same shape
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ChatError::InvalidInput(rejection.body_text()).into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ChatError::InvalidInput(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ChatError::InvalidInput(rejection.body_text()).into()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
