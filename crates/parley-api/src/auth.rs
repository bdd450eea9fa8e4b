use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use parley_chat::ChatError;
use parley_chat::identity::{Profile, author_label};
use parley_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
pub(crate) const MAX_DISPLAY_NAME_LEN: usize = 64;

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let email = req.email.trim().to_string();
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(ChatError::InvalidInput("A valid email address is required".into()).into());
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ChatError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .into());
    }
    let name = normalize_display_name(req.name)?;

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let account = email.clone();
    run_blocking(move || {
        let password_hash = hash_password(&req.password)?;

        let now = chrono::Utc::now().timestamp_millis();
        if db.create_user(&user_id.to_string(), &account, name.as_deref(), &password_hash, now)? {
            Ok(())
        } else {
            Err(ChatError::AlreadyExists(format!("Account \"{}\"", account)))
        }
    })
    .await?;

    let token = state.identity.issue_token(user_id, &email).map_err(ChatError::Storage)?;
    info!("Registered user {}", user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let email = req.email.trim().to_string();
    let user = run_blocking(move || {
        let user = db.get_user_by_email(&email)?.ok_or(ChatError::Unauthenticated)?;

        // Verify password
        {
            let parsed_hash = PasswordHash::new(&user.password)
                .map_err(|e| anyhow::anyhow!("stored password hash is invalid: {}", e))?;
            Argon2::default()
                .verify_password(req.password.as_bytes(), &parsed_hash)
                .map_err(|_| ChatError::Unauthenticated)?;
        }

        Ok(user)
    })
    .await?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;
    let token = state.identity.issue_token(user_id, &user.email).map_err(ChatError::Storage)?;
    let label = author_label(Some(&Profile {
        name: user.name,
        email: Some(user.email),
    }));

    Ok(Json(LoginResponse {
        user_id,
        label,
        token,
    }))
}

/// Argon2id PHC string with a fresh random salt.
fn hash_password(password: &str) -> Result<String, ChatError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Trim a display name; blank becomes `None`.
pub(crate) fn normalize_display_name(name: Option<String>) -> Result<Option<String>, ChatError> {
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    if let Some(n) = &name {
        if n.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(ChatError::InvalidInput(format!(
                "Display name must be at most {} characters",
                MAX_DISPLAY_NAME_LEN
            )));
        }
    }
    Ok(name)
}
