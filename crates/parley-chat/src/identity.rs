//! Caller resolution and author labels.
//!
//! Authentication itself is a collaborator: a signed JWT identifies the user,
//! and this module only turns a presented credential into a [`Caller`].

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use parley_types::api::Claims;

use crate::error::{ChatError, Result};

/// Label used when a profile has neither a name nor an email.
pub const ANONYMOUS_LABEL: &str = "Anonymous";

/// A resolved, authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Actor {
    pub user_id: Uuid,
}

/// Whoever invoked an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(Actor),
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self::User(Actor { user_id })
    }

    /// The authenticated actor, or `Unauthenticated`.
    pub fn require(&self) -> Result<Actor> {
        match self {
            Self::User(actor) => Ok(*actor),
            Self::Anonymous => Err(ChatError::Unauthenticated),
        }
    }
}

/// Display-relevant parts of a user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Resolve the label stamped on a message.
///
/// Fallback order: display name, then email, then [`ANONYMOUS_LABEL`].
/// Blank values count as absent. A missing profile yields the anonymous label.
pub fn author_label(profile: Option<&Profile>) -> String {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    profile
        .and_then(|p| present(&p.name).or_else(|| present(&p.email)))
        .unwrap_or_else(|| ANONYMOUS_LABEL.to_string())
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct JwtIdentity {
    secret: String,
    ttl: Duration,
}

impl JwtIdentity {
    pub fn new(secret: impl Into<String>, ttl_days: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue_token(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            exp: (Utc::now() + self.ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Any missing, malformed, expired or foreign token resolves to
    /// [`Caller::Anonymous`]; operations decide whether that is acceptable.
    pub fn resolve_caller(&self, token: Option<&str>) -> Caller {
        let Some(token) = token else {
            return Caller::Anonymous;
        };

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => Caller::user(data.claims.sub),
            Err(e) => {
                debug!("Rejected token: {}", e);
                Caller::Anonymous
            }
        }
    }
}
