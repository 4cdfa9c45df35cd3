use crate::error::app_error::AppError;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

pub const SESSION_TOKEN_BYTES: usize = 32;

/// Opaque bearer value identifying a server-side session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Result<Self, AppError> {
        let token = token.into();
        if token.is_empty() {
            return Err(AppError::InvalidToken);
        }
        Ok(Self(token))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(general_purpose::URL_SAFE.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pushes the expiry to `duration` from now. Does not check whether the
    /// session already expired.
    pub fn renew(&mut self, duration: Duration) {
        let now = Utc::now();
        self.expires_at = now + duration;
        self.updated_at = now;
    }
}

/// A session that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

impl NewSession {
    pub fn new(user_id: i64, token: SessionToken, duration: Duration) -> Self {
        Self {
            user_id,
            token,
            expires_at: Utc::now() + duration,
        }
    }
}

/// Session as listed to its owner. The token itself is never exposed.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionResponse {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: &Session, current_token: &SessionToken) -> Self {
        Self {
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            current: &session.token == current_token,
        }
    }
}
