use crate::error::app_error::AppError;
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use std::fmt;

pub const OAUTH_STATE_BYTES: usize = 16;

/// CSRF token tying an authorization redirect to its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState(String);

impl OAuthState {
    pub fn new(state: impl Into<String>) -> Result<Self, AppError> {
        let state = state.into();
        if state.is_empty() {
            return Err(AppError::InvalidState);
        }
        Ok(Self(state))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; OAUTH_STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(general_purpose::URL_SAFE.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against a state echoed back by the provider in constant time.
    pub fn matches(&self, other: &OAuthState) -> bool {
        let (a, b) = (self.0.as_bytes(), other.0.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl fmt::Display for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access token issued by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Query string of the provider callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackParams<'a> {
    pub code: Option<&'a str>,
    pub state: Option<&'a str>,
    pub error: Option<&'a str>,
}
