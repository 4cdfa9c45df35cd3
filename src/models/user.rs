use crate::error::app_error::AppError;
use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex is valid"));

/// A syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn new(email: impl Into<String>) -> Result<Self, AppError> {
        let email = email.into();
        if email.is_empty() || !EMAIL_REGEX.is_match(&email) {
            return Err(AppError::InvalidEmail);
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subject identifier issued by Google for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoogleId(String);

impl GoogleId {
    pub fn new(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AppError::EmptyGoogleId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GoogleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profile returned by the Google userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub google_id: GoogleId,
    pub email: Email,
    pub verified_email: bool,
    pub name: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl User {
    /// Overwrites the mutable profile fields and records a login.
    pub fn update_profile(&mut self, email: Email, name: String, picture: String, verified_email: bool) {
        let now = Utc::now();
        self.email = email;
        self.name = name;
        self.picture = picture;
        self.verified_email = verified_email;
        self.last_login_at = now;
        self.updated_at = now;
    }
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub google_id: GoogleId,
    pub email: Email,
    pub verified_email: bool,
    pub name: String,
    pub picture: String,
    pub last_login_at: DateTime<Utc>,
}

impl NewUser {
    pub fn new(google_id: GoogleId, email: Email, name: String, picture: String, verified_email: bool) -> Self {
        Self {
            google_id,
            email,
            verified_email,
            name,
            picture,
            last_login_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserResponse {
    pub id: i64,
    pub google_id: String,
    pub email: String,
    pub verified_email: bool,
    pub name: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            google_id: user.google_id.to_string(),
            email: user.email.to_string(),
            verified_email: user.verified_email,
            name: user.name.clone(),
            picture: user.picture.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login_at: user.last_login_at,
        }
    }
}
