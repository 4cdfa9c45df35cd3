use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, warn};

/// Coarse classification of [`AppError`], used by callers that only care
/// about the category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Expired,
    Csrf,
    Upstream,
    Storage,
    Unauthorized,
    BadRequest,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Google ID cannot be empty")]
    EmptyGoogleId,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid state")]
    InvalidState,
    #[error("{field}: {message}")]
    InvalidUpload { field: &'static str, message: String },
    #[error("Session not found")]
    SessionNotFound,
    #[error("Session expired")]
    SessionExpired,
    #[error("User not found")]
    UserNotFound,
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("Invalid authorization state")]
    CsrfMismatch,
    #[error("Google OAuth error: {0}")]
    OAuthProvider(String),
    #[error("No authorization code received")]
    MissingAuthorizationCode,
    #[error("Upstream service error")]
    Upstream {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error")]
    Pdf { message: String },
    #[error("Internal server error")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn upstream(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Upstream {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn upstream_message(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    pub fn invalid_upload(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidUpload {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidEmail
            | AppError::EmptyGoogleId
            | AppError::InvalidToken
            | AppError::InvalidState
            | AppError::InvalidUpload { .. } => ErrorKind::Validation,
            AppError::SessionNotFound | AppError::UserNotFound => ErrorKind::NotFound,
            AppError::SessionExpired => ErrorKind::Expired,
            AppError::CsrfMismatch => ErrorKind::Csrf,
            AppError::OAuthProvider(_) | AppError::Upstream { .. } => ErrorKind::Upstream,
            AppError::Db { .. } => ErrorKind::Storage,
            AppError::Unauthorized | AppError::Forbidden => ErrorKind::Unauthorized,
            AppError::BadRequest(_) | AppError::MissingAuthorizationCode => ErrorKind::BadRequest,
            AppError::UserAlreadyExists(_) => ErrorKind::Conflict,
            AppError::Pdf { .. } | AppError::Io { .. } => ErrorKind::Internal,
        }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::InvalidEmail => Status::BadRequest,
            AppError::EmptyGoogleId => Status::BadRequest,
            AppError::InvalidToken => Status::Unauthorized,
            AppError::InvalidState => Status::BadRequest,
            AppError::InvalidUpload { .. } => Status::BadRequest,
            AppError::SessionNotFound => Status::Unauthorized,
            AppError::SessionExpired => Status::Unauthorized,
            AppError::UserNotFound => Status::NotFound,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::CsrfMismatch => Status::BadRequest,
            AppError::OAuthProvider(_) => Status::BadGateway,
            AppError::MissingAuthorizationCode => Status::BadRequest,
            AppError::Upstream { .. } => Status::BadGateway,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::Pdf { .. } => Status::InternalServerError,
            AppError::Io { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id().to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        match self.kind() {
            ErrorKind::Storage | ErrorKind::Upstream | ErrorKind::Internal => error!(
                error = ?self,
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                "request failed"
            ),
            _ => warn!(
                error = %self,
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                "request rejected"
            ),
        }

        let status = Status::from(&self);
        let body = self.to_string();

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("404", "Not Found"),
            ("500", "Internal Server Error"),
            ("502", "Bad Gateway"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}
