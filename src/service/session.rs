use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::session::{NewSession, Session, SessionToken};
use chrono::Duration;
use tracing::{debug, info};

pub struct SessionService<'a> {
    repository: &'a dyn SessionRepository,
}

impl<'a> SessionService<'a> {
    pub fn new(repository: &'a dyn SessionRepository) -> Self {
        SessionService { repository }
    }

    pub async fn create_session(&self, user_id: i64, duration: Duration) -> Result<Session, AppError> {
        let new_session = NewSession::new(user_id, SessionToken::generate(), duration);
        let session = self.repository.create_session(&new_session).await?;

        info!(user_id, session_id = session.id, expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// Resolves a presented token into a live session. A row that exists but
    /// is past its expiry is reported as [`AppError::SessionExpired`].
    pub async fn validate_session(&self, token: &str) -> Result<Session, AppError> {
        let token = SessionToken::new(token)?;
        let session = self.repository.find_session_by_token(&token).await?;

        if session.is_expired() {
            debug!(session_id = session.id, user_id = session.user_id, "session expired");
            return Err(AppError::SessionExpired);
        }

        Ok(session)
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        let token = SessionToken::new(token)?;
        self.repository.delete_session(&token).await?;

        info!("session deleted");
        Ok(())
    }

    pub async fn delete_user_sessions(&self, user_id: i64) -> Result<u64, AppError> {
        let deleted = self.repository.delete_sessions_for_user(user_id).await?;

        info!(user_id, deleted, "user sessions deleted");
        Ok(deleted)
    }

    pub async fn clean_expired_sessions(&self) -> Result<u64, AppError> {
        let deleted = self.repository.delete_expired_sessions().await?;

        info!(deleted, "expired sessions cleaned");
        Ok(deleted)
    }

    pub async fn get_user_sessions(&self, user_id: i64) -> Result<Vec<Session>, AppError> {
        let mut sessions = self.repository.find_sessions_by_user(user_id).await?;
        sessions.retain(|session| !session.is_expired());
        Ok(sessions)
    }

    /// Extends the session without checking its current expiry; callers are
    /// expected to have validated it.
    pub async fn renew_session(&self, mut session: Session, duration: Duration) -> Result<Session, AppError> {
        session.renew(duration);
        let session = self.repository.update_session(&session).await?;

        info!(session_id = session.id, expires_at = %session.expires_at, "session renewed");
        Ok(session)
    }
}
