use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{NewSession, Session, SessionToken};
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            token: SessionToken::new(row.token)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait::async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_session_by_token(&self, token: &SessionToken) -> Result<Session, AppError>;
    /// Non-expired sessions of a user, newest first.
    async fn find_sessions_by_user(&self, user_id: i64) -> Result<Vec<Session>, AppError>;
    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError>;
    async fn update_session(&self, session: &Session) -> Result<Session, AppError>;
    async fn delete_session(&self, token: &SessionToken) -> Result<(), AppError>;
    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError>;
    async fn delete_expired_sessions(&self) -> Result<u64, AppError>;
}

#[async_trait::async_trait]
impl SessionRepository for PostgresRepository {
    async fn find_session_by_token(&self, token: &SessionToken) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, token, expires_at, created_at, updated_at
            FROM user_sessions
            WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to get session", e))?;

        row.ok_or(AppError::SessionNotFound)?.try_into()
    }

    async fn find_sessions_by_user(&self, user_id: i64) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, token, expires_at, created_at, updated_at
            FROM user_sessions
            WHERE user_id = $1
              AND expires_at > now()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to list sessions", e))?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO user_sessions (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, created_at, updated_at
            "#,
        )
        .bind(session.user_id)
        .bind(session.token.as_str())
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to create session", e))?;

        row.try_into()
    }

    async fn update_session(&self, session: &Session) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE user_sessions
            SET expires_at = $1, updated_at = now()
            WHERE id = $2
            RETURNING id, user_id, token, expires_at, created_at, updated_at
            "#,
        )
        .bind(session.expires_at)
        .bind(session.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to update session", e))?;

        row.ok_or(AppError::SessionNotFound)?.try_into()
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete session", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound);
        }

        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete user sessions", e))?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < now()")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete expired sessions", e))?;

        Ok(result.rows_affected())
    }
}
