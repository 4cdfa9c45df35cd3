use crate::database::postgres_repository::{PostgresRepository, is_unique_violation};
use crate::error::app_error::AppError;
use crate::models::user::{Email, GoogleId, NewUser, User};
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    google_id: String,
    email: String,
    verified_email: bool,
    name: String,
    picture: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            google_id: GoogleId::new(row.google_id)?,
            email: Email::new(row.email)?,
            verified_email: row.verified_email,
            name: row.name,
            picture: row.picture,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        })
    }
}

const USER_COLUMNS: &str = "id, google_id, email, verified_email, name, picture, created_at, updated_at, last_login_at";

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<User, AppError>;
    async fn find_user_by_google_id(&self, google_id: &GoogleId) -> Result<User, AppError>;
    async fn find_user_by_email(&self, email: &Email) -> Result<User, AppError>;
    /// Fails with [`AppError::UserAlreadyExists`] when the google id or email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, AppError>;
    async fn update_user(&self, user: &User) -> Result<User, AppError>;
    async fn delete_user(&self, id: i64) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<User, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to get user", e))?;

        row.ok_or(AppError::UserNotFound)?.try_into()
    }

    async fn find_user_by_google_id(&self, google_id: &GoogleId) -> Result<User, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(google_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to get user by google id", e))?;

        row.ok_or(AppError::UserNotFound)?.try_into()
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<User, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to get user by email", e))?;

        row.ok_or(AppError::UserNotFound)?.try_into()
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let query = format!(
            r#"
            INSERT INTO users (google_id, email, verified_email, name, picture, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(user.google_id.as_str())
            .bind(user.email.as_str())
            .bind(user.verified_email)
            .bind(&user.name)
            .bind(&user.picture)
            .bind(user.last_login_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::UserAlreadyExists(user.google_id.to_string())
                } else {
                    AppError::db("Failed to create user", e)
                }
            })?;

        row.try_into()
    }

    async fn update_user(&self, user: &User) -> Result<User, AppError> {
        let query = format!(
            r#"
            UPDATE users
            SET email = $1, verified_email = $2, name = $3, picture = $4, last_login_at = $5, updated_at = now()
            WHERE id = $6
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(user.email.as_str())
            .bind(user.verified_email)
            .bind(&user.name)
            .bind(&user.picture)
            .bind(user.last_login_at)
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::UserAlreadyExists(user.email.to_string())
                } else {
                    AppError::db("Failed to update user", e)
                }
            })?;

        row.ok_or(AppError::UserNotFound)?.try_into()
    }

    async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db("Failed to delete user", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::UserNotFound);
        }

        Ok(())
    }
}
