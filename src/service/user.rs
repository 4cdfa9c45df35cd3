use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::user::{Email, GoogleId, GoogleProfile, NewUser, User};
use tracing::{info, warn};

pub struct UserService<'a> {
    repository: &'a dyn UserRepository,
}

impl<'a> UserService<'a> {
    pub fn new(repository: &'a dyn UserRepository) -> Self {
        UserService { repository }
    }

    /// Upserts the user identified by the profile's Google id.
    ///
    /// When a concurrent login creates the same user first, the unique
    /// constraint rejects our insert; the row is then re-read once and
    /// updated with this profile.
    pub async fn create_or_update_user(&self, profile: &GoogleProfile) -> Result<User, AppError> {
        let google_id = GoogleId::new(profile.id.as_str())?;
        let email = Email::new(profile.email.as_str())?;

        match self.repository.find_user_by_google_id(&google_id).await {
            Ok(user) => self.apply_profile(user, email, profile).await,
            Err(AppError::UserNotFound) => {
                let new_user = NewUser::new(
                    google_id.clone(),
                    email.clone(),
                    profile.name.clone(),
                    profile.picture.clone(),
                    profile.verified_email,
                );
                match self.repository.create_user(&new_user).await {
                    Ok(user) => {
                        info!(user_id = user.id, "user created");
                        Ok(user)
                    }
                    Err(AppError::UserAlreadyExists(_)) => {
                        warn!(google_id = %google_id, "user created concurrently, updating instead");
                        let user = self.repository.find_user_by_google_id(&google_id).await?;
                        self.apply_profile(user, email, profile).await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_profile(&self, mut user: User, email: Email, profile: &GoogleProfile) -> Result<User, AppError> {
        user.update_profile(email, profile.name.clone(), profile.picture.clone(), profile.verified_email);
        let user = self.repository.update_user(&user).await?;

        info!(user_id = user.id, "user profile updated");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, AppError> {
        self.repository.find_user_by_id(id).await
    }

    pub async fn get_user_by_google_id(&self, google_id: &str) -> Result<User, AppError> {
        let google_id = GoogleId::new(google_id)?;
        self.repository.find_user_by_google_id(&google_id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        let email = Email::new(email)?;
        self.repository.find_user_by_email(&email).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        self.repository.delete_user(id).await?;

        info!(user_id = id, "user deleted");
        Ok(())
    }
}
