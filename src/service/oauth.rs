use crate::config::GoogleOAuthConfig;
use crate::database::Repository;
use crate::error::app_error::AppError;
use crate::models::oauth::{AccessToken, CallbackParams, OAuthState, TokenResponse};
use crate::models::session::Session;
use crate::models::user::{GoogleProfile, User};
use crate::service::session::SessionService;
use crate::service::user::UserService;
use chrono::Duration;
use std::fmt;
use tracing::{error, info, warn};

/// Identity provider side of the authorization-code flow.
#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorization_url(&self, state: &OAuthState) -> String;
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError>;
    async fn fetch_profile(&self, token: &AccessToken) -> Result<GoogleProfile, AppError>;
}

pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig, http: reqwest::Client) -> Self {
        GoogleOAuthClient { config, http }
    }
}

#[async_trait::async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &OAuthState) -> String {
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(&scope),
            urlencoding::encode(state.as_str()),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream("Token request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream_message(format!("Token endpoint returned {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream("Invalid token response", e))?;

        Ok(AccessToken(token.access_token))
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<GoogleProfile, AppError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.0)
            .send()
            .await
            .map_err(|e| AppError::upstream("Userinfo request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream_message(format!("Userinfo endpoint returned {status}")));
        }

        response.json().await.map_err(|e| AppError::upstream("Invalid userinfo response", e))
    }
}

/// Checks the callback query against the state cookie and returns the
/// authorization code. The provider error wins over a missing code, which
/// wins over a state mismatch.
pub fn verify_callback<'a>(params: &CallbackParams<'a>, cookie_state: Option<&str>) -> Result<&'a str, AppError> {
    if let Some(provider_error) = params.error.filter(|e| !e.is_empty()) {
        return Err(AppError::OAuthProvider(provider_error.to_string()));
    }

    let code = params.code.filter(|c| !c.is_empty()).ok_or(AppError::MissingAuthorizationCode)?;

    let (Some(received), Some(expected)) = (params.state, cookie_state) else {
        return Err(AppError::CsrfMismatch);
    };
    let received = OAuthState::new(received).map_err(|_| AppError::CsrfMismatch)?;
    let expected = OAuthState::new(expected).map_err(|_| AppError::CsrfMismatch)?;
    if !expected.matches(&received) {
        return Err(AppError::CsrfMismatch);
    }

    Ok(code)
}

/// Message shown to the user on the front end for a rejected callback.
pub fn callback_error_message(err: &AppError) -> String {
    match err {
        AppError::OAuthProvider(_) | AppError::MissingAuthorizationCode | AppError::CsrfMismatch => err.to_string(),
        _ => "Authentication failed".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    ExchangeCode,
    FetchProfile,
    SaveUser,
    CreateSession,
}

#[derive(Debug)]
pub struct LoginFailure {
    pub stage: LoginStage,
    pub source: AppError,
}

impl LoginFailure {
    pub fn user_message(&self) -> &'static str {
        match self.stage {
            LoginStage::ExchangeCode => "Failed to exchange token",
            LoginStage::FetchProfile => "Failed to get user info",
            LoginStage::SaveUser => "Failed to save user data",
            LoginStage::CreateSession => "Failed to create session",
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.user_message(), self.source)
    }
}

pub struct CompletedLogin {
    pub profile: GoogleProfile,
    pub user: User,
    pub session: Session,
}

pub struct LoginService<'a> {
    repository: &'a dyn Repository,
    provider: &'a dyn OAuthProvider,
    session_duration: Duration,
}

impl<'a> LoginService<'a> {
    pub fn new(repository: &'a dyn Repository, provider: &'a dyn OAuthProvider, session_duration: Duration) -> Self {
        LoginService {
            repository,
            provider,
            session_duration,
        }
    }

    /// Runs the post-callback half of the flow. Nothing is written unless the
    /// provider returned a profile; the session is created last.
    pub async fn complete_login(&self, code: &str) -> Result<CompletedLogin, LoginFailure> {
        let fail = |stage: LoginStage| {
            move |source: AppError| {
                error!(stage = ?stage, error = ?source, "login failed");
                LoginFailure { stage, source }
            }
        };

        let token = self.provider.exchange_code(code).await.map_err(fail(LoginStage::ExchangeCode))?;
        let profile = self.provider.fetch_profile(&token).await.map_err(fail(LoginStage::FetchProfile))?;

        let user = UserService::new(self.repository.users())
            .create_or_update_user(&profile)
            .await
            .map_err(fail(LoginStage::SaveUser))?;

        let session = SessionService::new(self.repository.sessions())
            .create_session(user.id, self.session_duration)
            .await
            .map_err(fail(LoginStage::CreateSession))?;

        info!(user_id = user.id, session_id = session.id, "login completed");
        Ok(CompletedLogin { profile, user, session })
    }
}

pub(crate) fn log_rejected_callback(err: &AppError) {
    warn!(error = %err, kind = ?err.kind(), "oauth callback rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::app_error::ErrorKind;
    use crate::test_utils::{InMemoryRepository, MockOAuthProvider, sample_profile};

    fn params<'a>(code: Option<&'a str>, state: Option<&'a str>, error: Option<&'a str>) -> CallbackParams<'a> {
        CallbackParams { code, state, error }
    }

    fn google_config() -> GoogleOAuthConfig {
        GoogleOAuthConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:8080/auth/google/callback".to_string(),
            ..GoogleOAuthConfig::default()
        }
    }

    #[test]
    fn authorization_url_carries_client_state_and_offline_access() {
        let client = GoogleOAuthClient::new(google_config(), reqwest::Client::new());
        let state = OAuthState::new("abc=").unwrap();

        let url = client.authorization_url(&state);

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=profile%20email"));
        assert!(url.contains("state=abc%3D"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn provider_error_takes_precedence() {
        let result = verify_callback(&params(None, Some("x"), Some("access_denied")), Some("y"));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Google OAuth error: access_denied");
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn missing_code_is_checked_before_state() {
        let result = verify_callback(&params(None, Some("x"), None), Some("y"));
        assert!(matches!(result, Err(AppError::MissingAuthorizationCode)));
        let result = verify_callback(&params(Some(""), Some("x"), None), Some("x"));
        assert!(matches!(result, Err(AppError::MissingAuthorizationCode)));
    }

    #[test]
    fn state_must_match_cookie_exactly() {
        let state = OAuthState::generate();
        let mut tampered = state.as_str().to_string();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        assert!(matches!(verify_callback(&params(Some("c"), Some(&tampered), None), Some(state.as_str())), Err(AppError::CsrfMismatch)));
        assert!(matches!(verify_callback(&params(Some("c"), Some(state.as_str()), None), None), Err(AppError::CsrfMismatch)));
        assert!(matches!(verify_callback(&params(Some("c"), None, None), Some(state.as_str())), Err(AppError::CsrfMismatch)));
        assert!(matches!(verify_callback(&params(Some("c"), Some(""), None), Some("")), Err(AppError::CsrfMismatch)));
        assert_eq!(verify_callback(&params(Some("c"), Some(state.as_str()), None), Some(state.as_str())).unwrap(), "c");
    }

    #[test]
    fn internal_errors_are_not_shown_to_users() {
        let err = AppError::db("connection refused on 10.0.0.5", sqlx::Error::PoolTimedOut);
        assert_eq!(callback_error_message(&err), "Authentication failed");
        assert_eq!(callback_error_message(&AppError::CsrfMismatch), "Invalid authorization state");
    }

    #[tokio::test]
    async fn complete_login_creates_user_and_session() {
        let repo = InMemoryRepository::default();
        let provider = MockOAuthProvider::new(sample_profile("g-1", "a@example.com"));
        let service = LoginService::new(&repo, &provider, Duration::hours(24));

        let login = service.complete_login("code-1").await.unwrap();

        assert_eq!(login.user.google_id.as_str(), "g-1");
        assert_eq!(login.session.user_id, login.user.id);
        assert_eq!(repo.user_count(), 1);
        assert_eq!(repo.session_count(), 1);
    }

    #[tokio::test]
    async fn second_login_keeps_user_and_both_tokens_stay_valid() {
        let repo = InMemoryRepository::default();
        let provider = MockOAuthProvider::new(sample_profile("g-1", "a@example.com"));
        let service = LoginService::new(&repo, &provider, Duration::hours(24));

        let first = service.complete_login("code-1").await.unwrap();
        provider.set_profile(sample_profile("g-1", "b@example.com"));
        let second = service.complete_login("code-2").await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.email.as_str(), "b@example.com");
        assert_ne!(first.session.token, second.session.token);

        let sessions = SessionService::new(&repo);
        assert!(sessions.validate_session(first.session.token.as_str()).await.is_ok());
        assert!(sessions.validate_session(second.session.token.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn provider_failures_leave_storage_untouched() {
        let repo = InMemoryRepository::default();
        let mut provider = MockOAuthProvider::new(sample_profile("g-1", "a@example.com"));
        provider.fail_exchange = true;

        let failure = LoginService::new(&repo, &provider, Duration::hours(24)).complete_login("code").await.err().unwrap();
        assert_eq!(failure.stage, LoginStage::ExchangeCode);
        assert_eq!(failure.user_message(), "Failed to exchange token");

        provider.fail_exchange = false;
        provider.fail_profile = true;
        let failure = LoginService::new(&repo, &provider, Duration::hours(24)).complete_login("code").await.err().unwrap();
        assert_eq!(failure.stage, LoginStage::FetchProfile);

        assert_eq!(repo.user_count(), 0);
        assert_eq!(repo.session_count(), 0);
    }

    #[tokio::test]
    async fn malformed_profile_fails_at_save_without_session() {
        let repo = InMemoryRepository::default();
        let provider = MockOAuthProvider::new(sample_profile("g-1", "not-an-email"));

        let failure = LoginService::new(&repo, &provider, Duration::hours(24)).complete_login("code").await.err().unwrap();

        assert_eq!(failure.stage, LoginStage::SaveUser);
        assert!(matches!(failure.source, AppError::InvalidEmail));
        assert_eq!(repo.session_count(), 0);
    }
}
