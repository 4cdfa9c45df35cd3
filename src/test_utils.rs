use crate::database::session::SessionRepository;
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::oauth::{AccessToken, OAuthState};
use crate::models::session::{NewSession, Session, SessionToken};
use crate::models::user::{Email, GoogleId, GoogleProfile, NewUser, User};
use crate::service::oauth::OAuthProvider;
use crate::service::transcription::Summarizer;
use crate::{Config, Providers};
use chrono::{Duration, Utc};
use rocket::{Build, Rocket};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn sample_user(id: i64, google_id: &str, email: &str) -> User {
    let now = Utc::now();
    User {
        id,
        google_id: GoogleId::new(google_id).unwrap(),
        email: Email::new(email).unwrap(),
        verified_email: true,
        name: "Test User".to_string(),
        picture: "https://example.com/avatar.png".to_string(),
        created_at: now,
        updated_at: now,
        last_login_at: now,
    }
}

/// A session for `user_id` expiring `expires_in` from now (negative for an expired one).
pub fn sample_session(id: i64, user_id: i64, expires_in: Duration) -> Session {
    let now = Utc::now();
    Session {
        id,
        user_id,
        token: SessionToken::generate(),
        expires_at: now + expires_in,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_profile(google_id: &str, email: &str) -> GoogleProfile {
    GoogleProfile {
        id: google_id.to_string(),
        email: email.to_string(),
        verified_email: true,
        name: "Test User".to_string(),
        picture: "https://example.com/avatar.png".to_string(),
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<Session>,
    next_user_id: i64,
    next_session_id: i64,
}

/// Repository backed by vectors, with switches to simulate storage failures
/// and a lost race on user creation.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    failing: bool,
    hide_google_id_lookup: AtomicBool,
}

impl InMemoryRepository {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// The next lookup by google id reports not found even if the row exists.
    pub fn hide_next_google_id_lookup(&self) {
        self.hide_google_id_lookup.store(true, Ordering::SeqCst);
    }

    pub fn insert_user(&self, mut user: User) -> User {
        let mut tables = self.tables.lock().unwrap();
        if user.id == 0 {
            tables.next_user_id += 1;
            user.id = tables.next_user_id;
        }
        tables.users.push(user.clone());
        user
    }

    pub fn insert_session(&self, mut session: Session) -> Session {
        let mut tables = self.tables.lock().unwrap();
        if session.id == 0 {
            tables.next_session_id += 1;
            session.id = tables.next_session_id;
        }
        tables.sessions.push(session.clone());
        session
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }

    pub fn sessions_for(&self, user_id: i64) -> Vec<Session> {
        self.tables.lock().unwrap().sessions.iter().filter(|s| s.user_id == user_id).cloned().collect()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing {
            return Err(AppError::db("Simulated storage failure", sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemoryRepository {
    async fn find_session_by_token(&self, token: &SessionToken) -> Result<Session, AppError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        tables.sessions.iter().find(|s| &s.token == token).cloned().ok_or(AppError::SessionNotFound)
    }

    async fn find_sessions_by_user(&self, user_id: i64) -> Result<Vec<Session>, AppError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let mut sessions: Vec<Session> = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && !s.is_expired())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session, AppError> {
        self.check()?;
        let now = Utc::now();
        Ok(self.insert_session(Session {
            id: 0,
            user_id: session.user_id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update_session(&self, session: &Session) -> Result<Session, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.sessions.iter_mut().find(|s| s.id == session.id).ok_or(AppError::SessionNotFound)?;
        stored.expires_at = session.expires_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|s| &s.token != token);
        if tables.sessions.len() == before {
            return Err(AppError::SessionNotFound);
        }
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|s| !s.is_expired());
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<User, AppError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        tables.users.iter().find(|u| u.id == id).cloned().ok_or(AppError::UserNotFound)
    }

    async fn find_user_by_google_id(&self, google_id: &GoogleId) -> Result<User, AppError> {
        self.check()?;
        if self.hide_google_id_lookup.swap(false, Ordering::SeqCst) {
            return Err(AppError::UserNotFound);
        }
        let tables = self.tables.lock().unwrap();
        tables.users.iter().find(|u| &u.google_id == google_id).cloned().ok_or(AppError::UserNotFound)
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<User, AppError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        tables.users.iter().find(|u| &u.email == email).cloned().ok_or(AppError::UserNotFound)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        self.check()?;
        {
            let tables = self.tables.lock().unwrap();
            if tables.users.iter().any(|u| u.google_id == user.google_id) {
                return Err(AppError::UserAlreadyExists(user.google_id.to_string()));
            }
        }
        let now = Utc::now();
        Ok(self.insert_user(User {
            id: 0,
            google_id: user.google_id.clone(),
            email: user.email.clone(),
            verified_email: user.verified_email,
            name: user.name.clone(),
            picture: user.picture.clone(),
            created_at: now,
            updated_at: now,
            last_login_at: user.last_login_at,
        }))
    }

    async fn update_user(&self, user: &User) -> Result<User, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.users.iter_mut().find(|u| u.id == user.id).ok_or(AppError::UserNotFound)?;
        *stored = user.clone();
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Err(AppError::UserNotFound);
        }
        tables.sessions.retain(|s| s.user_id != id);
        Ok(())
    }
}

/// OAuth provider that returns a fixed profile, or fails at a chosen step.
pub struct MockOAuthProvider {
    pub profile: Mutex<GoogleProfile>,
    pub fail_exchange: bool,
    pub fail_profile: bool,
    pub exchanges: AtomicUsize,
}

impl MockOAuthProvider {
    pub fn new(profile: GoogleProfile) -> Self {
        Self {
            profile: Mutex::new(profile),
            fail_exchange: false,
            fail_profile: false,
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn set_profile(&self, profile: GoogleProfile) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OAuthProvider for MockOAuthProvider {
    fn authorization_url(&self, state: &OAuthState) -> String {
        format!("https://accounts.example.com/o/oauth2/auth?state={}", urlencoding::encode(state.as_str()))
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange {
            return Err(AppError::upstream_message("token endpoint returned 400"));
        }
        Ok(AccessToken(format!("access-{code}")))
    }

    async fn fetch_profile(&self, _token: &AccessToken) -> Result<GoogleProfile, AppError> {
        if self.fail_profile {
            return Err(AppError::upstream_message("userinfo endpoint returned 500"));
        }
        Ok(self.profile.lock().unwrap().clone())
    }
}

/// Summarizer returning canned text and recording the prompt inputs.
pub struct MockSummarizer {
    pub text: String,
    pub fail: bool,
    pub last_request: Mutex<Option<(usize, Option<u32>, Option<String>)>>,
}

impl MockSummarizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, audio: &[u8], _file_name: &str, pages: Option<u32>, notes: Option<&str>) -> Result<String, AppError> {
        *self.last_request.lock().unwrap() = Some((audio.len(), pages, notes.map(str::to_string)));
        if self.fail {
            return Err(AppError::upstream_message("transcription failed"));
        }
        Ok(self.text.clone())
    }
}

/// A rocket wired to in-memory storage and mock upstreams. Tests keep the
/// handles to inspect state after requests.
pub struct TestApp {
    pub config: Config,
    pub repository: Arc<InMemoryRepository>,
    pub oauth: Arc<MockOAuthProvider>,
    pub summarizer: Arc<MockSummarizer>,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.rate_limit.requests = 1000;
        config.api.enable_swagger = false;

        Self {
            config,
            repository: Arc::new(InMemoryRepository::default()),
            oauth: Arc::new(MockOAuthProvider::new(sample_profile("g-1", "a@example.com"))),
            summarizer: Arc::new(MockSummarizer::new("Lecture notes")),
        }
    }

    /// Only valid before `build`, while the mock is not shared yet.
    pub fn oauth_mut(&mut self) -> &mut MockOAuthProvider {
        Arc::get_mut(&mut self.oauth).expect("oauth mock already shared")
    }

    pub fn summarizer_mut(&mut self) -> &mut MockSummarizer {
        Arc::get_mut(&mut self.summarizer).expect("summarizer mock already shared")
    }

    pub fn build(&self) -> Rocket<Build> {
        crate::build_rocket_with(
            self.config.clone(),
            Providers {
                repository: Some(self.repository.clone()),
                oauth: self.oauth.clone(),
                summarizer: self.summarizer.clone(),
            },
        )
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
