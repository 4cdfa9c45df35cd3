use crate::auth::{CurrentUser, SESSION_COOKIE, STATE_COOKIE};
use crate::config::{Config, SessionConfig};
use crate::database::Repository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::oauth::{CallbackParams, OAuthState};
use crate::models::session::{Session, SessionResponse};
use crate::models::user::UserResponse;
use crate::service::oauth::{LoginService, OAuthProvider, callback_error_message, log_rejected_callback, verify_callback};
use crate::service::session::SessionService;
use crate::service::user::UserService;
use chrono::Duration;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::time::OffsetDateTime;
use rocket::{State, delete, get, post, routes};
use rocket_okapi::{openapi, openapi_get_routes_spec};
use std::sync::Arc;
use tracing::{error, info};

fn state_cookie(state: &OAuthState, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, state.as_str().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .max_age(rocket::time::Duration::seconds(config.state_ttl_seconds))
        .build()
}

fn session_cookie(session: &Session, config: &SessionConfig) -> Cookie<'static> {
    let builder = Cookie::build((SESSION_COOKIE, session.token.as_str().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies);

    match OffsetDateTime::from_unix_timestamp(session.expires_at.timestamp()) {
        Ok(expires) => builder.expires(expires).build(),
        Err(_) => builder.max_age(rocket::time::Duration::hours(config.duration_hours)).build(),
    }
}

fn clear_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

fn frontend_callback(config: &Config) -> String {
    format!("{}/auth/callback", config.frontend.url.trim_end_matches('/'))
}

fn redirect_with_error(config: &Config, message: &str) -> Redirect {
    Redirect::temporary(format!("{}?error={}", frontend_callback(config), urlencoding::encode(message)))
}

/// Starts the Google sign-in flow.
#[get("/google/login")]
pub async fn google_login(cookies: &CookieJar<'_>, provider: &State<Arc<dyn OAuthProvider>>, config: &State<Config>, _rate_limit: RateLimit) -> Redirect {
    let state = OAuthState::generate();
    cookies.add(state_cookie(&state, &config.session));

    Redirect::temporary(provider.authorization_url(&state))
}

/// Provider redirect target. Always answers with a redirect to the front end,
/// carrying either the signed-in user and token or an error message.
#[get("/google/callback?<code>&<state>&<error>")]
#[allow(clippy::too_many_arguments)]
pub async fn google_callback(
    code: Option<&str>,
    state: Option<&str>,
    error: Option<&str>,
    cookies: &CookieJar<'_>,
    repository: &State<Arc<dyn Repository>>,
    provider: &State<Arc<dyn OAuthProvider>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
) -> Redirect {
    let params = CallbackParams { code, state, error };
    let cookie_state = cookies.get(STATE_COOKIE).map(|c| c.value().to_string());

    let code = match verify_callback(&params, cookie_state.as_deref()) {
        Ok(code) => code,
        Err(err) => {
            log_rejected_callback(&err);
            return redirect_with_error(config, &callback_error_message(&err));
        }
    };

    let login_service = LoginService::new(
        repository.inner().as_ref(),
        provider.inner().as_ref(),
        Duration::hours(config.session.duration_hours),
    );
    let login = match login_service.complete_login(code).await {
        Ok(login) => login,
        Err(failure) => return redirect_with_error(config, failure.user_message()),
    };

    let profile_json = match serde_json::to_string(&login.profile) {
        Ok(json) => json,
        Err(err) => {
            error!(error = %err, "failed to serialize profile");
            return redirect_with_error(config, "Internal error");
        }
    };

    cookies.remove(clear_cookie(STATE_COOKIE));
    cookies.add(session_cookie(&login.session, &config.session));

    Redirect::temporary(format!(
        "{}?user={}&token={}",
        frontend_callback(config),
        urlencoding::encode(&profile_json),
        urlencoding::encode(login.session.token.as_str()),
    ))
}

/// Returns the signed-in user.
#[openapi(tag = "Auth")]
#[get("/me")]
pub async fn me(current_user: CurrentUser, _rate_limit: RateLimit) -> Json<UserResponse> {
    Json(UserResponse::from(&current_user.user))
}

/// Lists the signed-in user's active sessions, newest first.
#[openapi(tag = "Auth")]
#[get("/sessions")]
pub async fn list_sessions(
    current_user: CurrentUser,
    repository: &State<Arc<dyn Repository>>,
    _rate_limit: RateLimit,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = SessionService::new(repository.sessions()).get_user_sessions(current_user.id()).await?;

    Ok(Json(
        sessions
            .iter()
            .map(|session| SessionResponse::from_session(session, &current_user.session.token))
            .collect(),
    ))
}

#[post("/logout")]
pub async fn logout(cookies: &CookieJar<'_>, repository: &State<Arc<dyn Repository>>, _rate_limit: RateLimit) -> Result<&'static str, AppError> {
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest("Session cookie not found".to_string()))?;

    match SessionService::new(repository.sessions()).delete_session(&token).await {
        Ok(()) | Err(AppError::SessionNotFound) => {}
        Err(err) => return Err(err),
    }

    cookies.remove(clear_cookie(SESSION_COOKIE));
    Ok("Logged out successfully")
}

/// Signs the user out everywhere.
#[post("/logout-all")]
pub async fn logout_all(
    current_user: CurrentUser,
    cookies: &CookieJar<'_>,
    repository: &State<Arc<dyn Repository>>,
    _rate_limit: RateLimit,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = SessionService::new(repository.sessions()).delete_user_sessions(current_user.id()).await?;

    cookies.remove(clear_cookie(SESSION_COOKIE));
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[post("/session/renew")]
pub async fn renew_session(
    current_user: CurrentUser,
    cookies: &CookieJar<'_>,
    repository: &State<Arc<dyn Repository>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
) -> Result<Json<SessionResponse>, AppError> {
    let session = SessionService::new(repository.sessions())
        .renew_session(current_user.session, Duration::hours(config.session.duration_hours))
        .await?;

    cookies.add(session_cookie(&session, &config.session));
    Ok(Json(SessionResponse::from_session(&session, &session.token)))
}

/// Deletes the signed-in user together with all of their sessions.
#[delete("/account")]
pub async fn delete_account(
    current_user: CurrentUser,
    cookies: &CookieJar<'_>,
    repository: &State<Arc<dyn Repository>>,
    _rate_limit: RateLimit,
) -> Result<Status, AppError> {
    let user_id = current_user.id();
    SessionService::new(repository.sessions()).delete_user_sessions(user_id).await?;
    UserService::new(repository.users()).delete_user(user_id).await?;

    cookies.remove(clear_cookie(SESSION_COOKIE));
    info!(user_id, "account deleted");
    Ok(Status::NoContent)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    let (mut documented, openapi) = openapi_get_routes_spec![me, list_sessions];
    documented.extend(routes![google_login, google_callback, logout, logout_all, renew_session, delete_account]);
    (documented, openapi)
}
