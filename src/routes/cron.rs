use crate::config::Config;
use crate::database::Repository;
use crate::error::app_error::AppError;
use crate::service::session::SessionService;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket::serde::json::Json;
use rocket::{State, post, routes};
use serde::Serialize;
use std::sync::Arc;

pub(crate) struct CronAuth;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        if config.cron.auth_token.is_empty() {
            return Outcome::Error((Status::BadRequest, AppError::BadRequest("Cron auth token is not configured".to_string())));
        }

        let incoming = req.headers().get_one("x-cron-token");
        match incoming {
            Some(token) if token == config.cron.auth_token => Outcome::Success(CronAuth),
            _ => Outcome::Error((Status::Forbidden, AppError::Forbidden)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleanSessionsResponse {
    pub deleted: u64,
}

#[post("/clean-sessions")]
pub async fn clean_sessions(repository: &State<Arc<dyn Repository>>, _cron_auth: CronAuth) -> Result<Json<CleanSessionsResponse>, AppError> {
    let deleted = SessionService::new(repository.sessions()).clean_expired_sessions().await?;
    Ok(Json(CleanSessionsResponse { deleted }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![clean_sessions]
}
