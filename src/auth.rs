use crate::database::Repository;
use crate::error::app_error::AppError;
use crate::models::session::Session;
use crate::models::user::User;
use crate::service::session::SessionService;
use crate::service::user::UserService;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "session_token";
pub const STATE_COOKIE: &str = "oauth_state";

/// The authenticated user behind a valid, unexpired `session_token` cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let Some(cookie) = req.cookies().get(SESSION_COOKIE) else {
            return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
        };

        let repository = match req.rocket().state::<Arc<dyn Repository>>() {
            Some(repository) => repository,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        let session = match SessionService::new(repository.sessions()).validate_session(cookie.value()).await {
            Ok(session) => session,
            Err(err) => return Outcome::Error((Status::from(&err), err)),
        };

        let user = match UserService::new(repository.users()).get_user_by_id(session.user_id).await {
            Ok(user) => user,
            Err(AppError::UserNotFound) => return Outcome::Error((Status::Unauthorized, AppError::Unauthorized)),
            Err(err) => return Outcome::Error((Status::from(&err), err)),
        };

        let current_user = CurrentUser { user, session };
        req.local_cache(|| Some(current_user.clone()));
        Outcome::Success(current_user)
    }
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Cookie-based authentication. Sign in via GET /auth/google/login to obtain the session cookie.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: SESSION_COOKIE.to_string(),
                location: "cookie".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("cookieAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response};
        let mut responses = Responses::default();
        responses.responses.insert(
            "401".to_string(),
            RefOr::Object(Response {
                description: "Unauthorized - missing, unknown or expired session".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}
