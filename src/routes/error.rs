use crate::config::Config;
use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Response, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

fn error(message: &str) -> Json<Error> {
    Json(Error {
        message: message.to_string(),
    })
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<Error> {
    error("Bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    error("Unauthorized")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    error("Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    error("Conflict")
}

#[catch(413)]
pub fn payload_too_large(_: &Request) -> Json<Error> {
    error("Request body is too large")
}

pub struct TooManyRequests {
    retry_after: u64,
    body: Json<Error>,
}

impl<'r> Responder<'r, 'static> for TooManyRequests {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        Response::build_from(self.body.respond_to(req)?)
            .status(Status::TooManyRequests)
            .raw_header("Retry-After", self.retry_after.to_string())
            .ok()
    }
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> TooManyRequests {
    let retry_after = req
        .local_cache(|| None::<RateLimitRetryAfter>)
        .as_ref()
        .map(|r| r.0)
        .or_else(|| req.rocket().state::<Config>().map(|c| c.rate_limit.window_seconds))
        .unwrap_or(60);

    TooManyRequests {
        retry_after,
        body: error("Too many requests, please try again later"),
    }
}
