use rocket::get;
use rocket_okapi::{openapi, openapi_get_routes_spec};

/// Liveness check.
#[openapi(tag = "Health")]
#[get("/")]
pub async fn healthcheck() -> &'static str {
    "Healthy"
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    openapi_get_routes_spec![healthcheck]
}
