mod auth;
mod config;
mod cron_tasks;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use cron_tasks::{CleanSessionsResult, clean_expired_sessions};

/// Schema management used by the `migrate` binary.
pub mod migrations {
    pub use crate::db::{MigrationStatus, init_pool, migration_status, rollback_migrations, run_migrations};
}

use crate::database::Repository;
use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use crate::service::oauth::{GoogleOAuthClient, OAuthProvider};
use crate::service::pdf::PdfService;
use crate::service::session::SessionService;
use crate::service::transcription::{OpenAiSummarizer, Summarizer};
use okapi::merge::marge_spec_list;
use rocket::data::{ByteUnit, Limits};
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::get_openapi_route;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g.
    //   RUST_LOG=conspect_api::routes=debug
    //   RUST_LOG=info,conspect_api::service::oauth=trace
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    let _ = if json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Delete, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept", "X-Requested-With"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: Option<okapi::openapi3::OpenApi>,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (health_routes, health_openapi) = app_routes::health::routes();
    let (auth_routes, auth_openapi) = app_routes::auth::routes();

    vec![
        RouteSpec {
            path: "/",
            routes: health_routes,
            openapi: Some(health_openapi),
        },
        RouteSpec {
            path: "/auth",
            routes: auth_routes,
            openapi: Some(auth_openapi),
        },
        RouteSpec {
            path: "/audio",
            routes: app_routes::audio::routes(),
            openapi: None,
        },
        RouteSpec {
            path: "/cron",
            routes: app_routes::cron::routes(),
            openapi: None,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, enable_swagger: bool) -> Rocket<Build> {
    let mut openapi_list = Vec::new();
    for spec in collect_route_specs() {
        rocket = rocket.mount(spec.path, spec.routes);
        if let Some(openapi) = spec.openapi {
            openapi_list.push((spec.path.trim_end_matches('/'), openapi));
        }
    }

    if !enable_swagger {
        return rocket;
    }

    match marge_spec_list(&openapi_list) {
        Ok(docs) => {
            let settings = rocket_okapi::settings::OpenApiSettings::default();
            rocket
                .mount("/", vec![get_openapi_route(docs, &settings)])
                .mount(
                    "/docs",
                    make_swagger_ui(&SwaggerUIConfig {
                        url: "/openapi.json".to_string(),
                        ..Default::default()
                    }),
                )
        }
        Err(err) => {
            tracing::error!(error = %err, "could not merge OpenAPI specs, docs disabled");
            rocket
        }
    }
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(&rate_limit_config));
        limiter.clone().spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

/// Periodically deletes expired sessions. An interval of zero disables it.
fn stage_session_sweeper(interval_seconds: u64) -> AdHoc {
    AdHoc::on_liftoff("Session Sweeper", move |rocket| {
        let repository = rocket.state::<Arc<dyn Repository>>().cloned();
        Box::pin(async move {
            let Some(repository) = repository else {
                return;
            };
            if interval_seconds == 0 {
                return;
            }

            let period = std::time::Duration::from_secs(interval_seconds);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    match SessionService::new(repository.sessions()).clean_expired_sessions().await {
                        Ok(deleted) => tracing::debug!(deleted, "session sweep finished"),
                        Err(err) => tracing::warn!(error = ?err, "session sweep failed"),
                    }
                }
            });
        })
    })
}

fn server_figment(config: &Config) -> rocket::figment::Figment {
    let body_limit = ByteUnit::from(config.upload.max_body_size);
    let limits = Limits::default().limit("file", body_limit).limit("data-form", body_limit);

    rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()))
        .merge(("limits", limits))
}

/// Upstreams and storage the server talks to. `repository: None` connects
/// Postgres during ignition.
pub(crate) struct Providers {
    pub repository: Option<Arc<dyn Repository>>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub summarizer: Arc<dyn Summarizer>,
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let http = reqwest::Client::new();
    let providers = Providers {
        repository: None,
        oauth: Arc::new(GoogleOAuthClient::new(config.oauth.google.clone(), http.clone())),
        summarizer: Arc::new(OpenAiSummarizer::new(config.openai.clone(), http)),
    };

    build_rocket_with(config, providers)
}

pub(crate) fn build_rocket_with(config: Config, providers: Providers) -> Rocket<Build> {
    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");

    let mut rocket = rocket::custom(server_figment(&config))
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(cors)
        .attach(RequestLogger)
        .manage(PdfService::new(&config.pdf))
        .manage(providers.oauth)
        .manage(providers.summarizer);

    rocket = match providers.repository {
        Some(repository) => rocket.manage(repository),
        None => rocket.attach(stage_db(config.database.clone())),
    };
    rocket = rocket.attach(stage_session_sweeper(config.session.cleanup_interval_seconds));

    rocket = mount_api_routes(rocket, config.api.enable_swagger);
    rocket
        .register(
            "/",
            catchers![
                app_routes::error::bad_request,
                app_routes::error::unauthorized,
                app_routes::error::not_found,
                app_routes::error::conflict,
                app_routes::error::payload_too_large,
                app_routes::error::too_many_requests
            ],
        )
        .manage(config)
}
