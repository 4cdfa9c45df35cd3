use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;

/// Sliding-window limiter keyed by client IP: a client may make at most
/// `requests` requests within any `window`.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit: u32,
    window: Duration,
    cleanup_interval: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitDecision {
    Allow,
    Limited { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.requests,
            window: Duration::from_secs(config.window_seconds.max(1)),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let cleanup_interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                self.prune(Instant::now()).await;
            }
        });
    }

    async fn prune(&self, now: Instant) {
        let mut hits = self.hits.lock().await;
        for timestamps in hits.values_mut() {
            drop_outside_window(timestamps, now, self.window);
        }
        hits.retain(|_, timestamps| !timestamps.is_empty());
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut hits = self.hits.lock().await;
        let timestamps = hits.entry(key.to_string()).or_default();
        drop_outside_window(timestamps, now, self.window);

        if timestamps.len() >= self.limit as usize {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return RateLimitDecision::Limited { retry_after };
        }

        timestamps.push_back(now);
        RateLimitDecision::Allow
    }

    async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }
}

fn drop_outside_window(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps.front().is_some_and(|t| now.duration_since(*t) >= window) {
        timestamps.pop_front();
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimit;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TooManyRequests;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = TooManyRequests;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let limiter = match request.rocket().state::<Arc<RateLimiter>>() {
            Some(limiter) => limiter,
            None => return Outcome::Success(RateLimit),
        };

        let request_id = request
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let ip = match request.client_ip() {
            Some(ip) => ip.to_string(),
            None => {
                warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting");
                "missing-ip".to_string()
            }
        };

        match limiter.check(&ip).await {
            RateLimitDecision::Allow => Outcome::Success(RateLimit),
            RateLimitDecision::Limited { retry_after } => {
                let retry_after_secs = retry_after.as_secs().max(1);
                request.local_cache(|| Some(RateLimitRetryAfter(retry_after_secs)));
                warn!(
                    request_id = %request_id,
                    client_ip = %ip,
                    method = %request.method(),
                    uri = %request.uri(),
                    retry_after_secs,
                    "rate limit exceeded"
                );
                Outcome::Error((Status::TooManyRequests, TooManyRequests))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        responses.responses.insert(
            "429".to_string(),
            RefOr::Object(OpenApiResponse {
                description: "Too Many Requests".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}
