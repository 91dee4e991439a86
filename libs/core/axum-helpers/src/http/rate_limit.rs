use axum::Router;
use core_config::{ConfigError, FromEnv, env_parse_or};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};

const DEFAULT_MAX_REQUESTS: u32 = 100;
const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

/// How often idle per-IP buckets are dropped.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Per client IP request budget.
///
/// Up to `max_requests` may arrive at once; after that one request is
/// allowed every `window / max_requests`.
///
/// Environment variables:
/// - `RATE_LIMIT_MAX_REQUESTS` (default: 100)
/// - `RATE_LIMIT_WINDOW_SECS` (default: 900)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ParseError {
                key: "RATE_LIMIT_MAX_REQUESTS".to_string(),
                details: "must be positive".to_string(),
            });
        }
        if window / max_requests < Duration::from_millis(1) {
            return Err(ConfigError::ParseError {
                key: "RATE_LIMIT_WINDOW_SECS".to_string(),
                details: format!("too short for {max_requests} requests"),
            });
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn replenish_period(&self) -> Duration {
        self.window / self.max_requests
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

impl FromEnv for RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let max_requests = env_parse_or("RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS)?;
        let window_secs = env_parse_or("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)?;
        Self::new(max_requests, Duration::from_secs(window_secs))
    }
}

/// Limit `router` per peer IP. Requests over budget get `429 Too Many Requests`.
///
/// The peer address comes from `ConnectInfo<SocketAddr>`, so the router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn rate_limit(router: Router, config: &RateLimitConfig) -> Result<Router, ConfigError> {
    let governor = GovernorConfigBuilder::default()
        .period(config.replenish_period())
        .burst_size(config.max_requests)
        .finish()
        .ok_or_else(|| ConfigError::ParseError {
            key: "RATE_LIMIT_MAX_REQUESTS".to_string(),
            details: format!("unusable rate limit {config:?}"),
        })?;

    // Buckets are kept per IP; drop full ones until the limiter itself is gone
    let limiter = Arc::downgrade(governor.limiter());
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(CLEANUP_INTERVAL);
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            limiter.retain_recent();
        }
    });

    tracing::info!(
        max_requests = config.max_requests,
        window_secs = config.window.as_secs(),
        "Rate limiting configured"
    );
    Ok(router.layer(GovernorLayer::new(Arc::new(governor))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
        routing::get,
    };
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn from(ip: &str) -> Request<Body> {
        let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
        let mut request = Request::get("/ping").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_defaults_allow_100_per_15_minutes() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests, 100);
        assert_eq!(config.window, Duration::from_secs(900));
        assert_eq!(config.replenish_period(), Duration::from_secs(9));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("RATE_LIMIT_MAX_REQUESTS", Some("10")),
                ("RATE_LIMIT_WINDOW_SECS", Some("60")),
            ],
            || {
                let config = RateLimitConfig::from_env().unwrap();
                assert_eq!(config.replenish_period(), Duration::from_secs(6));
            },
        );
        temp_env::with_var("RATE_LIMIT_MAX_REQUESTS", Some("0"), || {
            assert!(RateLimitConfig::from_env().is_err());
        });
        temp_env::with_var("RATE_LIMIT_WINDOW_SECS", Some("soon"), || {
            assert!(RateLimitConfig::from_env().is_err());
        });
    }

    #[tokio::test]
    async fn test_budget_is_per_ip() {
        let config = RateLimitConfig::new(2, Duration::from_secs(3600)).unwrap();
        let router = rate_limit(Router::new().route("/ping", get(|| async { "pong" })), &config)
            .unwrap();

        for _ in 0..2 {
            let response = router.clone().oneshot(from("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = router.clone().oneshot(from("10.0.0.1")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = router.oneshot(from("10.0.0.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }
}
