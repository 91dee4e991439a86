//! # Axum Helpers
//!
//! Shared HTTP plumbing for the referral service.
//!
//! - **[`auth`]**: HS256 session tokens and the bearer-token middleware
//! - **[`server`]**: router assembly with Swagger UI, health checks, graceful shutdown
//! - **[`http`]**: CORS, security headers and rate limiting
//! - **[`errors`]**: JSON error bodies with stable error codes
//! - **[`extractors`]**: validated JSON bodies
//!
//! ```ignore
//! use axum_helpers::server::{create_production_app, create_router, health_router};
//!
//! let router = create_router::<ApiDoc>(api_routes)?.merge(health_router(app_info!()));
//! create_production_app(router, &config, Duration::from_secs(30), async {}).await?;
//! ```

pub mod auth;
pub mod errors;
pub mod extractors;
pub mod http;
pub mod server;

pub use auth::{JwtAuth, JwtClaims, JwtConfig, TokenError, jwt_auth_middleware};

pub use server::{
    HealthCheckFuture, HealthResponse, ShutdownCoordinator, create_production_app, create_router,
    health_router, run_health_checks, shutdown_signal,
};

pub use http::{RateLimitConfig, create_cors_layer, rate_limit, security_headers};

pub use errors::{AppError, ErrorCode, ErrorResponse};

pub use extractors::ValidatedJson;
