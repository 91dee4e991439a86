//! HTTP-level middleware: CORS, security headers and per-IP rate limiting.
//!
//! ```ignore
//! use axum_helpers::http::{create_cors_layer, security_headers};
//!
//! let app = Router::new()
//!     .layer(axum::middleware::from_fn(security_headers))
//!     .layer(create_cors_layer(vec![origin]));
//! ```

pub mod cors;
pub mod rate_limit;
pub mod security;

pub use cors::create_cors_layer;
pub use rate_limit::{RateLimitConfig, rate_limit};
pub use security::security_headers;
