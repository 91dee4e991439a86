//! Bearer-token authentication.
//!
//! - [`JwtAuth`] issues and verifies HS256 session tokens bound to a user id
//! - [`JwtConfig`] loads the signing secret and token lifetime from the environment
//! - [`jwt_auth_middleware`] guards routes and exposes [`JwtClaims`] to handlers
//!
//! ```ignore
//! use axum_helpers::auth::{JwtAuth, JwtConfig, jwt_auth_middleware};
//! use core_config::FromEnv;
//!
//! let auth = JwtAuth::new(&JwtConfig::from_env()?);
//!
//! let protected = Router::new()
//!     .route("/referrals", get(list_referrals))
//!     .route_layer(axum::middleware::from_fn_with_state(auth, jwt_auth_middleware));
//! ```

pub mod config;
pub mod jwt;
pub mod middleware;

pub use config::JwtConfig;
pub use jwt::{JwtAuth, JwtClaims, TokenError};
pub use middleware::{bearer_token, jwt_auth_middleware};
