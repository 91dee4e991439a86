//! Document store plumbing for the referral service.
//!
//! The service persists users and referrals in MongoDB. This crate owns the
//! connection concerns only: configuration, connecting with retry and health checks.
//! Collections, indexes and queries live with the domain that owns them.
//!
//! # Features
//!
//! - `config` - load [`mongodb::MongoConfig`] through `core_config::FromEnv`
//!
//! # Example
//!
//! ```ignore
//! use database::mongodb::{MongoConfig, connect_from_config_with_retry};
//!
//! let config = MongoConfig::with_database("mongodb://localhost:27017", "referrals");
//! let client = connect_from_config_with_retry(&config, None).await?;
//! let db = client.database(config.database());
//! ```

pub mod common;
pub mod mongodb;

pub use common::{DatabaseError, DatabaseResult};
