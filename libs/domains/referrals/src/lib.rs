//! Referrals Domain
//!
//! User accounts with referral codes: registration, login, password reset,
//! and per-user referral listings and stats.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │     Handlers     │  ← HTTP endpoints + OpenAPI
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  AccountService  │  ← Workflows, validation, session tokens
//! └───┬──────────┬───┘
//!     │          │
//! ┌───▼─────┐ ┌──▼─────────────┐
//! │Credential│ │ ReferralLedger │  ← Hashing, reset tokens / paired writes, stats
//! │  Store   │ └──┬─────────────┘
//! └───┬─────┘    │
//! ┌───▼──────────▼───┐
//! │   Repositories   │  ← Traits + in-memory + MongoDB
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum_helpers::{JwtAuth, JwtConfig};
//! use domain_referrals::{
//!     AccountService, AccountSettings, InMemoryReferralRepository, InMemoryUserRepository,
//!     handlers,
//! };
//!
//! let tokens = JwtAuth::new(&JwtConfig::new("a-secret-of-at-least-thirty-two-chars").unwrap());
//! let service = AccountService::new(
//!     InMemoryUserRepository::new(),
//!     InMemoryReferralRepository::new(),
//!     tokens.clone(),
//!     AccountSettings::default(),
//! );
//!
//! let router = handlers::router(service, tokens);
//! ```

pub mod credentials;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod mongo;
pub mod password;
pub mod repository;
pub mod service;
pub mod validation;

pub use credentials::CredentialStore;
pub use error::{AccountError, AccountResult, DuplicateField};
pub use handlers::ApiDoc;
pub use ledger::{ReconcileReport, ReferralLedger};
pub use models::{
    AuthResponse, ForgotPasswordRequest, ForgotPasswordResponse, LinkState, LoginRequest,
    MessageResponse, Referral, ReferralEntry, ReferralStats, ReferralStatus, RegisterRequest,
    ResetPasswordRequest, User, UserSummary,
};
pub use mongo::{MongoReferralRepository, MongoUserRepository};
pub use repository::{
    InMemoryReferralRepository, InMemoryUserRepository, ReferralRepository, UserRepository,
};
pub use service::{AccountService, AccountSettings, DEFAULT_RESET_TOKEN_TTL_SECS};
pub use validation::FieldError;
