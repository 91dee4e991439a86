//! API routes module

pub mod health;

use axum::Router;

use crate::state::AppState;

/// Account and referral routes; nested under `/api` by `axum_helpers::create_router`
pub fn routes(state: &AppState) -> Router {
    domain_referrals::handlers::router(state.accounts.clone(), state.tokens.clone())
}
