//! Shared application state handed to the route builders.

use axum_helpers::JwtAuth;
use domain_referrals::{AccountService, MongoReferralRepository, MongoUserRepository};
use mongodb::{Client, Database};

pub type Accounts = AccountService<MongoUserRepository, MongoReferralRepository>;

/// Cheap to clone: the driver client and the service share their pools.
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub mongo_client: Client,
    pub db: Database,
    pub accounts: Accounts,
    pub tokens: JwtAuth,
}

impl AppState {
    pub fn new(config: crate::config::Config, mongo_client: Client) -> Self {
        let db = mongo_client.database(config.mongodb.database());
        let tokens = JwtAuth::new(&config.jwt);
        let accounts = AccountService::new(
            MongoUserRepository::new(&db),
            MongoReferralRepository::new(&db),
            tokens.clone(),
            config.accounts,
        );

        Self {
            config,
            mongo_client,
            db,
            accounts,
            tokens,
        }
    }
}
