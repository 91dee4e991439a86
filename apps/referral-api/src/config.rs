use axum_helpers::JwtConfig;
use chrono::Duration;
use core_config::{AppInfo, ConfigError, FromEnv, app_info, env_parse_or, server::ServerConfig};
use database::mongodb::MongoConfig;
use domain_referrals::{AccountSettings, DEFAULT_RESET_TOKEN_TTL_SECS};

pub use core_config::Environment;

/// Referrals stuck in `linking` for longer than this are settled at startup.
const DEFAULT_RECONCILE_GRACE_SECS: i64 = 300;

/// Application configuration, composed from the shared config components
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub accounts: AccountSettings,
    pub reconcile_grace: Duration,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let app = app_info!();
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?;
        let mut mongodb = MongoConfig::from_env()?;
        if mongodb.app_name.is_none() {
            mongodb = mongodb.with_app_name(app.name);
        }
        let jwt = JwtConfig::from_env()?;

        let reset_token_ttl = positive_secs("RESET_TOKEN_TTL_SECS", DEFAULT_RESET_TOKEN_TTL_SECS)?;
        let reconcile_grace =
            non_negative_secs("REFERRAL_RECONCILE_GRACE_SECS", DEFAULT_RECONCILE_GRACE_SECS)?;

        Ok(Self {
            app,
            environment,
            server,
            mongodb,
            jwt,
            accounts: AccountSettings {
                reset_token_ttl: Duration::seconds(reset_token_ttl),
            },
            reconcile_grace: Duration::seconds(reconcile_grace),
        })
    }
}

fn positive_secs(key: &str, default: i64) -> Result<i64, ConfigError> {
    let secs = env_parse_or(key, default)?;
    if secs <= 0 {
        return Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("must be positive (got {secs})"),
        });
    }
    Ok(secs)
}

fn non_negative_secs(key: &str, default: i64) -> Result<i64, ConfigError> {
    let secs = env_parse_or(key, default)?;
    if secs < 0 {
        return Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("must not be negative (got {secs})"),
        });
    }
    Ok(secs)
}
