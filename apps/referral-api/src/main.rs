use axum_helpers::server::{create_production_app, create_router, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_referrals::{MongoReferralRepository, MongoUserRepository};
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let mongo_client =
        database::mongodb::connect_from_config_with_retry(&config.mongodb, None).await?;

    let state = AppState::new(config, mongo_client);

    // Uniqueness of email, username and referral code relies on these
    MongoUserRepository::new(&state.db).create_indexes().await?;
    MongoReferralRepository::new(&state.db)
        .create_indexes()
        .await?;

    match state
        .accounts
        .reconcile_referrals(state.config.reconcile_grace)
        .await
    {
        Ok(report) => info!(
            linked = report.linked,
            discarded = report.discarded,
            "Referral reconciliation finished"
        ),
        Err(e) => warn!(error = %e, "Referral reconciliation failed, continuing startup"),
    }

    let router = create_router::<openapi::ApiDoc>(api::routes(&state))?;
    let app = router
        .merge(health_router(state.config.app))
        .merge(api::health::router(state.clone()));

    let mongo_client = state.mongo_client.clone();
    info!("Starting referral API (30s shutdown timeout)");

    create_production_app(
        app,
        &state.config.server,
        Duration::from_secs(30),
        async move {
            info!("Shutting down: closing MongoDB connections");
            mongo_client.shutdown().await;
            info!("MongoDB connections closed");
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {e}"))?;

    info!("Referral API shutdown complete");
    Ok(())
}
