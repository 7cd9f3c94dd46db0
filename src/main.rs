use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use restaurant_search::{
    config::ClientConfig,
    search::SearchClient,
    server::{self, ServerArgs},
};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    info!(
        "providers configured: places={} business={} menu={}",
        config.places.is_configured(),
        config.business.is_configured(),
        config.menu.is_configured()
    );

    let client = SearchClient::new(config).context("failed to build search client")?;
    let context = client.context().clone();

    let _timers = context.limiter.spawn_reset_timers();
    let cache = context.cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            cache.purge_expired();
        }
    });

    server::serve(Arc::new(client), &args).await
}
