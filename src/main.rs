use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use twtxt_cache::config::Config;
use twtxt_cache::fetcher::start_background_refresh;
use twtxt_cache::version::full_version;
use twtxt_cache::{Cache, Fetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twtxt_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TWTXT_CONFIG").ok())
        .unwrap_or_else(|| "twtxt.toml".to_string());
    let config = Config::load(&config_path)?;
    let sources = config.sources();
    info!(
        "twtxt-cache v{} following {} feeds ({})",
        full_version(),
        sources.len(),
        config_path
    );

    tokio::fs::create_dir_all(&config.data).await?;
    let cache = Arc::new(Cache::load(&config.data).await?);
    let fetcher = Arc::new(Fetcher::with_options(cache, config.fetcher_options())?);

    let refresh = tokio::spawn(start_background_refresh(
        fetcher.clone(),
        sources,
        config.data.clone(),
        config.refresh_interval,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    refresh.abort();
    fetcher.cache().store(&config.data).await?;

    Ok(())
}
