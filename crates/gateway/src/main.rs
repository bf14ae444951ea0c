use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use vestguard_common::AppConfig;
use vestguard_rate_limit::RateLimitService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    // Optional config path; without one the compiled-in limit table applies.
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(config_path = %path, "loading configuration");
            AppConfig::load(&path)?
        }
        None => {
            info!("no config path given, using built-in defaults");
            AppConfig::default()
        }
    };

    info!(
        listen = %config.server.listen,
        categories = config.limits.categories.len(),
        "starting vestguard gateway"
    );

    // One limiter per process; every guarantee it makes is process-local.
    let limiter = RateLimitService::new(config.limits.clone());
    let cleanup = limiter.start_cleanup_task();

    let state = vestguard_api::new_shared_state(config.clone(), limiter);
    let result = vestguard_api::run_server(state, &config.server.listen).await;

    cleanup.stop();
    result
}
