//! Meta Server - Main entry point.

use anyhow::Result;
use meta_common::config::Config;
use meta_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    config.validate()?;

    tracing::info!("Meta Server v{}", env!("CARGO_PKG_VERSION"));

    meta_server::start_server(&config).await
}
