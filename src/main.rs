//! WildWings - HTTP Server Entry Point
//!
//! Loads the config file, sets up logging and serves the control API until
//! interrupted.

use tracing::info;
use wildwings::{api, config::Config, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Held until exit so buffered file output is flushed
    let _logging = logging::init_logging(&config.logfile_path, config.debug)?;
    info!(
        host = %config.host,
        port = config.port,
        cors_origin = %config.cors_origin,
        script = %config.mission.script_path.display(),
        "Loaded configuration"
    );

    api::serve(config).await?;

    Ok(())
}
