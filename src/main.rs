use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use devpack::cli::DaemonOpts;
use devpack::config::{self, Settings};
use devpack::server;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    init_logging();

    let config_path = opts
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut settings = Settings::load(&config_path)?;
    settings.apply_cli(&opts);

    info!(
        config = %config_path.display(),
        bind = %settings.bind,
        artifact = %settings.artifact_name,
        "starting devpack daemon"
    );
    if settings.scan_timeout().is_none() {
        warn!("full-disk scan timeout disabled; a stuck scan will never report back");
    }

    let router = server::build_router(&settings)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(async move {
        tokio::select! {
            res = server::serve(&settings.bind, router) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                Ok(())
            }
        }
    })
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devpack=info,devpackd=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
