use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    path::Path,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use wave_portal::{
    client,
    config::Args,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

// stdout belongs to the terminal UI, so logs go to a daily file
fn init_tracing(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "wave-portal.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Args::parse().into_config()?;
    init_tracing(&config.log_dir)?;
    tracing::info!(
        "starting wave-portal on {} against {}",
        config.network.url(),
        config.contract
    );
    client::run_app(config).await
}
