use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod surveillance;

const BUS_NAME: &str = "org.watchpost.Watchpost1";
const OBJECT_PATH: &str = "/org/watchpost/Watchpost1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("watchpostd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_url,
        threshold = config.match_threshold,
        matcher = ?config.matcher,
        gallery = %config.gallery_dir.display(),
        intruders = %config.intruder_dir.display(),
        "configuration loaded"
    );

    let engine = engine::spawn_engine(move || engine::build_surveillance(&config))
        .await
        .context("failed to initialize surveillance engine")?;

    let service = dbus_interface::WatchpostService {
        engine: engine.clone(),
    };
    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "watchpostd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("watchpostd shutting down");

    if let Err(e) = engine.stop().await {
        tracing::warn!(error = %e, "engine did not acknowledge stop");
    }

    Ok(())
}
