use anyhow::Result;
use smiley_platform::{DirectoryLibrary, FsPermissions, LogNotifier, SnapshotCamera};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{Bus, Config};

const BUS_NAME: &str = "org.smileycam.SmileyCam1";
const OBJECT_PATH: &str = "/org/smileycam/SmileyCam1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("smileyd starting");

    let config = Config::from_env();
    tracing::info!(
        library = %config.library_dir.display(),
        captures = %config.capture_dir.display(),
        front = %config.front_snapshot.display(),
        rear = %config.rear_snapshot.display(),
        camera = %config.initial_camera,
        interval_ms = config.detection_interval.as_millis() as u64,
        "configuration loaded"
    );

    let collaborators = engine::Collaborators {
        permissions: Arc::new(FsPermissions::new(
            vec![config.front_snapshot.clone(), config.rear_snapshot.clone()],
            config.library_dir.clone(),
        )),
        camera: Arc::new(SnapshotCamera::new(
            config.front_snapshot.clone(),
            config.rear_snapshot.clone(),
            config.capture_dir.clone(),
        )),
        storage: Arc::new(DirectoryLibrary::new(config.library_dir.clone())),
        notifier: Arc::new(LogNotifier),
    };
    let engine = engine::spawn_engine(
        collaborators,
        config.initial_camera,
        config.detection_interval,
    );

    let builder = match config.bus {
        Bus::Session => zbus::connection::Builder::session()?,
        Bus::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::SmileyService::new(engine))?
        .build()
        .await?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "smileyd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("smileyd shutting down");

    Ok(())
}
