use crate::engine::{EngineError, EngineHandle};
use crate::surveillance::{ReferenceSource, SurveillanceError};
use std::path::PathBuf;
use watchpost_io::StoreError;
use zbus::interface;

/// D-Bus interface for the Watchpost surveillance daemon.
///
/// Bus name: org.watchpost.Watchpost1
/// Object path: /org/watchpost/Watchpost1
pub struct WatchpostService {
    pub engine: EngineHandle,
}

#[interface(name = "org.watchpost.Watchpost1")]
impl WatchpostService {
    /// Begin surveillance. Returns false if it was already running.
    async fn start(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("start requested");
        self.engine.start().await.map_err(to_fdo)
    }

    /// Stop surveillance at the next iteration boundary.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested");
        self.engine.stop().await.map_err(to_fdo)
    }

    /// Add a known identity. An empty `image_path` captures the current
    /// camera frame; otherwise the file is imported. Returns JSON.
    async fn add_identity(&self, name: &str, image_path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, image_path, "add_identity requested");
        let source = if image_path.is_empty() {
            ReferenceSource::Camera
        } else {
            ReferenceSource::File(PathBuf::from(image_path))
        };
        let enrolled = self
            .engine
            .add_identity(name.to_string(), source)
            .await
            .map_err(to_fdo)?;
        serde_json::to_string(&enrolled).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Remove a known identity by reference-image name.
    async fn remove_identity(&self, name: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "remove_identity requested");
        let path = self
            .engine
            .remove_identity(name.to_string())
            .await
            .map_err(to_fdo)?;
        Ok(path.display().to_string())
    }

    /// Identity names in gallery order, as a JSON array.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let names = self.engine.list_identities().await.map_err(to_fdo)?;
        serde_json::to_string(&names).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        let mut value =
            serde_json::to_value(&status).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        value["version"] = env!("CARGO_PKG_VERSION").into();
        Ok(value.to_string())
    }

    /// Directory holding intruder snapshots.
    async fn intruder_folder(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(status.intruder_dir.display().to_string())
    }
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    tracing::warn!(error = %e, "request failed");
    match e {
        EngineError::Surveillance(SurveillanceError::Store(
            StoreError::EmptyName | StoreError::InvalidName(_),
        )) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        EngineError::Surveillance(SurveillanceError::Store(StoreError::NotFound(_))) => {
            zbus::fdo::Error::FileNotFound(e.to_string())
        }
        _ => zbus::fdo::Error::Failed(e.to_string()),
    }
}
