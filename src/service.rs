use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;

use crate::{
    camera::{Camera, CameraStatus},
    registry::CameraRegistry,
    snapshot::{FrameEncoder, SnapshotError},
};

/// Root object shared by the HTTP handlers: every camera plus the encoder.
pub struct SnapshotService {
    cameras: BTreeMap<String, Arc<Camera>>,
    encoder: Arc<dyn FrameEncoder>,
}

impl SnapshotService {
    pub fn new(registry: &CameraRegistry, encoder: Arc<dyn FrameEncoder>) -> Self {
        let cameras = registry
            .iter()
            .map(|config| (config.name.clone(), Arc::new(Camera::new(config.clone()))))
            .collect();
        Self { cameras, encoder }
    }

    pub fn camera(&self, name: &str) -> Option<&Arc<Camera>> {
        self.cameras.get(name)
    }

    /// Cameras in name order.
    pub fn cameras(&self) -> impl Iterator<Item = &Arc<Camera>> {
        self.cameras.values()
    }

    pub fn content_type(&self) -> &'static str {
        self.encoder.content_type()
    }

    /// Latest snapshot of `name`. Encoding runs on the blocking pool.
    pub async fn get_snapshot(&self, name: &str) -> Result<Bytes, SnapshotError> {
        let camera = self
            .camera(name)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(name.to_string()))?;
        let encoder = self.encoder.clone();

        tokio::task::spawn_blocking(move || camera.snapshot(encoder.as_ref()))
            .await
            .map_err(|e| SnapshotError::Encoding(anyhow::anyhow!("{}: encode task: {}", name, e)))?
    }

    pub fn status(&self) -> Vec<CameraStatus> {
        self.cameras.values().map(|camera| camera.status()).collect()
    }
}
