use std::collections::BTreeMap;

/// One camera as resolved from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    pub name: String,
    pub source_url: String,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
        }
    }
}

/// Anything that can produce the list of cameras to serve.
pub trait ConfigProvider {
    fn cameras(&self) -> anyhow::Result<Vec<CameraConfig>>;
}

impl ConfigProvider for Vec<CameraConfig> {
    fn cameras(&self) -> anyhow::Result<Vec<CameraConfig>> {
        Ok(self.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("camera configuration unavailable: {0:#}")]
    Unavailable(anyhow::Error),
    #[error("no cameras found in configuration")]
    NoCamerasFound,
    #[error("duplicate camera name {0:?}")]
    DuplicateName(String),
    #[error("invalid camera name {0:?}")]
    InvalidName(String),
    #[error("camera {name:?} has invalid source {url:?}")]
    InvalidSource { name: String, url: String },
}

/// The immutable set of cameras this process serves, keyed by name.
#[derive(Debug)]
pub struct CameraRegistry {
    cameras: BTreeMap<String, CameraConfig>,
}

impl CameraRegistry {
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        let list = provider.cameras().map_err(ConfigError::Unavailable)?;
        if list.is_empty() {
            return Err(ConfigError::NoCamerasFound);
        }

        let mut cameras = BTreeMap::new();
        for camera in list {
            if camera.name.is_empty() || camera.name.contains('/') {
                return Err(ConfigError::InvalidName(camera.name));
            }
            if !is_valid_source(&camera.source_url) {
                return Err(ConfigError::InvalidSource {
                    name: camera.name,
                    url: camera.source_url,
                });
            }
            if cameras.contains_key(&camera.name) {
                return Err(ConfigError::DuplicateName(camera.name));
            }
            cameras.insert(camera.name.clone(), camera);
        }

        Ok(Self { cameras })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Cameras in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.values()
    }
}

// scheme://rest with a non-empty rest and no whitespace
fn is_valid_source(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && !rest.is_empty()
                && !url.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
