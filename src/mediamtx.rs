//! Camera discovery from a MediaMTX configuration file.
//!
//! The file is maintained by a separate generator. A path entry is a camera
//! when its `source` is `publisher` and its `runOnInit` command pushes to an
//! `rtsp://` URL; that URL is where the snapshot server pulls from.

use std::path::PathBuf;

use anyhow::Context;
use serde_yaml::Value;

use crate::registry::{CameraConfig, ConfigProvider};

pub struct MediaMtxConfig {
    path: PathBuf,
}

impl MediaMtxConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for MediaMtxConfig {
    fn cameras(&self) -> anyhow::Result<Vec<CameraConfig>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        parse_publishers(&text).with_context(|| format!("parse {}", self.path.display()))
    }
}

/// Cameras declared in a MediaMTX YAML document, in file order.
pub fn parse_publishers(text: &str) -> anyhow::Result<Vec<CameraConfig>> {
    let doc: Value = serde_yaml::from_str(text)?;
    let Some(paths) = doc.get("paths").and_then(Value::as_mapping) else {
        return Ok(Vec::new());
    };

    let mut cameras = Vec::new();
    for (name, entry) in paths {
        let Some(name) = name.as_str() else {
            continue;
        };
        if !entry.is_mapping() {
            continue;
        }
        if entry.get("source").and_then(Value::as_str) != Some("publisher") {
            continue;
        }
        let run_on_init = entry
            .get("runOnInit")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match extract_rtsp_url(run_on_init) {
            Some(url) => cameras.push(CameraConfig::new(name, url)),
            None => log::debug!("mediamtx: path {} has no rtsp url in runOnInit", name),
        }
    }
    Ok(cameras)
}

/// First `rtsp://` URL in a shell command line, up to whitespace or a quote.
pub fn extract_rtsp_url(command: &str) -> Option<&str> {
    let start = command.find("rtsp://")?;
    let rest = &command[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '\'' || c == '"')
        .unwrap_or(rest.len());
    Some(&rest[..end]).filter(|url| url.len() > "rtsp://".len())
}
