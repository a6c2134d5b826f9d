use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

use crate::worker::WorkerSettings;

/// Serves the latest frame of every camera as a JPEG snapshot.
#[derive(Debug, Parser, Clone)]
#[command(name = "snapfeeder", version)]
pub struct SnapConfig {
    /// HTTP port
    #[arg(long, env = "SNAPFEEDER_PORT", default_value_t = 5050)]
    pub port: u16,

    /// Address to listen on
    #[arg(long, env = "SNAPFEEDER_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// MediaMTX configuration the cameras are read from
    #[arg(long, env = "SNAPFEEDER_CONFIG", default_value = "/usr/local/etc/mediamtx.yml")]
    pub config: PathBuf,

    /// ffmpeg binary used for decoding
    #[arg(long, env = "SNAPFEEDER_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// JPEG quality (1-100)
    #[arg(
        long,
        env = "SNAPFEEDER_QUALITY",
        default_value_t = 100,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub quality: u8,

    /// Delay before reconnecting a failed camera, in milliseconds
    #[arg(long, env = "SNAPFEEDER_BACKOFF_MS", default_value_t = 5000)]
    pub backoff_ms: u64,

    /// Grace period for a decoder to exit before it is killed, in milliseconds
    #[arg(long, env = "SNAPFEEDER_SHUTDOWN_TIMEOUT_MS", default_value_t = 2000)]
    pub shutdown_timeout_ms: u64,

    /// Reconnect when no frame arrives for this long, in milliseconds (0 disables)
    #[arg(long, env = "SNAPFEEDER_STALL_TIMEOUT_MS", default_value_t = 15000)]
    pub stall_timeout_ms: u64,

    /// Verbosity level (`error`, `warn`, `info`, `debug`, `trace`)
    #[arg(long, env = "SNAPFEEDER_LOG_LEVEL", default_value_t = log::LevelFilter::Info)]
    pub log_level: log::LevelFilter,
}

impl SnapConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            backoff: Duration::from_millis(self.backoff_ms),
            shutdown_timeout: self.shutdown_timeout(),
            stall_timeout: (self.stall_timeout_ms > 0)
                .then(|| Duration::from_millis(self.stall_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SnapConfig::try_parse_from(["snapfeeder"]).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:5050".parse().unwrap());
        assert_eq!(config.config, PathBuf::from("/usr/local/etc/mediamtx.yml"));
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.quality, 100);
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert_eq!(config.worker_settings(), WorkerSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = SnapConfig::try_parse_from([
            "snapfeeder",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
            "--quality",
            "85",
            "--backoff-ms",
            "250",
            "--stall-timeout-ms",
            "0",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.quality, 85);
        assert_eq!(config.log_level, log::LevelFilter::Debug);

        let settings = config.worker_settings();
        assert_eq!(settings.backoff, Duration::from_millis(250));
        assert_eq!(settings.stall_timeout, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        for args in [
            ["snapfeeder", "--quality", "0"],
            ["snapfeeder", "--quality", "101"],
            ["snapfeeder", "--port", "70000"],
            ["snapfeeder", "--log-level", "loud"],
        ] {
            assert!(SnapConfig::try_parse_from(args).is_err(), "{:?}", args);
        }
    }
}
