use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timings: Timings,
}

/// Upper bound applied to every configured delay (one day).
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

fn delay(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Delays driving the simulated link, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// From `connect` to the first "Probing…" line.
    pub connect_delay_ms: u64,
    /// "Probing…" to "Handshake…".
    pub handshake_delay_ms: u64,
    /// "Handshake…" to "Elevating…".
    pub elevate_delay_ms: u64,
    /// "Elevating…" to the banner.
    pub establish_delay_ms: u64,
    pub intrusion_limit_ms: u64,
    pub tick_ms: u64,
    pub scan_delay_ms: u64,
    /// How long an unmapped address takes to report as offline.
    pub probe_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            connect_delay_ms: 2200,
            handshake_delay_ms: 700,
            elevate_delay_ms: 700,
            establish_delay_ms: 400,
            intrusion_limit_ms: 90_000,
            tick_ms: 1000,
            scan_delay_ms: 300,
            probe_timeout_ms: 1100,
        }
    }
}

impl Timings {
    pub fn connect_delay(&self) -> Duration {
        delay(self.connect_delay_ms)
    }

    pub fn handshake_delay(&self) -> Duration {
        delay(self.handshake_delay_ms)
    }

    pub fn elevate_delay(&self) -> Duration {
        delay(self.elevate_delay_ms)
    }

    pub fn establish_delay(&self) -> Duration {
        delay(self.establish_delay_ms)
    }

    pub fn intrusion_limit(&self) -> Duration {
        delay(self.intrusion_limit_ms)
    }

    // A zero tick would spin the countdown forever at one instant.
    pub fn tick(&self) -> Duration {
        delay(self.tick_ms.max(1))
    }

    pub fn scan_delay(&self) -> Duration {
        delay(self.scan_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        delay(self.probe_timeout_ms)
    }

    /// Time from `connect` until the link is up.
    pub fn handshake_total(&self) -> Duration {
        self.connect_delay() + self.handshake_delay() + self.elevate_delay() + self.establish_delay()
    }
}

impl Config {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }
}
