//! Client configuration.
//!
//! Loaded from a KDL file, then overridden by environment variables:
//!
//! ```kdl
//! endpoint "https://notes.example/api"
//! sync {
//!     quiet-period-ms 1500
//!     poll-interval-ms 30000
//!     untitled "Untitled"
//! }
//! ```
//!
//! | Variable                 | Overrides                 |
//! |--------------------------|---------------------------|
//! | `FOLIO_ENDPOINT`         | `endpoint`                |
//! | `FOLIO_QUIET_PERIOD_MS`  | `sync.quiet-period-ms`    |
//! | `FOLIO_POLL_INTERVAL_MS` | `sync.poll-interval-ms`   |
//! | `FOLIO_UNTITLED`         | `sync.untitled`           |

use std::path::Path;
use std::time::Duration;

use kdl::{KdlDocument, KdlNode};
use smol_str::SmolStr;
use url::Url;

use crate::error::ConfigError;

/// Timing and defaults for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period after the last edit before an automatic save.
    pub quiet_period: Duration,
    /// How often the open document is refetched.
    pub poll_interval: Duration,
    /// Title written when the draft title is blank.
    pub untitled_title: SmolStr,
}

impl SyncSettings {
    pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1500);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_UNTITLED: &'static str = "Untitled";
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            quiet_period: Self::DEFAULT_QUIET_PERIOD,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            untitled_title: SmolStr::new_static(Self::DEFAULT_UNTITLED),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the document service.
    pub endpoint: Url,
    pub sync: SyncSettings,
}

impl Config {
    pub const DEFAULT_ENDPOINT: &'static str = "http://127.0.0.1:8080/api";

    /// Load from `path` if it exists, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let doc: KdlDocument = content.parse().map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_kdl(&doc)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_kdl(doc: &KdlDocument) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(endpoint) = string_arg(doc.get("endpoint")) {
            config.endpoint = parse_endpoint(endpoint)?;
        }

        if let Some(sync) = doc.get("sync").and_then(KdlNode::children) {
            if let Some(ms) = int_arg(sync.get("quiet-period-ms"), "sync.quiet-period-ms")? {
                config.sync.quiet_period = Duration::from_millis(ms);
            }
            if let Some(ms) = int_arg(sync.get("poll-interval-ms"), "sync.poll-interval-ms")? {
                config.sync.poll_interval = Duration::from_millis(ms);
            }
            if let Some(untitled) = string_arg(sync.get("untitled")) {
                config.sync.untitled_title = untitled.into();
            }
        }

        Ok(config)
    }

    /// Apply `FOLIO_*` overrides from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup("FOLIO_ENDPOINT") {
            self.endpoint = parse_endpoint(&endpoint)?;
        }
        if let Some(ms) = lookup("FOLIO_QUIET_PERIOD_MS") {
            self.sync.quiet_period = Duration::from_millis(parse_ms("FOLIO_QUIET_PERIOD_MS", &ms)?);
        }
        if let Some(ms) = lookup("FOLIO_POLL_INTERVAL_MS") {
            self.sync.poll_interval =
                Duration::from_millis(parse_ms("FOLIO_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(untitled) = lookup("FOLIO_UNTITLED") {
            self.sync.untitled_title = untitled.into();
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(Self::DEFAULT_ENDPOINT).expect("default endpoint is a valid url"),
            sync: SyncSettings::default(),
        }
    }
}

fn parse_endpoint(url: &str) -> Result<Url, ConfigError> {
    Url::parse(url).map_err(|e| ConfigError::UrlParse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn parse_ms(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("expected milliseconds, got {value:?}"),
    })
}

fn string_arg(node: Option<&KdlNode>) -> Option<&str> {
    node?.entries().first()?.value().as_string()
}

fn int_arg(node: Option<&KdlNode>, key: &str) -> Result<Option<u64>, ConfigError> {
    let Some(value) = node.and_then(|n| n.entries().first()).map(|e| e.value()) else {
        return Ok(None);
    };
    value
        .as_i64()
        .and_then(|v| u64::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got {value}"),
        })
}
