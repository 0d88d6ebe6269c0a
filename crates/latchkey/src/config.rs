//! Latchkey configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! session_dir = "/var/lib/app/sessions"
//!
//! [session]
//! valid_for = 900
//! liminal_time = 30
//! allowed_inactivity = 604800
//!
//! [gc]
//! probability = 1
//! divisor = 100
//!
//! [cookie]
//! same_site = "strict"
//!
//! [client]
//! web_cookie = "app_session"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use latchkey_gc::GcConfig;
use latchkey_session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which [`LockStore`](latchkey_store::LockStore) implementation backs the
/// containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// One directory per container, `flock`-ed files per entry.
    #[default]
    File,
}

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Attributes of the web session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// Where each client kind carries its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cookie name for web clients.
    pub web_cookie: String,

    /// Header name for mobile clients, used in both directions.
    pub mobile_header: String,

    /// Cookie name for remember-me ids.
    pub remember_cookie: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            web_cookie: "latchkey".to_string(),
            mobile_header: "X-Latchkey-Token".to_string(),
            remember_cookie: "latchkey_remember".to_string(),
        }
    }
}

/// Full configuration for a [`Latchkey`](crate::Latchkey) handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatchkeyConfig {
    /// Container for session entries.
    pub session_dir: PathBuf,

    /// Container for remember-me ids.
    pub remember_dir: PathBuf,

    /// Container for rate-limit timestamps.
    pub throttle_dir: PathBuf,

    pub backend: StoreBackend,

    /// `fsync` every overwrite.
    pub sync_writes: bool,

    pub session: SessionConfig,
    pub gc: GcConfig,
    pub cookie: CookieConfig,
    pub client: ClientConfig,

    /// How long a remember-me id stays redeemable, in seconds.
    /// Default: 30 days.
    pub remember_for: u64,
}

impl Default for LatchkeyConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("var/latchkey/sessions"),
            remember_dir: PathBuf::from("var/latchkey/remember"),
            throttle_dir: PathBuf::from("var/latchkey/throttle"),
            backend: StoreBackend::File,
            sync_writes: false,
            session: SessionConfig::default(),
            gc: GcConfig::default(),
            cookie: CookieConfig::default(),
            client: ClientConfig::default(),
            remember_for: 30 * 24 * 60 * 60,
        }
    }
}

impl LatchkeyConfig {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::ReadFile {
                path: path.display().to_string(),
                source,
            }
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Points all three containers under one root directory.
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.session_dir = root.join("sessions");
        self.remember_dir = root.join("remember");
        self.throttle_dir = root.join("throttle");
        self
    }
}
