//! Build-time environment configuration.
//!
//! DESIGN
//! ======
//! A [`Mode`] picks a table of hardcoded defaults; each field of the
//! resolved [`EnvConfig`] independently prefers its override variable. There
//! are no error conditions: absent, empty, or unrecognized inputs fall back.
//!
//! The process-wide record is resolved once and never changes afterwards.
//! [`install`] pins an explicitly resolved record at startup; [`env`] falls
//! back to resolving from the process environment on first use.

use std::sync::OnceLock;

use serde::Serialize;
use tracing::{info, warn};

pub const MODE_VAR: &str = "MODE";
pub const API_BASE_URL_VAR: &str = "VITE_API_BASE_URL";
pub const SOCKET_URL_VAR: &str = "VITE_SOCKET_URL";
pub const FILE_BASE_URL_VAR: &str = "VITE_FILE_BASE_URL";

pub const DEV_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEV_SOCKET_URL: &str = "http://localhost:5000";
pub const DEV_FILE_BASE_URL: &str = "http://localhost:5000";

pub const PROD_API_BASE_URL: &str = "https://your-render-app.onrender.com/api";
pub const PROD_SOCKET_URL: &str = "https://your-render-app.onrender.com";
pub const PROD_FILE_BASE_URL: &str = "https://your-render-app.onrender.com";

// =============================================================================
// MODE
// =============================================================================

/// Build mode selecting which defaults apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Parse a raw mode flag. Anything other than `production` is development.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// The `NODE_ENV`-style name of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// OVERRIDES
// =============================================================================

/// Optional per-field overrides. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_base_url: Option<String>,
    pub socket_url: Option<String>,
    pub file_base_url: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup (tests, embedded hosts).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            api_base_url: read(API_BASE_URL_VAR),
            socket_url: read(SOCKET_URL_VAR),
            file_base_url: read(FILE_BASE_URL_VAR),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Fully-populated environment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvConfig {
    #[serde(rename = "API_BASE_URL")]
    pub api_base_url: String,
    #[serde(rename = "SOCKET_URL")]
    pub socket_url: String,
    #[serde(rename = "FILE_BASE_URL")]
    pub file_base_url: String,
    #[serde(rename = "NODE_ENV")]
    pub mode: Mode,
}

impl EnvConfig {
    /// Hardcoded defaults for a mode, with no overrides applied.
    #[must_use]
    pub fn defaults(mode: Mode) -> Self {
        let (api, socket, file) = match mode {
            Mode::Development => (DEV_API_BASE_URL, DEV_SOCKET_URL, DEV_FILE_BASE_URL),
            Mode::Production => (PROD_API_BASE_URL, PROD_SOCKET_URL, PROD_FILE_BASE_URL),
        };
        Self { api_base_url: api.to_owned(), socket_url: socket.to_owned(), file_base_url: file.to_owned(), mode }
    }

    /// Resolve a record for `mode`, letting each present override win for its
    /// own field only. Logs the result in development.
    #[must_use]
    pub fn resolve(mode: Mode, overrides: &EnvOverrides) -> Self {
        let defaults = Self::defaults(mode);
        let config = Self {
            api_base_url: overrides.api_base_url.clone().unwrap_or(defaults.api_base_url),
            socket_url: overrides.socket_url.clone().unwrap_or(defaults.socket_url),
            file_base_url: overrides.file_base_url.clone().unwrap_or(defaults.file_base_url),
            mode,
        };
        if config.is_development() {
            info!(
                api_base_url = %config.api_base_url,
                socket_url = %config.socket_url,
                file_base_url = %config.file_base_url,
                node_env = config.node_env(),
                "environment configuration"
            );
        }
        config
    }

    /// Resolve from `MODE` and the `VITE_*` override variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mode = Mode::parse(std::env::var(MODE_VAR).ok().as_deref());
        Self::resolve(mode, &EnvOverrides::from_env())
    }

    #[must_use]
    pub fn node_env(&self) -> &'static str {
        self.mode.as_str()
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }

    /// Join `path` onto the API base URL.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }

    /// Join `path` onto the file base URL (uploaded attachments, avatars).
    #[must_use]
    pub fn file_url(&self, path: &str) -> String {
        join_url(&self.file_base_url, path)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() { base.to_owned() } else { format!("{base}/{path}") }
}

// =============================================================================
// PROCESS-WIDE RECORD
// =============================================================================

static ENV: OnceLock<EnvConfig> = OnceLock::new();

/// Pin `config` as the process-wide record. If a record was already
/// resolved, the existing one is kept and returned.
pub fn install(config: EnvConfig) -> &'static EnvConfig {
    if let Err(rejected) = ENV.set(config) {
        let current = env();
        if *current != rejected {
            warn!(mode = %current.mode, "environment already resolved; ignoring reinstall");
        }
    }
    env()
}

/// The process-wide record, resolved from the environment on first use.
pub fn env() -> &'static EnvConfig {
    ENV.get_or_init(EnvConfig::from_env)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
