//! Configuration module.
//!
//! Handles loading, validating, and layering `webpbin.toml`. Configuration
//! is resolved in three layers, each overriding the previous one:
//!
//! ```text
//! stock defaults  →  ./webpbin.toml  →  WEBPBIN_* environment variables
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [provision]
//! version = "1.2.0"         # libwebp release to download
//! skip_download = false     # never download; use dest/ or the system PATH
//! dest = "vendor/webp"      # where archives are unpacked
//! base_url = "https://storage.googleapis.com/downloads.webmproject.org/releases/webp/"
//! path_fallback = true      # unmapped platforms use the system PATH
//! detect_unsupported = true # ARM / Alpine hosts skip the download
//!
//! [encode]
//! quality = 75              # default cwebp -q for the CLI
//!
//! [processing]
//! max_processes = 4         # Max parallel encodes (omit for auto = CPU cores)
//! ```
//!
//! ## Environment
//!
//! | Variable | Overrides |
//! |---|---|
//! | `WEBPBIN_SKIP_DOWNLOAD` | `provision.skip_download` (`1/0`, `true/false`, `yes/no`, `on/off`) |
//! | `WEBPBIN_DEST` | `provision.dest` |
//! | `WEBPBIN_VERSION` | `provision.version` |
//!
//! Unknown keys are rejected to catch typos early.

use crate::release::{DEFAULT_BASE_URL, DEFAULT_VERSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in a directory.
pub const CONFIG_FILENAME: &str = "webpbin.toml";

pub const ENV_SKIP_DOWNLOAD: &str = "WEBPBIN_SKIP_DOWNLOAD";
pub const ENV_DEST: &str = "WEBPBIN_DEST";
pub const ENV_VERSION: &str = "WEBPBIN_VERSION";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `webpbin.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the cwebp/dwebp binaries come from.
    pub provision: ProvisionConfig,
    /// Encoder defaults for the command-line front end.
    pub encode: EncodeConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provision.version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provision.version must not be empty".into(),
            ));
        }
        if self.provision.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provision.base_url must not be empty".into(),
            ));
        }
        if self.encode.quality > 100 {
            return Err(ConfigError::Validation(
                "encode.quality must be 0-100".into(),
            ));
        }
        Ok(())
    }

    /// Apply `WEBPBIN_*` overrides read through `lookup`.
    ///
    /// Taking a lookup function instead of reading `std::env` directly keeps
    /// this testable without mutating the process environment.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SKIP_DOWNLOAD) {
            self.provision.skip_download = parse_bool(ENV_SKIP_DOWNLOAD, &raw)?;
        }
        if let Some(dest) = lookup(ENV_DEST) {
            self.provision.dest = PathBuf::from(dest);
        }
        if let Some(version) = lookup(ENV_VERSION) {
            self.provision.version = version.trim().to_string();
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Validation(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

/// Binary provisioning settings.
///
/// Immutable once handed to a [`Provisioner`](crate::provision::Provisioner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// libwebp release to install.
    pub version: String,
    /// Never download. Binaries are taken from `dest` when present there,
    /// otherwise from the system `PATH`.
    pub skip_download: bool,
    /// Directory archives are unpacked into.
    pub dest: PathBuf,
    /// Base URL of the release bucket.
    pub base_url: String,
    /// When the release table has no archive for the host, use the system
    /// `PATH` instead of failing.
    pub path_fallback: bool,
    /// Treat hosts without working prebuilt binaries (ARM, Alpine) as
    /// `skip_download`.
    pub detect_unsupported: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            skip_download: false,
            dest: PathBuf::from("vendor/webp"),
            base_url: DEFAULT_BASE_URL.to_string(),
            path_fallback: true,
            detect_unsupported: true,
        }
    }
}

/// Encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeConfig {
    /// cwebp `-q` (0 = smallest, 100 = best).
    pub quality: u32,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self { quality: 75 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of concurrent cwebp processes.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(Config::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `webpbin.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `webpbin.toml` in the given directory.
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    resolve_config(load_raw_config(dir)?)
}

/// Load config from `dir`, then apply the process environment.
pub fn load_config_with_env(dir: &Path) -> Result<Config, ConfigError> {
    load_config(dir)?.apply_env(|name| std::env::var(name).ok())
}

/// Returns a fully-commented stock `webpbin.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webpbin Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables override this file:
#   WEBPBIN_SKIP_DOWNLOAD  -> provision.skip_download
#   WEBPBIN_DEST           -> provision.dest
#   WEBPBIN_VERSION        -> provision.version
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Binary provisioning
# ---------------------------------------------------------------------------
[provision]
# libwebp release to download.
version = "1.2.0"

# Never download. cwebp/dwebp are taken from `dest` when present there,
# otherwise from the system PATH.
skip_download = false

# Directory the release archive is unpacked into.
dest = "vendor/webp"

# Release bucket.
base_url = "https://storage.googleapis.com/downloads.webmproject.org/releases/webp/"

# Hosts without a prebuilt archive use the system PATH instead of failing.
path_fallback = true

# ARM and Alpine Linux hosts cannot run the prebuilt binaries and skip the
# download automatically.
detect_unsupported = true

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encode]
# cwebp compression factor (0 = smallest file, 100 = best quality).
quality = 75

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum concurrent cwebp processes when encoding several files.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
