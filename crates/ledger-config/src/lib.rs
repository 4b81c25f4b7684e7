// SPDX-License-Identifier: MIT OR Apache-2.0
//! TOML-backed process configuration: parse, then a separate semantic
//! validation pass returning every violation found at once.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

const MAX_READ_POOL_SIZE: usize = 256;

/// Top-level configuration for the `ledger` binary and its library
/// consumers.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LedgerConfig {
    /// Root directory under which the ledger persists its state
    /// (spec §6.3): `<root>/ledger.db` and `<root>/artifacts/<digest>`.
    pub root: PathBuf,
    /// Size of the Record Store's read-only connection pool. Defaults to
    /// 4 if absent (spec §5's resource-limits note).
    #[serde(default)]
    pub read_pool_size: Option<usize>,
    /// Origin tag stamped on records ingested without an explicit
    /// `--source` override.
    #[serde(default = "default_source")]
    pub default_source: String,
}

fn default_source() -> String {
    "ledger-cli".to_string()
}

impl LedgerConfig {
    /// The Record Store's database file path.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.root.join("ledger.db")
    }

    /// The Blob Store's root directory.
    #[must_use]
    pub fn blob_root(&self) -> PathBuf {
        self.root.join("artifacts")
    }
}

/// Errors found during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `root` was empty or blank.
    MissingRoot,
    /// `read_pool_size` was zero or unreasonably large.
    InvalidReadPoolSize {
        /// The offending value.
        value: usize,
    },
    /// `default_source` was blank.
    BlankDefaultSource,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRoot => write!(f, "root directory must not be empty"),
            ConfigError::InvalidReadPoolSize { value } => {
                write!(f, "invalid read_pool_size: {value} (must be 1..={MAX_READ_POOL_SIZE})")
            }
            ConfigError::BlankDefaultSource => write!(f, "default_source must not be blank"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and parse a TOML configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse as a
/// [`LedgerConfig`].
pub fn load_config(path: &Path) -> anyhow::Result<LedgerConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    let config: LedgerConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))?;
    Ok(config)
}

/// Validate a parsed configuration, returning every semantic error found.
///
/// # Errors
///
/// Returns the non-empty list of violations found; an empty `Ok(())` is
/// returned if the configuration is fully valid.
pub fn validate_config(config: &LedgerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.root.as_os_str().is_empty() {
        errors.push(ConfigError::MissingRoot);
    }

    if let Some(size) = config.read_pool_size {
        if size == 0 || size > MAX_READ_POOL_SIZE {
            errors.push(ConfigError::InvalidReadPoolSize { value: size });
        }
    }

    if config.default_source.trim().is_empty() {
        errors.push(ConfigError::BlankDefaultSource);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LedgerConfig {
        LedgerConfig {
            root: PathBuf::from("/var/lib/ledger"),
            read_pool_size: Some(4),
            default_source: "ledger-cli".to_string(),
        }
    }

    #[test]
    fn valid_config_passes() {
        validate_config(&valid()).unwrap();
    }

    #[test]
    fn empty_root_is_invalid() {
        let mut config = valid();
        config.root = PathBuf::new();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.contains(&ConfigError::MissingRoot));
    }

    #[test]
    fn zero_read_pool_size_is_invalid() {
        let mut config = valid();
        config.read_pool_size = Some(0);
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::InvalidReadPoolSize { value: 0 })));
    }

    #[test]
    fn db_and_blob_paths_derive_from_root() {
        let config = valid();
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/ledger/ledger.db"));
        assert_eq!(config.blob_root(), PathBuf::from("/var/lib/ledger/artifacts"));
    }

    #[test]
    fn load_config_parses_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "root = \"/data/ledger\"\nread_pool_size = 8\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/data/ledger"));
        assert_eq!(config.read_pool_size, Some(8));
        assert_eq!(config.default_source, "ledger-cli");
    }

    #[test]
    fn display_config_errors() {
        assert_eq!(ConfigError::MissingRoot.to_string(), "root directory must not be empty");
        assert!(ConfigError::InvalidReadPoolSize { value: 0 }.to_string().contains("invalid read_pool_size"));
    }
}
