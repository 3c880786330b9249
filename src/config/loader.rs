//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (compiled into binary)
//! 2. System config: `/etc/dockbridge/config.toml`
//! 3. User config: `~/.config/dockbridge/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! Scalars set by a later layer override earlier ones.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::{Config, Settings};
use crate::cli::Cli;

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/dockbridge/config.toml";

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "dockbridge";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Configuration loader with support for hierarchy merging.
pub struct ConfigLoader {
    /// Path to system-wide configuration.
    system_path: PathBuf,
    /// Path to user configuration.
    user_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with default paths.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with custom paths (for testing).
    #[must_use]
    pub fn with_paths(system_path: PathBuf, user_path: PathBuf) -> Self {
        Self {
            system_path,
            user_path,
        }
    }

    /// Load and merge configuration from all sources.
    ///
    /// Missing system and user files are skipped. A missing `--config` file
    /// and invalid TOML anywhere are errors.
    pub fn load(&self, cli: &Cli) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        debug!("Loaded embedded default configuration");

        if let Some(system_config) = self.load_file(&self.system_path)? {
            config.merge(system_config);
            debug!("Loaded system config from {:?}", self.system_path);
        } else {
            debug!("No system config found at {:?}", self.system_path);
        }

        if let Some(user_config) = self.load_file(&self.user_path)? {
            config.merge(user_config);
            debug!("Loaded user config from {:?}", self.user_path);
        } else {
            debug!("No user config found at {:?}", self.user_path);
        }

        if let Some(ref cli_config_path) = cli.config {
            match self.load_file(cli_config_path)? {
                Some(cli_config) => {
                    config.merge(cli_config);
                    debug!("Loaded additional config from {:?}", cli_config_path);
                }
                None => {
                    // Unlike system/user config, a missing CLI-specified config is an error
                    return Err(ConfigError::ReadError {
                        path: cli_config_path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        config.merge(Config::from_cli(cli));

        Ok(config)
    }

    /// Load, merge and validate.
    pub fn load_settings(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        self.load(cli)?.resolve()
    }

    /// Path of the user config file.
    pub fn user_path(&self) -> &Path {
        &self.user_path
    }

    /// Load a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<Config>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn missing_paths(dir: &Path) -> ConfigLoader {
        ConfigLoader::with_paths(dir.join("system.toml"), dir.join("user.toml"))
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempdir().unwrap();
        let loader = missing_paths(dir.path());

        let config = loader.load(&Cli::default()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_user_overrides_system() {
        let dir = tempdir().unwrap();
        let loader = missing_paths(dir.path());
        fs::write(
            dir.path().join("system.toml"),
            "[upstream]\nhost = \"10.0.0.1\"\nport = 2376\n",
        )
        .unwrap();
        fs::write(dir.path().join("user.toml"), "[upstream]\nhost = \"10.0.0.2\"\n").unwrap();

        let settings = loader.load_settings(&Cli::default()).unwrap();
        assert_eq!(settings.upstream.host, "10.0.0.2");
        assert_eq!(settings.upstream.port, 2376);
    }

    #[test]
    fn test_missing_cli_config_is_error() {
        let dir = tempdir().unwrap();
        let loader = missing_paths(dir.path());
        let cli = Cli {
            config: Some(dir.path().join("nope.toml")),
            ..Default::default()
        };

        let err = loader.load(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let loader = missing_paths(dir.path());
        fs::write(dir.path().join("user.toml"), "[upstream\nhost = ").unwrap();

        let err = loader.load(&Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_user_path_accessor() {
        let dir = tempdir().unwrap();
        let loader = missing_paths(dir.path());
        assert_eq!(loader.user_path(), dir.path().join("user.toml"));
    }
}
