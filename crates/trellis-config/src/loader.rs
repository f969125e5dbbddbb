//! Configuration Loader
//!
//! Finds trellis.toml and layers environment variable overrides on top.

use crate::project::TrellisConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Project config (trellis.toml in the start directory or an ancestor)
/// 2. Environment variables (`TRELLIS_*`, `NO_COLOR`)
/// 3. CLI flags (handled by the caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides, for embedding and tests
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: TrellisConfig,

    /// Directory where trellis.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not read `TRELLIS_*` variables
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find trellis.toml. A missing file is
    /// not an error: defaults are used and `project_root` is `None`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let project = self.apply_env_overrides(project)?;
        Ok(Config {
            project,
            project_root,
        })
    }

    /// Load configuration from an explicit file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = TrellisConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;
        Ok(Config {
            project,
            project_root: config_path.parent().map(Path::to_path_buf),
        })
    }

    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, TrellisConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                debug!(path = %config_path.display(), "found project config");
                let project = TrellisConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, TrellisConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides, then re-validate
    fn apply_env_overrides(&self, mut config: TrellisConfig) -> ConfigResult<TrellisConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(timeout) = env::var("TRELLIS_TIMEOUT") {
            let timeout_ms = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "TRELLIS_TIMEOUT".to_string(),
                    reason: format!("'{}' is not a number of milliseconds", timeout),
                })?;
            config.set_timeout_ms(timeout_ms);
        }

        if let Ok(bail) = env::var("TRELLIS_BAIL") {
            config.set_bail(is_truthy(&bail));
        }

        if let Ok(grep) = env::var("TRELLIS_GREP") {
            if !grep.is_empty() {
                config.set_grep(grep);
            }
        }

        if let Ok(reporters) = env::var("TRELLIS_REPORTERS") {
            let names: Vec<String> = reporters
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if !names.is_empty() {
                config.set_reporters(names);
            }
        }

        // Any non-empty value disables color, see no-color.org
        if env::var("NO_COLOR").is_ok_and(|v| !v.is_empty()) {
            config.set_no_color(true);
        }

        config.validate()?;
        Ok(config)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Whether a trellis.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[run]\ntimeout_ms = 1500\n");

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.project.timeout(), Duration::from_millis(1500));
        assert!(config.is_project());
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[run]\nbail = true\n");

        let sub_dir = temp_dir.path().join("tests").join("e2e");
        fs::create_dir_all(&sub_dir).unwrap();

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(&sub_dir)
            .unwrap();
        assert!(config.project.bail());
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::new()
            .without_env()
            .load_from_file(&temp_dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            "[run]\ntimeout_ms = 1500\n[reporters]\nenabled = [\"console\"]\n",
        );

        env::set_var("TRELLIS_TIMEOUT", "250");
        env::set_var("TRELLIS_BAIL", "yes");
        env::set_var("TRELLIS_REPORTERS", "teamcity, cobertura");
        env::set_var("NO_COLOR", "1");

        let result = ConfigLoader::new().load_from_directory(temp_dir.path());

        env::remove_var("TRELLIS_TIMEOUT");
        env::remove_var("TRELLIS_BAIL");
        env::remove_var("TRELLIS_REPORTERS");
        env::remove_var("NO_COLOR");

        let config = result.unwrap();
        assert_eq!(config.project.timeout(), Duration::from_millis(250));
        assert!(config.project.bail());
        assert_eq!(config.project.reporter_names(), vec!["teamcity", "cobertura"]);
        assert!(config.project.no_color());
    }

    #[test]
    #[serial]
    fn test_env_override_is_validated() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("TRELLIS_TIMEOUT", "soon");
        let bad_number = ConfigLoader::new().load_from_directory(temp_dir.path());
        env::remove_var("TRELLIS_TIMEOUT");

        env::set_var("TRELLIS_REPORTERS", "junit");
        let bad_reporter = ConfigLoader::new().load_from_directory(temp_dir.path());
        env::remove_var("TRELLIS_REPORTERS");

        assert!(matches!(bad_number, Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(bad_reporter, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("no"));
        assert!(!is_truthy(""));
    }
}
