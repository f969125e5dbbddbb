//! Project configuration (trellis.toml)

use crate::{ConfigError, ConfigResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use trellis_core::RemoteDescriptor;
use trellis_reporters::{DEFAULT_OUTPUT, REPORTER_NAMES};

/// Default per-test timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cancellation grace period in milliseconds
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Default number of suite trees run in parallel
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Project configuration from trellis.toml
///
/// Every section is optional. Missing values fall back to the defaults
/// returned by the accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TrellisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporters: Option<ReportersConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cobertura: Option<CoberturaConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentConfig>,
}

/// `[run]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bail: Option<bool>,

    /// Only tests whose id matches this regex run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grep: Option<String>,
}

/// `[reporters]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReportersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_color: Option<bool>,
}

/// `[cobertura]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoberturaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// One `[[environments]]` entry. Each entry runs the suites once in a
/// session described by it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub environment_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl EnvironmentConfig {
    /// Descriptor published with `/session/start`
    pub fn descriptor(&self) -> RemoteDescriptor {
        RemoteDescriptor {
            environment_type: self.environment_type.clone(),
            browser_name: self.browser_name.clone(),
            version: self.version.clone(),
            platform: self.platform.clone(),
        }
    }
}

impl TrellisConfig {
    /// Load and validate a config file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: TrellisConfig =
            toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(run) = &self.run {
            if run.timeout_ms == Some(0) {
                return Err(invalid("run.timeout_ms", "must be greater than zero"));
            }
            if run.max_concurrency == Some(0) {
                return Err(invalid("run.max_concurrency", "must be greater than zero"));
            }
            if let Some(grep) = &run.grep {
                Regex::new(grep).map_err(|e| invalid("run.grep", e.to_string()))?;
            }
        }

        if let Some(enabled) = self.reporters.as_ref().and_then(|r| r.enabled.as_ref()) {
            for name in enabled {
                if !REPORTER_NAMES.contains(&name.as_str()) {
                    return Err(invalid(
                        "reporters.enabled",
                        format!(
                            "unknown reporter '{}' (expected one of: {})",
                            name,
                            REPORTER_NAMES.join(", ")
                        ),
                    ));
                }
            }
        }

        for (index, env) in self.environments.iter().enumerate() {
            if env.environment_type.trim().is_empty() {
                return Err(invalid(
                    &format!("environments[{}].environment_type", index),
                    "cannot be empty",
                ));
            }
        }

        Ok(())
    }

    fn run(&self) -> RunConfig {
        self.run.clone().unwrap_or_default()
    }

    fn run_mut(&mut self) -> &mut RunConfig {
        self.run.get_or_insert_with(RunConfig::default)
    }

    fn reporters_mut(&mut self) -> &mut ReportersConfig {
        self.reporters.get_or_insert_with(ReportersConfig::default)
    }

    /// Per-test timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.run().timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Cancellation grace period
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(
            self.run()
                .grace_period_ms
                .unwrap_or(DEFAULT_GRACE_PERIOD_MS),
        )
    }

    pub fn max_concurrency(&self) -> usize {
        self.run().max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn bail(&self) -> bool {
        self.run().bail.unwrap_or(false)
    }

    /// Compiled grep filter, if one is configured
    pub fn grep(&self) -> ConfigResult<Option<Regex>> {
        match self.run.as_ref().and_then(|r| r.grep.as_deref()) {
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|e| invalid("run.grep", e.to_string())),
            None => Ok(None),
        }
    }

    /// Enabled reporter names, `console` when none are configured
    pub fn reporter_names(&self) -> Vec<String> {
        self.reporters
            .as_ref()
            .and_then(|r| r.enabled.clone())
            .unwrap_or_else(|| vec!["console".to_string()])
    }

    pub fn no_color(&self) -> bool {
        self.reporters
            .as_ref()
            .and_then(|r| r.no_color)
            .unwrap_or(false)
    }

    /// Cobertura output path
    pub fn cobertura_output(&self) -> PathBuf {
        self.cobertura
            .as_ref()
            .and_then(|c| c.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
    }

    /// Session descriptors, one per configured environment
    pub fn environments(&self) -> Vec<RemoteDescriptor> {
        self.environments
            .iter()
            .map(EnvironmentConfig::descriptor)
            .collect()
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.run_mut().timeout_ms = Some(timeout_ms);
    }

    pub fn set_max_concurrency(&mut self, max_concurrency: usize) {
        self.run_mut().max_concurrency = Some(max_concurrency);
    }

    pub fn set_bail(&mut self, bail: bool) {
        self.run_mut().bail = Some(bail);
    }

    pub fn set_grep(&mut self, grep: impl Into<String>) {
        self.run_mut().grep = Some(grep.into());
    }

    pub fn set_reporters(&mut self, names: Vec<String>) {
        self.reporters_mut().enabled = Some(names);
    }

    pub fn set_no_color(&mut self, no_color: bool) {
        self.reporters_mut().no_color = Some(no_color);
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_empty_config() {
        let config: TrellisConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.max_concurrency(), 4);
        assert!(!config.bail());
        assert_eq!(config.reporter_names(), vec!["console"]);
        assert_eq!(config.cobertura_output(), PathBuf::from("cobertura-coverage.xml"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[run]
timeout_ms = 2000
grace_period_ms = 100
max_concurrency = 2
bail = true
grep = "login"

[reporters]
enabled = ["console", "teamcity"]
no_color = true

[cobertura]
output = "out/coverage.xml"

[[environments]]
environment_type = "node"

[[environments]]
environment_type = "browser"
browser_name = "chrome"
version = "120"
platform = "linux"
"#;

        let config: TrellisConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert_eq!(config.grace_period(), Duration::from_millis(100));
        assert_eq!(config.max_concurrency(), 2);
        assert!(config.bail());
        assert!(config.grep().unwrap().unwrap().is_match("user login works"));
        assert_eq!(config.reporter_names(), vec!["console", "teamcity"]);
        assert!(config.no_color());
        assert_eq!(config.cobertura_output(), PathBuf::from("out/coverage.xml"));

        let envs = config.environments();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[1].to_string(), "browser chrome 120 linux");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<TrellisConfig, _> = toml::from_str("[run]\ntimeout = 10\n");
        assert!(result.is_err());
    }

    #[rstest]
    #[case("[run]\ntimeout_ms = 0", "run.timeout_ms")]
    #[case("[run]\nmax_concurrency = 0", "run.max_concurrency")]
    #[case("[run]\ngrep = \"(unclosed\"", "run.grep")]
    #[case("[reporters]\nenabled = [\"junit\"]", "reporters.enabled")]
    #[case("[[environments]]\nenvironment_type = \" \"", "environments[0].environment_type")]
    fn test_invalid_values(#[case] toml: &str, #[case] expected_field: &str) {
        let config: TrellisConfig = toml::from_str(toml).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_setters_create_sections() {
        let mut config = TrellisConfig::default();
        config.set_timeout_ms(500);
        config.set_bail(true);
        config.set_grep("^a");
        config.set_reporters(vec!["combined".to_string()]);
        config.set_no_color(true);

        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert!(config.bail());
        assert_eq!(config.reporter_names(), vec!["combined"]);
        assert!(config.no_color());
        assert!(config.validate().is_ok());
    }
}
