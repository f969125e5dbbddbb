//! Command line flags of a harness binary

use clap::Parser;
use std::path::PathBuf;
use trellis_config::TrellisConfig;

/// Run the suites registered in this test binary.
///
/// Flags override trellis.toml and `TRELLIS_*` environment variables.
///
/// EXAMPLES:
///     cargo test --test e2e -- --grep login
///     cargo test --test e2e -- --reporter teamcity --reporter cobertura
///     cargo test --test e2e -- --bail --timeout 5000
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "trellis")]
#[command(version)]
pub struct HarnessArgs {
    /// Path to a config file (defaults to trellis.toml found from the working directory)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Only run tests whose full id matches this regex
    #[arg(long, short = 'g')]
    pub grep: Option<String>,

    /// Reporter to enable (console, teamcity, combined, cobertura); repeatable
    #[arg(long = "reporter", short = 'r')]
    pub reporters: Vec<String>,

    /// Default per-test timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Suite trees run in parallel
    #[arg(long, short = 'j')]
    pub max_concurrency: Option<usize>,

    /// Skip remaining tests after the first failure
    #[arg(long)]
    pub bail: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Log filter used when RUST_LOG is unset (e.g. debug, trellis_core=trace)
    #[arg(long, value_name = "FILTER")]
    pub log: Option<String>,
}

impl HarnessArgs {
    /// Apply flags on top of file and environment configuration
    pub fn apply(&self, config: &mut TrellisConfig) {
        if let Some(grep) = &self.grep {
            config.set_grep(grep.clone());
        }
        if !self.reporters.is_empty() {
            config.set_reporters(self.reporters.clone());
        }
        if let Some(timeout) = self.timeout {
            config.set_timeout_ms(timeout);
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.set_max_concurrency(max_concurrency);
        }
        if self.bail {
            config.set_bail(true);
        }
        if self.no_color {
            config.set_no_color(true);
        }
    }
}
