//! Trellis reporters
//!
//! Observers that render the lifecycle published on a
//! [`trellis_core::EventBus`]:
//! - [`ConsoleReporter`] - grouped PASS/FAIL/SKIP lines
//! - [`TeamCityReporter`] - TeamCity service messages
//! - [`CombinedReporter`] - session and tunnel progress plus failures
//! - [`CoberturaReporter`] - merged coverage written as Cobertura XML

pub mod cobertura;
pub mod combined;
pub mod console;
pub mod sink;
pub mod teamcity;

pub use cobertura::{CoberturaReporter, CoberturaTotals, DEFAULT_OUTPUT};
pub use combined::CombinedReporter;
pub use console::ConsoleReporter;
pub use sink::{ConsoleSink, Grouping, Level, Recorded, RecordingConsole, TerminalConsole};
pub use teamcity::{escape, ServiceMessage, TeamCityReporter};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use trellis_core::{HandlerError, Reporter};

/// Reporter names accepted by [`create`]
pub const REPORTER_NAMES: [&str; 4] = ["console", "teamcity", "combined", "cobertura"];

/// Reporter construction and output errors
#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("Unknown reporter '{0}' (expected one of: console, teamcity, combined, cobertura)")]
    UnknownReporter(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

pub type ReporterResult<T> = Result<T, ReporterError>;

impl From<ReporterError> for HandlerError {
    fn from(err: ReporterError) -> Self {
        match err {
            ReporterError::Xml(err) => HandlerError::Xml(err.to_string()),
            other => HandlerError::Message(other.to_string()),
        }
    }
}

/// Options shared by the reporters built through [`create`]
#[derive(Clone)]
pub struct ReporterOptions {
    pub sink: Arc<dyn ConsoleSink>,
    pub cobertura_output: PathBuf,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            sink: Arc::new(TerminalConsole::new()),
            cobertura_output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// Build a reporter by name
pub fn create(name: &str, options: &ReporterOptions) -> ReporterResult<Arc<dyn Reporter>> {
    let sink = Arc::clone(&options.sink);
    let reporter: Arc<dyn Reporter> = match name {
        "console" => Arc::new(ConsoleReporter::new(sink)),
        "teamcity" => Arc::new(TeamCityReporter::new(sink)),
        "combined" => Arc::new(CombinedReporter::new(sink)),
        "cobertura" => Arc::new(CoberturaReporter::new(&options.cobertura_output)),
        other => return Err(ReporterError::UnknownReporter(other.to_string())),
    };
    Ok(reporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("console")]
    #[case("teamcity")]
    #[case("combined")]
    #[case("cobertura")]
    fn test_create_known_reporters(#[case] name: &str) {
        let options = ReporterOptions {
            sink: Arc::new(RecordingConsole::new()),
            ..Default::default()
        };
        let reporter = create(name, &options).unwrap();
        assert_eq!(reporter.name(), name);
        assert!(!reporter.topics().is_empty());
    }

    #[test]
    fn test_create_unknown_reporter() {
        let err = create("junit", &ReporterOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ReporterError::UnknownReporter(ref name) if name == "junit"));
        assert!(err.to_string().contains("junit"));
    }
}
