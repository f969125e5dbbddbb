//! TeamCity service-message reporter
//!
//! Emits `##teamcity[...]` lines that TeamCity parses from build output. The
//! root suite of a remote session only wraps the session and is not reported.

use crate::sink::ConsoleSink;
use std::fmt;
use std::sync::Arc;
use trellis_core::{topics, Event, HandlerResult, Reporter, SuiteRef};

const TOPICS: &[&str] = &[
    topics::SUITE_START,
    topics::SUITE_END,
    topics::TEST_START,
    topics::TEST_SKIP,
    topics::TEST_END,
    topics::TEST_FAIL,
];

/// Escape a value for use inside a service message attribute
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            c if u32::from(c) > 0xFF => out.push_str(&format!("|0x{:x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

/// A single `##teamcity[name key='value' ...]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMessage {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
}

impl ServiceMessage {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }
}

impl fmt::Display for ServiceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "##teamcity[{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {}='{}'", key, escape(value))?;
        }
        f.write_str("]")
    }
}

pub struct TeamCityReporter {
    sink: Arc<dyn ConsoleSink>,
}

impl TeamCityReporter {
    pub fn new(sink: Arc<dyn ConsoleSink>) -> Self {
        Self { sink }
    }

    fn emit(&self, message: ServiceMessage) -> HandlerResult {
        self.sink.log(&message.to_string())?;
        Ok(())
    }
}

fn is_session_wrapper(suite: &SuiteRef<'_>) -> bool {
    suite.is_root() && suite.environment().is_some()
}

fn millis(elapsed: Option<std::time::Duration>) -> String {
    elapsed.map(|d| d.as_millis()).unwrap_or(0).to_string()
}

impl Reporter for TeamCityReporter {
    fn name(&self) -> &str {
        "teamcity"
    }

    fn topics(&self) -> &[&'static str] {
        TOPICS
    }

    fn on_event(&self, event: &Event<'_>) -> HandlerResult {
        match event {
            Event::SuiteStart(suite) if !is_session_wrapper(suite) => {
                self.emit(ServiceMessage::new("testSuiteStarted").attr("name", suite.id()))
            }
            Event::SuiteEnd(suite) if !is_session_wrapper(suite) => self.emit(
                ServiceMessage::new("testSuiteFinished")
                    .attr("name", suite.id())
                    .attr("duration", millis(suite.time_elapsed())),
            ),
            Event::TestStart(test) => {
                self.emit(ServiceMessage::new("testStarted").attr("name", test.id()))
            }
            Event::TestSkip(test) => self.emit(
                ServiceMessage::new("testIgnored")
                    .attr("name", test.id())
                    .attr("message", test.skipped().unwrap_or_default()),
            ),
            Event::TestEnd(test) => self.emit(
                ServiceMessage::new("testFinished")
                    .attr("name", test.id())
                    .attr("duration", millis(test.time_elapsed())),
            ),
            Event::TestFail(test) => {
                let mut message = ServiceMessage::new("testFailed").attr("name", test.id());
                if let Some(failure) = test.error() {
                    message = message.attr("message", failure.message.clone());
                    if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
                        message = message
                            .attr("type", "comparisonFailure")
                            .attr("expected", expected.clone())
                            .attr("actual", actual.clone());
                    }
                    message = message.attr("details", failure.describe());
                }
                self.emit(message)
            }
            _ => Ok(()),
        }
    }
}
