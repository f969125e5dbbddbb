//! Console reporter - grouped PASS/FAIL/SKIP lines

use crate::sink::ConsoleSink;
use std::sync::Arc;
use trellis_core::{topics, Event, HandlerResult, Reporter, SuiteRef, TestRef};

const TOPICS: &[&str] = &[
    topics::SUITE_START,
    topics::SUITE_END,
    topics::TEST_PASS,
    topics::TEST_FAIL,
    topics::TEST_SKIP,
    topics::ERROR,
];

pub struct ConsoleReporter {
    sink: Arc<dyn ConsoleSink>,
}

impl ConsoleReporter {
    pub fn new(sink: Arc<dyn ConsoleSink>) -> Self {
        Self { sink }
    }

    /// The name inside a group, the full id otherwise
    fn label(&self, test: &TestRef<'_>) -> String {
        if self.sink.grouping().is_some() {
            test.name().to_string()
        } else {
            test.id()
        }
    }

    fn suite_end(&self, suite: &SuiteRef<'_>) -> HandlerResult {
        let mut message = format!(
            "{}/{} tests failed",
            suite.num_failed_tests(),
            suite.num_tests()
        );
        let skipped = suite.num_skipped_tests();
        if skipped > 0 {
            message.push_str(&format!(" ({} skipped)", skipped));
        }

        if suite.has_passed() {
            self.sink.info(&message)?;
        } else {
            self.sink.warn(&message)?;
        }
        if let Some(err) = suite.error() {
            self.sink.error(&err.failure().describe())?;
        }

        if let Some(grouping) = self.sink.grouping() {
            grouping.group_end(suite.name())?;
        }
        Ok(())
    }
}

fn millis(test: &TestRef<'_>) -> u128 {
    test.time_elapsed().map(|d| d.as_millis()).unwrap_or(0)
}

impl Reporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    fn topics(&self) -> &[&'static str] {
        TOPICS
    }

    fn on_event(&self, event: &Event<'_>) -> HandlerResult {
        match event {
            Event::SuiteStart(suite) => {
                if let Some(grouping) = self.sink.grouping() {
                    grouping.group(suite.name())?;
                }
            }
            Event::SuiteEnd(suite) => self.suite_end(suite)?,
            Event::TestPass(test) => {
                self.sink
                    .log(&format!("PASS: {} ({}ms)", self.label(test), millis(test)))?;
            }
            Event::TestFail(test) => {
                self.sink
                    .error(&format!("FAIL: {} ({}ms)", self.label(test), millis(test)))?;
                if let Some(failure) = test.error() {
                    self.sink.error(&failure.describe())?;
                }
            }
            Event::TestSkip(test) => {
                let reason = test.skipped().unwrap_or_default();
                self.sink
                    .log(&format!("SKIP: {} ({})", self.label(test), reason))?;
            }
            Event::Error(err) => {
                self.sink.warn("FATAL ERROR")?;
                self.sink.error(&err.describe())?;
            }
            _ => {}
        }
        Ok(())
    }
}
