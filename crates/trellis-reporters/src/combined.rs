//! Combined reporter - session and tunnel progress plus failures
//!
//! Quiet about passing tests; meant for runs that span several remote
//! sessions where per-test output would interleave.

use crate::sink::ConsoleSink;
use std::sync::Arc;
use trellis_core::{topics, Event, HandlerResult, Reporter};

const TOPICS: &[&str] = &[
    topics::SESSION_START,
    topics::TUNNEL_START,
    topics::TUNNEL_DOWNLOAD_PROGRESS,
    topics::TUNNEL_STATUS,
    topics::ERROR,
    topics::TEST_FAIL,
];

pub struct CombinedReporter {
    sink: Arc<dyn ConsoleSink>,
}

impl CombinedReporter {
    pub fn new(sink: Arc<dyn ConsoleSink>) -> Self {
        Self { sink }
    }
}

impl Reporter for CombinedReporter {
    fn name(&self) -> &str {
        "combined"
    }

    fn topics(&self) -> &[&'static str] {
        TOPICS
    }

    fn start(&self) -> HandlerResult {
        self.sink.log("Running client tests…")?;
        Ok(())
    }

    fn on_event(&self, event: &Event<'_>) -> HandlerResult {
        match event {
            Event::SessionStart(remote) => {
                self.sink
                    .log(&format!("Testing {}", remote.environment_type))?;
            }
            Event::TunnelStart(_) => self.sink.log("Starting tunnel")?,
            Event::TunnelDownloadProgress { progress, .. } => {
                self.sink
                    .log(&format!("Download {}% complete", progress.percent()))?;
            }
            Event::TunnelStatus { status, .. } => {
                self.sink.log(&format!("Tunnel: {}", status))?;
            }
            Event::Error(err) => self.sink.error(&err.describe())?,
            Event::TestFail(test) => {
                let elapsed = test.time_elapsed().map(|d| d.as_millis()).unwrap_or(0);
                self.sink
                    .error(&format!("FAIL: {} ({}ms)", test.id(), elapsed))?;
                if let Some(failure) = test.error() {
                    self.sink.error(&failure.describe())?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
