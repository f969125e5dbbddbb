//! Reporter capability interface
//!
//! A reporter declares the topics it handles instead of patching shared
//! state; [`ReporterSet`] subscribes it to a bus and drives its lifecycle.

use crate::bus::{EventBus, HandlerResult, SubscriptionHandle};
use crate::event::Event;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Observer that renders events
pub trait Reporter: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Topics this reporter subscribes to
    fn topics(&self) -> &[&'static str];

    fn on_event(&self, event: &Event<'_>) -> HandlerResult;

    /// Called once before the first tree runs
    fn start(&self) -> HandlerResult {
        Ok(())
    }

    /// Called once after every tree finished
    fn stop(&self) -> HandlerResult {
        Ok(())
    }
}

/// Reporters registered on one bus
pub struct ReporterSet {
    bus: Arc<EventBus>,
    entries: Vec<(Arc<dyn Reporter>, Vec<SubscriptionHandle>)>,
}

impl ReporterSet {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            entries: Vec::new(),
        }
    }

    /// Subscribe `reporter` to each topic it declares
    pub fn add(&mut self, reporter: Arc<dyn Reporter>) {
        let handles = reporter
            .topics()
            .iter()
            .map(|topic| {
                let target = Arc::clone(&reporter);
                self.bus
                    .subscribe(*topic, move |event| target.on_event(event))
            })
            .collect();
        debug!(reporter = reporter.name(), "registered reporter");
        self.entries.push((reporter, handles));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start(&self) {
        for (reporter, _) in &self.entries {
            Self::lifecycle(reporter.as_ref(), "start", |r| r.start());
        }
    }

    /// Stop every reporter and remove its subscriptions
    pub fn stop(&mut self) {
        for (reporter, handles) in self.entries.drain(..) {
            for handle in handles {
                self.bus.unsubscribe(handle);
            }
            Self::lifecycle(reporter.as_ref(), "stop", |r| r.stop());
        }
    }

    fn lifecycle(reporter: &dyn Reporter, phase: &str, call: impl Fn(&dyn Reporter) -> HandlerResult) {
        match catch_unwind(AssertUnwindSafe(|| call(reporter))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(reporter = reporter.name(), phase, %err, "reporter failed"),
            Err(_) => warn!(reporter = reporter.name(), phase, "reporter panicked"),
        }
    }
}
