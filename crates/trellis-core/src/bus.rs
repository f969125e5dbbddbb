//! Topic-keyed publish/subscribe dispatcher
//!
//! Handlers run synchronously, in subscription order, on the publishing
//! thread. One publish call delivers to all of its handlers before another
//! publish call may start, so publishes from parallel trees interleave only
//! between calls. A failing or panicking handler is recorded as a
//! [`HandlerDiagnostic`] and never reaches the publisher.

use crate::event::Event;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::warn;

/// Error a handler may return
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("I/O error in handler: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error in handler: {0}")]
    Xml(String),

    #[error("{0}")]
    Message(String),
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Message(message)
    }
}

pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Event<'_>) -> HandlerResult + Send + Sync>;

/// Returned by [`EventBus::subscribe`]; pass to [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

/// A handler failure isolated by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDiagnostic {
    pub topic: String,
    pub handle: SubscriptionHandle,
    pub message: String,
}

struct Subscription {
    handle: SubscriptionHandle,
    topic: String,
    handler: Handler,
}

thread_local! {
    /// Buses this thread is currently delivering for, by address
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a bus as dispatching on this thread until dropped
struct DispatchGuard(usize);

impl DispatchGuard {
    fn enter(bus: usize) -> Self {
        DISPATCHING.with(|d| d.borrow_mut().push(bus));
        DispatchGuard(bus)
    }

    fn is_dispatching(bus: usize) -> bool {
        DISPATCHING.with(|d| d.borrow().contains(&bus))
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| {
            let mut buses = d.borrow_mut();
            if let Some(pos) = buses.iter().rposition(|&bus| bus == self.0) {
                buses.remove(pos);
            }
        });
    }
}

/// Event bus
///
/// Construct one per run and share it through an `Arc`; there is no global
/// instance.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_handle: AtomicU64,
    dispatch: Mutex<()>,
    diagnostics: Mutex<Vec<HandlerDiagnostic>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            dispatch: Mutex::new(()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Register `handler` for `topic`
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Event<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                handle,
                topic: topic.into(),
                handler: Arc::new(handler),
            });
        handle
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.handle != handle);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Deliver `event` to every handler subscribed to its topic
    ///
    /// Returns the number of handlers invoked. A publish issued from inside a
    /// handler of this same bus is delivered immediately on the same thread;
    /// a publish to a different bus waits for that bus like any other caller.
    pub fn publish(&self, event: &Event<'_>) -> usize {
        let topic = event.topic();
        let handlers: Vec<(SubscriptionHandle, Handler)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| (s.handle, Arc::clone(&s.handler)))
            .collect();

        if handlers.is_empty() {
            return 0;
        }

        let id = self.id();
        if DispatchGuard::is_dispatching(id) {
            return self.deliver(topic, event, &handlers);
        }

        let _serialized = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = DispatchGuard::enter(id);
        self.deliver(topic, event, &handlers)
    }

    fn id(&self) -> usize {
        self as *const EventBus as usize
    }

    fn deliver(
        &self,
        topic: &str,
        event: &Event<'_>,
        handlers: &[(SubscriptionHandle, Handler)],
    ) -> usize {
        for (handle, handler) in handlers {
            let message = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => match payload.downcast_ref::<&str>() {
                    Some(s) => format!("handler panicked: {}", s),
                    None => match payload.downcast_ref::<String>() {
                        Some(s) => format!("handler panicked: {}", s),
                        None => "handler panicked".to_string(),
                    },
                },
            };
            warn!(topic, ?handle, %message, "event handler failed");
            self.diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(HandlerDiagnostic {
                    topic: topic.to_string(),
                    handle: *handle,
                    message,
                });
        }
        handlers.len()
    }

    /// Handler failures recorded so far
    pub fn diagnostics(&self) -> Vec<HandlerDiagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_diagnostics(&self) -> Vec<HandlerDiagnostic> {
        std::mem::take(
            &mut *self
                .diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
