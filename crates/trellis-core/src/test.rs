//! Test unit - a single executable body with a terminal outcome

use crate::bus::EventBus;
use crate::engine::CancelToken;
use crate::error::{Failure, TestError};
use crate::event::Event;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Type-erased async body shared by tests and hooks
pub(crate) type Body = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<(), TestError>> + Send + Sync>;

pub(crate) fn boxed<F, Fut>(body: F) -> Body
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TestError>> + Send + 'static,
{
    Arc::new(move |ctx| body(ctx).boxed())
}

/// Handle passed to every body and hook invocation
///
/// Calling [`Context::skip`] from a `beforeEach` hook or a test body turns the
/// test into a skip; from a suite `setup` hook it skips every child.
///
/// Bodies reach the run's [`EventBus`] through [`Context::publish`], e.g. to
/// hand in a `/coverage` payload or raise a fatal `/error`.
#[derive(Clone)]
pub struct Context {
    id: String,
    skip: Arc<Mutex<Option<String>>>,
    bus: Arc<EventBus>,
}

impl Context {
    pub(crate) fn new(id: String, bus: Arc<EventBus>) -> Self {
        Self {
            id,
            skip: Arc::new(Mutex::new(None)),
            bus,
        }
    }

    /// Id of the suite or test this invocation belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request that the unit be skipped with `reason`
    pub fn skip(&self, reason: impl Into<String>) {
        *self.skip.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    pub(crate) fn take_skip(&self) -> Option<String> {
        self.skip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Publish on the bus of the running engine; returns the handler count
    pub fn publish(&self, event: &Event<'_>) -> usize {
        self.bus.publish(event)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// Terminal state of a test
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Pending,
    Skipped(String),
    Passed(Duration),
    Failed(Duration, Failure),
}

impl TestOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestOutcome::Pending)
    }
}

/// A single test
pub struct TestUnit {
    pub(crate) name: String,
    pub(crate) body: Body,
    pub(crate) timeout: Option<Duration>,
    pub(crate) skip: Option<String>,
    pub(crate) outcome: TestOutcome,
}

impl TestUnit {
    /// Create a test from an async body
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: boxed(body),
            timeout: None,
            skip: None,
            outcome: TestOutcome::Pending,
        }
    }

    /// Create a test from a synchronous body
    pub fn sync<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Context) -> Result<(), TestError> + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        Self::new(name, move |ctx| {
            let body = Arc::clone(&body);
            async move { body(&ctx) }
        })
    }

    /// Override the engine's default timeout for this test
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the test skipped before it runs
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outcome(&self) -> &TestOutcome {
        &self.outcome
    }

    /// Time spent in the body; absent until the test passed or failed
    pub fn time_elapsed(&self) -> Option<Duration> {
        match &self.outcome {
            TestOutcome::Passed(elapsed) | TestOutcome::Failed(elapsed, _) => Some(*elapsed),
            _ => None,
        }
    }

    /// `None` while pending or skipped
    pub fn has_passed(&self) -> Option<bool> {
        match &self.outcome {
            TestOutcome::Passed(_) => Some(true),
            TestOutcome::Failed(..) => Some(false),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Failure> {
        match &self.outcome {
            TestOutcome::Failed(_, failure) => Some(failure),
            _ => None,
        }
    }

    /// Skip reason once skipped, or the pending skip request before the run
    pub fn skipped_reason(&self) -> Option<&str> {
        match &self.outcome {
            TestOutcome::Skipped(reason) => Some(reason),
            TestOutcome::Pending => self.skip.as_deref(),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("skip", &self.skip)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Invoke a body with panic capture, a time bound and cancellation
///
/// Dropping the body future on timeout or abort releases whatever it held.
pub(crate) async fn invoke(
    body: &Body,
    ctx: Context,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(), TestError> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
        Ok(future) => future,
        Err(payload) => return Err(TestError::Panicked(panic_message(payload.as_ref()))),
    };

    let guarded = AssertUnwindSafe(future).catch_unwind();

    tokio::select! {
        biased;
        _ = cancel.aborted() => Err(TestError::Cancelled),
        result = tokio::time::timeout(timeout, guarded) => match result {
            Err(_) => Err(TestError::Timeout(timeout)),
            Ok(Err(payload)) => Err(TestError::Panicked(panic_message(payload.as_ref()))),
            Ok(Ok(outcome)) => outcome,
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new("suite - test".to_string(), Arc::new(EventBus::new()))
    }

    #[test]
    fn test_context_publishes_on_its_bus() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bus.subscribe("/error", move |event| {
            if let Event::Error(err) = event {
                log.lock().unwrap().push(err.message.clone());
            }
            Ok(())
        });

        let ctx = Context::new("main - t".to_string(), Arc::clone(&bus));
        let err = crate::error::FatalError::new("browser gone");
        assert_eq!(ctx.clone().publish(&Event::Error(&err)), 1);
        assert!(Arc::ptr_eq(ctx.bus(), &bus));
        assert_eq!(*seen.lock().unwrap(), vec!["browser gone"]);
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let body = boxed(|_| async { Ok(()) });
        let result = invoke(&body, ctx(), Duration::from_secs(1), &CancelToken::new()).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_invoke_error() {
        let body = boxed(|_| async { Err(TestError::body("Oops")) });
        let result = invoke(&body, ctx(), Duration::from_secs(1), &CancelToken::new()).await;
        assert_eq!(result, Err(TestError::Body("Oops".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_timeout() {
        let body = boxed(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let result = invoke(&body, ctx(), Duration::from_millis(10), &CancelToken::new()).await;
        assert_eq!(result, Err(TestError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_invoke_panic_in_future() {
        let body = boxed(|_| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let result = invoke(&body, ctx(), Duration::from_secs(1), &CancelToken::new()).await;
        assert_eq!(result, Err(TestError::Panicked("boom".to_string())));
    }

    #[tokio::test]
    async fn test_invoke_aborted() {
        let token = CancelToken::new();
        token.abort();
        let body = boxed(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let result = invoke(&body, ctx(), Duration::from_secs(120), &token).await;
        assert_eq!(result, Err(TestError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_resources() {
        struct Guard(Arc<Mutex<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                *self.0.lock().unwrap() = true;
            }
        }

        let released = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&released);
        let body = boxed(move |_| {
            let guard = Guard(Arc::clone(&flag));
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        });

        let result = invoke(&body, ctx(), Duration::from_millis(5), &CancelToken::new()).await;
        assert!(matches!(result, Err(TestError::Timeout(_))));
        assert!(*released.lock().unwrap());
    }

    #[test]
    fn test_unit_accessors() {
        let unit = TestUnit::sync("t", |_| Ok(())).skipped("not supported");
        assert_eq!(unit.name(), "t");
        assert_eq!(unit.skipped_reason(), Some("not supported"));
        assert_eq!(unit.has_passed(), None);
        assert_eq!(unit.time_elapsed(), None);
        assert!(!unit.is_terminal());
    }

    #[test]
    fn test_context_skip_is_taken_once() {
        let ctx = ctx();
        ctx.skip("no browser");
        assert_eq!(ctx.take_skip().as_deref(), Some("no browser"));
        assert_eq!(ctx.take_skip(), None);
    }
}
