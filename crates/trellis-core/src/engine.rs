//! Execution engine
//!
//! Drives one suite tree: hooks, children strictly in declared order, one
//! body at a time. Every per-test and per-hook error is converted into a
//! terminal state plus an event; nothing raised by user code escapes.

use crate::bus::EventBus;
use crate::error::{Failure, HookKind, TestError};
use crate::event::Event;
use crate::suite::SuiteError;
use crate::test::{invoke, Body, Context, TestOutcome, TestUnit};
use crate::tree::{NodeId, SuiteTree};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Skip reason given to descendants of a suite whose setup failed
pub const SETUP_FAILED: &str = "suite setup failed";

/// Skip reason given to remaining tests once bail triggered
pub const BAILED: &str = "bailed";

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound for test bodies without their own timeout, and for hooks
    pub default_timeout: Duration,
    /// Skip every remaining test after the first failure
    pub bail: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            bail: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    Running,
    Draining,
    Aborted,
}

/// Cooperative cancellation shared by the coordinator and its engines
///
/// `cancel` stops new trees from starting; `abort` additionally interrupts
/// in-flight bodies and fails the remaining tests.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<CancelState>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(CancelState::Running)),
        }
    }

    pub fn cancel(&self) {
        self.state.send_if_modified(|state| {
            if *state == CancelState::Running {
                *state = CancelState::Draining;
                true
            } else {
                false
            }
        });
    }

    pub fn abort(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != CancelState::Aborted;
            *state = CancelState::Aborted;
            changed
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow() != CancelState::Running
    }

    pub fn is_aborted(&self) -> bool {
        *self.state.borrow() == CancelState::Aborted
    }

    /// Resolves once `cancel` or `abort` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state != CancelState::Running).await;
    }

    /// Resolves once `abort` has been called
    pub async fn aborted(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == CancelState::Aborted).await;
    }
}

#[derive(Debug, Default)]
struct RunState {
    bailed: bool,
}

/// Runs suite trees and publishes their lifecycle
pub struct Engine {
    bus: Arc<EventBus>,
    config: EngineConfig,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            config: EngineConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run the whole tree from its root
    ///
    /// Outcomes are final: a tree that already ran is left untouched.
    pub async fn run(&self, tree: &mut SuiteTree) {
        let root = tree.root();
        if tree.suite(root).is_some_and(|s| s.time_elapsed.is_some()) {
            warn!(tree = ?tree.tree_id(), suite = %tree.id(root), "tree already ran");
            return;
        }
        let mut state = RunState::default();
        debug!(tree = ?tree.tree_id(), suite = %tree.id(root), "running tree");
        self.run_suite(tree, root, &mut state).await;
    }

    fn run_suite<'a>(
        &'a self,
        tree: &'a mut SuiteTree,
        suite: NodeId,
        state: &'a mut RunState,
    ) -> BoxFuture<'a, ()> {
        async move {
            self.bus.publish(&Event::SuiteStart(tree.suite_ref(suite)));
            let started = Instant::now();

            if let Some(reason) = tree.inherited_skip(suite).map(str::to_string) {
                self.skip_children(tree, suite, &reason);
                return self.finish_suite(tree, suite, started);
            }

            if self.cancel.is_aborted() {
                self.cancel_children(tree, suite);
                return self.finish_suite(tree, suite, started);
            }

            let hooks = tree.suite(suite).map(|s| (s.setup.clone(), s.teardown.clone()));
            let (setup, teardown) = hooks.unwrap_or_default();
            let ctx = Context::new(tree.id(suite), Arc::clone(&self.bus));

            if let Some(setup) = setup {
                if let Err(err) = self.run_hook(&setup, ctx.clone()).await {
                    if err == TestError::Cancelled || self.cancel.is_aborted() {
                        debug!(suite = %tree.id(suite), "suite setup interrupted");
                        self.cancel_children(tree, suite);
                        return self.finish_suite(tree, suite, started);
                    }
                    let failure = Failure::from_hook(HookKind::Setup, err);
                    warn!(suite = %tree.id(suite), %failure, "suite setup failed");
                    if let Some(s) = tree.suite_mut(suite) {
                        s.error = Some(SuiteError::Setup(failure));
                    }
                    self.skip_children(tree, suite, SETUP_FAILED);
                    return self.finish_suite(tree, suite, started);
                }
            }

            match ctx.take_skip() {
                Some(reason) => self.skip_children(tree, suite, &reason),
                None => self.run_children(tree, suite, state).await,
            }

            if let Some(teardown) = teardown {
                if !self.cancel.is_aborted() {
                    if let Err(err) = self.run_hook(&teardown, ctx).await {
                        let failure = Failure::from_hook(HookKind::Teardown, err);
                        warn!(suite = %tree.id(suite), %failure, "suite teardown failed");
                        if let Some(s) = tree.suite_mut(suite) {
                            s.error = Some(SuiteError::Teardown(failure));
                        }
                    }
                }
            }

            self.finish_suite(tree, suite, started);
        }
        .boxed()
    }

    async fn run_children(&self, tree: &mut SuiteTree, suite: NodeId, state: &mut RunState) {
        let children = tree.children(suite).to_vec();
        for child in children {
            if self.cancel.is_aborted() {
                self.cancel_node(tree, child);
            } else if state.bailed {
                self.skip_node(tree, child, BAILED);
            } else if tree.is_suite(child) {
                self.run_suite(tree, child, state).await;
            } else {
                self.run_test(tree, suite, child, state).await;
            }
        }
    }

    fn finish_suite(&self, tree: &mut SuiteTree, suite: NodeId, started: Instant) {
        if let Some(s) = tree.suite_mut(suite) {
            s.time_elapsed = Some(started.elapsed());
        }
        debug!(suite = %tree.id(suite), "suite finished");
        self.bus.publish(&Event::SuiteEnd(tree.suite_ref(suite)));
    }

    async fn run_test(
        &self,
        tree: &mut SuiteTree,
        suite: NodeId,
        test: NodeId,
        state: &mut RunState,
    ) {
        if tree.test(test).is_some_and(TestUnit::is_terminal) {
            return;
        }
        if let Some(reason) = tree.inherited_skip(test).map(str::to_string) {
            self.mark_skipped(tree, test, reason);
            return;
        }

        let Some((body, timeout)) = tree.test(test).map(|t| (t.body.clone(), t.timeout)) else {
            return;
        };
        let (before_each, after_each) = tree
            .suite(suite)
            .map(|s| (s.before_each.clone(), s.after_each.clone()))
            .unwrap_or_default();
        let ctx = Context::new(tree.id(test), Arc::clone(&self.bus));

        let before = match &before_each {
            Some(hook) => self.run_hook(hook, ctx.clone()).await,
            None => Ok(()),
        };
        if before.is_ok() {
            if let Some(reason) = ctx.take_skip() {
                self.mark_skipped(tree, test, reason);
                return;
            }
        }

        self.bus.publish(&Event::TestStart(tree.test_ref(test)));
        let started = Instant::now();
        let result = match before {
            Err(err) => Err(hook_failure(HookKind::BeforeEach, err)),
            Ok(()) => {
                let timeout = timeout.unwrap_or(self.config.default_timeout);
                invoke(&body, ctx.clone(), timeout, &self.cancel)
                    .await
                    .map_err(Failure::from)
            }
        };
        let elapsed = started.elapsed();
        let skip_requested = ctx.take_skip();

        let after = match &after_each {
            Some(hook) => self
                .run_hook(hook, ctx)
                .await
                .map_err(|err| hook_failure(HookKind::AfterEach, err)),
            None => Ok(()),
        };

        let outcome = match (result, after) {
            (Err(failure), _) | (Ok(()), Err(failure)) => TestOutcome::Failed(elapsed, failure),
            (Ok(()), Ok(())) => match skip_requested {
                Some(reason) => TestOutcome::Skipped(reason),
                None => TestOutcome::Passed(elapsed),
            },
        };

        if matches!(outcome, TestOutcome::Failed(..)) && self.config.bail {
            state.bailed = true;
        }
        self.finish_test(tree, test, outcome);
    }

    /// Record a terminal outcome and publish its events
    fn finish_test(&self, tree: &mut SuiteTree, test: NodeId, outcome: TestOutcome) {
        if let Some(t) = tree.test_mut(test) {
            t.outcome = outcome;
        }
        let view = tree.test_ref(test);
        match view.outcome() {
            TestOutcome::Passed(_) => {
                self.bus.publish(&Event::TestPass(view));
                self.bus.publish(&Event::TestEnd(view));
            }
            TestOutcome::Failed(_, failure) => {
                debug!(test = %view.id(), %failure, "test failed");
                self.bus.publish(&Event::TestFail(view));
                self.bus.publish(&Event::TestEnd(view));
            }
            TestOutcome::Skipped(_) => {
                self.bus.publish(&Event::TestSkip(view));
            }
            TestOutcome::Pending => {}
        }
    }

    fn mark_skipped(&self, tree: &mut SuiteTree, test: NodeId, reason: String) {
        self.finish_test(tree, test, TestOutcome::Skipped(reason));
    }

    async fn run_hook(&self, hook: &Body, ctx: Context) -> Result<(), TestError> {
        invoke(hook, ctx, self.config.default_timeout, &self.cancel).await
    }

    /// Skip every descendant, keeping nested suites bracketed by start/end
    fn skip_children(&self, tree: &mut SuiteTree, suite: NodeId, reason: &str) {
        for child in tree.children(suite).to_vec() {
            self.skip_node(tree, child, reason);
        }
    }

    fn skip_node(&self, tree: &mut SuiteTree, node: NodeId, reason: &str) {
        if tree.is_suite(node) {
            self.bus.publish(&Event::SuiteStart(tree.suite_ref(node)));
            self.skip_children(tree, node, reason);
            self.finish_suite(tree, node, Instant::now());
        } else if tree.test(node).is_some_and(|t| !t.is_terminal()) {
            self.mark_skipped(tree, node, reason.to_string());
        }
    }

    /// Fail every remaining test beneath `node` as cancelled
    fn cancel_node(&self, tree: &mut SuiteTree, node: NodeId) {
        if tree.is_suite(node) {
            self.bus.publish(&Event::SuiteStart(tree.suite_ref(node)));
            self.cancel_children(tree, node);
            self.finish_suite(tree, node, Instant::now());
        } else if tree.test(node).is_some_and(|t| !t.is_terminal()) {
            self.bus.publish(&Event::TestStart(tree.test_ref(node)));
            let failure = Failure::from(TestError::Cancelled);
            self.finish_test(tree, node, TestOutcome::Failed(Duration::ZERO, failure));
        }
    }

    fn cancel_children(&self, tree: &mut SuiteTree, suite: NodeId) {
        for child in tree.children(suite).to_vec() {
            self.cancel_node(tree, child);
        }
    }
}

/// An aborted hook fails its test as cancelled
fn hook_failure(kind: HookKind, err: TestError) -> Failure {
    match err {
        TestError::Cancelled => Failure::from(TestError::Cancelled),
        err => Failure::from_hook(kind, err),
    }
}
