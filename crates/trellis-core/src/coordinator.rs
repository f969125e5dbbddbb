//! Run coordinator
//!
//! Owns independent suite trees (one per remote session, or one for a local
//! run) and runs each with its own engine pass. Trees share only the bus.

use crate::bus::EventBus;
use crate::engine::{CancelToken, Engine, EngineConfig};
use crate::event::{topics, Event};
use crate::tree::SuiteTree;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Trees allowed to run at the same time
    pub max_concurrency: usize,
    /// Time in-flight trees get to finish after a fatal error before they are aborted
    pub grace_period: Duration,
    pub engine: EngineConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            grace_period: Duration::from_secs(5),
            engine: EngineConfig::default(),
        }
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub num_tests: usize,
    pub num_failed: usize,
    pub num_skipped: usize,
    pub num_passed: usize,
    /// Suites whose setup or teardown failed
    pub suite_errors: usize,
    /// `/error` publishes observed during the run
    pub fatal_errors: usize,
    /// Trees never started because the run was cancelled
    pub not_started: usize,
}

impl RunSummary {
    /// Fold the final state of a tree into the summary
    pub fn record(&mut self, tree: &SuiteTree) {
        let tally = tree.tally(tree.root());
        self.num_tests += tally.total;
        self.num_failed += tally.failed;
        self.num_skipped += tally.skipped;
        self.num_passed += tally.passed;
        self.suite_errors += tree
            .suites()
            .filter(|&suite| tree.suite(suite).is_some_and(|s| s.error().is_some()))
            .count();
    }

    /// The process-level exit signal
    pub fn success(&self) -> bool {
        self.num_failed == 0
            && self.suite_errors == 0
            && self.fatal_errors == 0
            && self.not_started == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} passed, {} failed, {} skipped",
            self.num_tests, self.num_passed, self.num_failed, self.num_skipped
        )?;
        if self.suite_errors > 0 {
            write!(f, ", {} suite errors", self.suite_errors)?;
        }
        if self.fatal_errors > 0 {
            write!(f, ", {} fatal errors", self.fatal_errors)?;
        }
        if self.not_started > 0 {
            write!(f, ", {} sessions not started", self.not_started)?;
        }
        Ok(())
    }
}

/// Runs suite trees and aggregates their outcome
pub struct Coordinator {
    bus: Arc<EventBus>,
    config: CoordinatorConfig,
    trees: Vec<SuiteTree>,
    cancel: CancelToken,
}

impl Coordinator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            config: CoordinatorConfig::default(),
            trees: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_tree(&mut self, tree: SuiteTree) {
        self.trees.push(tree);
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Token that cancels this run; `cancel` behaves like a fatal error
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run every tree and return the aggregate summary
    ///
    /// A `/error` publish stops new trees from starting. Trees already running
    /// get the grace period to finish, after which their remaining tests are
    /// failed as cancelled.
    pub async fn run(self) -> RunSummary {
        let Coordinator {
            bus,
            config,
            trees,
            cancel,
        } = self;

        let fatal = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let fatal = Arc::clone(&fatal);
            let cancel = cancel.clone();
            bus.subscribe(topics::ERROR, move |event| {
                if let Event::Error(err) = event {
                    error!(error = %err.message, origin = ?err.origin, "fatal error, cancelling run");
                }
                fatal.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Ok(())
            })
        };

        let watcher = {
            let cancel = cancel.clone();
            let grace = config.grace_period;
            tokio::spawn(async move {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
                debug!("grace period elapsed, aborting in-flight trees");
                cancel.abort();
            })
        };

        let mut summary = RunSummary::default();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let mut running = JoinSet::new();
        let mut trees = trees.into_iter();

        while let Some(mut tree) = trees.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.not_started += 1;
                summary.record(&tree);
                for tree in trees.by_ref() {
                    summary.not_started += 1;
                    summary.record(&tree);
                }
                break;
            };

            if let Some(environment) = tree.environment() {
                bus.publish(&Event::SessionStart(environment));
            }
            let engine = Engine::new(Arc::clone(&bus))
                .with_config(config.engine.clone())
                .with_cancel(cancel.clone());
            running.spawn(async move {
                engine.run(&mut tree).await;
                drop(permit);
                tree
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(tree) => summary.record(&tree),
                Err(err) => {
                    error!(%err, "suite tree task failed");
                    summary.fatal_errors += 1;
                }
            }
        }

        watcher.abort();
        bus.unsubscribe(subscription);
        summary.fatal_errors += fatal.load(Ordering::SeqCst);
        debug!(%summary, "run finished");
        summary
    }
}
