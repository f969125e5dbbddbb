//! Suite - ordered children with setup/teardown hooks

use crate::error::Failure;
use crate::test::{boxed, Body, Context};
use crate::tree::NodeId;
use crate::TestError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Suite-level fatal error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuiteError {
    /// Setup failed; no child ran
    #[error("{0}")]
    Setup(Failure),

    /// Teardown failed after every child completed
    #[error("{0}")]
    Teardown(Failure),
}

impl SuiteError {
    pub fn failure(&self) -> &Failure {
        match self {
            SuiteError::Setup(failure) | SuiteError::Teardown(failure) => failure,
        }
    }
}

/// A group of tests and nested suites sharing hooks
///
/// Children are attached through [`crate::SuiteTree::add_suite`] and
/// [`crate::SuiteTree::add_test`]; declaration order is execution order.
pub struct Suite {
    pub(crate) name: String,
    pub(crate) setup: Option<Body>,
    pub(crate) before_each: Option<Body>,
    pub(crate) after_each: Option<Body>,
    pub(crate) teardown: Option<Body>,
    pub(crate) skip: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) error: Option<SuiteError>,
    pub(crate) time_elapsed: Option<Duration>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            before_each: None,
            after_each: None,
            teardown: None,
            skip: None,
            children: Vec::new(),
            error: None,
            time_elapsed: None,
        }
    }

    /// Runs once before any child; a failure skips every descendant
    pub fn setup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.setup = Some(boxed(hook));
        self
    }

    /// Runs before each direct child test
    pub fn before_each<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.before_each = Some(boxed(hook));
        self
    }

    /// Runs after each direct child test that started
    pub fn after_each<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.after_each = Some(boxed(hook));
        self
    }

    /// Runs once after every child completed
    pub fn teardown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.teardown = Some(boxed(hook));
        self
    }

    /// Skip every descendant with `reason`
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn error(&self) -> Option<&SuiteError> {
        self.error.as_ref()
    }

    pub fn time_elapsed(&self) -> Option<Duration> {
        self.time_elapsed
    }

    pub fn skipped_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("teardown", &self.teardown.is_some())
            .field("skip", &self.skip)
            .field("children", &self.children)
            .field("error", &self.error)
            .field("time_elapsed", &self.time_elapsed)
            .finish()
    }
}
