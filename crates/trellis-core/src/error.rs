//! Failure taxonomy
//!
//! Test bodies and hooks return [`TestError`]; the engine converts it into a
//! recorded [`Failure`] attached to the test or suite. [`FatalError`] is the
//! payload of `/error` and never originates from a test body.

use std::fmt;
use std::panic::Location;
use std::time::Duration;
use thiserror::Error;

/// Rendered in place of a stack or location when neither is known.
pub const NO_LOCATION: &str = "No stack or location";

/// Error returned from a test body or hook
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestError {
    /// A failed expectation, optionally carrying the compared values
    #[error("{message}")]
    Assertion {
        message: String,
        actual: Option<String>,
        expected: Option<String>,
        location: Option<&'static Location<'static>>,
    },

    /// Any other error raised by the body
    #[error("{0}")]
    Body(String),

    /// The body did not complete within its bound
    #[error("Timeout reached after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The body panicked
    #[error("panicked: {0}")]
    Panicked(String),

    /// The run was aborted while the body was in flight
    #[error("run cancelled before the test completed")]
    Cancelled,
}

impl TestError {
    /// A failed expectation without compared values
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        TestError::Assertion {
            message: message.into(),
            actual: None,
            expected: None,
            location: Some(Location::caller()),
        }
    }

    /// A failed comparison carrying both values
    #[track_caller]
    pub fn mismatch(
        message: impl Into<String>,
        actual: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        TestError::Assertion {
            message: message.into(),
            actual: Some(actual.into()),
            expected: Some(expected.into()),
            location: Some(Location::caller()),
        }
    }

    pub fn body(message: impl Into<String>) -> Self {
        TestError::Body(message.into())
    }
}

impl From<String> for TestError {
    fn from(message: String) -> Self {
        TestError::Body(message)
    }
}

impl From<&str> for TestError {
    fn from(message: &str) -> Self {
        TestError::Body(message.to_string())
    }
}

impl From<std::io::Error> for TestError {
    fn from(err: std::io::Error) -> Self {
        TestError::Body(err.to_string())
    }
}

/// Fail with `message` unless `condition` holds
#[track_caller]
pub fn expect(condition: bool, message: impl Into<String>) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::assertion(message))
    }
}

/// Fail with a structured mismatch unless `actual == expected`
#[track_caller]
pub fn expect_eq<T>(actual: T, expected: T, message: impl Into<String>) -> Result<(), TestError>
where
    T: PartialEq + fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(TestError::mismatch(
            message,
            format!("{:?}", actual),
            format!("{:?}", expected),
        ))
    }
}

/// Suite-level and per-test hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Setup,
    BeforeEach,
    AfterEach,
    Teardown,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Setup => "setup",
            HookKind::BeforeEach => "beforeEach",
            HookKind::AfterEach => "afterEach",
            HookKind::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Category of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Assertion,
    Error,
    Timeout,
    Panic,
    Hook(HookKind),
    Cancelled,
}

/// Failure detail recorded on a test or suite
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub actual: Option<String>,
    pub expected: Option<String>,
    /// Source location or stack, when one was captured
    pub location: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actual: None,
            expected: None,
            location: None,
        }
    }

    /// Attribute `err` to a hook, keeping any compared values
    pub fn from_hook(hook: HookKind, err: TestError) -> Self {
        let mut failure = Failure::from(err);
        failure.message = format!("{} hook failed: {}", hook, failure.message);
        failure.kind = FailureKind::Hook(hook);
        failure
    }

    /// True when the failure carries both compared values
    pub fn is_comparison(&self) -> bool {
        self.actual.is_some() && self.expected.is_some()
    }

    /// Message followed by the location, or the placeholder when none is known
    pub fn describe(&self) -> String {
        let mut out = self.message.clone();
        if let (Some(actual), Some(expected)) = (&self.actual, &self.expected) {
            out.push_str(&format!("\n  expected: {}\n  actual:   {}", expected, actual));
        }
        out.push('\n');
        out.push_str(self.location.as_deref().unwrap_or(NO_LOCATION));
        out
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<TestError> for Failure {
    fn from(err: TestError) -> Self {
        let message = err.to_string();
        match err {
            TestError::Assertion {
                actual,
                expected,
                location,
                ..
            } => Failure {
                kind: FailureKind::Assertion,
                message,
                actual,
                expected,
                location: location.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
            },
            TestError::Body(_) => Failure::new(FailureKind::Error, message),
            TestError::Timeout(_) => Failure::new(FailureKind::Timeout, message),
            TestError::Panicked(_) => Failure::new(FailureKind::Panic, message),
            TestError::Cancelled => Failure::new(FailureKind::Cancelled, message),
        }
    }
}

/// Unrecoverable condition outside the test lifecycle, published on `/error`
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FatalError {
    pub message: String,
    /// Where the condition came from (tunnel, session, ...)
    pub origin: Option<String>,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Message followed by the origin, or the placeholder when none is known
    pub fn describe(&self) -> String {
        format!(
            "{}\n{}",
            self.message,
            self.origin.as_deref().unwrap_or(NO_LOCATION)
        )
    }
}
