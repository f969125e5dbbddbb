//! Event catalogue
//!
//! Suite and test events borrow the live node through [`SuiteRef`] /
//! [`TestRef`]; observers read the real object, never a copy.

use crate::coverage::CoverageMap;
use crate::error::{Failure, FatalError};
use crate::suite::SuiteError;
use crate::test::{TestOutcome, TestUnit};
use crate::tree::{NodeId, SuiteTree, TreeId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Topic names published or relayed by the core
pub mod topics {
    pub const SUITE_START: &str = "/suite/start";
    pub const SUITE_END: &str = "/suite/end";
    pub const TEST_START: &str = "/test/start";
    pub const TEST_PASS: &str = "/test/pass";
    pub const TEST_FAIL: &str = "/test/fail";
    pub const TEST_SKIP: &str = "/test/skip";
    pub const TEST_END: &str = "/test/end";
    pub const ERROR: &str = "/error";
    pub const COVERAGE: &str = "/coverage";
    pub const SESSION_START: &str = "/session/start";
    pub const TUNNEL_START: &str = "/tunnel/start";
    pub const TUNNEL_STATUS: &str = "/tunnel/status";
    pub const TUNNEL_DOWNLOAD_PROGRESS: &str = "/tunnel/download/progress";
}

/// Remote environment a session runs against
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub environment_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl RemoteDescriptor {
    pub fn new(environment_type: impl Into<String>) -> Self {
        Self {
            environment_type: environment_type.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for RemoteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.environment_type)?;
        for part in [&self.browser_name, &self.version, &self.platform]
            .into_iter()
            .flatten()
        {
            write!(f, " {}", part)?;
        }
        Ok(())
    }
}

/// Tunnel process as seen by observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub name: String,
}

/// Bytes received of a tunnel download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: u64,
}

impl DownloadProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.received as f64 / self.total as f64 * 100.0
    }
}

/// Borrowed view of a suite node
#[derive(Clone, Copy)]
pub struct SuiteRef<'a> {
    tree: &'a SuiteTree,
    node: NodeId,
}

impl<'a> SuiteRef<'a> {
    pub(crate) fn new(tree: &'a SuiteTree, node: NodeId) -> Self {
        Self { tree, node }
    }

    pub fn tree(&self) -> &'a SuiteTree {
        self.tree
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree.tree_id()
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn name(&self) -> &'a str {
        self.tree.name(self.node)
    }

    pub fn id(&self) -> String {
        self.tree.id(self.node)
    }

    pub fn parent(&self) -> Option<SuiteRef<'a>> {
        self.tree
            .parent(self.node)
            .map(|parent| SuiteRef::new(self.tree, parent))
    }

    pub fn is_root(&self) -> bool {
        self.tree.parent(self.node).is_none()
    }

    pub fn num_tests(&self) -> usize {
        self.tree.num_tests(self.node)
    }

    pub fn num_failed_tests(&self) -> usize {
        self.tree.num_failed_tests(self.node)
    }

    pub fn num_skipped_tests(&self) -> usize {
        self.tree.num_skipped_tests(self.node)
    }

    pub fn num_passed_tests(&self) -> usize {
        self.tree.num_passed_tests(self.node)
    }

    pub fn has_passed(&self) -> bool {
        self.tree.has_passed(self.node)
    }

    pub fn error(&self) -> Option<&'a SuiteError> {
        self.tree.suite(self.node).and_then(|s| s.error())
    }

    pub fn time_elapsed(&self) -> Option<Duration> {
        self.tree.suite(self.node).and_then(|s| s.time_elapsed())
    }

    pub fn environment(&self) -> Option<&'a RemoteDescriptor> {
        self.tree.environment()
    }
}

impl fmt::Debug for SuiteRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteRef")
            .field("tree", &self.tree_id())
            .field("id", &self.id())
            .finish()
    }
}

/// Borrowed view of a test node
#[derive(Clone, Copy)]
pub struct TestRef<'a> {
    tree: &'a SuiteTree,
    node: NodeId,
    unit: &'a TestUnit,
}

impl<'a> TestRef<'a> {
    pub(crate) fn new(tree: &'a SuiteTree, node: NodeId, unit: &'a TestUnit) -> Self {
        Self { tree, node, unit }
    }

    fn unit(&self) -> &'a TestUnit {
        self.unit
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree.tree_id()
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn name(&self) -> &'a str {
        self.unit().name()
    }

    pub fn id(&self) -> String {
        self.tree.id(self.node)
    }

    pub fn parent(&self) -> Option<SuiteRef<'a>> {
        self.tree
            .parent(self.node)
            .map(|parent| SuiteRef::new(self.tree, parent))
    }

    pub fn outcome(&self) -> &'a TestOutcome {
        self.unit().outcome()
    }

    pub fn time_elapsed(&self) -> Option<Duration> {
        self.unit().time_elapsed()
    }

    pub fn has_passed(&self) -> Option<bool> {
        self.unit().has_passed()
    }

    pub fn error(&self) -> Option<&'a Failure> {
        self.unit().error()
    }

    pub fn skipped(&self) -> Option<&'a str> {
        self.unit().skipped_reason()
    }
}

impl fmt::Debug for TestRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRef")
            .field("tree", &self.tree_id())
            .field("id", &self.id())
            .field("outcome", self.outcome())
            .finish()
    }
}

/// A published event; the topic is derived from the variant
#[derive(Clone, Copy)]
pub enum Event<'a> {
    SuiteStart(SuiteRef<'a>),
    SuiteEnd(SuiteRef<'a>),
    TestStart(TestRef<'a>),
    TestPass(TestRef<'a>),
    TestFail(TestRef<'a>),
    TestSkip(TestRef<'a>),
    TestEnd(TestRef<'a>),
    Error(&'a FatalError),
    Coverage {
        session_id: &'a str,
        coverage: &'a CoverageMap,
    },
    SessionStart(&'a RemoteDescriptor),
    TunnelStart(Option<&'a TunnelInfo>),
    TunnelStatus {
        tunnel: Option<&'a TunnelInfo>,
        status: &'a str,
    },
    TunnelDownloadProgress {
        tunnel: Option<&'a TunnelInfo>,
        progress: DownloadProgress,
    },
    /// Anything outside the catalogue; the bus does not validate topics
    Custom {
        topic: &'a str,
        payload: &'a (dyn Any + Send + Sync),
    },
}

impl<'a> Event<'a> {
    pub fn topic(&self) -> &'a str {
        match self {
            Event::SuiteStart(_) => topics::SUITE_START,
            Event::SuiteEnd(_) => topics::SUITE_END,
            Event::TestStart(_) => topics::TEST_START,
            Event::TestPass(_) => topics::TEST_PASS,
            Event::TestFail(_) => topics::TEST_FAIL,
            Event::TestSkip(_) => topics::TEST_SKIP,
            Event::TestEnd(_) => topics::TEST_END,
            Event::Error(_) => topics::ERROR,
            Event::Coverage { .. } => topics::COVERAGE,
            Event::SessionStart(_) => topics::SESSION_START,
            Event::TunnelStart(_) => topics::TUNNEL_START,
            Event::TunnelStatus { .. } => topics::TUNNEL_STATUS,
            Event::TunnelDownloadProgress { .. } => topics::TUNNEL_DOWNLOAD_PROGRESS,
            Event::Custom { topic, .. } => *topic,
        }
    }

    pub fn suite(&self) -> Option<SuiteRef<'a>> {
        match self {
            Event::SuiteStart(suite) | Event::SuiteEnd(suite) => Some(*suite),
            _ => None,
        }
    }

    pub fn test(&self) -> Option<TestRef<'a>> {
        match self {
            Event::TestStart(test)
            | Event::TestPass(test)
            | Event::TestFail(test)
            | Event::TestSkip(test)
            | Event::TestEnd(test) => Some(*test),
            _ => None,
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.suite(), self.test()) {
            (Some(suite), _) => write!(f, "{} {:?}", self.topic(), suite.id()),
            (_, Some(test)) => write!(f, "{} {:?}", self.topic(), test.id()),
            _ => f.write_str(self.topic()),
        }
    }
}
