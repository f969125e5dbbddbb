//! Suite tree arena
//!
//! Suites and tests live in a flat `Vec` addressed by [`NodeId`]. Each node
//! stores its parent as an index, so the parent link never owns anything and
//! never forms a cycle. Ids are computed from the immutable names on demand.

use crate::event::{RemoteDescriptor, SuiteRef, TestRef};
use crate::suite::Suite;
use crate::test::{TestOutcome, TestUnit};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Delimiter between ancestor names in an id
pub const ID_SEPARATOR: &str = " - ";

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a node within its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Process-unique identity of a tree, for keying nodes across trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

/// Tree construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Node {0:?} is a test and cannot have children")]
    NotASuite(NodeId),
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Suite(Suite),
    Test(TestUnit),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

/// Leaf counts beneath a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    /// Tests that have not reached a terminal state yet
    pub fn pending(&self) -> usize {
        self.total - self.passed - self.failed - self.skipped
    }
}

/// One independent suite tree (a local run or one remote session)
#[derive(Debug)]
pub struct SuiteTree {
    id: TreeId,
    nodes: Vec<Node>,
    environment: Option<RemoteDescriptor>,
}

impl SuiteTree {
    /// Create a tree whose root is `root`
    pub fn new(root: Suite) -> Self {
        Self {
            id: TreeId(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: vec![Node {
                parent: None,
                kind: NodeKind::Suite(root),
            }],
            environment: None,
        }
    }

    /// Attach the remote environment this tree runs against
    pub fn with_environment(mut self, environment: RemoteDescriptor) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn tree_id(&self) -> TreeId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn environment(&self) -> Option<&RemoteDescriptor> {
        self.environment.as_ref()
    }

    /// Append a nested suite as the last child of `parent`
    pub fn add_suite(&mut self, parent: NodeId, suite: Suite) -> Result<NodeId, TreeError> {
        self.attach(parent, NodeKind::Suite(suite))
    }

    /// Append a test as the last child of `parent`
    pub fn add_test(&mut self, parent: NodeId, test: TestUnit) -> Result<NodeId, TreeError> {
        self.attach(parent, NodeKind::Test(test))
    }

    fn attach(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, TreeError> {
        let id = NodeId(self.nodes.len());
        match self.nodes.get_mut(parent.0).map(|n| &mut n.kind) {
            Some(NodeKind::Suite(suite)) => suite.children.push(id),
            Some(NodeKind::Test(_)) => return Err(TreeError::NotASuite(parent)),
            None => return Err(TreeError::UnknownNode(parent)),
        }
        self.nodes.push(Node {
            parent: Some(parent),
            kind,
        });
        Ok(id)
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Suite(suite) => &suite.name,
            NodeKind::Test(test) => &test.name,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// `parent ? id(parent) + separator + name : name`
    pub fn id(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .parent_chain(id)
            .into_iter()
            .rev()
            .map(|ancestor| self.name(ancestor))
            .collect();
        names.push(self.name(id));
        names.join(ID_SEPARATOR)
    }

    /// Ancestors of `id`, nearest first
    pub fn parent_chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parent(parent);
        }
        chain
    }

    pub fn is_suite(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Suite(_))
    }

    pub fn suite(&self, id: NodeId) -> Option<&Suite> {
        match &self.node(id).kind {
            NodeKind::Suite(suite) => Some(suite),
            NodeKind::Test(_) => None,
        }
    }

    pub fn test(&self, id: NodeId) -> Option<&TestUnit> {
        match &self.node(id).kind {
            NodeKind::Test(test) => Some(test),
            NodeKind::Suite(_) => None,
        }
    }

    pub(crate) fn suite_mut(&mut self, id: NodeId) -> Option<&mut Suite> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Suite(suite) => Some(suite),
            NodeKind::Test(_) => None,
        }
    }

    pub(crate) fn test_mut(&mut self, id: NodeId) -> Option<&mut TestUnit> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Test(test) => Some(test),
            NodeKind::Suite(_) => None,
        }
    }

    /// Direct children of a suite, in declared order; empty for tests
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.suite(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// Every leaf test beneath `id` in execution order
    pub fn descendant_tests(&self, id: NodeId) -> Vec<NodeId> {
        let mut tests = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &self.node(current).kind {
                NodeKind::Test(_) => tests.push(current),
                NodeKind::Suite(suite) => stack.extend(suite.children.iter().rev()),
            }
        }
        tests
    }

    /// First skip reason found on `id` or any ancestor suite
    pub fn inherited_skip(&self, id: NodeId) -> Option<&str> {
        let own = match &self.node(id).kind {
            NodeKind::Suite(suite) => suite.skip.as_deref(),
            NodeKind::Test(test) => test.skip.as_deref(),
        };
        own.or_else(|| {
            self.parent_chain(id)
                .into_iter()
                .find_map(|ancestor| self.suite(ancestor).and_then(|s| s.skip.as_deref()))
        })
    }

    /// Request a skip for a node that has not run yet
    pub fn skip(&mut self, id: NodeId, reason: impl Into<String>) {
        match &mut self.nodes[id.0].kind {
            NodeKind::Suite(suite) => suite.skip = Some(reason.into()),
            NodeKind::Test(test) if !test.outcome.is_terminal() => {
                test.skip = Some(reason.into())
            }
            NodeKind::Test(_) => {}
        }
    }

    /// Skip every test whose id does not match `pattern`; returns how many were skipped
    pub fn apply_grep(&mut self, pattern: &Regex) -> usize {
        let root = self.root();
        let mut skipped = 0;
        for test in self.descendant_tests(root) {
            if !pattern.is_match(&self.id(test)) {
                self.skip(test, "grep");
                skipped += 1;
            }
        }
        skipped
    }

    /// Leaf counts beneath `id`, recomputed from the live nodes
    pub fn tally(&self, id: NodeId) -> Tally {
        let mut tally = Tally::default();
        for test in self.descendant_tests(id) {
            tally.total += 1;
            match self.test(test).map(TestUnit::outcome) {
                Some(TestOutcome::Passed(_)) => tally.passed += 1,
                Some(TestOutcome::Failed(..)) => tally.failed += 1,
                Some(TestOutcome::Skipped(_)) => tally.skipped += 1,
                _ => {}
            }
        }
        tally
    }

    pub fn num_tests(&self, id: NodeId) -> usize {
        self.tally(id).total
    }

    pub fn num_failed_tests(&self, id: NodeId) -> usize {
        self.tally(id).failed
    }

    pub fn num_skipped_tests(&self, id: NodeId) -> usize {
        self.tally(id).skipped
    }

    pub fn num_passed_tests(&self, id: NodeId) -> usize {
        self.tally(id).passed
    }

    /// No failed descendant and no suite-level error on the suite itself
    pub fn has_passed(&self, id: NodeId) -> bool {
        let own_error = self.suite(id).is_some_and(|s| s.error.is_some());
        self.num_failed_tests(id) == 0 && !own_error
    }

    /// All suites in the tree, parents before children
    pub fn suites(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Suite(_)))
            .map(|(index, _)| NodeId(index))
    }

    /// # Panics
    /// Panics if `id` is not a suite
    pub fn suite_ref(&self, id: NodeId) -> SuiteRef<'_> {
        assert!(self.is_suite(id), "{:?} is not a suite", id);
        SuiteRef::new(self, id)
    }

    /// # Panics
    /// Panics if `id` is not a test
    pub fn test_ref(&self, id: NodeId) -> TestRef<'_> {
        match self.test(id) {
            Some(unit) => TestRef::new(self, id, unit),
            None => panic!("{:?} is not a test", id),
        }
    }
}
