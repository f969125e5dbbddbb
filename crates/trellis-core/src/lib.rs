//! Trellis core
//!
//! Runs hierarchical suites of tests and broadcasts every lifecycle
//! transition on a topic-based [`EventBus`]:
//! - [`SuiteTree`] - arena holding suites and tests, addressed by [`NodeId`]
//! - [`Engine`] - sequential traversal of one tree, hooks, timeouts, failure containment
//! - [`Coordinator`] - runs independent trees (one per session) and aggregates the exit signal
//! - [`Reporter`] - capability interface for observers that render events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_core::{Engine, EventBus, Suite, SuiteTree, TestUnit};
//!
//! # async fn demo() {
//! let bus = Arc::new(EventBus::new());
//! let mut tree = SuiteTree::new(Suite::new("main"));
//! let root = tree.root();
//! tree.add_test(root, TestUnit::new("adds", |_| async { Ok(()) }))
//!     .unwrap();
//!
//! Engine::new(bus).run(&mut tree).await;
//! assert!(tree.suite_ref(root).has_passed());
//! # }
//! ```

pub mod bus;
pub mod coordinator;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod event;
pub mod reporter;
pub mod suite;
pub mod test;
pub mod tree;

pub use bus::{EventBus, HandlerDiagnostic, HandlerError, HandlerResult, SubscriptionHandle};
pub use coordinator::{Coordinator, CoordinatorConfig, RunSummary};
pub use coverage::{CoverageMap, FileCoverage};
pub use engine::{CancelToken, Engine, EngineConfig};
pub use error::{expect, expect_eq, Failure, FailureKind, FatalError, HookKind, TestError};
pub use event::{
    topics, DownloadProgress, Event, RemoteDescriptor, SuiteRef, TestRef, TunnelInfo,
};
pub use reporter::{Reporter, ReporterSet};
pub use suite::{Suite, SuiteError};
pub use test::{Context, TestOutcome, TestUnit};
pub use tree::{NodeId, SuiteTree, Tally, TreeError, TreeId, ID_SEPARATOR};
