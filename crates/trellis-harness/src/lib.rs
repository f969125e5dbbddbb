//! Trellis harness
//!
//! Turns a `harness = false` test binary into a Trellis run: parses flags,
//! loads trellis.toml, initialises logging, builds the requested reporters,
//! expands each registered suite once per configured environment, runs them
//! on the [`trellis_core::Coordinator`] and maps the result to an exit code.

pub mod args;
pub mod harness;
pub mod logging;

pub use args::HarnessArgs;
pub use harness::{load_config, Harness, SuiteFactory};
pub use logging::init_tracing;
