//! Wiring of configuration, reporters and the coordinator for one run

use crate::args::HarnessArgs;
use crate::logging::init_tracing;
use anyhow::{Context as _, Result};
use clap::Parser;
use std::env;
use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use trellis_config::{ConfigLoader, TrellisConfig};
use trellis_core::{
    Coordinator, CoordinatorConfig, EngineConfig, EventBus, ReporterSet, RunSummary, SuiteTree,
};
use trellis_reporters::{ConsoleSink, ReporterOptions, TerminalConsole};

/// Builds a fresh tree; called once per configured environment
pub type SuiteFactory = Box<dyn Fn() -> SuiteTree + Send + Sync>;

/// Entry point of a `harness = false` test binary
///
/// ```no_run
/// use trellis_core::{Suite, SuiteTree, TestUnit};
/// use trellis_harness::Harness;
///
/// fn math() -> SuiteTree {
///     let mut tree = SuiteTree::new(Suite::new("math"));
///     let root = tree.root();
///     tree.add_test(root, TestUnit::sync("adds", |_| Ok(()))).unwrap();
///     tree
/// }
///
/// fn main() -> std::process::ExitCode {
///     Harness::new().suite(math).main()
/// }
/// ```
#[derive(Default)]
pub struct Harness {
    suites: Vec<SuiteFactory>,
    sink: Option<Arc<dyn ConsoleSink>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root suite
    pub fn suite(mut self, factory: impl Fn() -> SuiteTree + Send + Sync + 'static) -> Self {
        self.suites.push(Box::new(factory));
        self
    }

    /// Send reporter output somewhere other than the terminal
    pub fn with_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn num_suites(&self) -> usize {
        self.suites.len()
    }

    /// Run with the process arguments and turn any error into a failing exit code
    pub fn main(self) -> ExitCode {
        match self.run_with_args(env::args_os()) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        }
    }

    /// Parse `args`, load configuration and run every registered suite
    pub fn run_with_args<I, T>(self, args: I) -> Result<ExitCode>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = match HarnessArgs::try_parse_from(args) {
            Ok(args) => args,
            Err(err) => {
                // --help and --version land here too
                let code = if err.use_stderr() {
                    ExitCode::from(2)
                } else {
                    ExitCode::SUCCESS
                };
                err.print()?;
                return Ok(code);
            }
        };

        init_tracing(args.log.as_deref());
        let config = load_config(&args)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let summary = runtime.block_on(self.execute(&config))?;

        Ok(if summary.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    /// Run every registered suite under `config`
    pub async fn execute(self, config: &TrellisConfig) -> Result<RunSummary> {
        let no_color = config.no_color();
        if no_color {
            colored::control::set_override(false);
        }

        let sink: Arc<dyn ConsoleSink> = match &self.sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(TerminalConsole::new().with_no_color(no_color)),
        };
        let options = ReporterOptions {
            sink: Arc::clone(&sink),
            cobertura_output: config.cobertura_output(),
        };

        let bus = Arc::new(EventBus::new());
        let mut reporters = ReporterSet::new(Arc::clone(&bus));
        let names = config.reporter_names();
        for name in &names {
            let reporter = trellis_reporters::create(name, &options)
                .with_context(|| format!("failed to create reporter '{}'", name))?;
            reporters.add(reporter);
        }

        let mut coordinator = Coordinator::new(bus).with_config(CoordinatorConfig {
            max_concurrency: config.max_concurrency(),
            grace_period: config.grace_period(),
            engine: EngineConfig {
                default_timeout: config.timeout(),
                bail: config.bail(),
            },
        });
        for tree in self.trees(config)? {
            coordinator.add_tree(tree);
        }

        info!(
            trees = coordinator.num_trees(),
            reporters = reporters.len(),
            "starting run"
        );
        reporters.start();
        let summary = coordinator.run().await;
        reporters.stop();
        info!(%summary, "run finished");

        if names.iter().any(|name| name == "console") {
            if summary.success() {
                sink.info(&summary.to_string())?;
            } else {
                sink.warn(&summary.to_string())?;
            }
        }

        Ok(summary)
    }

    /// One tree per suite and environment, with the grep filter applied
    fn trees(&self, config: &TrellisConfig) -> Result<Vec<SuiteTree>> {
        let grep = config.grep()?;
        let environments = config.environments();

        let mut trees = Vec::new();
        for factory in &self.suites {
            if environments.is_empty() {
                trees.push(factory());
            } else {
                for environment in &environments {
                    trees.push(factory().with_environment(environment.clone()));
                }
            }
        }

        if let Some(grep) = &grep {
            for tree in &mut trees {
                let skipped = tree.apply_grep(grep);
                debug!(tree = ?tree.tree_id(), skipped, "applied grep");
            }
        }

        Ok(trees)
    }
}

/// Project file, then environment, then flags
pub fn load_config(args: &HarnessArgs) -> Result<TrellisConfig> {
    let loader = ConfigLoader::new();
    let loaded = match &args.config {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let cwd = env::current_dir().context("failed to read working directory")?;
            loader.load_from_directory(&cwd)?
        }
    };
    debug!(root = ?loaded.project_root(), "configuration loaded");

    let mut config = loaded.project;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}
