//! A `harness = false` test binary driven by Trellis itself

use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trellis_core::{expect, expect_eq, Suite, SuiteTree, TestUnit};
use trellis_harness::Harness;

fn strings() -> SuiteTree {
    let mut tree = SuiteTree::new(Suite::new("strings"));
    let root = tree.root();
    tree.add_test(
        root,
        TestUnit::sync("uppercases", |_| {
            expect_eq("abc".to_uppercase(), "ABC".to_string(), "uppercase")
        }),
    )
    .unwrap();
    tree.add_test(
        root,
        TestUnit::sync("trims", |_| expect("  x ".trim() == "x", "trim")),
    )
    .unwrap();
    tree.add_test(
        root,
        TestUnit::sync("unicode widths", |_| Ok(())).skipped("not implemented"),
    )
    .unwrap();
    tree
}

fn hooks() -> SuiteTree {
    let counter = Arc::new(AtomicUsize::new(0));
    let before = Arc::clone(&counter);
    let check = Arc::clone(&counter);

    let mut tree = SuiteTree::new(Suite::new("hooks").before_each(move |_| {
        let before = Arc::clone(&before);
        async move {
            before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));
    let root = tree.root();
    tree.add_test(
        root,
        TestUnit::new("sleeps", |_| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        })
        .with_timeout(Duration::from_secs(1)),
    )
    .unwrap();
    tree.add_test(
        root,
        TestUnit::sync("counts hooks", move |_| {
            expect_eq(check.load(Ordering::SeqCst), 2, "beforeEach calls")
        }),
    )
    .unwrap();
    tree
}

fn main() -> ExitCode {
    Harness::new()
        .suite(strings)
        .suite(hooks)
        .run_with_args(["smoke", "--reporter", "console"])
        .unwrap_or(ExitCode::FAILURE)
}
