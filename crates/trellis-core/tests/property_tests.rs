//! Property-based tests for the execution engine.
//!
//! Random suite trees (nested suites, passing, failing and skipped tests,
//! failing setup and teardown hooks) are run on a fresh bus, and every
//! recorded event sequence is checked for:
//! 1. Bracketing: `/suite/start` first and `/suite/end` last for every suite
//! 2. Per-test ordering: start, then pass/fail/skip, then end (never after skip)
//! 3. Aggregation: total == failed + skipped + passed for every suite
//! 4. Pass: has_passed == (no failed descendant && no suite error)

mod common;

use common::EventLog;
use proptest::prelude::*;
use std::sync::Arc;
use trellis_core::{Engine, EventBus, NodeId, Suite, SuiteTree, TestError, TestUnit};

#[derive(Debug, Clone)]
enum Shape {
    Pass,
    Fail,
    Skip,
    Suite {
        setup_fails: bool,
        teardown_fails: bool,
        children: Vec<Shape>,
    },
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        4 => Just(Shape::Pass),
        2 => Just(Shape::Fail),
        1 => Just(Shape::Skip),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        (
            prop::bool::weighted(0.1),
            prop::bool::weighted(0.1),
            prop::collection::vec(inner, 0..6),
        )
            .prop_map(|(setup_fails, teardown_fails, children)| Shape::Suite {
                setup_fails,
                teardown_fails,
                children,
            })
    })
}

fn suite_for(name: String, setup_fails: bool, teardown_fails: bool) -> Suite {
    let mut suite = Suite::new(name);
    if setup_fails {
        suite = suite.setup(|_| async { Err(TestError::body("setup broke")) });
    }
    if teardown_fails {
        suite = suite.teardown(|_| async { Err(TestError::body("teardown broke")) });
    }
    suite
}

fn attach(tree: &mut SuiteTree, parent: NodeId, shape: &Shape, index: usize) {
    let name = format!("n{}", index);
    match shape {
        Shape::Pass => {
            tree.add_test(parent, TestUnit::sync(name, |_| Ok(()))).unwrap();
        }
        Shape::Fail => {
            tree.add_test(parent, TestUnit::sync(name, |_| Err("Oops".into())))
                .unwrap();
        }
        Shape::Skip => {
            tree.add_test(parent, TestUnit::sync(name, |_| Ok(())).skipped("not supported"))
                .unwrap();
        }
        Shape::Suite {
            setup_fails,
            teardown_fails,
            children,
        } => {
            let suite = tree
                .add_suite(parent, suite_for(name, *setup_fails, *teardown_fails))
                .unwrap();
            for (i, child) in children.iter().enumerate() {
                attach(tree, suite, child, i);
            }
        }
    }
}

fn build(shape: &Shape) -> SuiteTree {
    let mut tree = SuiteTree::new(Suite::new("root"));
    let root = tree.root();
    attach(&mut tree, root, shape, 0);
    tree
}

fn run(tree: &mut SuiteTree) -> EventLog {
    let bus = Arc::new(EventBus::new());
    let log = EventLog::attach(&bus);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(Engine::new(bus).run(tree));
    log
}

/// Every node id beneath `suite`, suites included
fn descendants(tree: &SuiteTree, suite: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &child in tree.children(suite) {
        out.push(child);
        out.extend(descendants(tree, child));
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn suite_events_bracket_descendants(shape in shape_strategy()) {
        let mut tree = build(&shape);
        let log = run(&mut tree);
        let entries = log.entries();

        for suite in tree.suites().collect::<Vec<_>>() {
            let own = log.positions(tree.tree_id(), suite);
            prop_assert_eq!(own.len(), 2);
            prop_assert_eq!(entries[own[0]].topic.as_str(), "/suite/start");
            prop_assert_eq!(entries[own[1]].topic.as_str(), "/suite/end");

            for node in descendants(&tree, suite) {
                for position in log.positions(tree.tree_id(), node) {
                    prop_assert!(own[0] < position && position < own[1]);
                }
            }
        }
    }

    #[test]
    fn test_events_follow_lifecycle(shape in shape_strategy()) {
        let mut tree = build(&shape);
        let log = run(&mut tree);
        let entries = log.entries();
        let root = tree.root();

        for test in tree.descendant_tests(root) {
            let topics: Vec<&str> = log
                .positions(tree.tree_id(), test)
                .into_iter()
                .map(|i| entries[i].topic.as_str())
                .collect();
            let valid = topics == ["/test/skip"]
                || topics == ["/test/start", "/test/skip"]
                || topics == ["/test/start", "/test/pass", "/test/end"]
                || topics == ["/test/start", "/test/fail", "/test/end"];
            prop_assert!(valid, "unexpected sequence {:?}", topics);
            prop_assert!(tree.test(test).unwrap().is_terminal());
        }
    }

    #[test]
    fn aggregates_stay_consistent(shape in shape_strategy()) {
        let mut tree = build(&shape);
        let _log = run(&mut tree);

        for suite in tree.suites().collect::<Vec<_>>() {
            let view = tree.suite_ref(suite);
            prop_assert_eq!(
                view.num_tests(),
                view.num_failed_tests() + view.num_skipped_tests() + view.num_passed_tests()
            );
            prop_assert_eq!(
                view.has_passed(),
                view.num_failed_tests() == 0 && view.error().is_none()
            );
        }
    }
}
