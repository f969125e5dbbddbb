//! Shared helpers for engine integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use trellis_core::{topics, EventBus, NodeId, TreeId};

pub const LIFECYCLE_TOPICS: [&str; 7] = [
    topics::SUITE_START,
    topics::SUITE_END,
    topics::TEST_START,
    topics::TEST_PASS,
    topics::TEST_FAIL,
    topics::TEST_SKIP,
    topics::TEST_END,
];

/// One observed lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub topic: String,
    pub tree: TreeId,
    pub node: NodeId,
    pub name: String,
}

/// Records every lifecycle event published on a bus
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = EventLog::default();
        for topic in LIFECYCLE_TOPICS {
            let entries = Arc::clone(&log.entries);
            bus.subscribe(topic, move |event| {
                let entry = match (event.suite(), event.test()) {
                    (Some(suite), _) => Entry {
                        topic: event.topic().to_string(),
                        tree: suite.tree_id(),
                        node: suite.node_id(),
                        name: suite.name().to_string(),
                    },
                    (_, Some(test)) => Entry {
                        topic: event.topic().to_string(),
                        tree: test.tree_id(),
                        node: test.node_id(),
                        name: test.name().to_string(),
                    },
                    _ => return Ok(()),
                };
                entries.lock().unwrap().push(entry);
                Ok(())
            });
        }
        log
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.topic).collect()
    }

    /// `"<topic> <name>"` per event
    pub fn labelled(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|e| format!("{} {}", e.topic, e.name))
            .collect()
    }

    /// Position of every event for `node`
    pub fn positions(&self, tree: TreeId, node: NodeId) -> Vec<usize> {
        self.entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.tree == tree && e.node == node)
            .map(|(i, _)| i)
            .collect()
    }
}
