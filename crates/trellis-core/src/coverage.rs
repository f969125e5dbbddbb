//! Coverage payload carried by `/coverage`
//!
//! Per-file maps in the istanbul layout: statement, branch and function hit
//! counters keyed by id, with source ranges in the matching `*Map` tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coverage for a set of files, keyed by path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    pub files: BTreeMap<String, FileCoverage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchMapping {
    pub line: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub locations: Vec<SourceRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMapping {
    pub name: String,
    pub line: u32,
}

/// Counters for a single file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub path: String,
    #[serde(default)]
    pub s: BTreeMap<String, u64>,
    #[serde(default)]
    pub statement_map: BTreeMap<String, SourceRange>,
    #[serde(default)]
    pub b: BTreeMap<String, Vec<u64>>,
    #[serde(default)]
    pub branch_map: BTreeMap<String, BranchMapping>,
    #[serde(default)]
    pub f: BTreeMap<String, u64>,
    #[serde(default)]
    pub fn_map: BTreeMap<String, FunctionMapping>,
}

impl FileCoverage {
    /// Hits per source line, taking the highest statement count starting on each line
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines = BTreeMap::new();
        for (id, range) in &self.statement_map {
            let hits = self.s.get(id).copied().unwrap_or(0);
            let entry = lines.entry(range.start.line).or_insert(0);
            *entry = (*entry).max(hits);
        }
        lines
    }

    /// (covered, total) branch outcomes
    pub fn branch_totals(&self) -> (usize, usize) {
        self.b.values().fold((0, 0), |(covered, total), counts| {
            (
                covered + counts.iter().filter(|&&hits| hits > 0).count(),
                total + counts.len(),
            )
        })
    }

    /// Add the counters of `other`, which must describe the same file
    pub fn merge(&mut self, other: &FileCoverage) {
        for (id, hits) in &other.s {
            *self.s.entry(id.clone()).or_insert(0) += hits;
        }
        for (id, hits) in &other.f {
            *self.f.entry(id.clone()).or_insert(0) += hits;
        }
        for (id, counts) in &other.b {
            let mine = self.b.entry(id.clone()).or_default();
            if mine.len() < counts.len() {
                mine.resize(counts.len(), 0);
            }
            for (slot, hits) in mine.iter_mut().zip(counts) {
                *slot += hits;
            }
        }
        for (id, range) in &other.statement_map {
            self.statement_map.entry(id.clone()).or_insert(*range);
        }
        for (id, mapping) in &other.branch_map {
            self.branch_map
                .entry(id.clone())
                .or_insert_with(|| mapping.clone());
        }
        for (id, mapping) in &other.fn_map {
            self.fn_map
                .entry(id.clone())
                .or_insert_with(|| mapping.clone());
        }
    }
}

impl CoverageMap {
    /// Merge another session's coverage into this one
    pub fn merge(&mut self, other: &CoverageMap) {
        for (path, coverage) in &other.files {
            match self.files.get_mut(path) {
                Some(existing) => existing.merge(coverage),
                None => {
                    self.files.insert(path.clone(), coverage.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> CoverageMap {
        serde_json::from_str(
            r#"{
                "test.js": {
                    "path": "test.js",
                    "s": { "1": 1, "2": 0 },
                    "b": { "1": [1, 0] },
                    "f": {},
                    "fnMap": {},
                    "statementMap": {
                        "1": { "start": { "line": 1, "column": 0 }, "end": { "line": 60, "column": 3 } },
                        "2": { "start": { "line": 4, "column": 2 }, "end": { "line": 4, "column": 9 } }
                    },
                    "branchMap": {
                        "1": { "line": 4, "type": "if", "locations": [] }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parses_istanbul_layout() {
        let map = fixture();
        let file = &map.files["test.js"];
        assert_eq!(file.path, "test.js");
        assert_eq!(file.statement_map["1"].end.line, 60);
        assert_eq!(file.branch_map["1"].kind, "if");
    }

    #[test]
    fn test_line_hits() {
        let map = fixture();
        let hits = map.files["test.js"].line_hits();
        assert_eq!(hits.get(&1), Some(&1));
        assert_eq!(hits.get(&4), Some(&0));
    }

    #[test]
    fn test_merge_adds_counters() {
        let mut map = fixture();
        map.merge(&fixture());
        let file = &map.files["test.js"];
        assert_eq!(file.s["1"], 2);
        assert_eq!(file.b["1"], vec![2, 0]);
        assert_eq!(file.branch_totals(), (1, 2));
    }
}
