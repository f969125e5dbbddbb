//! Cobertura coverage reporter
//!
//! Collects `/coverage` payloads from every session, merges their hit
//! counters, and writes a single Cobertura XML document when stopped.

use crate::{ReporterError, ReporterResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use trellis_core::{topics, CoverageMap, Event, FileCoverage, HandlerResult, Reporter};

/// Output file used when none is configured
pub const DEFAULT_OUTPUT: &str = "cobertura-coverage.xml";

/// Document-level counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoberturaTotals {
    pub files: usize,
    pub lines_valid: usize,
    pub lines_covered: usize,
    pub branches_valid: usize,
    pub branches_covered: usize,
}

impl CoberturaTotals {
    pub fn of(coverage: &CoverageMap) -> Self {
        let mut totals = CoberturaTotals::default();
        for file in coverage.files.values() {
            totals.add(&CoberturaTotals::of_file(file));
        }
        totals
    }

    fn of_file(file: &FileCoverage) -> Self {
        let lines = file.line_hits();
        let (branches_covered, branches_valid) = file.branch_totals();
        CoberturaTotals {
            files: 1,
            lines_valid: lines.len(),
            lines_covered: lines.values().filter(|&&hits| hits > 0).count(),
            branches_valid,
            branches_covered,
        }
    }

    fn add(&mut self, other: &CoberturaTotals) {
        self.files += other.files;
        self.lines_valid += other.lines_valid;
        self.lines_covered += other.lines_covered;
        self.branches_valid += other.branches_valid;
        self.branches_covered += other.branches_covered;
    }

    pub fn line_rate(&self) -> String {
        rate(self.lines_covered, self.lines_valid)
    }

    pub fn branch_rate(&self) -> String {
        rate(self.branches_covered, self.branches_valid)
    }
}

fn rate(covered: usize, valid: usize) -> String {
    let ratio = if valid == 0 {
        1.0
    } else {
        covered as f64 / valid as f64
    };
    format!("{:.4}", ratio)
}

/// Directory a file is grouped under; `.` for top-level files
fn package_name(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

fn class_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Render `coverage` as a Cobertura document
pub fn render(coverage: &CoverageMap, timestamp: u128) -> ReporterResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let totals = CoberturaTotals::of(coverage);
    let mut root = BytesStart::new("coverage");
    root.extend_attributes([
        ("lines-valid", totals.lines_valid.to_string().as_str()),
        ("lines-covered", totals.lines_covered.to_string().as_str()),
        ("line-rate", totals.line_rate().as_str()),
        ("branches-valid", totals.branches_valid.to_string().as_str()),
        ("branches-covered", totals.branches_covered.to_string().as_str()),
        ("branch-rate", totals.branch_rate().as_str()),
        ("timestamp", timestamp.to_string().as_str()),
        ("complexity", "0"),
        ("version", "0.1"),
    ]);
    writer.write_event(XmlEvent::Start(root))?;

    writer.write_event(XmlEvent::Start(BytesStart::new("sources")))?;
    writer.write_event(XmlEvent::Start(BytesStart::new("source")))?;
    writer.write_event(XmlEvent::Text(BytesText::new(".")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("source")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("sources")))?;

    let mut packages: BTreeMap<String, Vec<&FileCoverage>> = BTreeMap::new();
    for (path, file) in &coverage.files {
        packages.entry(package_name(path)).or_default().push(file);
    }

    writer.write_event(XmlEvent::Start(BytesStart::new("packages")))?;
    for (name, files) in &packages {
        write_package(&mut writer, name, files)?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new("packages")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("coverage")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn write_package<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    files: &[&FileCoverage],
) -> ReporterResult<()> {
    let mut totals = CoberturaTotals::default();
    for file in files {
        totals.add(&CoberturaTotals::of_file(file));
    }

    let mut tag = BytesStart::new("package");
    tag.extend_attributes([
        ("name", name),
        ("line-rate", totals.line_rate().as_str()),
        ("branch-rate", totals.branch_rate().as_str()),
    ]);
    writer.write_event(XmlEvent::Start(tag))?;
    writer.write_event(XmlEvent::Start(BytesStart::new("classes")))?;
    for file in files {
        write_class(writer, file)?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new("classes")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("package")))?;
    Ok(())
}

fn write_class<W: Write>(writer: &mut Writer<W>, file: &FileCoverage) -> ReporterResult<()> {
    let totals = CoberturaTotals::of_file(file);
    let mut tag = BytesStart::new("class");
    tag.extend_attributes([
        ("name", class_name(&file.path).as_str()),
        ("filename", file.path.as_str()),
        ("line-rate", totals.line_rate().as_str()),
        ("branch-rate", totals.branch_rate().as_str()),
    ]);
    writer.write_event(XmlEvent::Start(tag))?;

    writer.write_event(XmlEvent::Start(BytesStart::new("methods")))?;
    for (id, function) in &file.fn_map {
        let hits = file.f.get(id).copied().unwrap_or(0);
        let mut method = BytesStart::new("method");
        method.extend_attributes([
            ("name", function.name.as_str()),
            ("hits", hits.to_string().as_str()),
            ("signature", "()V"),
        ]);
        writer.write_event(XmlEvent::Start(method))?;
        writer.write_event(XmlEvent::Start(BytesStart::new("lines")))?;
        let mut line = BytesStart::new("line");
        line.extend_attributes([
            ("number", function.line.to_string().as_str()),
            ("hits", hits.to_string().as_str()),
        ]);
        writer.write_event(XmlEvent::Empty(line))?;
        writer.write_event(XmlEvent::End(BytesEnd::new("lines")))?;
        writer.write_event(XmlEvent::End(BytesEnd::new("method")))?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new("methods")))?;

    let mut branches: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for (id, mapping) in &file.branch_map {
        if let Some(counts) = file.b.get(id) {
            let entry = branches.entry(mapping.line).or_insert((0, 0));
            entry.0 += counts.iter().filter(|&&hits| hits > 0).count();
            entry.1 += counts.len();
        }
    }

    writer.write_event(XmlEvent::Start(BytesStart::new("lines")))?;
    for (number, hits) in file.line_hits() {
        let mut line = BytesStart::new("line");
        line.extend_attributes([
            ("number", number.to_string().as_str()),
            ("hits", hits.to_string().as_str()),
        ]);
        match branches.get(&number) {
            Some(&(covered, total)) if total > 0 => {
                let condition = format!("{}% ({}/{})", covered * 100 / total, covered, total);
                line.extend_attributes([
                    ("branch", "true"),
                    ("condition-coverage", condition.as_str()),
                ]);
            }
            _ => line.push_attribute(("branch", "false")),
        }
        writer.write_event(XmlEvent::Empty(line))?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new("lines")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("class")))?;
    Ok(())
}

pub struct CoberturaReporter {
    output: PathBuf,
    coverage: Mutex<CoverageMap>,
}

impl CoberturaReporter {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            coverage: Mutex::new(CoverageMap::default()),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Coverage merged so far
    pub fn coverage(&self) -> CoverageMap {
        self.coverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write the merged coverage to the output path
    pub fn write(&self) -> ReporterResult<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let xml = render(&self.coverage(), timestamp)?;
        fs::write(&self.output, xml).map_err(|source| ReporterError::Io {
            path: self.output.clone(),
            source,
        })?;
        debug!(path = %self.output.display(), "wrote cobertura report");
        Ok(())
    }
}

impl Reporter for CoberturaReporter {
    fn name(&self) -> &str {
        "cobertura"
    }

    fn topics(&self) -> &[&'static str] {
        &[topics::COVERAGE]
    }

    fn on_event(&self, event: &Event<'_>) -> HandlerResult {
        if let Event::Coverage {
            session_id,
            coverage,
        } = event
        {
            debug!(session = %session_id, files = coverage.files.len(), "collected coverage");
            self.coverage
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .merge(coverage);
        }
        Ok(())
    }

    fn stop(&self) -> HandlerResult {
        Ok(self.write()?)
    }
}
