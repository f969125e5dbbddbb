//! Console sinks
//!
//! Reporters write leveled lines to a [`ConsoleSink`]. Nested grouping is an
//! optional capability: a sink that supports it returns `Some` from
//! [`ConsoleSink::grouping`], and reporters fall back to flat output otherwise.

use colored::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Severity of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Log,
    Info,
    Warn,
    Error,
}

/// Optional nesting support
pub trait Grouping {
    fn group(&self, name: &str) -> io::Result<()>;
    fn group_end(&self, name: &str) -> io::Result<()>;
}

/// Destination for reporter output
pub trait ConsoleSink: Send + Sync {
    fn write(&self, level: Level, message: &str) -> io::Result<()>;

    fn log(&self, message: &str) -> io::Result<()> {
        self.write(Level::Log, message)
    }

    fn info(&self, message: &str) -> io::Result<()> {
        self.write(Level::Info, message)
    }

    fn warn(&self, message: &str) -> io::Result<()> {
        self.write(Level::Warn, message)
    }

    fn error(&self, message: &str) -> io::Result<()> {
        self.write(Level::Error, message)
    }

    /// Grouping capability, if this sink supports it
    fn grouping(&self) -> Option<&dyn Grouping> {
        None
    }
}

/// Terminal output: log/info to stdout, warn/error to stderr
pub struct TerminalConsole {
    grouping: bool,
    no_color: bool,
    depth: AtomicUsize,
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self {
            grouping: true,
            no_color: false,
            depth: AtomicUsize::new(0),
        }
    }

    /// Disable colored output
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Print flat output with full ids instead of indented groups
    pub fn with_grouping(mut self, grouping: bool) -> Self {
        self.grouping = grouping;
        self
    }

    fn paint(&self, level: Level, message: &str) -> String {
        if self.no_color {
            return message.to_string();
        }
        match level {
            Level::Log => message.normal().to_string(),
            Level::Info => message.green().to_string(),
            Level::Warn => message.yellow().to_string(),
            Level::Error => message.red().to_string(),
        }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth.load(Ordering::Relaxed))
    }
}

impl ConsoleSink for TerminalConsole {
    fn write(&self, level: Level, message: &str) -> io::Result<()> {
        let indent = self.indent();
        let mut text = String::new();
        for line in message.lines() {
            text.push_str(&indent);
            text.push_str(&self.paint(level, line));
            text.push('\n');
        }
        match level {
            Level::Log | Level::Info => io::stdout().lock().write_all(text.as_bytes()),
            Level::Warn | Level::Error => io::stderr().lock().write_all(text.as_bytes()),
        }
    }

    fn grouping(&self) -> Option<&dyn Grouping> {
        if self.grouping {
            Some(self)
        } else {
            None
        }
    }
}

impl Grouping for TerminalConsole {
    fn group(&self, name: &str) -> io::Result<()> {
        let line = if self.no_color {
            name.to_string()
        } else {
            name.bold().to_string()
        };
        writeln!(io::stdout().lock(), "{}{}", self.indent(), line)?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn group_end(&self, _name: &str) -> io::Result<()> {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
        Ok(())
    }
}

/// One call captured by [`RecordingConsole`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Line(Level, String),
    Group(String),
    GroupEnd(String),
}

/// In-memory sink for tests and embedding
#[derive(Debug, Default)]
pub struct RecordingConsole {
    grouping: bool,
    records: Mutex<Vec<Recorded>>,
}

impl RecordingConsole {
    /// A sink without grouping support
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that supports grouping
    pub fn with_grouping() -> Self {
        Self {
            grouping: true,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every line written, ignoring group markers
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Recorded::Line(level, message) => Some((level, message)),
                _ => None,
            })
            .collect()
    }

    /// Messages written at `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    fn push(&self, record: Recorded) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl ConsoleSink for RecordingConsole {
    fn write(&self, level: Level, message: &str) -> io::Result<()> {
        self.push(Recorded::Line(level, message.to_string()));
        Ok(())
    }

    fn grouping(&self) -> Option<&dyn Grouping> {
        if self.grouping {
            Some(self)
        } else {
            None
        }
    }
}

impl Grouping for RecordingConsole {
    fn group(&self, name: &str) -> io::Result<()> {
        self.push(Recorded::Group(name.to_string()));
        Ok(())
    }

    fn group_end(&self, name: &str) -> io::Result<()> {
        self.push(Recorded::GroupEnd(name.to_string()));
        Ok(())
    }
}
