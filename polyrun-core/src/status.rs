//! Per-workspace outcome tracking and run summaries.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing::Level;

/// Ordered outcome of the work done for a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum Severity {
    #[default]
    Skipped = -2,
    Pending = -1,
    Success = 0,
    Warning = 1,
    Failure = 2,
}

impl Severity {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Skipped => "skipped",
            Severity::Pending => "pending",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }

    /// The log level a line of this severity is printed at.
    #[inline]
    pub fn level(&self) -> Level {
        match self {
            Severity::Skipped => Level::DEBUG,
            Severity::Pending | Severity::Success => Level::INFO,
            Severity::Warning => Level::WARN,
            Severity::Failure => Level::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Default)]
struct StatusState {
    severity: Severity,
    detail: String,
}

/// Latest outcome of a workspace; last write wins.
#[derive(Debug, Default)]
pub struct Status {
    state: Mutex<StatusState>,
}

impl Status {
    fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the severity and, when given, the detail text.
    pub fn set(&self, severity: Severity, detail: Option<&str>) {
        let mut state = self.lock();
        state.severity = severity;
        if let Some(detail) = detail {
            state.detail = detail.to_string();
        }
    }

    pub fn severity(&self) -> Severity {
        self.lock().severity
    }

    pub fn detail(&self) -> String {
        self.lock().detail.clone()
    }
}

/// One rendered entry of a [`Summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryLine {
    pub name: String,
    pub severity: Severity,
    pub detail: String,
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{:<8} {}", self.severity, self.name)
        } else {
            write!(f, "{:<8} {}: {}", self.severity, self.name, self.detail)
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub lines: Vec<SummaryLine>,
    pub overall: Severity,
}

impl Summary {
    /// Only `failure` fails the run; warnings are reported but pass.
    #[inline]
    pub fn is_failure(&self) -> bool {
        self.overall >= Severity::Failure
    }

    #[inline]
    pub fn exit_code(&self) -> i32 {
        if self.is_failure() {
            1
        } else {
            0
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.lines.iter().filter(|l| l.severity == severity).count()
    }

    /// Lines to print under the active log level.
    ///
    /// When no entry would log at `filter`, the per-workspace lines are
    /// dropped entirely.
    pub fn visible_lines(&self, filter: LevelFilter) -> &[SummaryLine] {
        if self.lines.iter().any(|l| filter >= l.severity.level()) {
            &self.lines
        } else {
            &[]
        }
    }

    /// The final pass/fail line, printed regardless of log level.
    pub fn verdict(&self) -> String {
        let failed = self.count(Severity::Failure);
        let warned = self.count(Severity::Warning);
        if self.is_failure() {
            format!("{} of {} workspaces failed", failed, self.lines.len())
        } else if warned > 0 {
            format!("Completed with {} warning(s)", warned)
        } else {
            "All workspaces completed successfully".to_string()
        }
    }

    /// Renders the visible lines followed by the verdict.
    pub fn render(&self, filter: LevelFilter) -> Vec<String> {
        self.visible_lines(filter)
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(self.verdict()))
            .collect()
    }
}

/// Builds a summary from `(name, status)` entries.
pub fn summarize<'a, I>(entries: I) -> Summary
where
    I: IntoIterator<Item = (&'a str, &'a Status)>,
{
    let lines: Vec<SummaryLine> = entries
        .into_iter()
        .map(|(name, status)| {
            let state = status.lock();
            SummaryLine {
                name: name.to_string(),
                severity: state.severity,
                detail: state.detail.clone(),
            }
        })
        .collect();
    let overall = lines
        .iter()
        .map(|l| l.severity)
        .max()
        .unwrap_or(Severity::Skipped);
    Summary { lines, overall }
}
