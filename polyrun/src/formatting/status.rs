//! Status indicators and message formatting.

use owo_colors::OwoColorize;
use polyrun_core::{Severity, Summary};

#[derive(Debug, Clone, Copy)]
pub enum Indicator {
    Success,
    Error,
    Warning,
    Info,
    Skipped,
}

impl From<Severity> for Indicator {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Skipped => Indicator::Skipped,
            Severity::Pending => Indicator::Info,
            Severity::Success => Indicator::Success,
            Severity::Warning => Indicator::Warning,
            Severity::Failure => Indicator::Error,
        }
    }
}

impl Indicator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Indicator::Success => "✓",
            Indicator::Error => "✗",
            Indicator::Warning => "⚠",
            Indicator::Info => "→",
            Indicator::Skipped => "-",
        }
    }

    pub fn color(&self) -> comfy_table::Color {
        match self {
            Indicator::Success => comfy_table::Color::Green,
            Indicator::Error => comfy_table::Color::Red,
            Indicator::Warning => comfy_table::Color::Yellow,
            Indicator::Info => comfy_table::Color::Cyan,
            Indicator::Skipped => comfy_table::Color::DarkGrey,
        }
    }

    fn colored_symbol(&self) -> String {
        match self {
            Indicator::Success => self.symbol().green().to_string(),
            Indicator::Error => self.symbol().red().to_string(),
            Indicator::Warning => self.symbol().yellow().to_string(),
            Indicator::Info => self.symbol().cyan().to_string(),
            Indicator::Skipped => self.symbol().bright_black().to_string(),
        }
    }

    /// Formats a message with the symbol, both in this indicator's color.
    pub fn format(&self, message: &str) -> String {
        format!("{} {}", self.colored_symbol(), self.colorize_text(message))
    }

    fn colorize_text(&self, text: &str) -> String {
        match self {
            Indicator::Success => text.green().bold().to_string(),
            Indicator::Error => text.red().bold().to_string(),
            Indicator::Warning => text.yellow().bold().to_string(),
            Indicator::Info => text.cyan().to_string(),
            Indicator::Skipped => text.bright_black().to_string(),
        }
    }
}

pub fn print_success(message: &str) {
    println!("  {}", Indicator::Success.format(message));
}

pub fn print_error(message: &str) {
    println!("  {}", Indicator::Error.format(message));
}

pub fn print_warning(message: &str) {
    println!("  {}", Indicator::Warning.format(message));
}

/// Prints the pass/fail line of a run; shown at every log level.
pub fn print_verdict(summary: &Summary) {
    let indicator = Indicator::from(summary.overall.max(Severity::Success));
    println!("  {}", indicator.format(&summary.verdict()));
}
