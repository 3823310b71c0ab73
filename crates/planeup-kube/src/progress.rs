//! Progress reporting for workflow operations
//!
//! The orchestrators and the prober report what they are doing through a
//! `ProgressSink`; rendering is injected by the caller, never hardwired. The
//! console implementation writes styled lines to stderr, the silent one is
//! for tests and `--quiet`.

use std::io::{self, Write};
use std::time::Duration;

use console::style;

/// Where workflow progress goes
pub trait ProgressSink: Send + Sync {
    /// A step's action is about to run
    fn step_started(&self, step: &str);

    /// A step's precondition was already satisfied
    fn step_skipped(&self, step: &str, reason: &str);

    /// A step's action and postcondition completed
    fn step_completed(&self, step: &str);

    /// A step failed; the error is propagated separately
    fn step_failed(&self, step: &str, detail: &str);

    /// Periodic heartbeat during a long wait so it does not appear hung
    fn waiting(&self, what: &str, elapsed: Duration, detail: Option<&str>);

    /// Freeform informational message
    fn info(&self, message: &str);
}

/// Styled stderr output
#[derive(Debug, Clone, Default)]
pub struct ConsoleProgress;

impl ConsoleProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressSink for ConsoleProgress {
    fn step_started(&self, step: &str) {
        let _ = writeln!(io::stderr(), "{} {}", style("▶").cyan().bold(), step);
    }

    fn step_skipped(&self, step: &str, reason: &str) {
        let _ = writeln!(
            io::stderr(),
            "{} {} ({})",
            style("⊘").dim(),
            step,
            style(reason).dim()
        );
    }

    fn step_completed(&self, step: &str) {
        let _ = writeln!(io::stderr(), "{} {}", style("✓").green(), step);
    }

    fn step_failed(&self, step: &str, detail: &str) {
        let _ = writeln!(
            io::stderr(),
            "{} {} - {}",
            style("✗").red().bold(),
            step,
            style(detail).red()
        );
    }

    fn waiting(&self, what: &str, elapsed: Duration, detail: Option<&str>) {
        let detail = detail
            .map(|d| format!(" - {}", style(d).dim()))
            .unwrap_or_default();
        let _ = writeln!(
            io::stderr(),
            "  {} waiting for {} ({}s){}",
            style("⟳").cyan(),
            what,
            elapsed.as_secs(),
            detail
        );
    }

    fn info(&self, message: &str) {
        let _ = writeln!(io::stderr(), "  {} {}", style("ℹ").blue(), message);
    }
}

/// Discards everything
#[derive(Debug, Clone, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn step_started(&self, _step: &str) {}
    fn step_skipped(&self, _step: &str, _reason: &str) {}
    fn step_completed(&self, _step: &str) {}
    fn step_failed(&self, _step: &str, _detail: &str) {}
    fn waiting(&self, _what: &str, _elapsed: Duration, _detail: Option<&str>) {}
    fn info(&self, _message: &str) {}
}
