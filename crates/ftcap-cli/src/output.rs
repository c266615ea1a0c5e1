//! Human-readable and JSON rendering of a finished capture.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ftcap_core::session::CaptureSummary;
use serde::Serialize;

const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Everything reported about one successful capture.
#[derive(Debug, Serialize)]
pub struct CaptureReport {
    /// Where the archive was written.
    pub archive: PathBuf,
    /// When tracing was started.
    pub started_at: DateTime<Utc>,
    /// Per-CPU byte counts and timing.
    #[serde(flatten)]
    pub summary: CaptureSummary,
}

impl CaptureReport {
    /// Prints the report to stdout as one JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized.
    #[allow(clippy::print_stdout)]
    pub fn print_json(&self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }

    /// Prints a short human summary to stderr.
    #[allow(clippy::print_stderr)]
    pub fn print_human(&self) {
        let s = &self.summary;
        eprintln!();
        if s.interrupted {
            eprintln!("  {YELLOW}Capture interrupted{RESET} after {}", format_millis(s.elapsed_ms));
        } else {
            eprintln!("  {GREEN}Capture complete{RESET} in {}", format_millis(s.elapsed_ms));
        }
        eprintln!(
            "  {} across {} CPUs in {} drain passes",
            format_bytes(s.total_bytes()),
            s.cpus.len(),
            s.ticks
        );
        for cpu in &s.cpus {
            eprintln!("    cpu{:<4} {:>10}", cpu.cpu, format_bytes(cpu.bytes));
        }
        eprintln!("  Archive: {BOLD}{}{RESET}", self.archive.display());
    }
}

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats milliseconds as seconds once past one second.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_millis(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}
