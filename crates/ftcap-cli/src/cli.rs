//! Command-line flags and their conversion into a capture configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ftcap_common::config::TraceConfiguration;
use ftcap_common::constants::{
    DEFAULT_BUFFER_SIZE_KB, DEFAULT_EVENTS, DEFAULT_KERNEL_DEVICES_ROOT, DEFAULT_KERNEL_TRACE_ROOT,
};
use ftcap_common::types::EventId;

/// Capture FTrace scheduling events into a portable archive.
#[derive(Parser, Debug)]
#[command(name = "ftcap", version, about, long_about = None)]
pub struct Cli {
    /// Directory the archive is written to; created if missing.
    #[arg(long)]
    pub out: PathBuf,

    /// Length of the capture window in seconds.
    #[arg(
        long = "capture_seconds",
        alias = "capture-seconds",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub capture_seconds: u64,

    /// Per-CPU ring buffer size in KiB.
    #[arg(
        long = "buffer_size",
        alias = "buffer-size",
        default_value_t = DEFAULT_BUFFER_SIZE_KB,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub buffer_size: u32,

    /// Comma-separated `category:event` list to enable.
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_event,
        default_values_t = default_events()
    )]
    pub events: Vec<EventId>,

    /// Root of the FTrace control filesystem.
    #[arg(
        long = "kernel_trace_root",
        alias = "kernel-trace-root",
        default_value = DEFAULT_KERNEL_TRACE_ROOT
    )]
    pub kernel_trace_root: PathBuf,

    /// Root of the sysfs devices tree.
    #[arg(
        long = "kernel_devices_root",
        alias = "kernel-devices-root",
        default_value = DEFAULT_KERNEL_DEVICES_ROOT
    )]
    pub kernel_devices_root: PathBuf,

    /// Drain CPU buffers on parallel threads.
    #[arg(long)]
    pub parallel_drain: bool,

    /// Print the capture summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Capture window as a duration.
    #[must_use]
    pub const fn capture_window(&self) -> Duration {
        Duration::from_secs(self.capture_seconds)
    }

    /// Builds the validated session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the flags describe an invalid configuration.
    pub fn to_config(&self) -> anyhow::Result<TraceConfiguration> {
        Ok(TraceConfiguration::new(
            &self.kernel_trace_root,
            &self.kernel_devices_root,
            &self.out,
            self.buffer_size,
            self.events.clone(),
        )?)
    }
}

/// Exit status for a flag-parsing outcome: `1` for usage errors, `0` for
/// `--help` and `--version`.
#[must_use]
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    i32::from(err.use_stderr())
}

fn parse_event(raw: &str) -> Result<EventId, String> {
    EventId::parse(raw).map_err(|e| e.to_string())
}

fn default_events() -> Vec<EventId> {
    DEFAULT_EVENTS
        .iter()
        .filter_map(|raw| EventId::parse(*raw).ok())
        .collect()
}
