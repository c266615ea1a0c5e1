//! System-wide constants, default paths, and kernel control file names.

use std::time::Duration;

/// Default mount point of the FTrace control filesystem.
pub const DEFAULT_KERNEL_TRACE_ROOT: &str = "/sys/kernel/debug/tracing";

/// Default root of the sysfs devices tree.
pub const DEFAULT_KERNEL_DEVICES_ROOT: &str = "/sys/devices";

/// Default per-CPU ring buffer size in kilobytes.
pub const DEFAULT_BUFFER_SIZE_KB: u32 = 4096;

/// Scheduler events collected when none are requested explicitly.
pub const DEFAULT_EVENTS: [&str; 4] = [
    "sched:sched_switch",
    "sched:sched_wakeup",
    "sched:sched_wakeup_new",
    "sched:sched_migrate_task",
];

/// Interval between two drain passes during the capture window.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// File name of the final archive inside the output directory.
pub const ARCHIVE_NAME: &str = "trace.tar.gz";

/// Application name used in CLI output.
pub const APP_NAME: &str = "ftcap";

/// Kernel control files, relative to the trace root.
pub mod control {
    /// Global on/off switch for recording.
    pub const TRACING_ON: &str = "tracing_on";
    /// Handle whose closing frees (and, with `disable_on_free`, halts) the buffer.
    pub const FREE_BUFFER: &str = "free_buffer";
    /// Active tracer plugin.
    pub const CURRENT_TRACER: &str = "current_tracer";
    /// Tracer option switches.
    pub const TRACE_OPTIONS: &str = "trace_options";
    /// Per-CPU ring buffer size in KB.
    pub const BUFFER_SIZE_KB: &str = "buffer_size_kb";
    /// Event selection list.
    pub const SET_EVENT: &str = "set_event";
    /// Directory holding per-event format descriptors.
    pub const EVENTS_DIR: &str = "events";
    /// Ring buffer page header descriptor, under [`EVENTS_DIR`].
    pub const HEADER_PAGE: &str = "header_page";

    /// Tracer plugin that records events only.
    pub const NOP_TRACER: &str = "nop";
    /// Option that stops tracing when the free-buffer handle is closed.
    pub const DISABLE_ON_FREE: &str = "disable_on_free";

    /// Path of the raw ring buffer pipe for `cpu`, relative to the trace root.
    #[must_use]
    pub fn trace_pipe_raw(cpu: usize) -> String {
        format!("per_cpu/cpu{cpu}/trace_pipe_raw")
    }
}

/// Directory names inside the staging tree.
pub mod layout {
    /// Event format descriptors.
    pub const FORMATS_DIR: &str = "formats";
    /// CPU topology descriptors.
    pub const TOPOLOGY_DIR: &str = "topology";
    /// Raw per-CPU trace data.
    pub const TRACES_DIR: &str = "traces";

    /// File name of the raw trace for `cpu` inside [`TRACES_DIR`].
    #[must_use]
    pub fn trace_file(cpu: usize) -> String {
        format!("cpu{cpu}")
    }
}
