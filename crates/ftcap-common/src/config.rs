//! Capture configuration model.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, TraceError};
use crate::types::EventId;

/// Immutable description of one capture.
///
/// Construct with [`TraceConfiguration::new`]; every field is validated
/// once there and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceConfiguration {
    trace_root: PathBuf,
    devices_root: PathBuf,
    output_dir: PathBuf,
    buffer_size_kb: u32,
    events: Vec<EventId>,
}

impl TraceConfiguration {
    /// Validates and builds a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Config`] if the buffer size is zero, the event
    /// list is empty, or an event is listed twice.
    pub fn new(
        trace_root: impl Into<PathBuf>,
        devices_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        buffer_size_kb: u32,
        events: Vec<EventId>,
    ) -> Result<Self> {
        if buffer_size_kb == 0 {
            return Err(TraceError::Config {
                message: "buffer size must be greater than zero".into(),
            });
        }
        if events.is_empty() {
            return Err(TraceError::Config {
                message: "at least one event must be selected".into(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = events.iter().find(|e| !seen.insert(e.as_str())) {
            return Err(TraceError::Config {
                message: format!("event {dup} is listed more than once"),
            });
        }

        Ok(Self {
            trace_root: trace_root.into(),
            devices_root: devices_root.into(),
            output_dir: output_dir.into(),
            buffer_size_kb,
            events,
        })
    }

    /// Root of the FTrace control filesystem.
    #[must_use]
    pub fn trace_root(&self) -> &Path {
        &self.trace_root
    }

    /// Root of the sysfs devices tree.
    #[must_use]
    pub fn devices_root(&self) -> &Path {
        &self.devices_root
    }

    /// Directory the final archive is written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Per-CPU kernel buffer size in KB.
    #[must_use]
    pub const fn buffer_size_kb(&self) -> u32 {
        self.buffer_size_kb
    }

    /// Size in bytes of the scratch buffer used for each drain read.
    ///
    /// The buffer size number is reused as a byte count, so the default
    /// of 4096 reads one ring-buffer page at a time.
    #[must_use]
    pub const fn scratch_len(&self) -> usize {
        self.buffer_size_kb as usize
    }

    /// Events to enable, in the order they were given.
    #[must_use]
    pub fn events(&self) -> &[EventId] {
        &self.events
    }
}
