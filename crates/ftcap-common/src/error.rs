//! Unified error type for the ftcap workspace.
//!
//! Every failure carries enough context to be reported as a single
//! human-readable line: the offending path, the CPU index, or the session
//! state that made an operation illegal.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SessionState;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// An operation was attempted in a session state that does not allow it.
    #[error("cannot {operation} while the trace session is {state}")]
    Precondition {
        /// Operation that was rejected.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// An I/O operation against the kernel or the filesystem failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading or writing one CPU's trace stream failed.
    #[error("I/O error on cpu{cpu} at {path}: {source}")]
    CpuIo {
        /// Logical CPU index of the failing stream.
        cpu: usize,
        /// Path of the stream or destination file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process lacks the privileges needed to drive the kernel tracer.
    #[error("permission denied: {message}")]
    Permission {
        /// Description of the denied operation.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Both the capture window and the final stop failed.
    #[error("{drain}\n\n{stop}")]
    Aggregated {
        /// Failure recorded while draining during the capture window.
        drain: Box<TraceError>,
        /// Failure raised while stopping the session.
        stop: Box<TraceError>,
    },
}

impl TraceError {
    /// Builds an [`TraceError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`TraceError::CpuIo`] for the stream of `cpu`.
    pub fn cpu_io(cpu: usize, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CpuIo {
            cpu,
            path: path.into(),
            source,
        }
    }

    /// Returns the CPU index this error is tagged with, if any.
    ///
    /// For aggregated failures the drain-phase CPU wins, since that is the
    /// failure that ended the capture window.
    #[must_use]
    pub fn cpu(&self) -> Option<usize> {
        match self {
            Self::CpuIo { cpu, .. } => Some(*cpu),
            Self::Aggregated { drain, stop } => drain.cpu().or_else(|| stop.cpu()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_message_keeps_both_failures() {
        let err = TraceError::Aggregated {
            drain: Box::new(TraceError::cpu_io(
                3,
                "/t/per_cpu/cpu3/trace_pipe_raw",
                std::io::Error::other("bad read"),
            )),
            stop: Box::new(TraceError::io(
                "/t/tracing_on",
                std::io::Error::other("bad write"),
            )),
        };
        let msg = err.to_string();
        assert!(msg.contains("cpu3"));
        assert!(msg.contains("bad read"));
        assert!(msg.contains("tracing_on"));
        assert!(msg.contains("bad write"));
        assert!(msg.contains("\n\n"));
        assert_eq!(err.cpu(), Some(3));
    }

    #[test]
    fn precondition_names_operation_and_state() {
        let err = TraceError::Precondition {
            operation: "stop tracing",
            state: SessionState::Idle,
        };
        assert_eq!(
            err.to_string(),
            "cannot stop tracing while the trace session is idle"
        );
        assert_eq!(err.cpu(), None);
    }
}
