//! Effective privilege check, run before anything touches tracefs.

use ftcap_common::error::{Result, TraceError};

/// Fails unless the process runs with an effective UID of 0.
///
/// # Errors
///
/// Returns [`TraceError::Permission`] when not running as root.
#[cfg(target_os = "linux")]
pub fn ensure_root() -> Result<()> {
    let euid = nix::unistd::geteuid();
    if euid.is_root() {
        return Ok(());
    }
    tracing::debug!(euid = euid.as_raw(), "not running as root");
    Err(TraceError::Permission {
        message: "the trace collector must be run as root in order to access FTrace".into(),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: FTrace only exists on Linux.
#[cfg(not(target_os = "linux"))]
pub fn ensure_root() -> Result<()> {
    Err(TraceError::Permission {
        message: "FTrace capture requires Linux".into(),
    })
}
