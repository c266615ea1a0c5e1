//! Ownership of the kernel's `free_buffer` handle.
//!
//! While the handle is open the kernel keeps the ring buffer. Once the
//! session has set `disable_on_free`, closing the handle both clears the
//! buffer and switches tracing off, which is also what happens if the
//! process dies with the handle still open.

use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque open handle; only its lifetime matters.
pub type OpaqueHandle = Box<dyn Send>;

/// Exclusive owner of the open buffer-clear handle.
///
/// Releasing is explicit through [`BufferClearGuard::release`] and happens
/// at most once; dropping an unreleased guard releases it.
pub struct BufferClearGuard {
    path: PathBuf,
    handle: Option<OpaqueHandle>,
}

impl BufferClearGuard {
    /// Wraps an already-open handle to the control file at `path`.
    pub fn new(path: impl Into<PathBuf>, handle: OpaqueHandle) -> Self {
        let path = path.into();
        tracing::debug!(path = %path.display(), "buffer clear guard acquired");
        Self {
            path,
            handle: Some(handle),
        }
    }

    /// Closes the handle, letting the kernel clear the ring buffer.
    ///
    /// Returns `true` if this call closed the handle and `false` if it had
    /// already been released.
    pub fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                drop(handle);
                tracing::debug!(path = %self.path.display(), "buffer clear guard released");
                true
            }
            None => false,
        }
    }

    /// Whether the handle is still open.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Path of the guarded control file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for BufferClearGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferClearGuard")
            .field("path", &self.path)
            .field("held", &self.is_held())
            .finish()
    }
}

impl Drop for BufferClearGuard {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
