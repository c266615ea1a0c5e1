//! Temporary staging tree, removed when dropped.

use std::path::Path;

use ftcap_common::constants::APP_NAME;
use ftcap_common::error::{Result, TraceError};

/// Owns the scratch directory a capture is assembled in.
#[derive(Debug)]
pub struct StagingDir {
    dir: tempfile::TempDir,
}

impl StagingDir {
    /// Creates a fresh staging directory under the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{APP_NAME}-"))
            .tempdir()
            .map_err(|e| TraceError::io(std::env::temp_dir(), e))?;
        tracing::debug!(path = %dir.path().display(), "staging directory created");
        Ok(Self { dir })
    }

    /// Path of the staging root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the tree, reporting failures instead of ignoring them.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| TraceError::io(path, e))
    }
}
