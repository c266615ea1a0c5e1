//! Seams to the collaborators that build the capture artifact.
//!
//! The session calls a stager once configuration succeeded and before
//! tracing starts, and a packager once the session has stopped.
//! Implementations live in `ftcap-artifact`.

use std::path::Path;

use ftcap_common::error::Result;

/// Copies format and topology descriptors into the staging tree.
pub trait ArtifactStager {
    /// Populates `staging_root` with `formats/` and `topology/`.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor cannot be read or written.
    fn stage(&self, staging_root: &Path) -> Result<()>;
}

/// Packs a finished staging tree into the final archive.
pub trait ArchivePackager {
    /// Writes everything under `staging_root` into `archive_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written.
    fn package(&self, staging_root: &Path, archive_path: &Path) -> Result<()>;
}
