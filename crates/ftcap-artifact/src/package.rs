//! Packs the staging tree into a gzip-compressed tar archive.
//!
//! Entries are stored at paths relative to the staging root in sorted
//! order. Directories get mode `0755` and files `0644`, whatever the
//! staging tree's own permissions are.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use ftcap_common::error::{Result, TraceError};
use ftcap_core::artifact::ArchivePackager;

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Writes `trace.tar.gz`-style archives with `tar` and `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct TarGzPackager {
    compression: Compression,
}

impl TarGzPackager {
    /// Creates a packager with the given gzip level.
    #[must_use]
    pub const fn new(compression: Compression) -> Self {
        Self { compression }
    }
}

impl Default for TarGzPackager {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl ArchivePackager for TarGzPackager {
    fn package(&self, staging_root: &Path, archive_path: &Path) -> Result<()> {
        let file = File::create(archive_path).map_err(|e| TraceError::io(archive_path, e))?;
        let encoder = GzEncoder::new(file, self.compression);
        let mut builder = tar::Builder::new(encoder);

        let mut entries = 0usize;
        append_tree(&mut builder, staging_root, Path::new(""), &mut entries)?;

        let encoder = builder
            .into_inner()
            .map_err(|e| TraceError::io(archive_path, e))?;
        let file = encoder
            .finish()
            .map_err(|e| TraceError::io(archive_path, e))?;
        file.sync_all()
            .map_err(|e| TraceError::io(archive_path, e))?;
        drop(file);
        make_world_readable(archive_path)?;

        tracing::info!(archive = %archive_path.display(), entries, "archive written");
        Ok(())
    }
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    rel: &Path,
    entries: &mut usize,
) -> Result<()> {
    let dir = root.join(rel);
    let mut children = std::fs::read_dir(&dir)
        .map_err(|e| TraceError::io(&dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| TraceError::io(&dir, e))?;
    children.sort_by_key(std::fs::DirEntry::file_name);

    for child in children {
        let path = child.path();
        let rel_child = rel.join(child.file_name());
        let meta = std::fs::metadata(&path).map_err(|e| TraceError::io(&path, e))?;

        let mut header = tar::Header::new_gnu();
        header.set_metadata(&meta);
        if meta.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(DIR_MODE);
            builder
                .append_data(&mut header, &rel_child, std::io::empty())
                .map_err(|e| TraceError::io(&path, e))?;
            *entries += 1;
            append_tree(builder, root, &rel_child, entries)?;
        } else if meta.is_file() {
            header.set_mode(FILE_MODE);
            let file = File::open(&path).map_err(|e| TraceError::io(&path, e))?;
            builder
                .append_data(&mut header, &rel_child, file)
                .map_err(|e| TraceError::io(&path, e))?;
            *entries += 1;
        } else {
            tracing::debug!(path = %path.display(), "skipping special file");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_world_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))
        .map_err(|e| TraceError::io(path, e))
}

#[cfg(not(unix))]
fn make_world_readable(_path: &Path) -> Result<()> {
    Ok(())
}
