//! Copies event format and CPU topology descriptors into the staging tree.
//!
//! Kernel pseudo-files report a size of zero, so every copy is a full
//! read followed by a write rather than a size-driven file copy.

use std::path::{Path, PathBuf};

use ftcap_common::config::TraceConfiguration;
use ftcap_common::constants::{control, layout};
use ftcap_common::error::{Result, TraceError};
use ftcap_common::types::EventId;
use ftcap_core::artifact::ArtifactStager;

/// Stager reading from a live tracefs and sysfs.
#[derive(Debug, Clone)]
pub struct TraceFsStager {
    trace_root: PathBuf,
    devices_root: PathBuf,
    events: Vec<EventId>,
}

impl TraceFsStager {
    /// Creates a stager for the given roots and events.
    pub fn new(
        trace_root: impl Into<PathBuf>,
        devices_root: impl Into<PathBuf>,
        events: Vec<EventId>,
    ) -> Self {
        Self {
            trace_root: trace_root.into(),
            devices_root: devices_root.into(),
            events,
        }
    }

    /// Creates a stager matching a capture configuration.
    #[must_use]
    pub fn from_config(config: &TraceConfiguration) -> Self {
        Self::new(
            config.trace_root(),
            config.devices_root(),
            config.events().to_vec(),
        )
    }

    fn copy_formats(&self, staging_root: &Path) -> Result<()> {
        let out = staging_root.join(layout::FORMATS_DIR);
        let events_root = self.trace_root.join(control::EVENTS_DIR);

        for event in &self.events {
            let rel = Path::new(event.category()).join(event.name());
            let out_dir = out.join(&rel);
            create_dir(&out_dir)?;
            copy_pseudo_file(&events_root.join(&rel).join("format"), &out_dir.join("format"))?;
        }
        copy_pseudo_file(
            &events_root.join(control::HEADER_PAGE),
            &out.join(control::HEADER_PAGE),
        )?;
        tracing::debug!(events = self.events.len(), "event formats staged");
        Ok(())
    }

    fn copy_topology(&self, staging_root: &Path) -> Result<()> {
        let out = staging_root.join(layout::TOPOLOGY_DIR);
        let node_root = self.devices_root.join("system").join("node");
        let mut cpus = 0usize;

        for node in list_dir(&node_root)? {
            let Some(node_name) = indexed_name(&node, "node") else {
                continue;
            };
            for cpu in list_dir(&node)? {
                let Some(cpu_name) = indexed_name(&cpu, "cpu") else {
                    continue;
                };
                let topology = cpu.join("topology");
                if !topology.is_dir() {
                    continue;
                }
                let out_dir = out.join(&node_name).join(&cpu_name).join("topology");
                create_dir(&out_dir)?;
                for file in list_dir(&topology)? {
                    if !file.is_file() {
                        continue;
                    }
                    if let Some(name) = file.file_name() {
                        copy_pseudo_file(&file, &out_dir.join(name))?;
                    }
                }
                cpus += 1;
            }
        }
        tracing::debug!(cpus, "cpu topology staged");
        Ok(())
    }
}

impl ArtifactStager for TraceFsStager {
    fn stage(&self, staging_root: &Path) -> Result<()> {
        self.copy_formats(staging_root)?;
        self.copy_topology(staging_root)?;
        tracing::info!(staging = %staging_root.display(), "descriptors staged");
        Ok(())
    }
}

/// Returns the file name if it is `<prefix><digits>`, e.g. `node0`.
fn indexed_name(path: &Path, prefix: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix(prefix)?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then(|| name.to_string())
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| TraceError::io(dir, e))?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| TraceError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| TraceError::io(dir, e))
}

fn copy_pseudo_file(src: &Path, dst: &Path) -> Result<()> {
    let data = std::fs::read(src).map_err(|e| TraceError::io(src, e))?;
    std::fs::write(dst, data).map_err(|e| TraceError::io(dst, e))
}
