//! Kernel tracing control surface.
//!
//! [`TraceControl`] is the seam between the session state machine and the
//! tracefs control files. [`TraceFs`] is the production implementation,
//! rooted at the configured trace root. Nothing here retries: a failed
//! control write is reported as is and the caller decides what happens next.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use ftcap_common::constants::control;
use ftcap_common::error::{Result, TraceError};
use ftcap_common::types::EventId;

use crate::guard::BufferClearGuard;

/// Readable end of one CPU's raw ring buffer.
pub type RawStream = Box<dyn Read + Send>;

/// Operations the session needs from the kernel tracer.
pub trait TraceControl {
    /// Overwrites the control file at `relative` (under the trace root)
    /// with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Io`] if the file cannot be opened for writing
    /// or the kernel accepts fewer bytes than were written.
    fn write_control(&self, relative: &str, value: &str) -> Result<()>;

    /// Replaces the enabled event set with `events`, written one per line
    /// through a single handle on `set_event`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Io`] naming the event whose write failed.
    fn enable_events(&self, events: &[EventId]) -> Result<()>;

    /// Opens the raw ring buffer of `cpu` without blocking semantics.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::CpuIo`] if the CPU has no stream or the open fails.
    fn open_raw_stream(&self, cpu: usize) -> Result<RawStream>;

    /// Opens the `free_buffer` handle that keeps the ring buffer alive.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Io`] if the handle cannot be opened.
    fn open_clear_guard(&self) -> Result<BufferClearGuard>;

    /// Number of CPUs currently online.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot report its CPU count.
    fn online_cpus(&self) -> Result<usize>;
}

/// Production [`TraceControl`] backed by a mounted tracefs.
#[derive(Debug, Clone)]
pub struct TraceFs {
    root: PathBuf,
}

impl TraceFs {
    /// Creates a controller for the tracefs mounted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn open_for_write(&self, relative: &str) -> Result<(File, PathBuf)> {
        let path = self.root.join(relative);
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| TraceError::io(&path, e))?;
        Ok((file, path))
    }
}

impl TraceControl for TraceFs {
    fn write_control(&self, relative: &str, value: &str) -> Result<()> {
        let (mut file, path) = self.open_for_write(relative)?;
        write_value(&mut file, &path, value)?;
        tracing::debug!(file = relative, value, "control written");
        Ok(())
    }

    fn enable_events(&self, events: &[EventId]) -> Result<()> {
        let (mut file, path) = self.open_for_write(control::SET_EVENT)?;
        for event in events {
            let line = format!("{event}\n");
            write_whole(&mut file, line.as_bytes()).map_err(|e| {
                TraceError::io(
                    &path,
                    io::Error::new(e.kind(), format!("failed to enable {event}: {e}")),
                )
            })?;
            tracing::debug!(%event, "event enabled");
        }
        Ok(())
    }

    fn open_raw_stream(&self, cpu: usize) -> Result<RawStream> {
        let path = self.root.join(control::trace_pipe_raw(cpu));
        let file = open_nonblocking(&path).map_err(|e| TraceError::cpu_io(cpu, &path, e))?;
        Ok(Box::new(file))
    }

    fn open_clear_guard(&self) -> Result<BufferClearGuard> {
        let path = self.root.join(control::FREE_BUFFER);
        let file = File::open(&path).map_err(|e| TraceError::io(&path, e))?;
        Ok(BufferClearGuard::new(path, Box::new(file)))
    }

    fn online_cpus(&self) -> Result<usize> {
        online_cpu_count()
    }
}

/// Writes `value` to an opened control file at `path`.
fn write_value<W: Write>(out: &mut W, path: &Path, value: &str) -> Result<()> {
    write_whole(out, value.as_bytes()).map_err(|e| TraceError::io(path, e))
}

/// Issues exactly one `write(2)`; control files treat a partial write as
/// a different value, so a short count is an error rather than a retry.
fn write_whole<W: Write>(out: &mut W, data: &[u8]) -> io::Result<()> {
    let written = out.write(data)?;
    if written == data.len() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {written} of {} bytes", data.len()),
        ))
    }
}

#[cfg(target_os = "linux")]
fn open_nonblocking(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_nonblocking(_path: &Path) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "FTrace ring buffers are only available on Linux",
    ))
}

#[cfg(target_os = "linux")]
fn online_cpu_count() -> Result<usize> {
    use nix::unistd::{SysconfVar, sysconf};

    let source = "sysconf(_SC_NPROCESSORS_ONLN)";
    match sysconf(SysconfVar::_NPROCESSORS_ONLN) {
        Ok(Some(n)) if n > 0 => usize::try_from(n).map_err(|_| TraceError::Config {
            message: format!("{source} returned {n}"),
        }),
        Ok(_) => Err(TraceError::Config {
            message: format!("{source} reported no online CPUs"),
        }),
        Err(errno) => Err(TraceError::io(source, io::Error::from(errno))),
    }
}

#[cfg(not(target_os = "linux"))]
fn online_cpu_count() -> Result<usize> {
    Err(TraceError::Config {
        message: "Linux required to enumerate trace CPUs".into(),
    })
}
