//! Per-CPU ring buffer draining.
//!
//! Each [`CpuDrainer`] owns one non-blocking kernel stream and the file it
//! is copied into. A drain pass reads until the kernel has nothing more to
//! offer right now; "no data" (`0` or `EAGAIN`) ends the pass quietly and
//! is never an error.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use ftcap_common::constants::{control, layout};
use ftcap_common::error::{Result, TraceError};

use crate::kernel::{RawStream, TraceControl};

/// Writable destination of one CPU's raw pages.
pub type TraceSink = Box<dyn Write + Send>;

/// One CPU's input stream and destination file.
pub struct CpuDrainer {
    cpu: usize,
    input: RawStream,
    input_path: PathBuf,
    output: TraceSink,
    output_path: PathBuf,
    scratch: Vec<u8>,
    bytes: u64,
}

impl CpuDrainer {
    /// Creates (or truncates) `output_path` and pairs it with `input`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::CpuIo`] if the destination cannot be created.
    pub fn new(
        cpu: usize,
        input: RawStream,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        scratch_len: usize,
    ) -> Result<Self> {
        let output_path = output_path.into();
        let output = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&output_path)
            .map_err(|e| TraceError::cpu_io(cpu, &output_path, e))?;
        Ok(Self::with_output(
            cpu,
            input,
            input_path,
            Box::new(output),
            output_path,
            scratch_len,
        ))
    }

    /// Pairs `input` with an already opened destination.
    pub fn with_output(
        cpu: usize,
        input: RawStream,
        input_path: impl Into<PathBuf>,
        output: TraceSink,
        output_path: impl Into<PathBuf>,
        scratch_len: usize,
    ) -> Self {
        Self {
            cpu,
            input,
            input_path: input_path.into(),
            output,
            output_path: output_path.into(),
            scratch: vec![0; scratch_len.max(1)],
            bytes: 0,
        }
    }

    /// Copies everything currently available on the stream.
    ///
    /// Returns the number of bytes appended during this pass.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::CpuIo`] on a failed read or on a write that
    /// could not be completed.
    pub fn drain(&mut self) -> Result<u64> {
        let mut pass = 0u64;
        loop {
            let n = match self.input.read(&mut self.scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TraceError::cpu_io(self.cpu, &self.input_path, e)),
            };
            self.output
                .write_all(&self.scratch[..n])
                .map_err(|e| TraceError::cpu_io(self.cpu, &self.output_path, e))?;
            pass += n as u64;
        }
        self.bytes += pass;
        if pass > 0 {
            tracing::trace!(cpu = self.cpu, bytes = pass, "drained");
        }
        Ok(pass)
    }

    /// Logical CPU index.
    #[must_use]
    pub const fn cpu(&self) -> usize {
        self.cpu
    }

    /// Total bytes written to the destination so far.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Destination file path.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// All CPU drainers of one capture, keyed by CPU index.
///
/// Dropping the collection closes every stream and destination file.
#[derive(Default)]
pub struct CpuStreams {
    drainers: BTreeMap<usize, CpuDrainer>,
}

impl CpuStreams {
    /// Opens one stream pair for each CPU in `0..cpus`, writing into
    /// `traces_dir/cpu<N>`.
    ///
    /// On failure every pair opened so far is closed before returning.
    ///
    /// # Errors
    ///
    /// Returns the first open failure, tagged with its CPU.
    pub fn open<C: TraceControl + ?Sized>(
        control: &C,
        trace_root: &Path,
        traces_dir: &Path,
        cpus: usize,
        scratch_len: usize,
    ) -> Result<Self> {
        let mut streams = Self::default();
        for cpu in 0..cpus {
            let input = control.open_raw_stream(cpu)?;
            let drainer = CpuDrainer::new(
                cpu,
                input,
                trace_root.join(control::trace_pipe_raw(cpu)),
                traces_dir.join(layout::trace_file(cpu)),
                scratch_len,
            )?;
            streams.insert(drainer);
        }
        tracing::debug!(cpus, "cpu streams opened");
        Ok(streams)
    }

    fn insert(&mut self, drainer: CpuDrainer) {
        let _ = self.drainers.insert(drainer.cpu(), drainer);
    }

    /// Drains every CPU in index order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failing CPU's error; CPUs after it are not drained.
    pub fn drain_all(&mut self) -> Result<u64> {
        let mut total = 0;
        for drainer in self.drainers.values_mut() {
            total += drainer.drain()?;
        }
        Ok(total)
    }

    /// Drains every CPU on its own scoped thread and joins them.
    ///
    /// Every CPU is drained even if another fails; the failure of the
    /// lowest-indexed CPU is reported.
    ///
    /// # Errors
    ///
    /// Returns the first failure in CPU order.
    pub fn drain_all_concurrent(&mut self) -> Result<u64> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .drainers
                .values_mut()
                .map(|drainer| scope.spawn(move || drainer.drain()))
                .collect();

            let mut total = 0;
            let mut first_err = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(n)) => total += n,
                    Ok(Err(e)) => {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
            first_err.map_or(Ok(total), Err)
        })
    }

    /// Bytes captured so far, per CPU in index order.
    #[must_use]
    pub fn bytes_per_cpu(&self) -> Vec<(usize, u64)> {
        self.drainers.values().map(|d| (d.cpu(), d.bytes())).collect()
    }

    /// Number of open CPU stream pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drainers.len()
    }

    /// Whether no stream pair is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drainers.is_empty()
    }
}

impl FromIterator<CpuDrainer> for CpuStreams {
    fn from_iter<I: IntoIterator<Item = CpuDrainer>>(iter: I) -> Self {
        let mut streams = Self::default();
        for drainer in iter {
            streams.insert(drainer);
        }
        streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Replays a fixed sequence of read outcomes, then reports `EAGAIN`.
    struct Scripted(VecDeque<io::Result<Vec<u8>>>);

    impl Scripted {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> RawStream {
            Box::new(Self(steps.into()))
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Err(io::ErrorKind::WouldBlock.into()),
                Some(Err(e)) => Err(e),
                Some(Ok(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.0.push_front(Ok(data.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn would_block() -> io::Result<Vec<u8>> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn drainer(dir: &Path, cpu: usize, steps: Vec<io::Result<Vec<u8>>>, scratch: usize) -> CpuDrainer {
        CpuDrainer::new(
            cpu,
            Scripted::new(steps),
            format!("/t/per_cpu/cpu{cpu}/trace_pipe_raw"),
            dir.join(format!("cpu{cpu}")),
            scratch,
        )
        .expect("create drainer")
    }

    #[test]
    fn drain_copies_until_would_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = drainer(
            dir.path(),
            0,
            vec![Ok(b"abc".to_vec()), Ok(b"def".to_vec()), would_block(), Ok(b"late".to_vec())],
            64,
        );
        assert_eq!(d.drain().unwrap(), 6);
        assert_eq!(std::fs::read(d.output_path()).unwrap(), b"abcdef");
        assert_eq!(d.drain().unwrap(), 4);
        assert_eq!(std::fs::read(d.output_path()).unwrap(), b"abcdeflate");
        assert_eq!(d.bytes(), 10);
    }

    #[test]
    fn empty_buffer_is_not_an_error_for_either_no_data_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = drainer(dir.path(), 1, vec![Ok(b"x".to_vec()), Ok(Vec::new()), would_block()], 8);
        assert_eq!(d.drain().unwrap(), 1);
        assert_eq!(d.drain().unwrap(), 0);
        assert_eq!(d.drain().unwrap(), 0);
        assert_eq!(std::fs::read(d.output_path()).unwrap(), b"x");
    }

    #[test]
    fn small_scratch_buffer_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let mut d = drainer(dir.path(), 0, vec![Ok(payload.clone())], 7);
        assert_eq!(d.drain().unwrap(), 256);
        assert_eq!(std::fs::read(d.output_path()).unwrap(), payload);
    }

    #[test]
    fn interrupted_read_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = drainer(
            dir.path(),
            0,
            vec![Err(io::ErrorKind::Interrupted.into()), Ok(b"ok".to_vec())],
            8,
        );
        assert_eq!(d.drain().unwrap(), 2);
    }

    #[test]
    fn read_failure_is_tagged_with_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = drainer(
            dir.path(),
            5,
            vec![Ok(b"kept".to_vec()), Err(io::Error::other("ring buffer gone"))],
            8,
        );
        let err = d.drain().unwrap_err();
        assert_eq!(err.cpu(), Some(5));
        assert!(err.to_string().contains("ring buffer gone"));
        assert_eq!(std::fs::read(d.output_path()).unwrap(), b"kept");
    }

    /// Accepts `room` bytes in total, then reports zero bytes written.
    struct FillingSink {
        room: usize,
    }

    impl Write for FillingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_destination_write_is_tagged_with_cpu_and_path() {
        let mut d = CpuDrainer::with_output(
            3,
            Scripted::new(vec![Ok(b"page-one".to_vec())]),
            "/t/per_cpu/cpu3/trace_pipe_raw",
            Box::new(FillingSink { room: 5 }),
            "/staging/traces/cpu3",
            64,
        );
        match d.drain().unwrap_err() {
            TraceError::CpuIo { cpu, path, source } => {
                assert_eq!(cpu, 3);
                assert_eq!(path, Path::new("/staging/traces/cpu3"));
                assert_eq!(source.kind(), io::ErrorKind::WriteZero);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(d.bytes(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn full_device_write_is_reported() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let mut d = CpuDrainer::new(
            2,
            Scripted::new(vec![Ok(b"data".to_vec())]),
            "/t/per_cpu/cpu2/trace_pipe_raw",
            "/dev/full",
            16,
        )
        .unwrap();
        let err = d.drain().unwrap_err();
        assert_eq!(err.cpu(), Some(2));
        assert!(err.to_string().contains("/dev/full"));
    }

    #[test]
    fn drain_all_stops_at_first_failing_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let mut streams: CpuStreams = vec![
            drainer(dir.path(), 0, vec![Ok(b"zero".to_vec())], 8),
            drainer(dir.path(), 1, vec![Err(io::Error::other("boom"))], 8),
            drainer(dir.path(), 2, vec![Ok(b"two".to_vec())], 8),
        ]
        .into_iter()
        .collect();

        let err = streams.drain_all().unwrap_err();
        assert_eq!(err.cpu(), Some(1));
        assert_eq!(streams.bytes_per_cpu(), vec![(0, 4), (1, 0), (2, 0)]);
        assert!(std::fs::read(dir.path().join("cpu2")).unwrap().is_empty());
    }

    #[test]
    fn concurrent_drain_matches_sequential_output() {
        let seq_dir = tempfile::tempdir().unwrap();
        let par_dir = tempfile::tempdir().unwrap();
        let script = |cpu: u8| {
            vec![
                Ok(vec![cpu; 100]),
                Ok(vec![cpu + 1; 3]),
                would_block(),
                Ok(vec![cpu + 2; 50]),
            ]
        };

        let mut seq: CpuStreams = (0..4)
            .map(|cpu| drainer(seq_dir.path(), cpu, script(cpu as u8), 16))
            .collect();
        let mut par: CpuStreams = (0..4)
            .map(|cpu| drainer(par_dir.path(), cpu, script(cpu as u8), 16))
            .collect();

        for _ in 0..3 {
            let a = seq.drain_all().unwrap();
            let b = par.drain_all_concurrent().unwrap();
            assert_eq!(a, b);
        }
        for cpu in 0..4 {
            let name = format!("cpu{cpu}");
            assert_eq!(
                std::fs::read(seq_dir.path().join(&name)).unwrap(),
                std::fs::read(par_dir.path().join(&name)).unwrap()
            );
        }
        assert_eq!(seq.bytes_per_cpu(), par.bytes_per_cpu());
    }

    #[test]
    fn concurrent_drain_reports_lowest_failing_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let mut streams: CpuStreams = vec![
            drainer(dir.path(), 0, vec![Ok(b"a".to_vec())], 8),
            drainer(dir.path(), 1, vec![Err(io::Error::other("one"))], 8),
            drainer(dir.path(), 2, vec![Err(io::Error::other("two"))], 8),
        ]
        .into_iter()
        .collect();
        let err = streams.drain_all_concurrent().unwrap_err();
        assert_eq!(err.cpu(), Some(1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn nonblocking_pipe_without_data_drains_nothing() {
        use crate::kernel::TraceFs;

        let root = tempfile::tempdir().unwrap();
        let cpu_dir = root.path().join("per_cpu/cpu0");
        std::fs::create_dir_all(&cpu_dir).unwrap();
        let pipe = cpu_dir.join("trace_pipe_raw");
        nix::unistd::mkfifo(&pipe, nix::sys::stat::Mode::S_IRWXU).unwrap();

        let out = tempfile::tempdir().unwrap();
        let fs = TraceFs::new(root.path());
        let mut streams = CpuStreams::open(&fs, root.path(), out.path(), 1, 4096).unwrap();
        let mut writer = OpenOptions::new().write(true).open(&pipe).unwrap();

        assert_eq!(streams.drain_all().unwrap(), 0);
        writer.write_all(b"page").unwrap();
        assert_eq!(streams.drain_all().unwrap(), 4);
        assert_eq!(streams.drain_all().unwrap(), 0);
        assert_eq!(std::fs::read(out.path().join("cpu0")).unwrap(), b"page");
    }
}
