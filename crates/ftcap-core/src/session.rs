//! Trace session state machine.
//!
//! A [`TraceSession`] walks `Idle → Configuring → Tracing → Stopping →
//! Stopped`, dropping to `Failed` from anywhere an operation cannot be
//! completed. Every public operation checks the current state first and
//! fails with [`TraceError::Precondition`] without touching the kernel if
//! it is not allowed there.
//!
//! The clear guard is held from configuration until teardown, and every
//! exit path (success, failure, drop) closes all CPU streams and releases
//! the guard exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ftcap_common::config::TraceConfiguration;
use ftcap_common::constants::{self, control, layout};
use ftcap_common::error::{Result, TraceError};
use ftcap_common::types::SessionState;
use serde::Serialize;

use crate::artifact::{ArchivePackager, ArtifactStager};
use crate::drain::CpuStreams;
use crate::guard::BufferClearGuard;
use crate::kernel::TraceControl;

/// Bytes captured for one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuCapture {
    /// Logical CPU index.
    pub cpu: usize,
    /// Bytes written to `traces/cpu<N>`.
    pub bytes: u64,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    /// Per-CPU byte counts, in CPU order.
    pub cpus: Vec<CpuCapture>,
    /// Drain passes run during the capture window.
    pub ticks: u64,
    /// Wall-clock time tracing was on, in milliseconds.
    pub elapsed_ms: u64,
    /// Whether the window was cut short by an interrupt.
    pub interrupted: bool,
}

impl CaptureSummary {
    /// Total bytes captured across all CPUs.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.cpus.iter().map(|c| c.bytes).sum()
    }
}

/// One capture against the kernel tracer.
pub struct TraceSession<C: TraceControl> {
    config: TraceConfiguration,
    control: C,
    staging_root: PathBuf,
    state: SessionState,
    guard: Option<BufferClearGuard>,
    streams: Option<CpuStreams>,
    poll_interval: Duration,
    parallel_drain: bool,
    interrupt: Arc<AtomicBool>,
    tracing_since: Option<Instant>,
    ticks: u64,
    interrupted: bool,
}

impl<C: TraceControl> TraceSession<C> {
    /// Creates an idle session writing CPU traces under `staging_root`.
    pub fn new(config: TraceConfiguration, control: C, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            control,
            staging_root: staging_root.into(),
            state: SessionState::Idle,
            guard: None,
            streams: None,
            poll_interval: constants::POLL_INTERVAL,
            parallel_drain: false,
            interrupt: Arc::new(AtomicBool::new(false)),
            tracing_since: None,
            ticks: 0,
            interrupted: false,
        }
    }

    /// Overrides the interval between drain passes.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drains CPUs on parallel threads instead of one after another.
    #[must_use]
    pub const fn with_parallel_drain(mut self, parallel: bool) -> Self {
        self.parallel_drain = parallel;
        self
    }

    /// Flag that ends the capture window early once set.
    ///
    /// The flag is checked between ticks, so the current tick always
    /// completes first.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Number of CPU stream pairs currently open.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.streams.as_ref().map_or(0, CpuStreams::len)
    }

    /// Whether the `free_buffer` handle is currently held.
    #[must_use]
    pub fn holds_clear_guard(&self) -> bool {
        self.guard.as_ref().is_some_and(BufferClearGuard::is_held)
    }

    /// Prepares the kernel tracer for a capture.
    ///
    /// In order: switch tracing off, take the clear guard, select the
    /// `nop` tracer, set `disable_on_free`, size the buffers, and enable
    /// the configured events. Earlier writes are not rolled back when a
    /// later one fails.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] unless the session is idle, or
    /// the first failing step; the session is then `Failed`.
    pub fn configure(&mut self) -> Result<()> {
        self.require("configure tracing", &[SessionState::Idle])?;
        self.transition(SessionState::Configuring);
        if let Err(e) = self.apply_configuration() {
            self.fail();
            return Err(e);
        }
        tracing::info!(
            trace_root = %self.config.trace_root().display(),
            buffer_size_kb = self.config.buffer_size_kb(),
            events = self.config.events().len(),
            "ftrace configured"
        );
        Ok(())
    }

    fn apply_configuration(&mut self) -> Result<()> {
        self.control.write_control(control::TRACING_ON, "0")?;
        self.guard = Some(self.control.open_clear_guard()?);
        self.control
            .write_control(control::CURRENT_TRACER, control::NOP_TRACER)?;
        self.control
            .write_control(control::TRACE_OPTIONS, control::DISABLE_ON_FREE)?;
        self.control.write_control(
            control::BUFFER_SIZE_KB,
            &self.config.buffer_size_kb().to_string(),
        )?;
        self.control.enable_events(self.config.events())
    }

    /// Opens one stream pair per online CPU and switches tracing on.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] unless the session has been
    /// configured. Any open or write failure closes every stream opened so
    /// far, releases the guard, and leaves the session `Failed`.
    pub fn start_capture(&mut self) -> Result<()> {
        self.require("start capturing", &[SessionState::Configuring])?;
        if let Err(e) = self.open_and_enable() {
            self.fail();
            return Err(e);
        }
        Ok(())
    }

    fn open_and_enable(&mut self) -> Result<()> {
        let traces_dir = self.staging_root.join(layout::TRACES_DIR);
        std::fs::create_dir_all(&traces_dir).map_err(|e| TraceError::io(&traces_dir, e))?;

        let cpus = self.control.online_cpus()?;
        self.streams = Some(CpuStreams::open(
            &self.control,
            self.config.trace_root(),
            &traces_dir,
            cpus,
            self.config.scratch_len(),
        )?);

        self.control.write_control(control::TRACING_ON, "1")?;
        self.tracing_since = Some(Instant::now());
        self.transition(SessionState::Tracing);
        tracing::info!(cpus, "tracing started");
        Ok(())
    }

    /// Runs one drain pass over every CPU.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] outside `Tracing`, or the
    /// first CPU failure of the pass.
    pub fn drain_pass(&mut self) -> Result<u64> {
        self.require("drain cpu buffers", &[SessionState::Tracing])?;
        self.drain_streams()
    }

    fn drain_streams(&mut self) -> Result<u64> {
        let Some(streams) = self.streams.as_mut() else {
            return Ok(0);
        };
        if self.parallel_drain {
            streams.drain_all_concurrent()
        } else {
            streams.drain_all()
        }
    }

    /// Keeps tracing for `duration`, draining every poll interval.
    ///
    /// Returns once tracing has been on for at least `duration`, when the
    /// interrupt flag is seen, or at the first drain failure. Data drained
    /// before a failure stays in the trace files.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] outside `Tracing`, or the
    /// drain failure that ended the window. The session stays `Tracing`
    /// either way so that [`TraceSession::stop`] can follow.
    pub fn capture(&mut self, duration: Duration) -> Result<()> {
        self.require("run the capture window", &[SessionState::Tracing])?;
        tracing::info!(seconds = duration.as_secs_f64(), "capture window open");

        let start = self.tracing_since.unwrap_or_else(Instant::now);
        loop {
            std::thread::sleep(self.poll_interval);
            if let Err(e) = self.drain_streams() {
                tracing::error!(tick = self.ticks + 1, error = %e, "drain failed; ending capture early");
                return Err(e);
            }
            self.ticks += 1;

            if start.elapsed() >= duration {
                break;
            }
            if self.interrupt.load(Ordering::SeqCst) {
                self.interrupted = true;
                tracing::warn!(ticks = self.ticks, "interrupted; ending capture early");
                break;
            }
        }
        Ok(())
    }

    /// Switches tracing off, optionally flushes what is left in the ring
    /// buffers, then closes every stream and releases the clear guard.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Precondition`] without any kernel write unless
    /// the session is configured or tracing. If `tracing_on` cannot be
    /// reset, the operator is warned that the kernel may still be tracing.
    /// Either failure leaves the session `Failed` with all resources
    /// released.
    pub fn stop(&mut self, final_copy: bool) -> Result<CaptureSummary> {
        self.require(
            "stop tracing",
            &[SessionState::Configuring, SessionState::Tracing],
        )?;
        self.transition(SessionState::Stopping);

        if let Err(e) = self.control.write_control(control::TRACING_ON, "0") {
            tracing::warn!(
                path = %self.config.trace_root().join(control::TRACING_ON).display(),
                "failed to stop tracing; FTrace may still be running, check that tracing_on is set to 0"
            );
            self.fail();
            return Err(e);
        }

        if final_copy {
            if let Err(e) = self.drain_streams() {
                self.fail();
                return Err(e);
            }
        }

        let summary = self.summary();
        self.streams = None;
        self.release_guard();
        self.transition(SessionState::Stopped);
        tracing::info!(
            bytes = summary.total_bytes(),
            ticks = summary.ticks,
            "tracing stopped"
        );
        Ok(summary)
    }

    /// Runs a whole capture: configure, stage descriptors, trace for
    /// `duration`, stop with a final flush, and package the result into
    /// `<output_dir>/trace.tar.gz`.
    ///
    /// Whatever happens, the session leaves no stream open and no guard
    /// held. Once tracing started, the archive is written even if the
    /// capture window ended on a drain failure, so data captured up to the
    /// failure is kept.
    ///
    /// # Errors
    ///
    /// Returns the first failure. If both the capture window and the stop
    /// fail, [`TraceError::Aggregated`] carries both.
    pub fn run(
        &mut self,
        duration: Duration,
        stager: &dyn ArtifactStager,
        packager: &dyn ArchivePackager,
    ) -> Result<CaptureSummary> {
        self.configure()?;
        if let Err(e) = stager.stage(&self.staging_root) {
            self.abort();
            return Err(e);
        }
        self.start_capture()?;

        let captured = self.capture(duration);
        let stopped = self.stop(true);
        let archive_path = self.config.output_dir().join(constants::ARCHIVE_NAME);
        let outcome = match (captured, stopped) {
            (Ok(()), Ok(summary)) => Ok(summary),
            (Err(drain), Ok(_)) => Err(drain),
            (Ok(()), Err(stop)) => Err(stop),
            (Err(drain), Err(stop)) => Err(TraceError::Aggregated {
                drain: Box::new(drain),
                stop: Box::new(stop),
            }),
        };

        match outcome {
            Ok(summary) => {
                packager.package(&self.staging_root, &archive_path)?;
                tracing::info!(archive = %archive_path.display(), "trace archive written");
                Ok(summary)
            }
            Err(e) => {
                match packager.package(&self.staging_root, &archive_path) {
                    Ok(()) => tracing::warn!(
                        archive = %archive_path.display(),
                        "partial trace archive written"
                    ),
                    Err(pack) => tracing::error!(error = %pack, "could not package partial trace"),
                }
                Err(e)
            }
        }
    }

    /// Best-effort `stop(false)` for sessions still holding kernel state.
    fn abort(&mut self) {
        if !self.state.is_active() {
            return;
        }
        tracing::warn!(state = %self.state, "tearing down unfinished trace session");
        if let Err(e) = self.stop(false) {
            tracing::error!(error = %e, "trace session teardown failed");
        }
    }

    fn summary(&self) -> CaptureSummary {
        let cpus = self
            .streams
            .as_ref()
            .map(CpuStreams::bytes_per_cpu)
            .unwrap_or_default()
            .into_iter()
            .map(|(cpu, bytes)| CpuCapture { cpu, bytes })
            .collect();
        let elapsed = self.tracing_since.map_or(Duration::ZERO, |t| t.elapsed());
        CaptureSummary {
            cpus,
            ticks: self.ticks,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            interrupted: self.interrupted,
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TraceError::Precondition {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: SessionState) {
        tracing::debug!(from = %self.state, %to, "session state change");
        self.state = to;
    }

    fn release_guard(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            let _ = guard.release();
        }
    }

    fn fail(&mut self) {
        self.streams = None;
        self.release_guard();
        self.transition(SessionState::Failed);
    }
}

impl<C: TraceControl> Drop for TraceSession<C> {
    fn drop(&mut self) {
        self.abort();
    }
}
