//! # ftcap-core
//!
//! The FTrace session engine.
//!
//! This crate provides:
//! - **Kernel control**: the [`TraceControl`](kernel::TraceControl) seam over
//!   the tracefs control files, with the production [`TraceFs`](kernel::TraceFs).
//! - **Clear guard**: [`BufferClearGuard`](guard::BufferClearGuard), the held
//!   `free_buffer` handle whose closing releases the kernel ring buffer.
//! - **Draining**: per-CPU non-blocking readers that copy raw ring buffer
//!   pages into files.
//! - **Session**: the [`TraceSession`](session::TraceSession) state machine
//!   that configures, captures, and tears down tracing.
//! - **Artifacts**: the stager and packager seams the session calls out to.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod artifact;
pub mod drain;
pub mod guard;
pub mod kernel;
pub mod privilege;
pub mod session;
