//! # ftcap-artifact
//!
//! Builds the capture artifact around the session engine:
//! - **Staging**: a temporary tree the session writes `traces/` into.
//! - **Stage**: copies event formats and CPU topology descriptors.
//! - **Package**: packs the tree into a world-readable `trace.tar.gz`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod package;
pub mod stage;
pub mod staging;
