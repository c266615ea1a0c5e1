//! The single `ftcap` action: validate, capture, package, report.

use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::Context;
use ftcap_artifact::package::TarGzPackager;
use ftcap_artifact::stage::TraceFsStager;
use ftcap_artifact::staging::StagingDir;
use ftcap_common::constants::ARCHIVE_NAME;
use ftcap_core::kernel::TraceFs;
use ftcap_core::privilege::ensure_root;
use ftcap_core::session::TraceSession;

use crate::cli::Cli;
use crate::output::CaptureReport;

/// Runs one capture as described by the parsed flags.
///
/// # Errors
///
/// Returns an error if the process is not root, a path is unusable, or
/// the capture session fails.
pub fn execute(cli: &Cli) -> anyhow::Result<()> {
    ensure_root()?;
    let config = cli.to_config()?;
    require_dir(config.trace_root(), "kernel trace root")?;
    require_dir(config.devices_root(), "kernel devices root")?;
    std::fs::create_dir_all(config.output_dir()).with_context(|| {
        format!(
            "could not create output directory {}",
            config.output_dir().display()
        )
    })?;

    let staging = StagingDir::create()?;
    let stager = TraceFsStager::from_config(&config);
    let archive = config.output_dir().join(ARCHIVE_NAME);
    let control = TraceFs::new(config.trace_root());
    let mut session = TraceSession::new(config, control, staging.path())
        .with_parallel_drain(cli.parallel_drain);

    let interrupt = session.interrupt_flag();
    ctrlc::set_handler(move || {
        interrupt.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let started_at = chrono::Utc::now();
    tracing::info!(
        date = %started_at.to_rfc3339(),
        seconds = cli.capture_seconds,
        "starting trace capture"
    );
    let summary = session.run(
        cli.capture_window(),
        &stager,
        &TarGzPackager::default(),
    )?;
    drop(session);
    if let Err(e) = staging.close() {
        tracing::warn!(error = %e, "could not remove staging directory");
    }

    let report = CaptureReport {
        archive,
        started_at,
        summary,
    };
    if cli.json {
        report.print_json()?;
    } else {
        report.print_human();
    }
    Ok(())
}

fn require_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{what} {} does not exist", path.display()))
    }
}
