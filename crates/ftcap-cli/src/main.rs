//! # ftcap: FTrace capture CLI
//!
//! Records raw per-CPU scheduler events for a fixed window and packs
//! them, with event formats and CPU topology, into `trace.tar.gz`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod capture;
mod cli;
mod output;

use clap::Parser;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = cli::usage_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };
    capture::execute(&cli)
}
