#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Binary entrypoint: one discovery and drain pass per invocation.

use std::process::ExitCode;

use clap::Parser;
use gribmirror_app::{Cli, exit_code, init_telemetry, run_app};
use gribmirror_fetch::render_chain;
use gribmirror_telemetry::GlobalContextGuard;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_telemetry(&cli) {
        eprintln!("error: {}", render_chain(&err));
        return ExitCode::FAILURE;
    }
    let context = GlobalContextGuard::new("mirror");
    info!(run_id = %context.run_id(), "gribmirror starting");

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupt received; stopping after in-flight work settles");
                    cancel.cancel();
                }
                Err(err) => warn!(error = %err, "could not install Ctrl-C handler"),
            }
        })
    };

    let result = run_app(&cli, cancel).await;
    interrupt.abort();

    match result {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(summary) => println!("{summary}"),
                Err(err) => warn!(error = %err, "could not render run summary"),
            }
            exit_code(&report)
        }
        Err(err) => {
            error!(
                operation = err.operation(),
                error = %render_chain(&err),
                "gribmirror run failed"
            );
            ExitCode::FAILURE
        }
    }
}
