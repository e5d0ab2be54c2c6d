//! Entry point for the claims cleanup job.
//!
//! Takes no arguments; everything comes from the environment (see
//! [`claims_cleanup::config`]). Exits with status 0 after printing a success
//! line, or prints `ERROR: <message>` to stderr and exits with status 1.

#![expect(clippy::print_stdout, clippy::print_stderr)]

use claims_cleanup::{logging, pipeline};
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("Warning: file logging unavailable: {e:#}");
        if let Err(e) = logging::init_console() {
            eprintln!("Warning: console logging unavailable: {e:#}");
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("ERROR: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(pipeline::run_from_env()) {
        Ok(summary) => {
            tracing::info!("{}", summary.summary());
            println!("Data cleaning completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Data cleaning failed: {e}");
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}
