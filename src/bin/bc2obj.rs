//! bc2obj command-line entry point.
//!
//! The same binary is the coordinator and, re-executed with the hidden
//! `--worker` flag, every worker process.

use std::env;
use std::process::ExitCode;

use bc2obj::cli::{Cli, Invocation};
use bc2obj::core::{Error, Result};
use bc2obj::driver::Driver;
use bc2obj::worker::run_worker;
use clap::Parser;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Help and version requests are not errors.
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.into_invocation()? {
        Invocation::Run(config) => {
            let exe = env::current_exe().map_err(|e| Error::fs("locate", "the bc2obj executable", e))?;
            Driver::new(config, exe).run()
        }
        Invocation::Worker(request, target) => {
            run_worker(request, &target)?;
            Ok(true)
        }
    }
}
