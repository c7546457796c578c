//! Binary entrypoint for the `chatlog` command.

use std::process::ExitCode;

use chatlog_store::cli;

fn main() -> ExitCode {
    cli::run()
}
