//! ConfShift CLI
//!
//! Unit code is compiled into the binary, so the CLI is a library: a
//! project builds its own `main` around [`run`] with its registry.
//!
//! ```rust,no_run
//! use confshift_core::UnitRegistry;
//!
//! fn main() -> std::process::ExitCode {
//!     let registry = UnitRegistry::new();
//!     confshift_cli::run(&registry)
//! }
//! ```

#![warn(unreachable_pub)]

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;

use std::ffi::OsString;
use std::process::ExitCode;

use confshift_core::UnitRegistry;

pub use cli::{command, parse, Action, GlobalArgs, DEFAULT_CONFIG};
pub use commands::Runner;
pub use output::Output;

/// Parse the process arguments and run against `registry`
#[must_use]
pub fn run(registry: &UnitRegistry) -> ExitCode {
    run_with(std::env::args_os(), registry, Output::stdout())
}

/// Parse `args` and run against `registry`, writing to `out`
pub fn run_with<I, T>(args: I, registry: &UnitRegistry, out: Output) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            // Help and version also end up here
            report_parse_error(&err, err.print(), &out);
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let (globals, action) = parse(&matches);
    logging::init(globals.verbose);
    let Some(action) = action else {
        return ExitCode::FAILURE;
    };

    let ansi = out.ansi() && !globals.no_ansi;
    let out = out.with_ansi(ansi);
    match Runner::new(globals, registry, out).execute(&action) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Route a clap message through `out` when clap could not print it
fn report_parse_error(err: &clap::Error, printed: std::io::Result<()>, out: &Output) {
    if let Err(io_err) = printed {
        tracing::debug!(error = %io_err, "unable to print usage");
        out.write(&err.to_string());
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_falls_back_to_output() {
        let Err(err) = command().try_get_matches_from(["confshift", "bogus"]) else {
            panic!("expected a parse error");
        };

        let out = Output::buffer();
        report_parse_error(&err, Ok(()), &out);
        assert!(out.contents().is_empty());

        report_parse_error(&err, Err(std::io::Error::other("closed")), &out);
        assert!(out.contents().contains("bogus"));
    }
}
