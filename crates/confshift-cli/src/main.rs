use std::process::ExitCode;

use confshift_core::UnitRegistry;

fn main() -> ExitCode {
    // Projects link their own units; the stock binary ships none
    let registry = UnitRegistry::new();
    confshift_cli::run(&registry)
}
