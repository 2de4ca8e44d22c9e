//! Binary entrypoint that serves the Docteur Analyste HTTP API.

use std::process::ExitCode;

use docteur_analyste::start_docteur_analyste;

/// Load configuration, connect to the backing services and serve until Ctrl+C.
fn main() -> ExitCode {
    start_docteur_analyste::run()
}
