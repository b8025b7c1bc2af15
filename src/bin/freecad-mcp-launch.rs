//! freecad-mcp-launch: frees the HTTP port, then starts `freecad-mcp --transport sse`.
//!
//! Every argument is forwarded to the service verbatim. Only `--port VALUE`
//! and `--port=VALUE` are inspected; without them the port comes from
//! `FREECAD_MCP_PORT`, falling back to 8000. The service is started with
//! `FREECAD_MCP_PORT` set to that port.

use std::ffi::OsString;
use std::process::ExitCode;

use tracing::{error, Level};
use tracing_subscriber::EnvFilter;

use freecad_mcp::config::{DEFAULT_HTTP_PORT, PORT_ENV_VAR};
use freecad_mcp::launcher::{ExecHandoff, LaunchError, Launcher, LsofProbe, OsSignaller};

/// Initialises the tracing subscriber. Diagnostics go to stderr only.
fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let default_port = std::env::var_os(PORT_ENV_VAR)
        .filter(|port| !port.is_empty())
        .unwrap_or_else(|| OsString::from(DEFAULT_HTTP_PORT.to_string()));

    let handoff = match ExecHandoff::from_env() {
        Ok(handoff) => handoff,
        Err(e) => {
            error!(error = %e, "Cannot locate the service binary");
            return ExitCode::FAILURE;
        }
    };

    let launcher = Launcher::new(LsofProbe::new(), OsSignaller, handoff);
    match launcher.launch(std::env::args_os().skip(1), &default_port) {
        Ok(_) => ExitCode::SUCCESS,
        Err(LaunchError::MissingPortValue) => {
            error!("--port requires a value");
            eprintln!("usage: freecad-mcp-launch [--port PORT | --port=PORT] [SERVER_ARGS...]");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Launch aborted");
            ExitCode::FAILURE
        }
    }
}
