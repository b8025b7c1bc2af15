//! freecad-mcp: MCP server that lets AI assistants drive FreeCAD
//!
//! This tool connects to the FreeCAD MCP addon's XML-RPC server and exposes
//! its operations as MCP tools over stdio or HTTP+SSE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use freecad_mcp::config::{self, Config, LOG_LEVELS, PORT_ENV_VAR};
use freecad_mcp::freecad::{FreeCadConnection, FreeCadRpc};
use freecad_mcp::mcp::{McpServer, SseServer};

/// How MCP clients reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// HTTP with server-sent events
    Sse,
}

/// MCP server for AI-assisted CAD modelling in FreeCAD.
///
/// Requires FreeCAD running with the MCP addon's RPC server started.
#[derive(Parser, Debug)]
#[command(name = "freecad-mcp")]
#[command(author, version, about, long_about = None)]
#[command(args_override_self = true)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve MCP over
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Interface to bind for the SSE transport
    #[arg(long)]
    host: Option<String>,

    /// Port to bind for the SSE transport
    #[arg(long, env = PORT_ENV_VAR)]
    port: Option<u16>,

    /// Path clients open the event stream on
    #[arg(long)]
    sse_path: Option<String>,

    /// Path clients POST messages to
    #[arg(long)]
    message_path: Option<String>,

    /// Disable screenshot feedback and respond with text only
    #[arg(long)]
    only_text_feedback: bool,

    /// Host of the FreeCAD RPC server
    #[arg(long)]
    freecad_host: Option<String>,

    /// Port of the FreeCAD RPC server
    #[arg(long)]
    freecad_port: Option<u16>,

    /// Log level (overrides the configuration file)
    #[arg(long, value_parser = LOG_LEVELS.to_vec())]
    log_level: Option<String>,

    /// Enable debug diagnostics (at least debug-level logging)
    #[arg(long)]
    debug: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    fn apply_to(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(path) = &self.sse_path {
            cfg.server.sse_path.clone_from(path);
        }
        if let Some(path) = &self.message_path {
            cfg.server.message_path.clone_from(path);
        }
        if self.only_text_feedback {
            cfg.only_text_feedback = true;
        }
        if let Some(host) = &self.freecad_host {
            cfg.freecad.host.clone_from(host);
        }
        if let Some(port) = self.freecad_port {
            cfg.freecad.port = port;
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level.clone_from(level);
        }
    }
}

/// Determines the log level from CLI arguments.
///
/// `--debug` counts as `-vv` unless more verbosity was asked for.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, debug: bool, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    let verbose = if debug { verbose.max(2) } else { verbose };
    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" | "critical" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Logs whether FreeCAD answers; the server starts either way.
async fn check_freecad(freecad: &dyn FreeCadRpc) {
    match freecad.ping().await {
        Ok(true) => info!("Connected to FreeCAD"),
        Ok(false) => warn!("FreeCAD answered the ping negatively"),
        Err(e) => warn!(
            error = %e,
            "FreeCAD is not reachable; make sure the addon's RPC server is running"
        ),
    }
}

async fn serve(
    transport: Transport,
    cfg: Config,
    freecad: Arc<dyn FreeCadRpc>,
) -> std::io::Result<()> {
    check_freecad(freecad.as_ref()).await;

    match transport {
        Transport::Stdio => {
            let mut server = McpServer::new(freecad, cfg.only_text_feedback);
            info!("MCP server ready on stdio, waiting for client connection...");
            server.run().await
        }
        Transport::Sse => {
            let server = SseServer::new(&cfg.server, freecad, cfg.only_text_feedback)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            server.run().await
        }
    }
}

/// Entry point for the freecad-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    args.apply_to(&mut cfg);
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.debug, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "freecad-mcp {}  Copyright (C) 2026  The FreeCAD MCP Developers",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?args.transport,
        "Starting freecad-mcp server"
    );

    let freecad: Arc<dyn FreeCadRpc> = match FreeCadConnection::from_config(&cfg.freecad) {
        Ok(conn) => {
            info!(url = conn.url(), "FreeCAD RPC endpoint configured");
            Arc::new(conn)
        }
        Err(e) => {
            error!(error = %e, "Failed to create FreeCAD client");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match args.transport {
        Transport::Stdio => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
        Transport::Sse => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(args.transport, cfg, freecad)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
