//! Error types for the port reclaiming launcher.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a launch. Every variant maps to exit status 1.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// `--port` was the last token and had no value.
    #[error("--port requires a value")]
    MissingPortValue,

    /// Listeners survived both the graceful and the forceful signal.
    #[error("port {port} is still in use by pid(s) {pids:?}")]
    PortBusy {
        /// The port that could not be freed.
        port: u16,
        /// Processes still listening on it.
        pids: BTreeSet<u32>,
    },

    /// The downstream service could not be executed.
    #[error("failed to start {}", program.display())]
    Handoff {
        /// Program that was being executed.
        program: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The downstream service ran but exited unsuccessfully.
    ///
    /// Only produced where the launcher cannot replace its own process image
    /// and has to wait for the service instead.
    #[error("{} exited with status {code:?}", program.display())]
    ServiceFailed {
        /// Program that was run.
        program: PathBuf,
        /// Exit code, if the service was not terminated by a signal.
        code: Option<i32>,
    },
}
