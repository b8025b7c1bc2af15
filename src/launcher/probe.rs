//! Listener discovery through the OS socket table.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Answers "which processes are listening on this TCP port right now".
///
/// Implementations must query fresh on every call.
pub trait ListenerProbe {
    /// Returns the pids holding a TCP socket in LISTEN state on `port`.
    fn list_listeners(&self, port: u16) -> BTreeSet<u32>;
}

impl<T: ListenerProbe + ?Sized> ListenerProbe for &T {
    fn list_listeners(&self, port: u16) -> BTreeSet<u32> {
        (**self).list_listeners(port)
    }
}

/// Queries listeners with `lsof`.
///
/// A missing or failing `lsof` is reported as "no listeners". The launcher is
/// therefore not guaranteed correct on hosts without it.
#[derive(Debug, Clone)]
pub struct LsofProbe {
    program: PathBuf,
}

impl LsofProbe {
    /// Uses `lsof` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("lsof")
    }

    /// Uses a specific `lsof` executable.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for LsofProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerProbe for LsofProbe {
    fn list_listeners(&self, port: u16) -> BTreeSet<u32> {
        let output = Command::new(&self.program)
            .arg("-nP")
            .arg("-t")
            .arg(format!("-iTCP:{port}"))
            .arg("-sTCP:LISTEN")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            // lsof exits 1 when nothing matches; stdout is authoritative either way
            Ok(output) => parse_pid_lines(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::debug!(
                    program = %self.program.display(),
                    error = %e,
                    "Listener query unavailable, assuming no listeners"
                );
                BTreeSet::new()
            }
        }
    }
}

/// Parses terse `lsof -t` output: one pid per line.
#[must_use]
pub fn parse_pid_lines(output: &str) -> BTreeSet<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}
