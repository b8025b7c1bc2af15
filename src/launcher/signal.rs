//! Termination signal delivery.

use std::io;

/// How hard to ask a listener to go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// `SIGTERM`: the process may clean up, or ignore it.
    Graceful,
    /// `SIGKILL`: enforced by the kernel.
    Forceful,
}

impl Severity {
    /// Conventional signal name, for diagnostics.
    #[must_use]
    pub const fn signal_name(self) -> &'static str {
        match self {
            Self::Graceful => "SIGTERM",
            Self::Forceful => "SIGKILL",
        }
    }
}

/// Delivers termination signals to arbitrary processes.
pub trait Signaller {
    /// Sends `severity` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal could not be delivered, for example
    /// because the process has already exited.
    fn signal(&self, pid: u32, severity: Severity) -> io::Result<()>;
}

impl<T: Signaller + ?Sized> Signaller for &T {
    fn signal(&self, pid: u32, severity: Severity) -> io::Result<()> {
        (**self).signal(pid, severity)
    }
}

/// Signals processes through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignaller;

#[cfg(unix)]
impl Signaller for OsSignaller {
    fn signal(&self, pid: u32, severity: Severity) -> io::Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range"))
        })?;
        let sig = match severity {
            Severity::Graceful => Signal::SIGTERM,
            Severity::Forceful => Signal::SIGKILL,
        };

        signal::kill(Pid::from_raw(raw), sig).map_err(io::Error::from)
    }
}

#[cfg(not(unix))]
impl Signaller for OsSignaller {
    fn signal(&self, pid: u32, severity: Severity) -> io::Result<()> {
        let mut command = std::process::Command::new("taskkill");
        command.arg("/PID").arg(pid.to_string());
        if severity == Severity::Forceful {
            command.arg("/F");
        }
        let status = command
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {status}")))
        }
    }
}
