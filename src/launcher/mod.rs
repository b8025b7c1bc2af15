//! Port reclaiming launcher.
//!
//! Frees a TCP port before handing off to the long-running HTTP service:
//!
//! 1. Scan arguments for `--port VALUE` / `--port=VALUE`
//! 2. Query the listeners on the port; none → step 5
//! 3. Send `SIGTERM` to each, wait for the graceful settle interval
//! 4. Re-query; send `SIGKILL` to survivors, wait for the forceful settle interval
//! 5. Final query; abort if anything still listens, otherwise hand off
//!
//! Execution is sequential and blocking. Nothing is cached between queries:
//! the OS socket table is re-read every time. The window between the final
//! query and the service binding the port is not closed.

mod args;
mod error;
mod handoff;
mod probe;
mod signal;

pub use args::{LaunchArgs, PORT_FLAG};
pub use error::LaunchError;
pub use handoff::{ExecHandoff, Handoff, DEFAULT_SERVER_BIN, SERVER_ENV_VAR};
pub use probe::{parse_pid_lines, ListenerProbe, LsofProbe};
pub use signal::{OsSignaller, Severity, Signaller};

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Settle intervals between escalation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    /// Wait after `SIGTERM`.
    pub graceful_settle: Duration,
    /// Wait after `SIGKILL`.
    pub forceful_settle: Duration,
}

impl ReclaimPolicy {
    /// No waiting at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            graceful_settle: Duration::ZERO,
            forceful_settle: Duration::ZERO,
        }
    }
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            graceful_settle: Duration::from_millis(500),
            forceful_settle: Duration::from_millis(200),
        }
    }
}

/// What a successful reclaim did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Listeners found by the first query.
    pub initial: BTreeSet<u32>,
    /// Pids that accepted a `SIGTERM`.
    pub sent_graceful: BTreeSet<u32>,
    /// Pids that accepted a `SIGKILL`.
    pub sent_forceful: BTreeSet<u32>,
}

impl ReclaimReport {
    /// True if the port had no listeners to begin with.
    #[must_use]
    pub fn was_free(&self) -> bool {
        self.initial.is_empty()
    }
}

/// Ties together listener discovery, signalling and hand-off.
#[derive(Debug)]
pub struct Launcher<P, S, H> {
    probe: P,
    signaller: S,
    handoff: H,
    policy: ReclaimPolicy,
}

impl<P, S, H> Launcher<P, S, H>
where
    P: ListenerProbe,
    S: Signaller,
    H: Handoff,
{
    /// Creates a launcher with the default settle intervals.
    pub fn new(probe: P, signaller: S, handoff: H) -> Self {
        Self {
            probe,
            signaller,
            handoff,
            policy: ReclaimPolicy::default(),
        }
    }

    /// Overrides the settle intervals.
    #[must_use]
    pub fn with_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scans `tokens`, frees the port and hands off.
    ///
    /// A port value that is not a TCP port number is forwarded as is; no
    /// listener can hold it, so the reclaim step is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error on a usage error (before any listener query), when the
    /// port cannot be freed (the service is not started), or when the hand-off
    /// itself fails.
    pub fn launch<I, T, D>(&self, tokens: I, default_port: D) -> Result<ReclaimReport, LaunchError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
        D: AsRef<OsStr>,
    {
        let args = LaunchArgs::parse(tokens, default_port)?;

        let report = if let Some(port) = args.port_number() {
            self.reclaim(port)?
        } else {
            warn!(
                port = ?args.port(),
                "Port is not a TCP port number, skipping listener check"
            );
            ReclaimReport::default()
        };

        self.handoff.hand_off(&args)?;
        Ok(report)
    }

    /// Makes sure nothing listens on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::PortBusy`] if listeners survive both signals.
    pub fn reclaim(&self, port: u16) -> Result<ReclaimReport, LaunchError> {
        let mut report = ReclaimReport {
            initial: self.probe.list_listeners(port),
            ..ReclaimReport::default()
        };

        if !report.initial.is_empty() {
            info!(port, pids = ?report.initial, "Port in use, sending SIGTERM");
            report.sent_graceful = self.signal_all(&report.initial, Severity::Graceful);
            std::thread::sleep(self.policy.graceful_settle);

            let survivors = self.probe.list_listeners(port);
            if !survivors.is_empty() {
                warn!(port, pids = ?survivors, "Listeners survived SIGTERM, sending SIGKILL");
                report.sent_forceful = self.signal_all(&survivors, Severity::Forceful);
                std::thread::sleep(self.policy.forceful_settle);
            }
        }

        let remaining = self.probe.list_listeners(port);
        if !remaining.is_empty() {
            error!(port, pids = ?remaining, "Unable to free port");
            return Err(LaunchError::PortBusy {
                port,
                pids: remaining,
            });
        }

        info!(port, "Port is free");
        Ok(report)
    }

    fn signal_all(&self, pids: &BTreeSet<u32>, severity: Severity) -> BTreeSet<u32> {
        let mut delivered = BTreeSet::new();
        for &pid in pids {
            match self.signaller.signal(pid, severity) {
                Ok(()) => {
                    delivered.insert(pid);
                }
                Err(e) => {
                    debug!(pid, signal = severity.signal_name(), error = %e, "Signal not delivered");
                }
            }
        }
        delivered
    }
}
