//! Integration tests for the port reclaiming launcher.
//!
//! A simulated host stands in for the OS socket table, signal delivery and
//! the downstream service, so every escalation path runs without sleeping
//! or touching real processes.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;

use freecad_mcp::launcher::{
    Handoff, LaunchArgs, LaunchError, Launcher, ListenerProbe, ReclaimPolicy, Severity, Signaller,
};

/// How a simulated listener reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    /// Exits on `SIGTERM`.
    Polite,
    /// Ignores `SIGTERM`, dies on `SIGKILL`.
    Stubborn,
    /// Survives everything (e.g. owned by another user).
    Immortal,
}

#[derive(Default)]
struct FakeHost {
    listeners: RefCell<BTreeMap<u32, Listener>>,
    queries: RefCell<usize>,
    signals: RefCell<Vec<(u32, Severity)>>,
    handoffs: RefCell<Vec<Vec<OsString>>>,
    handed_ports: RefCell<Vec<OsString>>,
}

impl FakeHost {
    fn with(listeners: &[(u32, Listener)]) -> Self {
        Self {
            listeners: RefCell::new(listeners.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn signals(&self) -> Vec<(u32, Severity)> {
        self.signals.borrow().clone()
    }

    fn handoffs(&self) -> Vec<Vec<OsString>> {
        self.handoffs.borrow().clone()
    }

    fn handed_ports(&self) -> Vec<OsString> {
        self.handed_ports.borrow().clone()
    }

    fn launcher(&self) -> Launcher<&Self, &Self, &Self> {
        Launcher::new(self, self, self).with_policy(ReclaimPolicy::immediate())
    }
}

impl ListenerProbe for FakeHost {
    fn list_listeners(&self, _port: u16) -> BTreeSet<u32> {
        *self.queries.borrow_mut() += 1;
        self.listeners.borrow().keys().copied().collect()
    }
}

impl Signaller for FakeHost {
    fn signal(&self, pid: u32, severity: Severity) -> std::io::Result<()> {
        self.signals.borrow_mut().push((pid, severity));

        let mut listeners = self.listeners.borrow_mut();
        let Some(&listener) = listeners.get(&pid) else {
            return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        };
        let dies = match (listener, severity) {
            (Listener::Polite, _) => true,
            (Listener::Stubborn, Severity::Forceful) => true,
            (Listener::Stubborn, Severity::Graceful) | (Listener::Immortal, _) => false,
        };
        if dies {
            listeners.remove(&pid);
        }
        Ok(())
    }
}

impl Handoff for FakeHost {
    fn hand_off(&self, args: &LaunchArgs) -> Result<(), LaunchError> {
        self.handoffs.borrow_mut().push(args.passthrough().to_vec());
        self.handed_ports.borrow_mut().push(args.port().to_os_string());
        Ok(())
    }
}

fn strings(tokens: &[&str]) -> Vec<OsString> {
    tokens.iter().map(OsString::from).collect()
}

#[test]
fn test_port_flag_is_parsed_and_forwarded() {
    let host = FakeHost::default();

    host.launcher()
        .launch(["--port", "9999", "--verbose"], "8000")
        .unwrap();

    assert_eq!(host.handoffs(), [strings(&["--port", "9999", "--verbose"])]);
}

#[test]
fn test_trailing_port_flag_fails_before_any_query() {
    let host = FakeHost::with(&[(10, Listener::Polite)]);

    let err = host.launcher().launch(["--port"], "8000").unwrap_err();

    assert!(matches!(err, LaunchError::MissingPortValue));
    assert_eq!(*host.queries.borrow(), 0);
    assert!(host.signals().is_empty());
    assert!(host.handoffs().is_empty());
}

#[test]
fn test_free_port_hands_off_without_signals() {
    let host = FakeHost::default();

    let report = host.launcher().launch(Vec::<String>::new(), "8000").unwrap();

    assert!(report.was_free());
    assert!(host.signals().is_empty());
    assert_eq!(host.handoffs(), [Vec::<OsString>::new()]);
}

#[test]
fn test_graceful_exit_needs_no_forceful_signal() {
    let host = FakeHost::with(&[(10, Listener::Polite), (11, Listener::Polite)]);

    let report = host.launcher().launch(["--port=8000"], "8000").unwrap();

    assert_eq!(
        host.signals(),
        [(10, Severity::Graceful), (11, Severity::Graceful)]
    );
    assert_eq!(report.sent_graceful, BTreeSet::from([10, 11]));
    assert!(report.sent_forceful.is_empty());
    assert_eq!(host.handoffs().len(), 1);
}

#[test]
fn test_stubborn_listener_is_killed() {
    let host = FakeHost::with(&[(10, Listener::Polite), (20, Listener::Stubborn)]);

    let report = host.launcher().launch(["--port", "8000"], "8000").unwrap();

    assert_eq!(
        host.signals(),
        [
            (10, Severity::Graceful),
            (20, Severity::Graceful),
            (20, Severity::Forceful)
        ]
    );
    assert_eq!(report.sent_forceful, BTreeSet::from([20]));
    assert_eq!(host.handoffs().len(), 1);
}

#[test]
fn test_immortal_listener_aborts_launch() {
    let host = FakeHost::with(&[(30, Listener::Immortal)]);

    let err = host.launcher().launch(["--port", "8000"], "8000").unwrap_err();

    match err {
        LaunchError::PortBusy { port, pids } => {
            assert_eq!(port, 8000);
            assert_eq!(pids, BTreeSet::from([30]));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        host.signals(),
        [(30, Severity::Graceful), (30, Severity::Forceful)]
    );
    assert!(host.handoffs().is_empty());
}

#[test]
fn test_default_port_is_reclaimed_without_flag() {
    let host = FakeHost::with(&[(10, Listener::Polite)]);

    host.launcher().launch(["--transport", "sse"], "8000").unwrap();

    assert_eq!(host.signals(), [(10, Severity::Graceful)]);
    assert_eq!(host.handoffs(), [strings(&["--transport", "sse"])]);
    assert_eq!(host.handed_ports(), [OsString::from("8000")]);
}

#[test]
fn test_service_is_told_the_reclaimed_port() {
    let host = FakeHost::default();

    host.launcher()
        .launch(["/home/me/.freecad-mcp/alt.json"], "8123")
        .unwrap();
    host.launcher().launch(["--port=9001"], "8123").unwrap();

    assert_eq!(host.handed_ports(), strings(&["8123", "9001"]));
}

#[test]
fn test_repeated_runs_against_free_port_are_identical() {
    let host = FakeHost::default();
    let launcher = host.launcher();

    let first = launcher.launch(["--port", "8000"], "8000").unwrap();
    let second = launcher.launch(["--port", "8000"], "8000").unwrap();

    assert_eq!(first, second);
    assert!(host.signals().is_empty());
    assert_eq!(host.handoffs().len(), 2);
    assert_eq!(host.handoffs()[0], host.handoffs()[1]);
}

#[test]
fn test_vanished_pid_does_not_stop_escalation() {
    // 40 exits on its own between the query and the signal
    struct Racy(FakeHost);

    impl ListenerProbe for Racy {
        fn list_listeners(&self, port: u16) -> BTreeSet<u32> {
            let mut pids = self.0.list_listeners(port);
            if *self.0.queries.borrow() == 1 {
                pids.insert(40);
            }
            pids
        }
    }

    let racy = Racy(FakeHost::with(&[(10, Listener::Polite)]));
    let launcher = Launcher::new(&racy, &racy.0, &racy.0).with_policy(ReclaimPolicy::immediate());

    let report = launcher.launch(["--port", "8000"], "8000").unwrap();

    assert_eq!(report.initial, BTreeSet::from([10, 40]));
    assert_eq!(report.sent_graceful, BTreeSet::from([10]));
    assert_eq!(racy.0.handoffs().len(), 1);
}
