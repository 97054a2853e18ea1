//! Polling-cycle state machine.
//!
//! [`StatusUpdater`] decides which checks a refresh needs, makes sure each
//! [`Check`] has at most one command outstanding, folds command output into
//! the [`StatusSnapshot`], and reports the snapshot once every check it
//! started has come back.
//!
//! Command callbacks never touch the updater. They post a [`Completion`] onto
//! a channel, and whoever owns the updater (normally [`crate::poller`]) hands
//! it back through [`StatusUpdater::complete`]. All mutation therefore stays
//! on one task. Once the receiving end is gone, late callbacks are no-ops.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::check::{Check, CheckCommands, InFlight};
use crate::command::CommandRunner;
use crate::status::{DaemonStatus, StatusSnapshot, SwitchStatus};

/// One finished command, routed back to the updater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub check: Check,
    pub output: Option<String>,
}

/// Called with the snapshot each time a polling cycle resolves.
pub type OnStatusResolved = Box<dyn FnMut(StatusSnapshot) + Send + 'static>;

pub struct StatusUpdater<R> {
    runner: R,
    commands: CheckCommands,
    snapshot: StatusSnapshot,
    in_flight: InFlight,
    /// Index into `commands.installation_probes` of the probe currently running.
    installation_step: usize,
    completions: mpsc::UnboundedSender<Completion>,
    on_resolved: OnStatusResolved,
}

impl<R: CommandRunner> StatusUpdater<R> {
    /// Builds an updater with an all-`Unknown` snapshot. The returned receiver
    /// yields the completions that must be fed to [`StatusUpdater::complete`].
    pub fn new(
        runner: R,
        commands: CheckCommands,
        on_resolved: OnStatusResolved,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let updater = Self {
            runner,
            commands,
            snapshot: StatusSnapshot::new(),
            in_flight: InFlight::default(),
            installation_step: 0,
            completions,
            on_resolved,
        };
        (updater, rx)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Starts every check whose precondition holds and that is not already
    /// in flight. Never waits for command output.
    pub fn request_refresh(&mut self) {
        let before = self.snapshot;

        if self.snapshot.daemon == DaemonStatus::Unknown {
            self.start_installation_check();
        }
        if self.snapshot.daemon.is_installed() {
            self.issue(Check::DaemonRunning);
        }
        if self.snapshot.daemon != DaemonStatus::NotInstalled {
            self.issue(Check::SwitchState);
        }

        // Only an empty probe list can settle the snapshot without a command.
        if self.in_flight.is_empty() && self.snapshot != before {
            (self.on_resolved)(self.snapshot);
        }
    }

    /// Applies one command result. Fires the resolved callback when this was
    /// the last outstanding check.
    pub fn complete(&mut self, completion: Completion) {
        let Completion { check, output } = completion;
        if !self.in_flight.contains(check) {
            debug!(check = ?check, "Ignoring completion for a check that is not in flight");
            return;
        }

        match check {
            Check::Installation => {
                let more_probes =
                    self.installation_step + 1 < self.commands.installation_probes.len();
                if output.is_some() && more_probes {
                    // More probes to go; the check stays in flight.
                    self.installation_step += 1;
                    self.dispatch(Check::Installation);
                    return;
                }
                if output.is_some() {
                    self.set_daemon(DaemonStatus::Installed);
                    // Chain the running check before Installation leaves the
                    // set so the cycle cannot resolve in between.
                    self.issue(Check::DaemonRunning);
                } else {
                    self.set_daemon(DaemonStatus::NotInstalled);
                }
            }
            Check::DaemonRunning => {
                let daemon = if output.is_some() {
                    DaemonStatus::Running
                } else {
                    DaemonStatus::Stopped
                };
                self.set_daemon(daemon);
            }
            Check::SwitchState => {
                let switch_state = SwitchStatus::from_switch_output(output.as_deref());
                if switch_state != self.snapshot.switch_state {
                    debug!(from = ?self.snapshot.switch_state, to = ?switch_state, "Switch state changed");
                }
                self.snapshot = self.snapshot.with_switch_state(switch_state);
            }
        }

        self.in_flight.remove(check);
        if self.in_flight.is_empty() {
            (self.on_resolved)(self.snapshot);
        }
    }

    /// Swaps in new commands. A daemon previously found missing goes back to
    /// `Unknown` so the next refresh probes installation again.
    pub fn reconfigure(&mut self, commands: CheckCommands) {
        self.commands = commands;
        if self.snapshot.daemon == DaemonStatus::NotInstalled {
            info!("Re-probing bumblebee installation");
            self.snapshot = self.snapshot.with_daemon(DaemonStatus::Unknown);
        }
    }

    fn start_installation_check(&mut self) {
        if self.in_flight.contains(Check::Installation) {
            return;
        }
        self.installation_step = 0;
        if self.commands.installation_probes.is_empty() {
            self.set_daemon(DaemonStatus::NotInstalled);
            return;
        }
        self.issue(Check::Installation);
    }

    /// Marks `check` in flight and runs its command, unless it already is.
    fn issue(&mut self, check: Check) {
        if !self.in_flight.insert(check) {
            debug!(check = ?check, "Already in flight");
            return;
        }
        self.dispatch(check);
    }

    fn dispatch(&self, check: Check) {
        let command = match check {
            Check::Installation => &self.commands.installation_probes[self.installation_step],
            Check::DaemonRunning => &self.commands.daemon_running,
            Check::SwitchState => &self.commands.switch_state,
        };
        debug!(check = ?check, command = ?command, "Running check");

        let tx = self.completions.clone();
        self.runner.run(
            command,
            Box::new(move |output| {
                if tx.send(Completion { check, output }).is_err() {
                    debug!(check = ?check, "Updater gone; dropping completion");
                }
            }),
        );
    }

    fn set_daemon(&mut self, daemon: DaemonStatus) {
        if daemon != self.snapshot.daemon {
            info!(from = ?self.snapshot.daemon, to = ?daemon, "Daemon status changed");
        }
        self.snapshot = self.snapshot.with_daemon(daemon);
    }
}
