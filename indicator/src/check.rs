/// The three probes the updater runs, and the commands behind them.
use serde::Deserialize;

/// Identifies one kind of check. At most one invocation per identifier is
/// ever outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    Installation,
    DaemonRunning,
    SwitchState,
}

impl Check {
    pub const ALL: [Check; 3] = [Check::Installation, Check::DaemonRunning, Check::SwitchState];

    fn index(self) -> usize {
        match self {
            Check::Installation => 0,
            Check::DaemonRunning => 1,
            Check::SwitchState => 2,
        }
    }
}

/// In-flight flag per [`Check`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InFlight([bool; 3]);

impl InFlight {
    /// Marks `check` as in flight. Returns `false` if it already was.
    pub fn insert(&mut self, check: Check) -> bool {
        let slot = &mut self.0[check.index()];
        !std::mem::replace(slot, true)
    }

    /// Clears `check`. Returns `false` if it was not in flight.
    pub fn remove(&mut self, check: Check) -> bool {
        std::mem::replace(&mut self.0[check.index()], false)
    }

    pub fn contains(&self, check: Check) -> bool {
        self.0[check.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|pending| !pending)
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|pending| **pending).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Check> + '_ {
        Check::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

/// Argv for every check, plus the systemd unit the start/stop actions control.
/// Deserialized from the `[commands]` table of config.toml.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckCommands {
    /// Run in order; bumblebee counts as installed only if each one prints something.
    #[serde(default = "default_installation_probes")]
    pub installation_probes: Vec<Vec<String>>,
    #[serde(default = "default_daemon_running")]
    pub daemon_running: Vec<String>,
    #[serde(default = "default_switch_state")]
    pub switch_state: Vec<String>,
    #[serde(default = "default_service_unit")]
    pub service_unit: String,
}

impl Default for CheckCommands {
    fn default() -> Self {
        Self {
            installation_probes: default_installation_probes(),
            daemon_running: default_daemon_running(),
            switch_state: default_switch_state(),
            service_unit: default_service_unit(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_installation_probes() -> Vec<Vec<String>> {
    vec![argv(&["bumblebeed", "--version"]), argv(&["optirun", "--version"])]
}

fn default_daemon_running() -> Vec<String> {
    argv(&["pgrep", "bumblebeed"])
}

fn default_switch_state() -> Vec<String> {
    argv(&["cat", "/proc/acpi/bbswitch"])
}

fn default_service_unit() -> String {
    "bumblebeed.service".to_string()
}
