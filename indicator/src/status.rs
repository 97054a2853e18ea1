use serde::{Deserialize, Serialize};

/// Lifecycle of the bumblebee daemon as observed by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    /// Installation has not been probed yet.
    #[default]
    Unknown,
    /// The installation probe found no bumblebee binaries.
    NotInstalled,
    /// Binaries are present; whether the daemon runs is not yet known.
    Installed,
    /// `bumblebeed` shows up in the process list.
    Running,
    /// Installed, but no `bumblebeed` process.
    Stopped,
}

impl DaemonStatus {
    /// True for every state the installation probe has already settled,
    /// except `NotInstalled`.
    pub fn is_installed(self) -> bool {
        matches!(self, Self::Installed | Self::Running | Self::Stopped)
    }
}

/// GPU power-switch state read from the switch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStatus {
    /// The switch check has not answered yet, gave no output, or printed
    /// text that ends in neither `ON` nor `OFF`.
    #[default]
    Unknown,
    /// Reserved for hosts that can tell the switch is absent. The switch
    /// check itself never produces it.
    Inactive,
    Off,
    On,
}

impl SwitchStatus {
    /// Classifies one line read from the switch file.
    ///
    /// The line is trimmed and its suffix compared case-sensitively against
    /// `OFF` and `ON`. Absent output matches neither and is `Unknown`.
    pub fn from_switch_output(output: Option<&str>) -> Self {
        let Some(line) = output else {
            return Self::Unknown;
        };
        let line = line.trim();
        if line.ends_with("OFF") {
            Self::Off
        } else if line.ends_with("ON") {
            Self::On
        } else {
            Self::Unknown
        }
    }
}

/// Everything the poller knows about bumblebee after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon: DaemonStatus,
    pub switch_state: SwitchStatus,
}

impl StatusSnapshot {
    /// The snapshot a fresh updater starts with: every field `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with only the daemon field replaced.
    pub fn with_daemon(self, daemon: DaemonStatus) -> Self {
        Self { daemon, ..self }
    }

    /// Returns a copy with only the switch field replaced.
    pub fn with_switch_state(self, switch_state: SwitchStatus) -> Self {
        Self { switch_state, ..self }
    }
}
