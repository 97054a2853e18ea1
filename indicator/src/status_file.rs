use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::presenter::{service_command, Elevation, Presenter, ServiceAction, StatusView};
use crate::status::{DaemonStatus, SwitchStatus};

/// What the panel host reads from `status.toml` after every change.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusFile {
    /// Indicator version (set from Cargo.toml at compile time).
    pub version: String,
    pub daemon: DaemonStatus,
    pub switch_state: SwitchStatus,
    pub icon_name: String,
    pub tooltip: String,
    /// The menu action currently offered, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ServiceAction>,
    /// Ready-to-run argv for `action`, elevation wrapper included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_command: Option<Vec<String>>,
    /// RFC 3339 timestamp of the write.
    pub updated_at: String,
}

impl StatusFile {
    pub fn from_view(view: &StatusView, unit: &str, elevation: Elevation) -> Self {
        let action = view.menu.offered();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            daemon: view.snapshot.daemon,
            switch_state: view.snapshot.switch_state,
            icon_name: view.icon_name.to_string(),
            tooltip: view.tooltip.to_string(),
            action,
            action_command: action.map(|a| service_command(a, unit, elevation)),
            updated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`, creating the parent
/// directory if needed.
pub fn write_status(path: &Path, status: &StatusFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(status).context("Failed to serialize status")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write status file {}", path.display()))
}

/// The standalone binary's [`Presenter`]: every view becomes a `status.toml`.
/// Write failures are logged and never stop polling.
pub struct StatusFilePresenter {
    path: PathBuf,
    unit: String,
    elevation: Elevation,
}

impl StatusFilePresenter {
    pub fn new(path: PathBuf, unit: impl Into<String>, elevation: Elevation) -> Self {
        Self {
            path,
            unit: unit.into(),
            elevation,
        }
    }

    /// Picks up a reloaded service unit / elevation for the next write.
    pub fn set_service(&mut self, unit: impl Into<String>, elevation: Elevation) {
        self.unit = unit.into();
        self.elevation = elevation;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Presenter for StatusFilePresenter {
    fn present(&mut self, view: &StatusView) {
        let status = StatusFile::from_view(view, &self.unit, self.elevation);
        match write_status(&self.path, &status) {
            Ok(()) => debug!(icon = view.icon_name, "Status written"),
            Err(e) => warn!("{e:#}"),
        }
    }
}
