use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::check::CheckCommands;
use crate::event::AppletEvent;
use crate::poller::PollSettings;
use crate::presenter::{Elevation, HostVersion};

pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Root configuration structure. Deserialized from
/// `$XDG_CONFIG_HOME/bumblebee-status/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Seconds between refreshes. Clamped to [1, 60].
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound on how long one check command may run. Unset or 0 waits
    /// indefinitely. Only read at startup.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    /// Version of the desktop shell, e.g. "3.8.2". Picks the elevation wrapper
    /// for start/stop; unset means a modern shell.
    #[serde(default)]
    pub host_version: Option<String>,
    #[serde(default)]
    pub commands: CheckCommands,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            command_timeout_secs: None,
            host_version: None,
            commands: CheckCommands::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        let secs = self
            .poll_interval_secs
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Falls back to pkexec if `host_version` is set but unparseable.
    pub fn elevation(&self) -> Elevation {
        let version = self.host_version.as_deref().and_then(|text| {
            let parsed = HostVersion::parse(text);
            if parsed.is_none() {
                warn!(host_version = text, "Unrecognised host version");
            }
            parsed
        });
        Elevation::for_host(version)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval(),
            commands: self.commands.clone(),
        }
    }
}

/// Reads the config at `path`. A missing file gives `Config::default()`; an
/// unreadable or malformed one is an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(e).with_context(|| format!("Cannot read {}", path.display())),
    };
    toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Reloads `path` each time it is written and hands the result to the applet
/// loop. A reload that fails to parse is logged and skipped. Returns when the
/// loop hangs up or the watcher cannot be set up.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<AppletEvent>) {
    let Some(dir) = path.parent().map(Path::to_path_buf) else {
        error!(path = %path.display(), "Config path has no parent directory");
        return;
    };

    let (fs_tx, mut fs_rx) = mpsc::channel::<Event>(16);
    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let _ = fs_tx.blocking_send(event);
        }
        Err(e) => warn!("Config watcher error: {e}"),
    });
    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            error!("Config hot reload unavailable: {e}");
            return;
        }
    };

    // Editors save by renaming a temp file over the original, so watch the
    // directory.
    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        error!(dir = %dir.display(), "Config hot reload unavailable: {e}");
        return;
    }
    debug!(dir = %dir.display(), "Watching for config changes");

    while let Some(event) = fs_rx.recv().await {
        if !is_config_write(&event, &path) {
            continue;
        }
        let config = match load_or_default(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping previous config: {e:#}");
                continue;
            }
        };
        if tx.send(AppletEvent::ConfigReloaded(config)).await.is_err() {
            break;
        }
    }
}

/// A create or modify event that names `path` itself.
fn is_config_write(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == path)
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_values() {
        let c = Config::default();
        assert_eq!(c.poll_interval(), Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        assert_eq!(c.command_timeout(), None);
        assert_eq!(c.elevation(), Elevation::Pkexec);
        assert_eq!(c.commands, CheckCommands::default());
    }

    // ── poll_interval ─────────────────────────────────────────────────────────

    #[test]
    fn poll_interval_clamps_below_min() {
        let c = Config { poll_interval_secs: 0, ..Config::default() };
        assert_eq!(c.poll_interval(), Duration::from_secs(MIN_POLL_INTERVAL_SECS));
    }

    #[test]
    fn poll_interval_clamps_above_max() {
        let c = Config { poll_interval_secs: 3600, ..Config::default() };
        assert_eq!(c.poll_interval(), Duration::from_secs(MAX_POLL_INTERVAL_SECS));
    }

    #[test]
    fn poll_settings_carry_interval_and_commands() {
        let c = Config { poll_interval_secs: 5, ..Config::default() };
        let s = c.poll_settings();
        assert_eq!(s.interval, Duration::from_secs(5));
        assert_eq!(s.commands, c.commands);
    }

    // ── command_timeout ───────────────────────────────────────────────────────

    #[test]
    fn zero_timeout_means_none() {
        let c = Config { command_timeout_secs: Some(0), ..Config::default() };
        assert_eq!(c.command_timeout(), None);
    }

    #[test]
    fn positive_timeout_is_used() {
        let c = Config { command_timeout_secs: Some(10), ..Config::default() };
        assert_eq!(c.command_timeout(), Some(Duration::from_secs(10)));
    }

    // ── elevation ─────────────────────────────────────────────────────────────

    #[test]
    fn old_host_uses_gksu() {
        let c = Config { host_version: Some("3.4.6".to_string()), ..Config::default() };
        assert_eq!(c.elevation(), Elevation::Gksu);
    }

    #[test]
    fn unparseable_host_version_falls_back_to_pkexec() {
        let c = Config { host_version: Some("unknown".to_string()), ..Config::default() };
        assert_eq!(c.elevation(), Elevation::Pkexec);
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
poll_interval_secs = 1
command_timeout_secs = 15
host_version = "3.2.8"

[commands]
installation_probes = [["which", "bumblebeed"]]
daemon_running = ["sh", "-c", "(pgrep bumblebeed) || exit 0"]
switch_state = ["cat", "/proc/acpi/bbswitch"]
service_unit = "bumblebeed.service"
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.elevation(), Elevation::Gksu);
        assert_eq!(config.commands.installation_probes, vec![vec!["which", "bumblebeed"]]);
        assert_eq!(config.commands.daemon_running[2], "(pgrep bumblebeed) || exit 0");
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_secs = 10\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.command_timeout_secs, None);
        assert_eq!(config.commands, CheckCommands::default());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_secs = \"fast\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_directory_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_default(dir.path()).is_err());
    }

    // ── is_config_write ───────────────────────────────────────────────────────

    #[test]
    fn writes_to_the_config_file_trigger_reload() {
        use notify::event::{CreateKind, DataChange, ModifyKind};
        let path = PathBuf::from("/tmp/bbs/config.toml");
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.clone());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert!(is_config_write(&modify, &path));
        assert!(is_config_write(&create, &path));
    }

    #[test]
    fn other_files_and_removals_are_ignored() {
        use notify::event::{ModifyKind, RemoveKind};
        let path = PathBuf::from("/tmp/bbs/config.toml");
        let sibling = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/bbs/config.toml.swp"));
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        assert!(!is_config_write(&sibling, &path));
        assert!(!is_config_write(&removed, &path));
    }
}
