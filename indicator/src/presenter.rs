//! The host-facing side: what a resolved snapshot looks like on the panel.
//!
//! Everything here is plain data. A host implements [`Presenter`] and draws
//! the [`StatusView`] it is handed; the start/stop actions are argv vectors
//! it can run itself or hand to [`ServiceControl`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::CommandRunner;
use crate::status::{DaemonStatus, StatusSnapshot, SwitchStatus};

pub const ICON_ON: &str = "bumblebee-status-on";
pub const ICON_OFF: &str = "bumblebee-status-off";
pub const ICON_INACTIVE: &str = "bumblebee-status-inactive";
pub const ICON_UNAVAILABLE: &str = "bumblebee-status-unavailable";

/// Renders resolved snapshots. Implemented by the host shell.
pub trait Presenter {
    fn present(&mut self, view: &StatusView);
}

/// Icon, tooltip and menu state for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub snapshot: StatusSnapshot,
    pub icon_name: &'static str,
    pub tooltip: &'static str,
    pub menu: MenuActions,
}

impl StatusView {
    pub fn from_snapshot(snapshot: StatusSnapshot) -> Self {
        let (icon_name, tooltip) = match (snapshot.daemon, snapshot.switch_state) {
            (DaemonStatus::NotInstalled, _) => (ICON_UNAVAILABLE, "The bumblebee is not installed"),
            (DaemonStatus::Unknown | DaemonStatus::Installed, _) => {
                (ICON_UNAVAILABLE, "Checking the bumblebee status")
            }
            (DaemonStatus::Stopped, _) => (ICON_INACTIVE, "The bumblebee service is not running"),
            (DaemonStatus::Running, SwitchStatus::On) => (ICON_ON, "The high performance GPU is ON"),
            (DaemonStatus::Running, SwitchStatus::Off) => {
                (ICON_OFF, "The high performance GPU is OFF")
            }
            (DaemonStatus::Running, SwitchStatus::Unknown | SwitchStatus::Inactive) => (
                ICON_UNAVAILABLE,
                "Test for bumblebee status returned unexpected result",
            ),
        };
        Self {
            snapshot,
            icon_name,
            tooltip,
            menu: MenuActions::for_daemon(snapshot.daemon),
        }
    }
}

/// Visibility of the two mutually exclusive service actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuActions {
    pub start: bool,
    pub stop: bool,
}

impl MenuActions {
    pub fn for_daemon(daemon: DaemonStatus) -> Self {
        match daemon {
            DaemonStatus::NotInstalled => Self { start: false, stop: false },
            DaemonStatus::Running => Self { start: false, stop: true },
            _ => Self { start: true, stop: false },
        }
    }

    /// The one action currently offered, if any.
    pub fn offered(self) -> Option<ServiceAction> {
        if self.stop {
            Some(ServiceAction::Stop)
        } else if self.start {
            Some(ServiceAction::Start)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

impl ServiceAction {
    pub fn verb(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
        }
    }
}

/// `major.minor` of the desktop shell hosting the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
}

impl HostVersion {
    /// First shell release whose applets elevate through pkexec.
    pub const PKEXEC_SINCE: HostVersion = HostVersion { major: 3, minor: 6 };

    /// Parses `"3.6"`, `"3.6.2"` and the like. Anything after the minor
    /// component is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |m| m.parse().ok())?;
        Some(Self { major, minor })
    }
}

/// How privileged service commands are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    Pkexec,
    /// gksu takes the whole command as one argument.
    Gksu,
}

impl Elevation {
    /// pkexec unless the host is known to predate it.
    pub fn for_host(version: Option<HostVersion>) -> Self {
        match version {
            Some(v) if v < HostVersion::PKEXEC_SINCE => Elevation::Gksu,
            _ => Elevation::Pkexec,
        }
    }

    pub fn wrap(self, argv: Vec<String>) -> Vec<String> {
        match self {
            Elevation::Pkexec => std::iter::once("pkexec".to_string()).chain(argv).collect(),
            Elevation::Gksu => vec!["gksu".to_string(), argv.join(" ")],
        }
    }
}

/// `systemctl <verb> <unit>` under the given elevation wrapper.
pub fn service_command(action: ServiceAction, unit: &str, elevation: Elevation) -> Vec<String> {
    elevation.wrap(vec![
        "systemctl".to_string(),
        action.verb().to_string(),
        unit.to_string(),
    ])
}

/// Runs start/stop commands for the bumblebee unit on behalf of a host that
/// embeds the library and wires its menu item here. The standalone binary
/// only publishes the argv (`action_command` in `status.toml`) and lets the
/// panel run it.
///
/// The result is logged and otherwise ignored; the next poll shows whether
/// it worked.
pub struct ServiceControl<R> {
    runner: R,
    unit: String,
    elevation: Elevation,
}

impl<R: CommandRunner> ServiceControl<R> {
    pub fn new(runner: R, unit: impl Into<String>, elevation: Elevation) -> Self {
        Self {
            runner,
            unit: unit.into(),
            elevation,
        }
    }

    pub fn command(&self, action: ServiceAction) -> Vec<String> {
        service_command(action, &self.unit, self.elevation)
    }

    pub fn invoke(&self, action: ServiceAction) {
        let command = self.command(action);
        info!(command = ?command, "Requesting bumblebee {}", action.verb());
        self.runner.run(
            &command,
            Box::new(move |output| match output {
                Some(line) => debug!(action = ?action, "Service command said: {line}"),
                None => debug!(action = ?action, "Service command finished without output"),
            }),
        );
    }
}

/// Forwards a view to the inner presenter only when it differs from the last
/// one forwarded.
pub struct DiffingPresenter<P> {
    inner: P,
    last: Option<StatusView>,
}

impl<P: Presenter> DiffingPresenter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, last: None }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    /// Forgets the last view so the next one is forwarded unconditionally.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

impl<P: Presenter> Presenter for DiffingPresenter<P> {
    fn present(&mut self, view: &StatusView) {
        if self.last.as_ref() == Some(view) {
            return;
        }
        if let Some(previous) = &self.last {
            if previous.icon_name != view.icon_name {
                info!(from = previous.icon_name, to = view.icon_name, "Icon changed");
            }
        }
        self.inner.present(view);
        self.last = Some(*view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::tests::RecordingRunner;

    fn view(daemon: DaemonStatus, switch_state: SwitchStatus) -> StatusView {
        StatusView::from_snapshot(StatusSnapshot { daemon, switch_state })
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct Counting {
        views: Vec<StatusView>,
    }

    impl Presenter for Counting {
        fn present(&mut self, view: &StatusView) {
            self.views.push(*view);
        }
    }

    // ── icon / tooltip mapping ────────────────────────────────────────────────

    #[test]
    fn running_with_gpu_on_shows_on_icon() {
        let v = view(DaemonStatus::Running, SwitchStatus::On);
        assert_eq!(v.icon_name, ICON_ON);
        assert_eq!(v.tooltip, "The high performance GPU is ON");
    }

    #[test]
    fn running_with_gpu_off_shows_off_icon() {
        let v = view(DaemonStatus::Running, SwitchStatus::Off);
        assert_eq!(v.icon_name, ICON_OFF);
        assert_eq!(v.tooltip, "The high performance GPU is OFF");
    }

    #[test]
    fn unexpected_switch_output_is_reported_in_tooltip() {
        let v = view(DaemonStatus::Running, SwitchStatus::Unknown);
        assert_eq!(v.icon_name, ICON_UNAVAILABLE);
        assert_eq!(v.tooltip, "Test for bumblebee status returned unexpected result");
    }

    #[test]
    fn stopped_daemon_is_inactive_regardless_of_switch() {
        for s in [SwitchStatus::On, SwitchStatus::Off, SwitchStatus::Unknown, SwitchStatus::Inactive] {
            assert_eq!(view(DaemonStatus::Stopped, s).icon_name, ICON_INACTIVE);
        }
    }

    #[test]
    fn not_installed_is_unavailable() {
        let v = view(DaemonStatus::NotInstalled, SwitchStatus::Off);
        assert_eq!(v.icon_name, ICON_UNAVAILABLE);
        assert_eq!(v.tooltip, "The bumblebee is not installed");
    }

    // ── menu toggle ───────────────────────────────────────────────────────────

    #[test]
    fn stop_offered_only_while_running() {
        assert_eq!(MenuActions::for_daemon(DaemonStatus::Running).offered(), Some(ServiceAction::Stop));
        assert_eq!(MenuActions::for_daemon(DaemonStatus::Stopped).offered(), Some(ServiceAction::Start));
        assert_eq!(MenuActions::for_daemon(DaemonStatus::NotInstalled).offered(), None);
    }

    #[test]
    fn start_and_stop_are_mutually_exclusive() {
        for d in [
            DaemonStatus::Unknown,
            DaemonStatus::NotInstalled,
            DaemonStatus::Installed,
            DaemonStatus::Running,
            DaemonStatus::Stopped,
        ] {
            let m = MenuActions::for_daemon(d);
            assert!(!(m.start && m.stop), "{d:?}");
        }
    }

    // ── elevation ─────────────────────────────────────────────────────────────

    #[test]
    fn host_version_parses_major_minor_and_ignores_patch() {
        assert_eq!(HostVersion::parse("3.6.2"), Some(HostVersion { major: 3, minor: 6 }));
        assert_eq!(HostVersion::parse(" 4 "), Some(HostVersion { major: 4, minor: 0 }));
        assert_eq!(HostVersion::parse("cinnamon"), None);
        assert_eq!(HostVersion::parse("3.x"), None);
    }

    #[test]
    fn pkexec_from_3_6_gksu_before() {
        assert_eq!(Elevation::for_host(HostVersion::parse("3.6.0")), Elevation::Pkexec);
        assert_eq!(Elevation::for_host(HostVersion::parse("4.2")), Elevation::Pkexec);
        assert_eq!(Elevation::for_host(HostVersion::parse("3.4.6")), Elevation::Gksu);
        assert_eq!(Elevation::for_host(None), Elevation::Pkexec);
    }

    #[test]
    fn service_commands_are_passed_through_verbatim() {
        assert_eq!(
            service_command(ServiceAction::Start, "bumblebeed.service", Elevation::Pkexec),
            argv(&["pkexec", "systemctl", "start", "bumblebeed.service"])
        );
        assert_eq!(
            service_command(ServiceAction::Stop, "bumblebeed.service", Elevation::Gksu),
            argv(&["gksu", "systemctl stop bumblebeed.service"])
        );
    }

    #[test]
    fn service_control_runs_the_wrapped_command() {
        let runner = RecordingRunner::default();
        let control = ServiceControl::new(runner.clone(), "bumblebeed.service", Elevation::Pkexec);
        control.invoke(ServiceAction::Stop);
        assert_eq!(
            runner.commands(),
            vec![argv(&["pkexec", "systemctl", "stop", "bumblebeed.service"])]
        );
        runner.finish("pkexec", None);
    }

    // ── diffing ───────────────────────────────────────────────────────────────

    #[test]
    fn identical_views_are_forwarded_once() {
        let mut p = DiffingPresenter::new(Counting::default());
        let v = view(DaemonStatus::Running, SwitchStatus::Off);
        p.present(&v);
        p.present(&v);
        p.present(&v);
        assert_eq!(p.inner().views.len(), 1);
    }

    #[test]
    fn changed_views_are_forwarded() {
        let mut p = DiffingPresenter::new(Counting::default());
        p.present(&view(DaemonStatus::Running, SwitchStatus::Off));
        p.present(&view(DaemonStatus::Running, SwitchStatus::On));
        p.present(&view(DaemonStatus::Running, SwitchStatus::Off));
        assert_eq!(p.inner().views.len(), 3);
    }

    #[test]
    fn invalidate_forces_next_view_through() {
        let mut p = DiffingPresenter::new(Counting::default());
        let v = view(DaemonStatus::Stopped, SwitchStatus::Off);
        p.present(&v);
        p.invalidate();
        p.present(&v);
        assert_eq!(p.inner().views.len(), 2);
    }
}
