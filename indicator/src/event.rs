use crate::config::Config;
use crate::status::StatusSnapshot;

pub enum AppletEvent {
    /// Every check of a polling cycle has come back.
    StatusResolved(StatusSnapshot),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; stop polling and exit.
    Shutdown,
}
