use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::check::CheckCommands;
use crate::command::CommandRunner;
use crate::updater::{OnStatusResolved, StatusUpdater};

/// What the poller needs from the config. Pushed through a watch channel so a
/// reload reaches the running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub commands: CheckCommands,
}

/// Owns the [`StatusUpdater`] and drives it: one refresh per tick, every
/// completion fed back in, all on this task.
///
/// The first refresh happens immediately. When `settings` changes, the timer
/// restarts with the new interval and the updater is reconfigured. Returns
/// once `shutdown` changes or its sender is dropped; commands still running
/// at that point finish on their own and their results are discarded.
pub async fn run<R: CommandRunner>(
    runner: R,
    mut settings: watch::Receiver<PollSettings>,
    mut shutdown: watch::Receiver<bool>,
    on_resolved: OnStatusResolved,
) {
    let initial = settings.borrow_and_update().clone();
    let (mut updater, mut completions) = StatusUpdater::new(runner, initial.commands, on_resolved);
    let mut ticker = new_ticker(initial.interval, true);
    info!(interval = ?initial.interval, "Polling started");

    loop {
        tokio::select! {
            _ = ticker.tick() => updater.request_refresh(),
            Some(completion) = completions.recv() => updater.complete(completion),
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = settings.borrow_and_update().clone();
                if next.interval != ticker.period() {
                    info!(interval = ?next.interval, "Restarting poll timer");
                    ticker = new_ticker(next.interval, false);
                }
                updater.reconfigure(next.commands);
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!(pending = updater.in_flight().len(), "Polling stopped");
}

fn new_ticker(period: Duration, immediate: bool) -> Interval {
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    // A stalled loop should not fire a burst of refreshes afterwards.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
