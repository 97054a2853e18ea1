use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use bumblebee_status::command::TokioCommandRunner;
use bumblebee_status::config::{self, Config};
use bumblebee_status::event::AppletEvent;
use bumblebee_status::paths;
use bumblebee_status::poller;
use bumblebee_status::presenter::{DiffingPresenter, Presenter, StatusView};
use bumblebee_status::status::StatusSnapshot;
use bumblebee_status::status_file::StatusFilePresenter;
use bumblebee_status::updater::OnStatusResolved;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Paths ─────────────────────────────────────────────────────────────────
    let (config_path, status_path) = match (paths::config_file_path(), paths::status_file_path()) {
        (Ok(c), Ok(s)) => (c, s),
        (Err(e), _) | (_, Err(e)) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };
    if let Some(dir) = config_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Failed to create config directory {}: {e}", dir.display());
            std::process::exit(1);
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("Config error (using defaults): {e:#}");
        Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let mut presenter = DiffingPresenter::new(StatusFilePresenter::new(
        status_path,
        config.commands.service_unit.clone(),
        config.elevation(),
    ));
    presenter.present(&StatusView::from_snapshot(StatusSnapshot::new()));

    let (event_tx, mut event_rx) = mpsc::channel::<AppletEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    let (settings_tx, settings_rx) = watch::channel(config.poll_settings());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let on_resolved: OnStatusResolved = {
        let tx = event_tx.clone();
        Box::new(move |snapshot| {
            if let Err(e) = tx.try_send(AppletEvent::StatusResolved(snapshot)) {
                warn!("Dropping resolved status: {e}");
            }
        })
    };
    let poller = tokio::spawn(poller::run(
        TokioCommandRunner::new(config.command_timeout()),
        settings_rx,
        shutdown_rx,
        on_resolved,
    ));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(AppletEvent::Shutdown).await;
            }
        });
    }

    info!("bumblebee-status v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            AppletEvent::StatusResolved(snapshot) => {
                presenter.present(&StatusView::from_snapshot(snapshot));
            }

            AppletEvent::ConfigReloaded(new_config) => {
                info!("Config reloaded");
                if new_config.command_timeout() != config.command_timeout() {
                    warn!("command_timeout_secs takes effect after a restart");
                }
                presenter
                    .inner_mut()
                    .set_service(new_config.commands.service_unit.clone(), new_config.elevation());
                // Re-render with the new action command on the next resolve.
                presenter.invalidate();
                settings_tx.send_replace(new_config.poll_settings());
                config = new_config;
            }

            AppletEvent::Shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = poller.await {
        warn!("Poller task ended abnormally: {e}");
    }

    // A stale status file would keep showing the last state after exit.
    let status_path = presenter.inner().path();
    if let Err(e) = std::fs::remove_file(status_path) {
        debug!("Could not remove {}: {e}", status_path.display());
    }
}
