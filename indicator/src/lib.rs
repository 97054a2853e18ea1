//! Status indicator core for the bumblebee GPU-switching service.
//!
//! [`poller::run`] drives a [`updater::StatusUpdater`], which probes the
//! system through a [`command::CommandRunner`] and hands every resolved
//! [`status::StatusSnapshot`] to its callback. A host turns snapshots into
//! panel state with [`presenter::StatusView`].

pub mod check;
pub mod command;
pub mod config;
pub mod event;
pub mod paths;
pub mod poller;
pub mod presenter;
pub mod status;
pub mod status_file;
pub mod updater;
