/// Canonical file paths for bumblebee-status data files on Linux.
///
///   - config.toml  `$XDG_CONFIG_HOME/bumblebee-status/`, written by the user.
///   - status.toml  `$XDG_RUNTIME_DIR/bumblebee-status/`, written by the
///     indicator and read by the panel. Falls back to the data-local dir
///     when there is no runtime dir.
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "bumblebee-status";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_DIR_NAME).context("No home directory to keep settings in")
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn status_dir() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let dir = dirs.runtime_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(dir.to_path_buf())
}

pub fn status_file_path() -> Result<PathBuf> {
    Ok(status_dir()?.join(STATUS_FILE_NAME))
}

#[cfg(test)]
#[cfg(target_os = "linux")]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_app_name() {
        let dir = config_dir().unwrap();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path().unwrap();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        let path = status_file_path().unwrap();
        assert_eq!(path.file_name().unwrap(), STATUS_FILE_NAME);
        assert_eq!(path.parent().unwrap().file_name().unwrap(), APP_DIR_NAME);
    }
}
