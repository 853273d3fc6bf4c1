//! Console and per-session file logging.

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const SUMMARY_FILE: &str = "summary.log";
const RULE: &str = "==================================================";

/// Session log folder: `<root>/<YYYY_MM_DD_HH_MM_SS>`.
pub fn session_dir(root: &Path, started: DateTime<Local>) -> PathBuf {
    root.join(started.format("%Y_%m_%d_%H_%M_%S").to_string())
}

fn open_summary(dir: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    File::create(dir.join(SUMMARY_FILE))
}

/// Install the global subscriber and return the session folder.
///
/// The file sink is best effort: if the folder cannot be created, logging
/// continues on the console only and a warning is emitted.
pub fn init(log_root: &Path) -> PathBuf {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let folder = session_dir(log_root, Local::now());

    let (summary, open_error) = match open_summary(&folder) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };
    let file_layer = summary.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        // Already initialised (tests).
    }

    if let Some(e) = open_error {
        tracing::warn!(path = %folder.display(), error = %e, "summary log unavailable, console only");
    }
    folder
}

/// Startup banner, logged once before the controller starts.
pub fn banner(folder: &Path, db_dir: &Path, camera: &str) {
    tracing::info!("{RULE}");
    tracing::info!("facegate door access controller {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("{RULE}");
    tracing::info!(path = %folder.display(), "log folder");
    tracing::info!(path = %db_dir.display(), "database folder");
    tracing::info!(camera, "camera");
    tracing::info!("{RULE}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_dir_format() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let dir = session_dir(Path::new("/var/log/facegate"), started);
        assert_eq!(dir, PathBuf::from("/var/log/facegate/2024_03_07_09_05_01"));
    }

    #[test]
    fn test_open_summary_creates_folder() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("2024_01_01_00_00_00");
        open_summary(&folder).unwrap();
        assert!(folder.join(SUMMARY_FILE).is_file());
    }
}
