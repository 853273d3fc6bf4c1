use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration: CLI arguments plus `FACEGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Camera index or V4L2 device path (default: "0").
    pub camera: String,
    /// Directory holding enrolled face images.
    pub db_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// How long the lock line stays asserted per grant.
    pub lock_hold: Duration,
    /// Poll interval while waiting for the enroll button to be released.
    pub debounce_poll: Duration,
    /// Sysfs GPIO root.
    pub gpio_root: PathBuf,
    /// Parent directory of the per-session log folders.
    pub log_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment, then apply the CLI values.
    ///
    /// `db_dir` defaults to `<cwd>/db` when not given.
    pub fn from_env(camera: String, db_dir: Option<PathBuf>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facegate_core::default_model_dir());

        Self {
            camera,
            db_dir: db_dir.unwrap_or_else(|| cwd.join("db")),
            model_dir,
            similarity_threshold: env_f32(
                "FACEGATE_SIMILARITY_THRESHOLD",
                facegate_core::DEFAULT_SIMILARITY_THRESHOLD,
            ),
            lock_hold: Duration::from_millis(env_u64("FACEGATE_LOCK_HOLD_MS", 1000)),
            debounce_poll: Duration::from_millis(env_u64("FACEGATE_DEBOUNCE_POLL_MS", 100)),
            gpio_root: std::env::var("FACEGATE_GPIO_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(facegate_hw::gpio::SYSFS_GPIO_ROOT)),
            log_dir: std::env::var("FACEGATE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| cwd.join("logs")),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_cli_values() {
        let cfg = Config::from_env("2".into(), Some(PathBuf::from("/srv/faces")));
        assert_eq!(cfg.camera, "2");
        assert_eq!(cfg.db_dir, PathBuf::from("/srv/faces"));
        assert!(cfg.scrfd_model_path().ends_with("det_10g.onnx"));
        assert!(cfg.arcface_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_db_dir_defaults_to_cwd() {
        let cfg = Config::from_env("0".into(), None);
        assert!(cfg.db_dir.ends_with("db"));
    }

    #[test]
    fn test_env_parsers_fall_back_on_garbage() {
        assert_eq!(env_u64("FACEGATE_TEST_UNSET_U64", 7), 7);
        assert_eq!(env_f32("FACEGATE_TEST_UNSET_F32", 0.5), 0.5);
    }
}
