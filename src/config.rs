use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

pub const DEFAULT_EXTENSION: &str = ".mp4";
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const SETTINGS_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub transcoder: String,
    pub extension: String,
    pub stop_timeout: Duration,
}

impl Config {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            transcoder: DEFAULT_TRANSCODER.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Per-user configuration directory, e.g. `~/.config/restream` on Linux.
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "restream").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }
}
