use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::process::Launcher;
use crate::scanner::find_newest;
use crate::settings::{SettingsStore, StreamSettings};
use crate::supervisor::{SessionInfo, StreamEvent, StreamStatus, StreamSupervisor};

/// Everything a front end needs for one session: the watched folder, the
/// settings file and the supervisor.
pub struct StreamController {
    settings: SettingsStore,
    supervisor: StreamSupervisor,
    extension: String,
    folder: Option<PathBuf>,
}

impl StreamController {
    pub fn new(config: &Config, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            settings: SettingsStore::new(config.settings_path()),
            supervisor: StreamSupervisor::new(config, launcher),
            extension: config.extension.clone(),
            folder: None,
        }
    }

    pub fn select_folder(&mut self, folder: impl Into<PathBuf>) {
        let folder = folder.into();
        info!("Watching {}", folder.display());
        self.folder = Some(folder);
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn supervisor(&self) -> &StreamSupervisor {
        &self.supervisor
    }

    pub async fn newest_file(&self) -> Result<Option<PathBuf>> {
        let folder = self.folder.as_deref().ok_or(StreamError::NoFolderSelected)?;
        find_newest(folder, &self.extension).await
    }

    /// Streams the newest file in the watched folder. Settings are read from
    /// disk on every call so edits made while idle take effect.
    pub async fn start_newest(&self) -> Result<SessionInfo> {
        let newest = self.newest_file().await?;
        let settings = self.settings.load().await?;
        self.supervisor
            .start(
                newest.as_deref(),
                &settings.destination_base_url,
                &settings.stream_key,
            )
            .await
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    pub async fn status(&self) -> StreamStatus {
        self.supervisor.status().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.supervisor.subscribe()
    }

    pub async fn load_settings(&self) -> Result<StreamSettings> {
        self.settings.load().await
    }

    /// Saves both values after trimming; neither may be empty.
    pub async fn save_settings(&self, destination_base_url: &str, stream_key: &str) -> Result<()> {
        let destination_base_url = destination_base_url.trim();
        let stream_key = stream_key.trim();
        if destination_base_url.is_empty() || stream_key.is_empty() {
            return Err(StreamError::InvalidSettings(
                "both the destination URL and the stream key must be filled".to_string(),
            ));
        }

        self.settings
            .save(&StreamSettings::new(destination_base_url, stream_key))
            .await
    }
}
