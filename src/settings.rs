use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StreamError};

pub const DEFAULT_DESTINATION_URL: &str = "rtmp://a.rtmp.youtube.com/live2";

/// Destination of the outgoing stream, persisted as a flat JSON record.
///
/// Files written with the older upper-case keys are still accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(alias = "YOUTUBE_URL")]
    pub destination_base_url: String,
    #[serde(alias = "STREAM_KEY")]
    pub stream_key: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            destination_base_url: DEFAULT_DESTINATION_URL.to_string(),
            stream_key: String::new(),
        }
    }
}

impl StreamSettings {
    pub fn new(destination_base_url: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            destination_base_url: destination_base_url.into(),
            stream_key: stream_key.into(),
        }
    }

    pub fn has_stream_key(&self) -> bool {
        !self.stream_key.is_empty()
    }

    pub fn masked_key(&self) -> &'static str {
        if self.has_stream_key() {
            "****"
        } else {
            "(not set)"
        }
    }
}

/// Reads and writes [`StreamSettings`] at a fixed path. Nothing is cached:
/// every `load` goes back to disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<StreamSettings> {
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|e| StreamError::persistence(&self.path, e))?;

        if !exists {
            info!("No settings at {}, writing defaults", self.path.display());
            let defaults = StreamSettings::default();
            self.save(&defaults).await?;
            return Ok(defaults);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| StreamError::persistence(&self.path, e))?;
        let settings: StreamSettings = serde_json::from_str(&content)
            .map_err(|e| StreamError::persistence(&self.path, e))?;

        debug!(
            "Loaded settings from {} (url: {}, key: {})",
            self.path.display(),
            settings.destination_base_url,
            settings.masked_key()
        );
        Ok(settings)
    }

    /// Replaces the whole record. Written to a sibling temp file first and
    /// renamed over the target so readers never see a partial file.
    pub async fn save(&self, settings: &StreamSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StreamError::persistence(parent, e))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| StreamError::persistence(&self.path, e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| StreamError::persistence(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StreamError::persistence(&self.path, e))?;

        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("config.json"));

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, StreamSettings::default());

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        let parsed: StreamSettings = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed, StreamSettings::default());
        assert!(on_disk.contains("destinationBaseUrl"));
        assert!(on_disk.contains("streamKey"));
    }

    #[tokio::test]
    async fn save_then_load_returns_saved_values() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("config.json"));

        let settings = StreamSettings::new("rtmp://host/live2", "secret123");
        store.save(&settings).await.unwrap();
        assert_eq!(store.load().await.unwrap(), settings);

        let cleared = StreamSettings::new("rtmp://other/app", "");
        store.save(&cleared).await.unwrap();
        assert_eq!(store.load().await.unwrap(), cleared);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn reads_legacy_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"YOUTUBE_URL": "rtmp://a.rtmp.youtube.com/live2", "STREAM_KEY": "abcd"}"#,
        )
        .unwrap();

        let loaded = SettingsStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.stream_key, "abcd");
        assert_eq!(loaded.destination_base_url, DEFAULT_DESTINATION_URL);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let err = SettingsStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StreamError::Persistence { .. }));
    }

    #[tokio::test]
    async fn unwritable_location_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = SettingsStore::new(blocker.join("config.json"));

        let err = store.save(&StreamSettings::default()).await.unwrap_err();
        assert!(matches!(err, StreamError::Persistence { .. }));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StreamError::Persistence { .. }));
    }

    #[test]
    fn key_is_masked() {
        assert_eq!(StreamSettings::new("rtmp://x", "secret").masked_key(), "****");
        assert_eq!(StreamSettings::default().masked_key(), "(not set)");
    }
}
