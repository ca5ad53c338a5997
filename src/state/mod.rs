mod bot_state;
mod timestamp_map;

pub use bot_state::BotState;

use crate::{BotError, Result};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Flat-file store for [`BotState`]. Writes go through a temporary file and an
/// atomic rename so an interrupted save never leaves a truncated state file.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<BotState> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!(
                    "No state file at {}, starting with empty state",
                    self.path.display()
                );
                return Ok(BotState::default());
            }
            Err(e) => return Err(BotError::CorruptState(self.path.clone(), e.to_string())),
        };

        serde_json::from_slice(&raw)
            .map_err(|e| BotError::CorruptState(self.path.clone(), e.to_string()))
    }

    pub async fn save(&self, state: &BotState) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&serialized).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp: OsString = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}
