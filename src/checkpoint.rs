//! Persistence of the trainer state bundle and the per-epoch weights paths.

use crate::schedule::ScheduleState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found at {path}")]
    NotFound { path: PathBuf },
    #[error("checkpoint corrupt at {path}: {msg}")]
    Corrupt { path: PathBuf, msg: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything besides the weights that a resumed run needs: the last fully
/// completed epoch, the optimizer's opaque state, and the decay schedule
/// counters. Resume continues at `epoch + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerState {
    pub epoch: usize,
    pub optimizer: serde_json::Value,
    pub lr_scheduler: ScheduleState,
}

/// Owns `workspace/checkpoint/`. Two artifacts per epoch: a weights file
/// with a numeric epoch suffix (written by the model itself) and a single
/// rolling trainer-state file, overwritten atomically each epoch.
pub struct CheckpointManager {
    dir: PathBuf,
    savename: String,
}

impl CheckpointManager {
    pub fn new(workspace: &Path, savename: &str) -> Result<Self, CheckpointError> {
        let dir = workspace.join("checkpoint");
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self {
            dir,
            savename: savename.to_string(),
        })
    }

    /// Templated weights path for one epoch, e.g. `yolov3-ckpt-007.json`.
    pub fn weights_path(&self, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("{}-ckpt-{:03}.json", self.savename, epoch))
    }

    pub fn trainer_state_path(&self) -> PathBuf {
        self.dir.join("trainer-ckpt.json")
    }

    /// Write the trainer state, temp-then-rename so a concurrent reader
    /// either sees the previous complete bundle or the new one, never a
    /// half-written file.
    pub fn save_state(&self, state: &TrainerState) -> Result<(), CheckpointError> {
        let path = self.trainer_state_path();
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| CheckpointError::Corrupt {
            path: path.clone(),
            msg: e.to_string(),
        })?;
        let tmp = self.dir.join("trainer-ckpt.json.tmp");
        fs::write(&tmp, &bytes).map_err(|e| CheckpointError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| CheckpointError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn load_state(&self) -> Result<TrainerState, CheckpointError> {
        let path = self.trainer_state_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound { path })
            }
            Err(e) => return Err(CheckpointError::Io { path, source: e }),
        };
        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
            path,
            msg: e.to_string(),
        })
    }
}
