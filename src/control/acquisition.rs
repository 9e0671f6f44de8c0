//! Acquisition file settings and the write command fan-out
//!
//! The file location, base name, extension and frame count are held
//! locally by the controller. When writing is switched on, every ranked
//! worker gets the frame count and its own file name (`<name>_r<rank>.<ext>`)
//! before the write flag is pushed to the whole pool.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::peer::ParameterController;
use super::rank::{worker_config_path, AssignmentReport, RankAssigner};
use crate::error::{ControlError, ControlResult};
use crate::params::ParameterTree;

pub const FILE_PATH_PATH: &str = "config/hdf/file/path";
pub const FILE_NAME_PATH: &str = "config/hdf/file/name";
pub const FILE_EXTENSION_PATH: &str = "config/hdf/file/extension";
pub const FRAMES_PATH: &str = "config/hdf/frames";

/// Command path switching file writing on or off
pub const WRITE_COMMAND_PATH: &str = "config/hdf/write";

const LOCAL_PATHS: [&str; 4] = [FILE_PATH_PATH, FILE_NAME_PATH, FILE_EXTENSION_PATH, FRAMES_PATH];

/// Whether `path` addresses one of the locally held acquisition settings
pub fn is_local_path(path: &str) -> bool {
    LOCAL_PATHS.contains(&path.trim_matches('/'))
}

/// Whether `path` is the write command
pub fn is_write_command(path: &str) -> bool {
    path.trim_matches('/') == WRITE_COMMAND_PATH
}

/// Interpret a write command body. `true`, `"true"` and `"1"` (any case)
/// switch writing on; everything else switches it off.
pub fn parse_write_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => {
            let s = s.trim().trim_matches('"').to_lowercase();
            s == "true" || s == "1"
        }
        _ => false,
    }
}

/// Snapshot of the acquisition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub file_path: String,
    pub file_name: String,
    pub file_extension: String,
    pub frames: u64,
}

impl AcquisitionSettings {
    /// Read the current settings from a controller's parameter tree
    pub fn from_tree(tree: &ParameterTree) -> ControlResult<Self> {
        let text = |path: &str| -> ControlResult<String> {
            match tree.leaf(path)? {
                Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            }
        };

        let frames = tree
            .leaf(FRAMES_PATH)?
            .as_u64()
            .ok_or_else(|| ControlError::invalid_value(FRAMES_PATH, "frames must be a non-negative integer"))?;

        Ok(Self {
            file_path: text(FILE_PATH_PATH)?,
            file_name: text(FILE_NAME_PATH)?,
            file_extension: text(FILE_EXTENSION_PATH)?,
            frames,
        })
    }

    /// Check the settings before any worker is touched
    pub fn validate(&self) -> ControlResult<()> {
        if !Path::new(&self.file_path).is_dir() {
            return Err(ControlError::invalid_value(
                FILE_PATH_PATH,
                format!("Invalid path specified [{}]", self.file_path),
            ));
        }
        if self.file_extension.is_empty() {
            return Err(ControlError::invalid_value(
                FILE_EXTENSION_PATH,
                "File extension must not be empty",
            ));
        }
        if self.file_name.is_empty() {
            return Err(ControlError::invalid_value(
                FILE_NAME_PATH,
                "File name must not be empty",
            ));
        }
        Ok(())
    }

    /// File name written by the worker at `rank`
    pub fn file_name_for_rank(&self, rank: usize) -> String {
        format!("{}_r{}.{}", self.file_name, rank, self.file_extension)
    }
}

/// Drives the write command across the ranked pool
#[derive(Debug, Clone, Default)]
pub struct AcquisitionFanout {
    assigner: RankAssigner,
}

impl AcquisitionFanout {
    pub fn new(assigner: RankAssigner) -> Self {
        Self { assigner }
    }

    /// Switch writing on.
    ///
    /// Re-runs rank assignment, sends every worker its frame count and
    /// file name, then enables writing on the whole pool. Rank failures are
    /// logged by the assigner and do not stop the fan-out; a failed file
    /// setup write does.
    pub async fn start<P, W>(
        &self,
        settings: &AcquisitionSettings,
        peer: &P,
        workers: &W,
    ) -> ControlResult<AssignmentReport>
    where
        P: ParameterController + ?Sized,
        W: ParameterController + ?Sized,
    {
        settings.validate()?;

        let report = self.assigner.assign(peer, workers).await?;

        for rank in 0..report.process_count {
            let path = worker_config_path(rank);
            workers
                .put(&path, json!({"hdf": {"frames": settings.frames}}))
                .await?;
            workers
                .put(
                    &path,
                    json!({
                        "hdf": {
                            "file": {
                                "path": settings.file_path,
                                "name": settings.file_name_for_rank(rank),
                            }
                        }
                    }),
                )
                .await?;
        }

        self.broadcast_write(report.process_count, true, workers).await?;

        tracing::info!(
            process_count = report.process_count,
            frames = settings.frames,
            path = %settings.file_path,
            "File writing enabled"
        );
        Ok(report)
    }

    /// Switch writing off on every worker in the pool
    pub async fn stop<P, W>(&self, peer: &P, workers: &W) -> ControlResult<usize>
    where
        P: ParameterController + ?Sized,
        W: ParameterController + ?Sized,
    {
        let process_count = self.assigner.read_pool_size(peer).await?;
        self.broadcast_write(process_count, false, workers).await?;

        tracing::info!(process_count, "File writing disabled");
        Ok(process_count)
    }

    async fn broadcast_write<W>(&self, process_count: usize, write: bool, workers: &W) -> ControlResult<()>
    where
        W: ParameterController + ?Sized,
    {
        for rank in 0..process_count {
            workers
                .put(&worker_config_path(rank), json!({"hdf": {"write": write}}))
                .await?;
        }
        Ok(())
    }
}
