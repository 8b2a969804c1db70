//! World archive files.
//!
//! A run writes into `<output_root>/<archive_dir>/<pipelineId>_<YYYY-MM-DD_HH_MM>/`:
//! one `frame-<step+1>-tick-<tick>.world.json.gz` per step and a final
//! `<pipelineId>.world.json.gz`. The `.gz` suffix is kept even when
//! compression is off; readers sniff the content instead.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};
use worldline_core::{SimulatorConfig, WorldArchive, WorldFrame, WorldState};

use crate::codec::{decode, FrameCodec};
use crate::error::{Result, StoreError};

const WORLD_SUFFIX: &str = ".world.json.gz";

/// Writes frame and archive files for one run.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    dir: PathBuf,
    codec: FrameCodec,
}

impl ArchiveWriter {
    /// Writer rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            codec: FrameCodec::new(compress),
        }
    }

    /// Timestamped run directory under the configured archive root.
    pub fn for_run(config: &SimulatorConfig, pipeline_id: &str) -> Self {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H_%M");
        let dir = config
            .archive_root()
            .join(format!("{pipeline_id}_{stamp}"));
        Self::new(dir, config.compress)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, world: &WorldState) -> PathBuf {
        self.dir
            .join(format!("frame-{}-tick-{}{}", world.step + 1, world.tick, WORLD_SUFFIX))
    }

    pub fn archive_path(&self, pipeline_id: &str) -> PathBuf {
        self.dir.join(format!("{pipeline_id}{WORLD_SUFFIX}"))
    }

    /// Write the world's current frame.
    pub async fn write_frame(&self, world: &WorldState) -> Result<PathBuf> {
        let path = self.frame_path(world);
        let frame = world.to_frame();
        self.write(&path, &frame).await?;
        debug!(path = %path.display(), tick = world.tick, "Frame written");
        Ok(path)
    }

    /// Write the final archive. The returned archive carries its file path.
    pub async fn write_archive(&self, world: &WorldState) -> Result<WorldArchive> {
        let path = self.archive_path(&world.pipeline_id);
        let mut archive = WorldArchive::from_world(world);
        archive.file_path = Some(path.display().to_string());
        self.write(&path, &archive).await?;
        info!(
            path = %path.display(),
            members = archive.members.len(),
            compressed = self.codec.compresses(),
            "World archive written"
        );
        Ok(archive)
    }

    async fn write<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = self.codec.encode(value)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// Load a frame or archive file, compressed or not, as a frame.
pub async fn read_world_file(path: impl AsRef<Path>) -> Result<WorldFrame> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io(e)
        }
    })?;
    let value: Value = decode(&bytes)?;
    let frame = match value.get("type").and_then(Value::as_str) {
        Some("WorldArchive") => serde_json::from_value::<WorldArchive>(value)?.into_frame(),
        _ => serde_json::from_value::<WorldFrame>(value)?,
    };
    debug!(path = %path.display(), tick = frame.tick, members = frame.members.len(), "World file loaded");
    Ok(frame)
}
