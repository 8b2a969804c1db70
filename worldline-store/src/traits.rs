//! Snapshot store contract.

use worldline_core::WorldFrame;

use crate::error::{Result, StoreError};

/// Durable storage of world frames addressed by (pipeline, run, tick).
///
/// Pipeline and run ids are key segments and may not contain `:`.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a frame under its pipeline, run and tick. Overwrites.
    async fn save_frame(&self, frame: &WorldFrame) -> Result<()>;

    async fn get_frame(&self, pipeline_id: &str, run_id: &str, tick: u64) -> Result<Option<WorldFrame>>;

    /// Ticks of every frame saved for a run, ascending.
    async fn list_frames(&self, pipeline_id: &str, run_id: &str) -> Result<Vec<u64>>;

    /// Frame with the numerically highest tick.
    async fn get_latest_frame(&self, pipeline_id: &str, run_id: &str) -> Result<Option<WorldFrame>> {
        match self.list_frames(pipeline_id, run_id).await?.last() {
            Some(tick) => self.get_frame(pipeline_id, run_id, *tick).await,
            None => Ok(None),
        }
    }

    /// Remove every frame of a run and drop it from the index.
    async fn delete_run(&self, pipeline_id: &str, run_id: &str) -> Result<()>;

    /// Runs recorded in the pipeline's index.
    async fn list_runs(&self, pipeline_id: &str) -> Result<Vec<String>>;

    async fn list_pipelines(&self) -> Result<Vec<String>>;

    /// Record a run in the pipeline's index. Ids may not contain `:`.
    async fn index_run(&self, pipeline_id: &str, run_id: &str) -> Result<()>;
}

/// Separator of store keys; not allowed inside pipeline or run ids.
pub(crate) const KEY_SEPARATOR: char = ':';

fn id_problem(pipeline_id: &str, run_id: &str) -> Option<String> {
    if pipeline_id.is_empty() || run_id.is_empty() {
        Some("missing pipeline or run id".into())
    } else if pipeline_id.contains(KEY_SEPARATOR) || run_id.contains(KEY_SEPARATOR) {
        Some(format!(
            "ids may not contain '{KEY_SEPARATOR}': pipeline {pipeline_id}, run {run_id}"
        ))
    } else {
        None
    }
}

/// Reject ids that are empty or would alias another key.
pub(crate) fn check_ids(pipeline_id: &str, run_id: &str) -> Result<()> {
    match id_problem(pipeline_id, run_id) {
        Some(problem) => Err(StoreError::InvalidFrame(problem)),
        None => Ok(()),
    }
}

/// Reject frames that cannot be addressed.
pub(crate) fn check_addressable(frame: &WorldFrame) -> Result<()> {
    match id_problem(&frame.pipeline_id, &frame.run_id) {
        Some(problem) => Err(StoreError::InvalidFrame(format!("{}: {problem}", frame.id))),
        None => Ok(()),
    }
}
