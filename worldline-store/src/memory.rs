//! In-memory snapshot store for tests and dry runs.

use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::debug;
use worldline_core::WorldFrame;

use crate::error::Result;
use crate::traits::{check_addressable, check_ids, SnapshotStore};

/// Frames keyed `<pipeline>:<run>:<tick>`; an index set per pipeline.
#[derive(Default)]
pub struct MemorySnapshotStore {
    frames: DashMap<String, WorldFrame>,
    index: DashMap<String, BTreeSet<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(pipeline_id: &str, run_id: &str, tick: u64) -> String {
        format!("{pipeline_id}:{run_id}:{tick}")
    }

    fn run_prefix(pipeline_id: &str, run_id: &str) -> String {
        format!("{pipeline_id}:{run_id}:")
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_frame(&self, frame: &WorldFrame) -> Result<()> {
        check_addressable(frame)?;
        let key = Self::key(&frame.pipeline_id, &frame.run_id, frame.tick);
        debug!(key = %key, members = frame.members.len(), "Saving frame in memory");
        self.frames.insert(key, frame.clone());
        Ok(())
    }

    async fn get_frame(&self, pipeline_id: &str, run_id: &str, tick: u64) -> Result<Option<WorldFrame>> {
        Ok(self
            .frames
            .get(&Self::key(pipeline_id, run_id, tick))
            .map(|f| f.value().clone()))
    }

    async fn list_frames(&self, pipeline_id: &str, run_id: &str) -> Result<Vec<u64>> {
        let prefix = Self::run_prefix(pipeline_id, run_id);
        let mut ticks: Vec<u64> = self
            .frames
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&prefix)?.parse().ok())
            .collect();
        ticks.sort_unstable();
        Ok(ticks)
    }

    async fn delete_run(&self, pipeline_id: &str, run_id: &str) -> Result<()> {
        let prefix = Self::run_prefix(pipeline_id, run_id);
        self.frames.retain(|key, _| {
            key.strip_prefix(&prefix)
                .map_or(true, |tick| tick.parse::<u64>().is_err())
        });
        if let Some(mut runs) = self.index.get_mut(pipeline_id) {
            runs.remove(run_id);
        }
        Ok(())
    }

    async fn list_runs(&self, pipeline_id: &str) -> Result<Vec<String>> {
        Ok(self
            .index
            .get(pipeline_id)
            .map(|runs| runs.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.index.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn index_run(&self, pipeline_id: &str, run_id: &str) -> Result<()> {
        check_ids(pipeline_id, run_id)?;
        self.index
            .entry(pipeline_id.to_string())
            .or_default()
            .insert(run_id.to_string());
        Ok(())
    }
}
