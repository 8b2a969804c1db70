//! Key-value snapshot store.
//!
//! Frames live at `<namespace>:worlds:<pipelineId>:<runId>:frame:<tick>` and
//! each pipeline keeps the set of its known runs at
//! `<namespace>:index:<pipelineId>`. Ids containing `:` are rejected so keys
//! never alias. The storage engine is abstracted behind [`KvBackend`].

use std::sync::Arc;

use tracing::{debug, info};
use worldline_core::WorldFrame;

use crate::codec::{decode, FrameCodec};
use crate::error::Result;
use crate::traits::{check_addressable, check_ids, SnapshotStore};

/// Minimal key-value client: byte values plus string sets.
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove keys; returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}

/// [`SnapshotStore`] over any [`KvBackend`].
pub struct KvSnapshotStore<B> {
    backend: Arc<B>,
    namespace: String,
    codec: FrameCodec,
}

impl<B: KvBackend> KvSnapshotStore<B> {
    pub fn new(backend: Arc<B>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            codec: FrameCodec::new(false),
        }
    }

    /// Gzip frames on write. Reads handle both forms.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.codec = FrameCodec::new(compress);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn frame_key(&self, pipeline_id: &str, run_id: &str, tick: u64) -> String {
        format!("{}{}", self.run_prefix(pipeline_id, run_id), tick)
    }

    fn run_prefix(&self, pipeline_id: &str, run_id: &str) -> String {
        format!("{}:worlds:{}:{}:frame:", self.namespace, pipeline_id, run_id)
    }

    pub fn index_key(&self, pipeline_id: &str) -> String {
        format!("{}{}", self.index_prefix(), pipeline_id)
    }

    fn index_prefix(&self) -> String {
        format!("{}:index:", self.namespace)
    }

    /// Delete every run recorded for a pipeline, then its index.
    pub async fn delete_all_runs(&self, pipeline_id: &str) -> Result<usize> {
        let runs = self.list_runs(pipeline_id).await?;
        for run_id in &runs {
            self.delete_run(pipeline_id, run_id).await?;
        }
        self.backend.delete(&[self.index_key(pipeline_id)]).await?;
        info!(pipeline_id = %pipeline_id, runs = runs.len(), "Deleted all runs");
        Ok(runs.len())
    }
}

#[async_trait::async_trait]
impl<B: KvBackend> SnapshotStore for KvSnapshotStore<B> {
    async fn save_frame(&self, frame: &WorldFrame) -> Result<()> {
        check_addressable(frame)?;
        let key = self.frame_key(&frame.pipeline_id, &frame.run_id, frame.tick);
        let bytes = self.codec.encode(frame)?;
        debug!(key = %key, bytes = bytes.len(), "Saving frame");
        self.backend.set(&key, bytes).await
    }

    async fn get_frame(&self, pipeline_id: &str, run_id: &str, tick: u64) -> Result<Option<WorldFrame>> {
        let key = self.frame_key(pipeline_id, run_id, tick);
        match self.backend.get(&key).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_frames(&self, pipeline_id: &str, run_id: &str) -> Result<Vec<u64>> {
        let prefix = self.run_prefix(pipeline_id, run_id);
        let mut ticks: Vec<u64> = self
            .backend
            .keys_with_prefix(&prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.parse().ok())
            .collect();
        ticks.sort_unstable();
        Ok(ticks)
    }

    async fn delete_run(&self, pipeline_id: &str, run_id: &str) -> Result<()> {
        let prefix = self.run_prefix(pipeline_id, run_id);
        let keys: Vec<String> = self
            .backend
            .keys_with_prefix(&prefix)
            .await?
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&prefix)
                    .is_some_and(|tick| tick.parse::<u64>().is_ok())
            })
            .collect();
        let removed = self.backend.delete(&keys).await?;
        self.backend
            .set_remove(&self.index_key(pipeline_id), run_id)
            .await?;
        debug!(pipeline_id = %pipeline_id, run_id = %run_id, frames = removed, "Deleted run");
        Ok(())
    }

    async fn list_runs(&self, pipeline_id: &str) -> Result<Vec<String>> {
        let mut runs = self.backend.set_members(&self.index_key(pipeline_id)).await?;
        runs.sort();
        Ok(runs)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let prefix = self.index_prefix();
        let mut ids: Vec<String> = self
            .backend
            .keys_with_prefix(&prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn index_run(&self, pipeline_id: &str, run_id: &str) -> Result<()> {
        check_ids(pipeline_id, run_id)?;
        self.backend.set_add(&self.index_key(pipeline_id), run_id).await
    }
}
