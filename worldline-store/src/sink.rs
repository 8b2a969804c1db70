//! Per-step frame sinks for the pipeline runner.

use std::sync::Arc;

use worldline_core::{FrameSink, WorldState};

use crate::archive::ArchiveWriter;
use crate::traits::SnapshotStore;

/// Writes a frame file after every step.
pub struct ArchiveFrameSink {
    writer: Arc<ArchiveWriter>,
}

impl ArchiveFrameSink {
    pub fn new(writer: Arc<ArchiveWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait::async_trait]
impl FrameSink for ArchiveFrameSink {
    async fn on_step(&self, world: &WorldState, _step_index: usize) -> worldline_core::Result<()> {
        self.writer.write_frame(world).await?;
        Ok(())
    }
}

/// Saves every step's frame to a snapshot store and indexes the run.
pub struct StoreFrameSink {
    store: Arc<dyn SnapshotStore>,
}

impl StoreFrameSink {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl FrameSink for StoreFrameSink {
    async fn on_step(&self, world: &WorldState, step_index: usize) -> worldline_core::Result<()> {
        self.store.save_frame(&world.to_frame()).await?;
        if step_index == 0 {
            self.store.index_run(&world.pipeline_id, &world.run_id).await?;
        }
        Ok(())
    }
}
