//! Run orchestration: world preparation, sinks, archives and branches.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{info, warn};
use worldline_core::{
    PipelineDefinition, PipelineRegistry, PipelineResult, PipelineRunner, WorldArchive,
    WorldState, WorldSummary,
};
use worldline_store::{
    read_world_file, ArchiveFrameSink, ArchiveWriter, SnapshotStore, StoreFrameSink,
};

use crate::config::SimConfig;
use crate::error::Result;
use crate::pipelines::default_registry;

/// Where the starting world comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorldSource {
    #[default]
    New,
    /// Resume from a saved frame, keeping its run id.
    Frame(PathBuf),
    /// Fork a saved world with the run's parameters.
    Archive(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub pipeline_id: String,
    pub source: WorldSource,
    pub params: Map<String, Value>,
    /// Extra forks of the prepared world; 0 runs the world itself.
    pub branches: usize,
}

impl SimulationRequest {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            source: WorldSource::New,
            params: Map::new(),
            branches: 0,
        }
    }

    pub fn with_source(mut self, source: WorldSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_branches(mut self, branches: usize) -> Self {
        self.branches = branches;
        self
    }
}

/// Outcome of one executed world.
#[derive(Debug)]
pub struct RunReport {
    pub summary: WorldSummary,
    pub archive: WorldArchive,
    pub result: PipelineResult,
    pub world: WorldState,
}

impl RunReport {
    pub fn archive_path(&self) -> Option<&str> {
        self.archive.file_path.as_deref()
    }
}

/// Drives pipelines from the registry against prepared worlds.
pub struct Simulator {
    config: SimConfig,
    registry: PipelineRegistry,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            registry: default_registry(),
            store: None,
        }
    }

    pub fn with_registry(mut self, registry: PipelineRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Also save every step's frame to `store`.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Build the starting world for a request.
    pub async fn prepare_world(&self, request: &SimulationRequest) -> Result<WorldState> {
        match &request.source {
            WorldSource::New => Ok(WorldState::new(request.pipeline_id.clone())),
            WorldSource::Frame(path) => {
                let frame = read_world_file(path).await?;
                let run_id = if frame.run_id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    frame.run_id.clone()
                };
                info!(path = %path.display(), tick = frame.tick, run_id = %run_id, "Resuming from frame");
                Ok(WorldState::from_frame(&frame, request.pipeline_id.clone(), run_id))
            }
            WorldSource::Archive(path) => {
                let frame = read_world_file(path).await?;
                let pipeline_id = if frame.pipeline_id.is_empty() {
                    request.pipeline_id.clone()
                } else {
                    frame.pipeline_id.clone()
                };
                let source = WorldState::from_frame(&frame, pipeline_id, frame.run_id.clone());
                let mut fork = source.fork(Some(request.params.clone()));
                fork.pipeline_id = request.pipeline_id.clone();
                info!(
                    path = %path.display(),
                    forked_from = %source.run_id,
                    run_id = %fork.run_id,
                    "Forking archived world"
                );
                Ok(fork)
            }
        }
    }

    /// Prepare the world and run the requested pipeline on it, or on
    /// `branches` forks of it concurrently.
    pub async fn run(&self, request: &SimulationRequest) -> Result<Vec<RunReport>> {
        let pipeline = self.registry.get(&request.pipeline_id)?;
        let world = self.prepare_world(request).await?;
        let writer = ArchiveWriter::for_run(&self.config.simulator, &request.pipeline_id);

        if request.branches == 0 {
            let report = self
                .run_world(pipeline.as_ref(), world, &request.params, writer)
                .await?;
            return Ok(vec![report]);
        }

        info!(
            pipeline_id = %request.pipeline_id,
            source_run = %world.run_id,
            branches = request.branches,
            "Running forked branches"
        );
        let definition = pipeline.as_ref();
        let runs = (0..request.branches).map(|_| {
            let fork = world.fork(Some(request.params.clone()));
            let branch_writer = ArchiveWriter::new(
                writer.dir().join(&fork.run_id),
                self.config.simulator.compress,
            );
            self.run_world(definition, fork, &request.params, branch_writer)
        });

        let mut reports = Vec::with_capacity(request.branches);
        for outcome in join_all(runs).await {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(error = %e, "Branch failed");
                    return Err(e);
                }
            }
        }
        Ok(reports)
    }

    async fn run_world(
        &self,
        pipeline: &dyn PipelineDefinition,
        mut world: WorldState,
        params: &Map<String, Value>,
        writer: ArchiveWriter,
    ) -> Result<RunReport> {
        let mut args = pipeline.prepare_args(params.clone())?;
        args.store_pipeline_run = self.config.simulator.store_pipeline_run;
        let steps = pipeline.steps(&args)?;

        let writer = Arc::new(writer);
        let mut runner = PipelineRunner::new(self.config.simulator.clone());
        if self.config.simulator.save_frames {
            runner = runner.with_sink(Arc::new(ArchiveFrameSink::new(Arc::clone(&writer))));
        }
        if let Some(store) = &self.store {
            runner = runner.with_sink(Arc::new(StoreFrameSink::new(Arc::clone(store))));
        }

        let result = runner.run(&mut world, args, &steps).await?;
        let archive = writer.write_archive(&world).await?;

        info!(
            pipeline_id = %world.pipeline_id,
            run_id = %world.run_id,
            ticks = result.tick_count,
            actions = result.actions.len(),
            duration_ms = result.duration_ms,
            "Simulation complete"
        );

        Ok(RunReport {
            summary: WorldSummary::of(&world),
            archive,
            result,
            world,
        })
    }
}
