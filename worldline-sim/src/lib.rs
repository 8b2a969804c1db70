//! worldline-sim: command-line driver and demo pipelines.
//!
//! Ships Conway's Game of Life as a pipeline of data-driven functor steps,
//! plus the orchestration the CLI uses to prepare worlds (new, resumed from
//! a frame, or forked from an archive), attach frame sinks and write the
//! final archive.
//!
//! ```text
//! SimulationRequest ──► Simulator::prepare_world ──► WorldState
//!                                │
//!                                ▼
//!        PipelineRegistry ──► PipelineRunner ──► ArchiveFrameSink / StoreFrameSink
//!                                │
//!                                ▼
//!                       ArchiveWriter::write_archive
//! ```

pub mod config;
pub mod error;
pub mod functors;
pub mod params;
pub mod pipelines;
pub mod simulation;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use params::parse_params;
pub use pipelines::{default_registry, ConwayPipeline, CONWAY_PIPELINE_ID};
pub use simulation::{RunReport, SimulationRequest, Simulator, WorldSource};
