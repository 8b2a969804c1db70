//! Worldline Core - the world execution engine
//!
//! Runs ordered sequences of functor steps against a mutable, versioned
//! world, recording provenance for everything a step produces:
//!
//! - **World state**: artifacts indexed by id plus tick/step/run metadata
//! - **Pipeline executor**: tick advancement, input resolution, fan-out,
//!   output flattening and deferred action recording
//! - **Provenance**: a `Transformation` per functor application and a
//!   `SymbolicAction` per produced object
//! - **Fork/snapshot**: cheap branching and reconstruction from frames
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     PipelineRunner                       │
//! │                                                          │
//! │  ┌──────────┐  ┌─────────┐  ┌─────────┐  ┌───────────┐   │
//! │  │ Resolve  │──│  Apply  │──│ Flatten │──│ Register  │   │
//! │  └──────────┘  └─────────┘  └─────────┘  └───────────┘   │
//! │                                                 │        │
//! │                       ┌─────────────────────────▼──┐     │
//! │                       │ FrameSink │ record_action  │     │
//! │                       └────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                     ┌──────▼──────┐
//!                     │ WorldState  │──fork──▶ WorldState
//!                     └─────────────┘
//! ```

pub mod config;
pub mod context;
pub mod executor;
pub mod flatten;
pub mod functor;
pub mod object;
pub mod pipeline;
pub mod provenance;
pub mod records;
pub mod snapshot;
pub mod summary;
pub mod types;
pub mod world;

// Re-export main types
pub use config::SimulatorConfig;
pub use context::{BatchedEntry, ContextKey, NamedOutput, RunPhase, StepContext, WorldContext};
pub use executor::{run_pipeline, FrameSink, PipelineResult, PipelineRunner, StepOutput};
pub use flatten::flatten_symbolic_objects;
pub use functor::{resolver, Functor, FunctorOutput, FunctorStep, InputResolver};
pub use object::{generate_id, Record, SymbolicObject};
pub use pipeline::{PipelineDefinition, PipelineRegistry};
pub use provenance::{create_pipeline_run, record_action};
pub use records::{OutputRef, PipelineArgs, PipelineRun, SymbolicAction, Transformation};
pub use snapshot::{WorldArchive, WorldFrame};
pub use summary::WorldSummary;
pub use types::{EngineError, Result};
pub use world::{ArtifactStore, WorldState};
