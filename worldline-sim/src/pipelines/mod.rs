//! Built-in pipeline definitions.

pub mod conway;

use std::sync::Arc;

use worldline_core::PipelineRegistry;

pub use conway::{ConwayPipeline, CONWAY_PIPELINE_ID};

/// Registry of every pipeline the simulator ships with.
pub fn default_registry() -> PipelineRegistry {
    PipelineRegistry::new().with(Arc::new(ConwayPipeline))
}
