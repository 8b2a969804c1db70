//! Error types for the engine.

/// Error types for the world execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Object is missing its id or type
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// A functor raised while being applied
    #[error("Functor error: {0}")]
    Functor(String),

    /// An input resolver failed
    #[error("Input resolution error: {0}")]
    InputResolution(String),

    /// A pipeline step failed; the run is aborted
    #[error("Step '{step_id}' failed on input item {item}: {source}")]
    StepFailed {
        step_id: String,
        item: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// Snapshot persistence failed
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Unknown pipeline or invalid pipeline arguments
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Wrap an error raised while processing `item` of step `step_id`.
    pub fn step_failed(step_id: impl Into<String>, item: usize, source: EngineError) -> Self {
        Self::StepFailed {
            step_id: step_id.into(),
            item,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
