//! Pipeline definitions and their registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::functor::FunctorStep;
use crate::records::PipelineArgs;
use crate::types::{EngineError, Result};

/// Supplies the ordered steps of a named pipeline.
pub trait PipelineDefinition: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Parameters used when the caller does not set them.
    fn default_params(&self) -> Map<String, Value> {
        Map::new()
    }

    fn required_params(&self) -> &[&str] {
        &[]
    }

    /// Build the steps for a run.
    fn steps(&self, args: &PipelineArgs) -> Result<Vec<FunctorStep>>;

    /// Merge defaults into `params` and check required keys.
    fn prepare_args(&self, params: Map<String, Value>) -> Result<PipelineArgs> {
        let args = PipelineArgs::new(params).with_defaults(&self.default_params());
        let missing: Vec<&str> = self
            .required_params()
            .iter()
            .copied()
            .filter(|key| !args.params.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Pipeline(format!(
                "pipeline '{}' is missing required params: {}",
                self.id(),
                missing.join(", ")
            )));
        }
        Ok(args)
    }
}

/// Pipelines available by id.
#[derive(Default, Clone)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<String, Arc<dyn PipelineDefinition>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: Arc<dyn PipelineDefinition>) {
        self.pipelines.insert(pipeline.id().to_string(), pipeline);
    }

    pub fn with(mut self, pipeline: Arc<dyn PipelineDefinition>) -> Self {
        self.register(pipeline);
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn PipelineDefinition>> {
        self.pipelines
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::Pipeline(format!("unknown pipeline '{id}'")))
    }

    /// Registered pipelines ordered by id.
    pub fn list(&self) -> Vec<Arc<dyn PipelineDefinition>> {
        self.pipelines.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Seeded;

    impl PipelineDefinition for Seeded {
        fn id(&self) -> &str {
            "seeded"
        }

        fn label(&self) -> &str {
            "Seeded"
        }

        fn default_params(&self) -> Map<String, Value> {
            let mut params = Map::new();
            params.insert("steps".into(), json!(4));
            params
        }

        fn required_params(&self) -> &[&str] {
            &["seed"]
        }

        fn steps(&self, _args: &PipelineArgs) -> Result<Vec<FunctorStep>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_prepare_args_merges_defaults() {
        let mut params = Map::new();
        params.insert("seed".into(), json!("glider"));
        let args = Seeded.prepare_args(params).unwrap();
        assert_eq!(args.param_u64("steps"), Some(4));
        assert_eq!(args.param_str("seed"), Some("glider"));
    }

    #[test]
    fn test_prepare_args_reports_missing() {
        let err = Seeded.prepare_args(Map::new()).unwrap_err();
        assert!(matches!(err, EngineError::Pipeline(msg) if msg.contains("seed")));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PipelineRegistry::new().with(Arc::new(Seeded));
        assert_eq!(registry.ids(), vec!["seeded"]);
        assert!(registry.get("seeded").is_ok());
        assert!(matches!(registry.get("nope"), Err(EngineError::Pipeline(_))));
    }
}
