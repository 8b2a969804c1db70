//! Provenance and run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::object::{generate_id, Record};

/// One id or several, as found in a functor's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputRef {
    Single(String),
    Many(Vec<String>),
}

impl OutputRef {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Single(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::Single(single) => single == id,
            Self::Many(ids) => ids.iter().any(|i| i == id),
        }
    }
}

/// Provenance of one functor application to one input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub id: String,
    /// Method name declared by the functor
    pub method: String,
    pub tick: u64,
    /// Id of the input item, if it had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_id: Option<OutputRef>,
    /// Functor-declared provenance plus `purpose` and `stepId`
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Transformation {
    pub fn new(method: impl Into<String>, tick: u64) -> Self {
        Self {
            id: format!("tx-{}", uuid::Uuid::new_v4()),
            method: method.into(),
            tick,
            input_id: None,
            output_id: None,
            metadata: Map::new(),
        }
    }
}

impl Record for Transformation {
    const KIND: &'static str = "Transformation";
}

/// Audit record tying a produced object to the actor, context, instrument
/// and purpose responsible for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolicAction {
    pub id: String,
    pub label: String,
    pub actor_id: String,
    pub context_id: String,
    /// Id of the functor that produced the object
    pub instrument_id: String,
    pub purpose: String,
    pub transformation_id: String,
    #[serde(default)]
    pub step_id: String,
    pub input_id: String,
    pub output_id: String,
    pub tick: u64,
    pub status: String,
    #[serde(default)]
    pub root_id: Option<String>,
}

impl Record for SymbolicAction {
    const KIND: &'static str = "SymbolicAction";
}

/// Summary of one completed pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: String,
    pub label: String,
    pub pipeline_id: String,
    pub run_id: String,
    #[serde(default)]
    pub pipeline_args_id: Option<String>,
    #[serde(default)]
    pub step_ids: Vec<String>,
    /// World tick when the run finished
    pub tick_count: u64,
    pub step_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from_run_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: String,
}

impl Record for PipelineRun {
    const KIND: &'static str = "PipelineRun";
}

fn default_true() -> bool {
    true
}

/// Arguments a pipeline is run with. Stored in the world at run start and
/// handed to the first step as its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineArgs {
    pub id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Insert a `PipelineRun` summary when the run completes
    #[serde(default = "default_true")]
    pub store_pipeline_run: bool,
}

impl Default for PipelineArgs {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

impl PipelineArgs {
    pub fn new(params: Map<String, Value>) -> Self {
        Self {
            id: generate_id(Self::KIND),
            params,
            store_pipeline_run: true,
        }
    }

    /// Fill in any parameter not already set.
    pub fn with_defaults(mut self, defaults: &Map<String, Value>) -> Self {
        for (key, value) in defaults {
            self.params
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn without_pipeline_run(mut self) -> Self {
        self.store_pipeline_run = false;
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

impl Record for PipelineArgs {
    const KIND: &'static str = "PipelineArgs";
}
