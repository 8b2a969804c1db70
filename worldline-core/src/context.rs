//! Per-run execution context.
//!
//! The context is scratch space for a single pipeline execution and is never
//! persisted. Inter-step data lives in named outputs, read either raw through
//! [`WorldContext::output`] or typed through a [`ContextKey`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::object::{Record, SymbolicObject};
use crate::records::PipelineArgs;
use crate::types::Result;
use crate::world::WorldState;

/// Where a pipeline execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running {
        step: usize,
    },
    Finalizing,
    Completed,
    Failed {
        step: usize,
    },
}

/// A step output exposed under a name.
#[derive(Debug, Clone)]
pub enum NamedOutput {
    /// Exactly one object was produced
    Object(Arc<SymbolicObject>),
    Objects(Vec<Arc<SymbolicObject>>),
    /// Arbitrary data written through a [`ContextKey`]
    Value(Value),
}

impl NamedOutput {
    pub fn to_value(&self) -> Result<Value> {
        Ok(match self {
            Self::Object(obj) => serde_json::to_value(obj.as_ref())?,
            Self::Objects(objs) => Value::Array(
                objs.iter()
                    .map(|o| serde_json::to_value(o.as_ref()))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Self::Value(value) => value.clone(),
        })
    }

    /// Objects held by this output; empty for raw values.
    pub fn objects(&self) -> Vec<Arc<SymbolicObject>> {
        match self {
            Self::Object(obj) => vec![Arc::clone(obj)],
            Self::Objects(objs) => objs.clone(),
            Self::Value(_) => Vec::new(),
        }
    }
}

/// A produced object awaiting its `SymbolicAction`.
#[derive(Debug, Clone)]
pub struct BatchedEntry {
    pub entry: Arc<SymbolicObject>,
    pub transformation_id: String,
    pub instrument_id: String,
    pub purpose: String,
    pub step_id: String,
    pub tick: u64,
    /// Primary output declared by the functor; its root takes priority as actor
    pub output_object: Option<Arc<SymbolicObject>>,
}

/// Execution scratch space for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct WorldContext {
    pub pipeline_args: Option<PipelineArgs>,
    /// Parameters supplied when this world was forked
    pub fork_params: Option<Map<String, Value>>,
    pub forked_from_run_id: Option<String>,
    /// Frame acting on the world; used as actor when no primary output exists
    pub acting_frame_id: Option<String>,
    pub contextual_frame_id: Option<String>,
    pub phase: RunPhase,
    outputs: HashMap<String, NamedOutput>,
    batched_entries: Vec<BatchedEntry>,
}

impl WorldContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&mut self, name: impl Into<String>, output: NamedOutput) {
        self.outputs.insert(name.into(), output);
    }

    pub fn output(&self, name: &str) -> Option<&NamedOutput> {
        self.outputs.get(name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn enqueue(&mut self, entries: impl IntoIterator<Item = BatchedEntry>) {
        self.batched_entries.extend(entries);
    }

    /// Number of produced objects still waiting for an action record.
    pub fn pending_actions(&self) -> usize {
        self.batched_entries.len()
    }

    pub fn drain_batched(&mut self) -> Vec<BatchedEntry> {
        std::mem::take(&mut self.batched_entries)
    }

    /// Context keys currently set, for summaries.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.outputs.keys().cloned().collect();
        if self.pipeline_args.is_some() {
            keys.push("pipelineArgs".into());
        }
        if self.fork_params.is_some() {
            keys.push("forkParams".into());
        }
        if self.forked_from_run_id.is_some() {
            keys.push("forkedFromRunId".into());
        }
        if !self.batched_entries.is_empty() {
            keys.push("batchedEntries".into());
        }
        keys.sort();
        keys
    }
}

/// A named context slot whose value type is fixed by the step writing it.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Serialize + DeserializeOwned> ContextKey<T> {
    pub fn store(&self, context: &mut WorldContext, value: &T) -> Result<()> {
        context.set_output(self.name, NamedOutput::Value(serde_json::to_value(value)?));
        Ok(())
    }

    /// Read the slot; `None` when unset or holding a different shape.
    pub fn load(&self, context: &WorldContext) -> Option<T> {
        let value = context.output(self.name)?.to_value().ok()?;
        serde_json::from_value(value).ok()
    }
}

/// Read-only view of the world handed to functors and input resolvers.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    world: &'a WorldState,
}

impl<'a> StepContext<'a> {
    pub fn new(world: &'a WorldState) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &'a WorldState {
        self.world
    }

    pub fn context(&self) -> &'a WorldContext {
        &self.world.context
    }

    pub fn tick(&self) -> u64 {
        self.world.tick
    }

    pub fn step(&self) -> usize {
        self.world.step
    }

    pub fn run_id(&self) -> &'a str {
        &self.world.run_id
    }

    pub fn pipeline_id(&self) -> &'a str {
        &self.world.pipeline_id
    }

    pub fn forked_from_run_id(&self) -> Option<&'a str> {
        self.world.context.forked_from_run_id.as_deref()
    }

    pub fn artifact(&self, id: &str) -> Option<&'a Arc<SymbolicObject>> {
        self.world.artifacts.get(id)
    }

    pub fn artifact_record<R: Record>(&self, id: &str) -> Option<R> {
        self.world.artifacts.get_record(id)
    }

    pub fn by_type(&self, kind: &str) -> Vec<&'a Arc<SymbolicObject>> {
        self.world.artifacts.by_type(kind)
    }

    pub fn latest_of_type(&self, kind: &str) -> Option<&'a Arc<SymbolicObject>> {
        self.world.artifacts.latest_of_type(kind)
    }

    pub fn output(&self, name: &str) -> Option<&'a NamedOutput> {
        self.world.context.output(name)
    }

    pub fn output_as<T: Serialize + DeserializeOwned>(&self, key: &ContextKey<T>) -> Option<T> {
        key.load(&self.world.context)
    }

    /// Parameter lookup; fork parameters shadow the pipeline arguments.
    pub fn param(&self, key: &str) -> Option<&'a Value> {
        let ctx = &self.world.context;
        ctx.fork_params
            .as_ref()
            .and_then(|p| p.get(key))
            .or_else(|| ctx.pipeline_args.as_ref().and_then(|a| a.param(key)))
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param(key).and_then(Value::as_u64)
    }

    pub fn param_str(&self, key: &str) -> Option<&'a str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Effective parameters with fork overrides applied.
    pub fn params(&self) -> Map<String, Value> {
        let ctx = &self.world.context;
        let mut params = ctx
            .pipeline_args
            .as_ref()
            .map(|a| a.params.clone())
            .unwrap_or_default();
        if let Some(fork) = &ctx.fork_params {
            for (k, v) in fork {
                params.insert(k.clone(), v.clone());
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Score {
        value: u32,
    }

    const SCORE: ContextKey<Score> = ContextKey::new("score");

    #[test]
    fn test_typed_key_round_trip() {
        let mut ctx = WorldContext::new();
        assert!(SCORE.load(&ctx).is_none());

        SCORE.store(&mut ctx, &Score { value: 7 }).unwrap();
        assert_eq!(SCORE.load(&ctx), Some(Score { value: 7 }));
        assert_eq!(SCORE.name(), "score");
    }

    #[test]
    fn test_typed_key_shape_mismatch_is_none() {
        let mut ctx = WorldContext::new();
        ctx.set_output("score", NamedOutput::Value(json!("not a score")));
        assert!(SCORE.load(&ctx).is_none());
    }

    #[test]
    fn test_fork_params_shadow_args() {
        let mut world = WorldState::new("p");
        world.context.pipeline_args = Some(
            PipelineArgs::default()
                .with_param("steps", 5)
                .with_param("seedPattern", "glider"),
        );
        let mut fork = Map::new();
        fork.insert("steps".into(), json!(2));
        world.context.fork_params = Some(fork);

        let ctx = StepContext::new(&world);
        assert_eq!(ctx.param_u64("steps"), Some(2));
        assert_eq!(ctx.param_str("seedPattern"), Some("glider"));
        assert_eq!(ctx.params().get("steps"), Some(&json!(2)));
    }

    #[test]
    fn test_drain_batched_empties_queue() {
        let mut ctx = WorldContext::new();
        ctx.enqueue(vec![BatchedEntry {
            entry: Arc::new(SymbolicObject::new("T")),
            transformation_id: "tx-1".into(),
            instrument_id: "f".into(),
            purpose: "test".into(),
            step_id: "s".into(),
            tick: 1,
            output_object: None,
        }]);
        assert_eq!(ctx.pending_actions(), 1);
        assert_eq!(ctx.drain_batched().len(), 1);
        assert_eq!(ctx.pending_actions(), 0);
    }
}
