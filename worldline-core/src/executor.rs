//! Pipeline executor - drives a world through an ordered list of steps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::SimulatorConfig;
use crate::context::{BatchedEntry, NamedOutput, RunPhase, StepContext};
use crate::flatten::{flatten_symbolic_objects, symbolic_id};
use crate::functor::FunctorStep;
use crate::object::SymbolicObject;
use crate::provenance::{create_pipeline_run, record_action};
use crate::records::{OutputRef, PipelineArgs, PipelineRun, SymbolicAction, Transformation};
use crate::types::{EngineError, Result};
use crate::world::WorldState;

/// Hook invoked after every completed step, typically to persist a frame.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    async fn on_step(&self, world: &WorldState, step_index: usize) -> Result<()>;
}

/// Combined result of one step.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Every object registered by the step, in production order
    pub outputs: Vec<Arc<SymbolicObject>>,
    /// Primary output declared by the functor for the last item that had one
    pub primary: Option<Arc<SymbolicObject>>,
}

impl StepOutput {
    pub fn single(object: Arc<SymbolicObject>) -> Self {
        Self {
            outputs: vec![object],
            primary: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn first(&self) -> Option<&Arc<SymbolicObject>> {
        self.outputs.first()
    }

    /// One object unwrapped, otherwise a list.
    pub fn to_value(&self) -> Result<Value> {
        self.as_named().to_value()
    }

    pub fn as_named(&self) -> NamedOutput {
        match self.outputs.as_slice() {
            [single] => NamedOutput::Object(Arc::clone(single)),
            many => NamedOutput::Objects(many.to_vec()),
        }
    }
}

/// Outcome of a pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub actions: Vec<SymbolicAction>,
    pub tick_count: u64,
    pub pipeline_run: Option<PipelineRun>,
    pub duration_ms: u64,
    pub phase: RunPhase,
    /// Output of the last step
    pub output: StepOutput,
}

/// Runs pipelines against worlds.
#[derive(Default)]
pub struct PipelineRunner {
    config: SimulatorConfig,
    sinks: Vec<Arc<dyn FrameSink>>,
}

impl PipelineRunner {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    /// Register a per-step frame sink.
    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Execute `steps` in order against `world`.
    ///
    /// The args record is inserted into the world and is the first step's
    /// raw input. Errors abort the run and leave the world as far as it got,
    /// with the context phase set to `Failed`.
    pub async fn run(
        &self,
        world: &mut WorldState,
        args: PipelineArgs,
        steps: &[FunctorStep],
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let started_at = chrono::Utc::now();

        info!(
            pipeline_id = %world.pipeline_id,
            run_id = %world.run_id,
            steps = steps.len(),
            tick = world.tick,
            "Starting pipeline run"
        );

        let args_object = world.artifacts.insert_record(&args)?;
        let store_run = args.store_pipeline_run;
        let args_id = args.id.clone();
        world.context.pipeline_args = Some(args);

        let mut previous = StepOutput::single(args_object);
        for (index, step) in steps.iter().enumerate() {
            world.context.phase = RunPhase::Running { step: index };

            previous = match self.run_step(world, index, step, &previous).await {
                Ok(output) => output,
                Err(e) => {
                    world.context.phase = RunPhase::Failed { step: index };
                    error!(step_id = %step.id, step = index, error = %e, "Pipeline step failed");
                    return Err(e);
                }
            };

            for sink in &self.sinks {
                if let Err(e) = sink.on_step(world, index).await {
                    world.context.phase = RunPhase::Failed { step: index };
                    error!(step_id = %step.id, error = %e, "Frame sink failed");
                    return Err(match e {
                        EngineError::Snapshot(_) => e,
                        other => EngineError::Snapshot(format!(
                            "saving frame for step {} (tick {}): {}",
                            index + 1,
                            world.tick,
                            other
                        )),
                    });
                }
            }
        }

        world.context.phase = RunPhase::Finalizing;
        let entries = world.context.drain_batched();
        let mut actions = Vec::with_capacity(entries.len());
        for entry in &entries {
            actions.push(record_action(&mut world.artifacts, entry, &world.context)?);
        }
        debug!(actions = actions.len(), "Recorded symbolic actions");

        let pipeline_run = if store_run {
            let run = create_pipeline_run(world, steps, Some(args_id), started_at);
            world.artifacts.insert_record(&run)?;
            Some(run)
        } else {
            None
        };

        world.context.phase = RunPhase::Completed;
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            pipeline_id = %world.pipeline_id,
            run_id = %world.run_id,
            tick = world.tick,
            artifacts = world.artifacts.len(),
            actions = actions.len(),
            duration_ms = duration_ms,
            "Pipeline run completed"
        );

        Ok(PipelineResult {
            actions,
            tick_count: world.tick,
            pipeline_run,
            duration_ms,
            phase: RunPhase::Completed,
            output: previous,
        })
    }

    async fn run_step(
        &self,
        world: &mut WorldState,
        index: usize,
        step: &FunctorStep,
        previous: &StepOutput,
    ) -> Result<StepOutput> {
        world.step = index;
        if step.tick_advance {
            world.tick_forward();
        }
        let tick = world.tick;

        let input = match &step.resolve_input {
            Some(resolver) => {
                let ctx = StepContext::new(world);
                resolver
                    .resolve(previous, &ctx)
                    .await
                    .map_err(|e| EngineError::step_failed(&step.id, 0, e))?
            }
            None => previous.to_value()?,
        };
        let items = into_items(input);

        self.log_detail(step, index, tick, items.len());

        let mut output = StepOutput::default();
        let mut entries: Vec<BatchedEntry> = Vec::new();
        let mut last_transformation = None;
        // Position of each id in `output.outputs` and `entries`, which grow in lockstep
        let mut emitted: HashMap<String, usize> = HashMap::new();

        for (item_index, item) in items.iter().enumerate() {
            let applied = {
                let ctx = StepContext::new(world);
                step.functor.apply(item, &ctx).await
            }
            .map_err(|e| EngineError::step_failed(&step.id, item_index, e))?;

            let applied = match applied {
                Some(out) if !out.is_empty() => out,
                _ => {
                    warn!(
                        step_id = %step.id,
                        item = item_index,
                        "Functor produced no output"
                    );
                    continue;
                }
            };

            let mut transformation = Transformation::new(step.functor.method(), tick);
            transformation.input_id = item.get("id").and_then(Value::as_str).map(str::to_string);
            transformation.metadata = step.functor.describe_provenance(item, &applied);
            transformation
                .metadata
                .insert("purpose".into(), Value::String(step.purpose.clone()));
            transformation
                .metadata
                .insert("stepId".into(), Value::String(step.id.clone()));

            let produced = flatten_symbolic_objects(&applied.value);
            transformation.output_id = output_ref(&applied.value, &produced);
            world.artifacts.insert_record(&transformation)?;

            let primary = applied.primary.map(|p| Arc::new(stamp_tick(p, tick)));
            for object in produced {
                let Some(stored) = world.artifacts.add(stamp_tick(object, tick)) else {
                    continue;
                };
                // Repeated ids across items: last write wins, one entry per step
                if let Some(&at) = emitted.get(&stored.id) {
                    entries[at].entry = Arc::clone(&stored);
                    output.outputs[at] = stored;
                    continue;
                }
                emitted.insert(stored.id.clone(), output.outputs.len());
                entries.push(BatchedEntry {
                    entry: Arc::clone(&stored),
                    transformation_id: transformation.id.clone(),
                    instrument_id: step.functor.id().to_string(),
                    purpose: step.purpose.clone(),
                    step_id: step.id.clone(),
                    tick,
                    output_object: primary.clone(),
                });
                output.outputs.push(stored);
            }
            if primary.is_some() {
                output.primary = primary;
            }
            last_transformation = Some(transformation.id);
        }

        if output.outputs.is_empty() {
            if let (Some(primary), Some(tx_id)) = (output.primary.clone(), last_transformation) {
                if let Some(stored) = world.artifacts.insert_arc(primary) {
                    entries.push(BatchedEntry {
                        entry: Arc::clone(&stored),
                        transformation_id: tx_id,
                        instrument_id: step.functor.id().to_string(),
                        purpose: step.purpose.clone(),
                        step_id: step.id.clone(),
                        tick,
                        output_object: Some(Arc::clone(&stored)),
                    });
                    output.outputs.push(stored);
                }
            }
        }

        if let Some(name) = &step.store_output_as {
            world.context.set_output(name.clone(), output.as_named());
        }
        world.context.enqueue(entries);

        debug!(
            step_id = %step.id,
            outputs = output.len(),
            pending_actions = world.context.pending_actions(),
            "Step complete"
        );
        Ok(output)
    }

    fn log_detail(&self, step: &FunctorStep, index: usize, tick: u64, items: usize) {
        if self.config.verbose {
            info!(step_id = %step.id, step = index, tick = tick, items = items, functor = %step.functor.name(), "Running step");
        } else {
            debug!(step_id = %step.id, step = index, tick = tick, items = items, functor = %step.functor.name(), "Running step");
        }
    }
}

/// Run a pipeline with the default runner.
pub async fn run_pipeline(
    world: &mut WorldState,
    args: PipelineArgs,
    steps: &[FunctorStep],
) -> Result<PipelineResult> {
    PipelineRunner::default().run(world, args, steps).await
}

/// Fan-out: arrays are split into items, null is no items, anything else is one item.
fn into_items(input: Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn stamp_tick(mut object: SymbolicObject, tick: u64) -> SymbolicObject {
    if object.tick.is_none() {
        object.tick = Some(tick);
    }
    object
}

/// Ids named by the top level of a functor's output.
fn output_ref(value: &Value, produced: &[SymbolicObject]) -> Option<OutputRef> {
    match value {
        Value::Array(items) => Some(OutputRef::Many(
            items
                .iter()
                .filter_map(symbolic_id)
                .map(str::to_string)
                .collect(),
        )),
        _ => match symbolic_id(value) {
            Some(id) => Some(OutputRef::Single(id.to_string())),
            None if produced.is_empty() => None,
            None => Some(OutputRef::Many(produced.iter().map(|o| o.id.clone()).collect())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::{resolver, Functor, FunctorOutput};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Emit {
        id: &'static str,
        value: Value,
    }

    #[async_trait::async_trait]
    impl Functor for Emit {
        fn id(&self) -> &str {
            self.id
        }

        fn method(&self) -> &str {
            "emit"
        }

        async fn apply(&self, _input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
            Ok(Some(FunctorOutput::from_value(self.value.clone())))
        }
    }

    struct Nothing;

    #[async_trait::async_trait]
    impl Functor for Nothing {
        fn id(&self) -> &str {
            "nothing"
        }

        fn method(&self) -> &str {
            "nothing"
        }

        async fn apply(&self, _input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
            Ok(None)
        }
    }

    /// Fails on the item whose `id` matches.
    struct FailOn {
        bad: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Functor for FailOn {
        fn id(&self) -> &str {
            "fail-on"
        }

        fn method(&self) -> &str {
            "fail"
        }

        async fn apply(&self, input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = input["id"].as_str().unwrap_or_default();
            if id == self.bad {
                return Err(EngineError::Functor(format!("cannot process {id}")));
            }
            let out = SymbolicObject::with_id(format!("{id}-out"), "Derived");
            Ok(Some(FunctorOutput::object(out)?))
        }
    }

    fn emit(id: &'static str, value: Value) -> Arc<dyn Functor> {
        Arc::new(Emit { id, value })
    }

    #[tokio::test]
    async fn test_tick_advance_and_no_advance() {
        let mut world = WorldState::new("p");
        let steps = vec![
            FunctorStep::new("a", emit("e1", json!({"id": "o1", "type": "T"})), "first"),
            FunctorStep::new("b", emit("e2", json!({"id": "o2", "type": "T"})), "second")
                .with_tick_advance(false),
            FunctorStep::new("c", emit("e3", json!({"id": "o3", "type": "T"})), "third"),
        ];

        let result = run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();

        assert_eq!(world.tick, 2);
        assert_eq!(world.step, 2);
        assert_eq!(result.tick_count, 2);
        assert_eq!(world.artifacts.get("o2").unwrap().tick, Some(1));
        assert_eq!(world.artifacts.get("o3").unwrap().tick, Some(2));
        assert_eq!(result.phase, RunPhase::Completed);
        assert_eq!(world.context.phase, RunPhase::Completed);
    }

    #[tokio::test]
    async fn test_existing_tick_is_kept() {
        let mut world = WorldState::new("p");
        let steps = vec![FunctorStep::new(
            "a",
            emit("e", json!({"id": "old", "type": "T", "tick": 99})),
            "keep tick",
        )];
        run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();
        assert_eq!(world.artifacts.get("old").unwrap().tick, Some(99));
    }

    #[tokio::test]
    async fn test_store_output_as_unwraps_single() {
        let mut world = WorldState::new("p");
        let steps = vec![
            FunctorStep::new("one", emit("e1", json!({"id": "solo", "type": "T"})), "one")
                .store_output_as("Single"),
            FunctorStep::new(
                "many",
                emit("e2", json!([{"id": "m1", "type": "T"}, {"id": "m2", "type": "T"}])),
                "many",
            )
            .store_output_as("Many"),
        ];
        run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();

        assert!(matches!(
            world.context.output("Single"),
            Some(NamedOutput::Object(o)) if o.id == "solo"
        ));
        assert!(matches!(
            world.context.output("Many"),
            Some(NamedOutput::Objects(list)) if list.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_fan_out_records_transformation_per_item() {
        let mut world = WorldState::new("p");
        let functor = Arc::new(FailOn {
            bad: "never",
            calls: AtomicUsize::new(0),
        });
        let steps = vec![FunctorStep::new("fan", functor.clone(), "derive").with_resolver(resolver(
            |_prev, _ctx| {
                Ok(json!([
                    {"id": "i1", "type": "In"},
                    {"id": "i2", "type": "In"},
                    {"id": "i3", "type": "In"}
                ]))
            },
        ))];

        run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();

        assert_eq!(functor.calls.load(Ordering::SeqCst), 3);
        let txs: Vec<Transformation> = world.artifacts.records();
        assert_eq!(txs.len(), 3);
        for tx in &txs {
            let input = tx.input_id.as_deref().unwrap();
            assert_eq!(tx.output_id, Some(OutputRef::Single(format!("{input}-out"))));
            assert_eq!(tx.metadata["stepId"], "fan");
            assert_eq!(tx.metadata["purpose"], "derive");
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_items_and_aborts() {
        let mut world = WorldState::new("p");
        let functor = Arc::new(FailOn {
            bad: "i2",
            calls: AtomicUsize::new(0),
        });
        let steps = vec![
            FunctorStep::new("fan", functor.clone(), "derive").with_resolver(resolver(|_, _| {
                Ok(json!([
                    {"id": "i1", "type": "In"},
                    {"id": "i2", "type": "In"},
                    {"id": "i3", "type": "In"}
                ]))
            })),
            FunctorStep::new("after", emit("e", json!({"id": "late", "type": "T"})), "never runs"),
        ];

        let err = run_pipeline(&mut world, PipelineArgs::default(), &steps)
            .await
            .unwrap_err();

        match err {
            EngineError::StepFailed { step_id, item, .. } => {
                assert_eq!(step_id, "fan");
                assert_eq!(item, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(functor.calls.load(Ordering::SeqCst), 2);
        assert!(world.artifacts.contains("i1-out"));
        assert!(!world.artifacts.contains("i2-out"));
        assert!(!world.artifacts.contains("late"));
        assert_eq!(world.context.phase, RunPhase::Failed { step: 0 });
        assert!(world.artifacts.records::<PipelineRun>().is_empty());
    }

    #[tokio::test]
    async fn test_loosely_typed_outputs_are_stored_with_actions() {
        let mut world = WorldState::new("p");
        let steps = vec![FunctorStep::new(
            "loose",
            emit(
                "e",
                json!([
                    {"id": "ok", "type": "T"},
                    {"id": "null-status", "type": "T", "status": null},
                    {"id": "string-tick", "type": "T", "tick": "7"},
                    {"id": "date-created", "type": "T", "createdAt": "2024-01-01"},
                    {"id": "null-metadata", "type": "T", "metadata": null}
                ]),
            ),
            "emit loosely typed objects",
        )];

        let result = run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();

        let txs: Vec<Transformation> = world.artifacts.records();
        assert_eq!(txs.len(), 1);
        let named = txs[0].output_id.as_ref().unwrap().ids();
        assert_eq!(named.len(), 5);
        for id in named {
            assert!(world.artifacts.contains(id), "{id} missing from artifacts");
            assert_eq!(
                result.actions.iter().filter(|a| a.output_id == id).count(),
                1,
                "{id} should have one action"
            );
        }
        assert_eq!(world.artifacts.get("string-tick").unwrap().tick, Some(7));
        assert_eq!(world.artifacts.get("null-status").unwrap().status, "active");
    }

    #[tokio::test]
    async fn test_repeated_id_across_items_gets_one_action() {
        let mut world = WorldState::new("p");
        let steps = vec![FunctorStep::new(
            "fan",
            emit("e", json!({"id": "shared", "type": "T"})),
            "same object per item",
        )
        .with_resolver(resolver(|_, _| {
            Ok(json!([{"id": "i1", "type": "In"}, {"id": "i2", "type": "In"}]))
        }))
        .store_output_as("Shared")];

        let result = run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();

        let txs: Vec<Transformation> = world.artifacts.records();
        assert_eq!(txs.len(), 2);
        assert_eq!(
            result.actions.iter().filter(|a| a.output_id == "shared").count(),
            1
        );
        assert_eq!(result.output.len(), 1);
        assert!(matches!(
            world.context.output("Shared"),
            Some(NamedOutput::Object(o)) if o.id == "shared"
        ));
        assert!(Arc::ptr_eq(
            result.output.first().unwrap(),
            world.artifacts.get("shared").unwrap()
        ));
    }

    #[tokio::test]
    async fn test_no_output_is_not_fatal() {
        let mut world = WorldState::new("p");
        let steps = vec![
            FunctorStep::new("quiet", Arc::new(Nothing), "nothing"),
            // An empty step hands the next one no items, so feed it explicitly
            FunctorStep::new("loud", emit("e", json!({"id": "o", "type": "T"})), "something")
                .with_resolver(resolver(|_, _| Ok(json!({"id": "seed", "type": "Seed"})))),
        ];
        let result = run_pipeline(&mut world, PipelineArgs::default(), &steps).await.unwrap();
        assert!(world.artifacts.contains("o"));
        assert_eq!(result.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_first_step_receives_args() {
        struct EchoArgs;

        #[async_trait::async_trait]
        impl Functor for EchoArgs {
            fn id(&self) -> &str {
                "echo"
            }

            fn method(&self) -> &str {
                "echo"
            }

            async fn apply(&self, input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
                let seed = input["params"]["seed"].clone();
                let out = SymbolicObject::with_id("echoed", "Echo").with_field("seed", seed);
                Ok(Some(FunctorOutput::object(out)?))
            }
        }

        let mut world = WorldState::new("p");
        let args = PipelineArgs::default().with_param("seed", 42);
        let args_id = args.id.clone();
        let steps = vec![FunctorStep::new("echo", Arc::new(EchoArgs), "echo args")];
        run_pipeline(&mut world, args, &steps).await.unwrap();

        assert!(world.artifacts.contains(&args_id));
        assert_eq!(world.artifacts.get("echoed").unwrap().field("seed"), Some(&json!(42)));
        let tx = &world.artifacts.records::<Transformation>()[0];
        assert_eq!(tx.input_id.as_deref(), Some(args_id.as_str()));
    }

    #[tokio::test]
    async fn test_store_pipeline_run_false_skips_run() {
        let mut world = WorldState::new("p");
        let steps = vec![FunctorStep::new("a", emit("e", json!({"id": "o", "type": "T"})), "a")];
        let result = run_pipeline(&mut world, PipelineArgs::default().without_pipeline_run(), &steps)
            .await
            .unwrap();
        assert!(result.pipeline_run.is_none());
        assert!(world.artifacts.records::<PipelineRun>().is_empty());
    }

    struct CountingSink {
        seen: std::sync::Mutex<Vec<(usize, u64)>>,
    }

    #[async_trait::async_trait]
    impl FrameSink for CountingSink {
        async fn on_step(&self, world: &WorldState, step_index: usize) -> Result<()> {
            self.seen.lock().unwrap().push((step_index, world.tick));
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait::async_trait]
    impl FrameSink for BrokenSink {
        async fn on_step(&self, _world: &WorldState, _step_index: usize) -> Result<()> {
            Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[tokio::test]
    async fn test_sink_called_after_each_step() {
        let sink = Arc::new(CountingSink {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let runner = PipelineRunner::new(SimulatorConfig::default()).with_sink(sink.clone());
        let mut world = WorldState::new("p");
        let steps = vec![
            FunctorStep::new("a", emit("e1", json!({"id": "o1", "type": "T"})), "a"),
            FunctorStep::new("b", emit("e2", json!({"id": "o2", "type": "T"})), "b")
                .with_tick_advance(false),
        ];
        runner.run(&mut world, PipelineArgs::default(), &steps).await.unwrap();
        assert_eq!(*sink.seen.lock().unwrap(), vec![(0, 1), (1, 1)]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_snapshot_error() {
        let runner = PipelineRunner::new(SimulatorConfig::default()).with_sink(Arc::new(BrokenSink));
        let mut world = WorldState::new("p");
        let steps = vec![FunctorStep::new("a", emit("e", json!({"id": "o", "type": "T"})), "a")];

        let err = runner
            .run(&mut world, PipelineArgs::default(), &steps)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(_)));
        assert_eq!(world.context.phase, RunPhase::Failed { step: 0 });
    }
}
