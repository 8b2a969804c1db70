//! Provenance and action recording.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::context::{BatchedEntry, WorldContext};
use crate::functor::FunctorStep;
use crate::object::generate_id;
use crate::records::{PipelineRun, SymbolicAction};
use crate::types::Result;
use crate::world::{ArtifactStore, WorldState};

const UNKNOWN_ACTOR: &str = "unknown-actor";
const UNKNOWN_CONTEXT: &str = "unknown-context";
const ACTION_ROOT: &str = "action-root";

/// Turn one batched entry into a `SymbolicAction` and insert it.
///
/// Actor resolution: the primary output's `rootId`, then the context's acting
/// frame, then the entry's own `rootId`, then `"unknown-actor"`. Every call
/// records a distinct action with a fresh id.
pub fn record_action(
    artifacts: &mut ArtifactStore,
    batched: &BatchedEntry,
    context: &WorldContext,
) -> Result<SymbolicAction> {
    let primary_root = batched
        .output_object
        .as_ref()
        .and_then(|o| o.root_id.clone());
    let entry = &batched.entry;

    let actor_id = primary_root
        .clone()
        .or_else(|| context.acting_frame_id.clone())
        .or_else(|| entry.root_id.clone())
        .unwrap_or_else(|| UNKNOWN_ACTOR.to_string());

    let input_id = primary_root
        .or_else(|| entry.root_id.clone())
        .unwrap_or_else(|| entry.id.clone());

    let action = SymbolicAction {
        id: generate_id("SymbolicAction"),
        label: format!("{} Action", entry.kind),
        actor_id,
        context_id: context
            .contextual_frame_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_CONTEXT.to_string()),
        instrument_id: batched.instrument_id.clone(),
        purpose: batched.purpose.clone(),
        transformation_id: batched.transformation_id.clone(),
        step_id: batched.step_id.clone(),
        input_id,
        output_id: entry.id.clone(),
        tick: batched.tick,
        status: "completed".to_string(),
        root_id: Some(ACTION_ROOT.to_string()),
    };

    artifacts.insert_record(&action)?;
    debug!(
        action_id = %action.id,
        actor_id = %action.actor_id,
        output_id = %action.output_id,
        "Recorded action"
    );
    Ok(action)
}

/// Summary record for a finished run.
pub fn create_pipeline_run(
    world: &WorldState,
    steps: &[FunctorStep],
    pipeline_args_id: Option<String>,
    started_at: DateTime<Utc>,
) -> PipelineRun {
    let forked_from_run_id = world.context.forked_from_run_id.clone();
    let label = match &forked_from_run_id {
        Some(source) => format!("Forked Run from {source}"),
        None => "Pipeline Run".to_string(),
    };

    PipelineRun {
        id: generate_id("PipelineRun"),
        label,
        pipeline_id: world.pipeline_id.clone(),
        run_id: world.run_id.clone(),
        pipeline_args_id,
        step_ids: steps.iter().map(|s| s.id.clone()).collect(),
        tick_count: world.tick,
        step_count: steps.len(),
        forked_from_run_id,
        started_at,
        completed_at: Utc::now(),
        status: "completed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SymbolicObject;
    use std::sync::Arc;

    fn batched(entry: SymbolicObject, output_object: Option<SymbolicObject>) -> BatchedEntry {
        BatchedEntry {
            entry: Arc::new(entry),
            transformation_id: "tx-1".into(),
            instrument_id: "functor-a".into(),
            purpose: "testing".into(),
            step_id: "step-a".into(),
            tick: 3,
            output_object: output_object.map(Arc::new),
        }
    }

    #[test]
    fn test_actor_prefers_primary_root() {
        let mut artifacts = ArtifactStore::new();
        let mut ctx = WorldContext::new();
        ctx.acting_frame_id = Some("frame-actor".into());

        let primary = SymbolicObject::with_id("p", "T").with_root("primary-root");
        let entry = batched(SymbolicObject::with_id("o", "Cell"), Some(primary));
        let action = record_action(&mut artifacts, &entry, &ctx).unwrap();

        assert_eq!(action.actor_id, "primary-root");
        assert_eq!(action.input_id, "primary-root");
        assert_eq!(action.output_id, "o");
        assert_eq!(action.label, "Cell Action");
        assert_eq!(action.status, "completed");
        assert_eq!(action.transformation_id, "tx-1");
        assert!(artifacts.contains(&action.id));
    }

    #[test]
    fn test_actor_falls_back_to_acting_frame_then_entry_root() {
        let mut artifacts = ArtifactStore::new();
        let mut ctx = WorldContext::new();
        ctx.acting_frame_id = Some("frame-actor".into());
        ctx.contextual_frame_id = Some("frame-ctx".into());

        let entry = batched(SymbolicObject::with_id("o", "T").with_root("lineage"), None);
        let action = record_action(&mut artifacts, &entry, &ctx).unwrap();
        assert_eq!(action.actor_id, "frame-actor");
        assert_eq!(action.context_id, "frame-ctx");
        assert_eq!(action.input_id, "lineage");

        let plain = WorldContext::new();
        let action = record_action(&mut artifacts, &entry, &plain).unwrap();
        assert_eq!(action.actor_id, "lineage");
        assert_eq!(action.context_id, "unknown-context");
    }

    #[test]
    fn test_unknown_actor_when_nothing_known() {
        let mut artifacts = ArtifactStore::new();
        let mut rootless = SymbolicObject::with_id("o", "T");
        rootless.root_id = None;

        let action = record_action(&mut artifacts, &batched(rootless, None), &WorldContext::new()).unwrap();
        assert_eq!(action.actor_id, "unknown-actor");
        assert_eq!(action.input_id, "o");
    }

    #[test]
    fn test_repeated_calls_record_distinct_actions() {
        let mut artifacts = ArtifactStore::new();
        let entry = batched(SymbolicObject::with_id("o", "T"), None);
        let ctx = WorldContext::new();
        let a = record_action(&mut artifacts, &entry, &ctx).unwrap();
        let b = record_action(&mut artifacts, &entry, &ctx).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(artifacts.records::<SymbolicAction>().len(), 2);
    }

    #[test]
    fn test_pipeline_run_label_reflects_fork() {
        let world = WorldState::new("p");
        let run = create_pipeline_run(&world, &[], None, Utc::now());
        assert_eq!(run.label, "Pipeline Run");
        assert!(run.forked_from_run_id.is_none());

        let fork = world.fork(None);
        let run = create_pipeline_run(&fork, &[], None, Utc::now());
        assert_eq!(run.label, format!("Forked Run from {}", world.run_id));
        assert_eq!(run.pipeline_id, "p");
        assert_eq!(run.run_id, fork.run_id);
    }
}
