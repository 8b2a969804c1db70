//! World state: the mutable execution unit of a pipeline run.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::WorldContext;
use crate::object::{Record, SymbolicObject};
use crate::snapshot::WorldFrame;
use crate::types::Result;

/// Objects of a world indexed by id.
///
/// Stored objects are shared, immutable `Arc`s: there is no mutable access
/// to an object once inserted, so forks can share instances safely.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    objects: HashMap<String, Arc<SymbolicObject>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, replacing any previous object with the same id.
    ///
    /// Objects without an id or type are skipped with a warning.
    pub fn add(&mut self, object: SymbolicObject) -> Option<Arc<SymbolicObject>> {
        self.insert_arc(Arc::new(object))
    }

    pub fn insert_arc(&mut self, object: Arc<SymbolicObject>) -> Option<Arc<SymbolicObject>> {
        if !object.is_valid() {
            warn!(id = %object.id, kind = %object.kind, "Skipping object without id or type");
            return None;
        }
        self.objects.insert(object.id.clone(), Arc::clone(&object));
        Some(object)
    }

    /// Convert a typed record and insert it.
    pub fn insert_record<R: Record>(&mut self, record: &R) -> Result<Arc<SymbolicObject>> {
        let object = Arc::new(record.to_object()?);
        self.objects.insert(object.id.clone(), Arc::clone(&object));
        Ok(object)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SymbolicObject>> {
        self.objects.get(id)
    }

    /// Typed read; `None` when missing or of another type.
    pub fn get_record<R: Record>(&self, id: &str) -> Option<R> {
        self.objects
            .get(id)
            .and_then(|obj| R::from_object(obj).ok())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn by_type(&self, kind: &str) -> Vec<&Arc<SymbolicObject>> {
        self.objects.values().filter(|o| o.kind == kind).collect()
    }

    /// All records of a type, decoded.
    pub fn records<R: Record>(&self) -> Vec<R> {
        self.objects
            .values()
            .filter(|o| o.kind == R::KIND)
            .filter_map(|o| R::from_object(o).ok())
            .collect()
    }

    /// Objects for the given ids, skipping ids that are not present.
    pub fn by_ids<'a, I>(&self, ids: I) -> Vec<&Arc<SymbolicObject>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter().filter_map(|id| self.objects.get(id)).collect()
    }

    /// Object of a type with the highest tick.
    pub fn latest_of_type(&self, kind: &str) -> Option<&Arc<SymbolicObject>> {
        self.objects
            .values()
            .filter(|o| o.kind == kind)
            .max_by_key(|o| (o.tick.unwrap_or(0), o.created_at))
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<SymbolicObject>> {
        self.objects.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Remove an object. Missing ids are a logged no-op.
    pub fn remove(&mut self, id: &str) -> Option<Arc<SymbolicObject>> {
        let removed = self.objects.remove(id);
        if removed.is_none() {
            warn!(id = %id, "Attempted to remove missing artifact");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// The mutable state a pipeline runs against.
#[derive(Debug, Clone)]
pub struct WorldState {
    /// Simulation counter, advanced by steps that opt in
    pub tick: u64,
    /// Index of the current pipeline step
    pub step: usize,
    pub run_id: String,
    pub pipeline_id: String,
    pub artifacts: ArtifactStore,
    pub context: WorldContext,
}

impl WorldState {
    /// Fresh world at tick 0 with a new run id.
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            tick: 0,
            step: 0,
            run_id: uuid::Uuid::new_v4().to_string(),
            pipeline_id: pipeline_id.into(),
            artifacts: ArtifactStore::new(),
            context: WorldContext::new(),
        }
    }

    /// Rebuild a world from a saved frame.
    ///
    /// Every member is keyed by its id; on duplicate ids the last one wins.
    pub fn from_frame(
        frame: &WorldFrame,
        pipeline_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        let mut artifacts = ArtifactStore::new();
        for member in &frame.members {
            artifacts.add(member.clone());
        }
        let world = Self {
            tick: frame.tick,
            step: frame.step,
            run_id: run_id.into(),
            pipeline_id: pipeline_id.into(),
            artifacts,
            context: WorldContext::new(),
        };
        debug!(
            run_id = %world.run_id,
            tick = world.tick,
            artifacts = world.artifacts.len(),
            "World restored from frame"
        );
        world
    }

    /// Branch this world.
    ///
    /// The artifact map is copied (the objects themselves are shared), the
    /// run id is regenerated and the context remembers where it came from.
    pub fn fork(&self, new_params: Option<Map<String, Value>>) -> Self {
        let mut context = self.context.clone();
        context.forked_from_run_id = Some(self.run_id.clone());
        context.phase = Default::default();
        if new_params.is_some() {
            context.fork_params = new_params;
        }

        let fork = Self {
            tick: self.tick,
            step: self.step,
            run_id: format!("forked-{}", uuid::Uuid::new_v4()),
            pipeline_id: self.pipeline_id.clone(),
            artifacts: self.artifacts.clone(),
            context,
        };
        debug!(
            source_run = %self.run_id,
            fork_run = %fork.run_id,
            artifacts = fork.artifacts.len(),
            "World forked"
        );
        fork
    }

    pub fn tick_forward(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Snapshot of the current state.
    pub fn to_frame(&self) -> WorldFrame {
        WorldFrame::from_world(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_world_is_empty() {
        let world = WorldState::new("p");
        assert_eq!(world.tick, 0);
        assert_eq!(world.step, 0);
        assert_eq!(world.pipeline_id, "p");
        assert!(world.artifacts.is_empty());
    }

    #[test]
    fn test_add_skips_invalid_objects() {
        let mut store = ArtifactStore::new();
        assert!(store.add(SymbolicObject::with_id("", "T")).is_none());
        assert!(store.add(SymbolicObject::with_id("a", "")).is_none());
        assert!(store.add(SymbolicObject::with_id("a", "T")).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut store = ArtifactStore::new();
        store.add(SymbolicObject::with_id("a", "T"));
        assert!(store.remove("missing").is_none());
        assert_eq!(store.len(), 1);
        assert!(store.remove("a").is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_latest_of_type_uses_tick() {
        let mut store = ArtifactStore::new();
        store.add(SymbolicObject::with_id("c1", "Constellation").with_tick(1));
        store.add(SymbolicObject::with_id("c3", "Constellation").with_tick(3));
        store.add(SymbolicObject::with_id("c2", "Constellation").with_tick(2));
        store.add(SymbolicObject::with_id("x", "Other").with_tick(9));

        assert_eq!(store.latest_of_type("Constellation").unwrap().id, "c3");
        assert_eq!(store.by_type("Constellation").len(), 3);
        assert_eq!(store.by_ids(["c1", "nope", "x"]).len(), 2);
    }

    #[test]
    fn test_fork_is_independent() {
        let mut world = WorldState::new("p");
        world.artifacts.add(SymbolicObject::with_id("x", "T"));

        let mut fork = world.fork(None);
        fork.artifacts.add(SymbolicObject::with_id("y", "T"));
        fork.artifacts.remove("x");

        assert_eq!(world.artifacts.len(), 1);
        assert!(world.artifacts.contains("x"));
        assert_ne!(fork.run_id, world.run_id);
        assert!(fork.run_id.starts_with("forked-"));
        assert_eq!(
            fork.context.forked_from_run_id.as_deref(),
            Some(world.run_id.as_str())
        );
    }

    #[test]
    fn test_fork_shares_instances_and_carries_params() {
        let mut world = WorldState::new("p");
        world.tick = 4;
        world.step = 2;
        world.artifacts.add(SymbolicObject::with_id("x", "T"));

        let mut params = Map::new();
        params.insert("steps".into(), json!(3));
        let fork = world.fork(Some(params));

        assert_eq!(fork.tick, 4);
        assert_eq!(fork.step, 2);
        assert!(Arc::ptr_eq(
            world.artifacts.get("x").unwrap(),
            fork.artifacts.get("x").unwrap()
        ));
        assert_eq!(
            fork.context.fork_params.as_ref().unwrap().get("steps"),
            Some(&json!(3))
        );
    }

    #[test]
    fn test_from_frame_last_duplicate_wins() {
        let frame: WorldFrame = serde_json::from_value(json!({
            "tick": 7,
            "step": 3,
            "members": [
                {"id": "alpha", "type": "T", "label": "first"},
                {"id": "beta", "type": "T"},
                {"id": "alpha", "type": "T", "label": "second"}
            ]
        }))
        .unwrap();

        let world = WorldState::from_frame(&frame, "p", "r");
        assert_eq!(world.tick, 7);
        assert_eq!(world.step, 3);
        assert_eq!(world.artifacts.len(), 2);
        assert_eq!(
            world.artifacts.get("alpha").unwrap().label.as_deref(),
            Some("second")
        );
    }
}
