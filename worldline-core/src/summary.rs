//! Human-readable world summaries.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::world::WorldState;

/// Counts describing a world at one point in time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSummary {
    pub pipeline_id: String,
    pub run_id: String,
    pub tick: u64,
    pub step: usize,
    pub artifact_count: usize,
    pub context_keys: Vec<String>,
    /// (type, count), most frequent first
    pub types: Vec<(String, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_from_run_id: Option<String>,
}

impl WorldSummary {
    pub fn of(world: &WorldState) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for obj in world.artifacts.all() {
            *counts.entry(obj.kind.as_str()).or_default() += 1;
        }
        let mut types: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(k, n)| (k.to_string(), n))
            .collect();
        types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            pipeline_id: world.pipeline_id.clone(),
            run_id: world.run_id.clone(),
            tick: world.tick,
            step: world.step,
            artifact_count: world.artifacts.len(),
            context_keys: world.context.keys(),
            types,
            forked_from_run_id: world.context.forked_from_run_id.clone(),
        }
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.types
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "World {} ({})", self.run_id, self.pipeline_id)?;
        if let Some(source) = &self.forked_from_run_id {
            writeln!(f, "  forked from: {source}")?;
        }
        writeln!(f, "  tick: {}  step: {}", self.tick, self.step)?;
        writeln!(f, "  artifacts: {}", self.artifact_count)?;
        for (kind, count) in &self.types {
            writeln!(f, "    {kind:<24} {count}")?;
        }
        write!(f, "  context: [{}]", self.context_keys.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SymbolicObject;

    #[test]
    fn test_type_breakdown_sorted_by_count() {
        let mut world = WorldState::new("p");
        world.artifacts.add(SymbolicObject::with_id("a", "Cell"));
        world.artifacts.add(SymbolicObject::with_id("b", "Cell"));
        world.artifacts.add(SymbolicObject::with_id("c", "Link"));

        let summary = WorldSummary::of(&world);
        assert_eq!(summary.artifact_count, 3);
        assert_eq!(summary.types[0], ("Cell".to_string(), 2));
        assert_eq!(summary.count_of("Link"), 1);
        assert_eq!(summary.count_of("Missing"), 0);

        let text = summary.to_string();
        assert!(text.contains("artifacts: 3"));
        assert!(text.contains("Cell"));
    }
}
