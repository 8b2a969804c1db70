//! Durable snapshots of a world.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::object::SymbolicObject;
use crate::world::WorldState;

fn frame_kind() -> String {
    "WorldFrame".to_string()
}

fn archive_kind() -> String {
    "WorldArchive".to_string()
}

fn frame_status() -> String {
    "active".to_string()
}

fn archive_status() -> String {
    "archived".to_string()
}

/// Point-in-time capture of every artifact in a world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldFrame {
    #[serde(rename = "type", default = "frame_kind")]
    pub kind: String,
    /// `frame-<tick>`
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tick: u64,
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub members: Vec<SymbolicObject>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "frame_status")]
    pub status: String,
}

impl WorldFrame {
    /// Capture the world. Read-only.
    pub fn from_world(world: &WorldState) -> Self {
        let members = sorted_members(world);
        let mut metadata = Map::new();
        metadata.insert("artifactCount".into(), json!(members.len()));

        Self {
            kind: frame_kind(),
            id: format!("frame-{}", world.tick),
            description: format!("World frame for tick {}", world.tick),
            tick: world.tick,
            step: world.step,
            run_id: world.run_id.clone(),
            pipeline_id: world.pipeline_id.clone(),
            member_ids: members.iter().map(|m| m.id.clone()).collect(),
            members,
            metadata,
            created_at: Utc::now(),
            status: frame_status(),
        }
    }

    pub fn artifact_count(&self) -> usize {
        self.members.len()
    }
}

/// Whole-run snapshot written when a pipeline finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldArchive {
    #[serde(rename = "type", default = "archive_kind")]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tick: u64,
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub members: Vec<SymbolicObject>,
    /// `pipelineId`, `runId`, `actingFrameId`, `contextualFrameId`
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "archive_status")]
    pub status: String,
    /// Set once the archive has been written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl WorldArchive {
    pub fn from_world(world: &WorldState) -> Self {
        let members = sorted_members(world);
        let mut metadata = Map::new();
        metadata.insert("pipelineId".into(), json!(world.pipeline_id));
        metadata.insert("runId".into(), json!(world.run_id));
        metadata.insert("actingFrameId".into(), json!(world.context.acting_frame_id));
        metadata.insert(
            "contextualFrameId".into(),
            json!(world.context.contextual_frame_id),
        );

        Self {
            kind: archive_kind(),
            id: format!("world-archive-{}", world.run_id),
            name: format!("{} archive", world.pipeline_id),
            description: format!(
                "Final world state of run {} at tick {}",
                world.run_id, world.tick
            ),
            tick: world.tick,
            step: world.step,
            run_id: world.run_id.clone(),
            pipeline_id: world.pipeline_id.clone(),
            member_ids: members.iter().map(|m| m.id.clone()).collect(),
            members,
            metadata,
            created_at: Utc::now(),
            status: archive_status(),
            file_path: None,
        }
    }

    /// View the archive as a frame so it can seed a new world.
    pub fn into_frame(self) -> WorldFrame {
        WorldFrame {
            kind: frame_kind(),
            id: format!("frame-{}", self.tick),
            description: self.description,
            tick: self.tick,
            step: self.step,
            run_id: self.run_id,
            pipeline_id: self.pipeline_id,
            member_ids: self.member_ids,
            members: self.members,
            metadata: self.metadata,
            created_at: self.created_at,
            status: self.status,
        }
    }
}

/// Members ordered by (tick, id) so snapshots are stable.
fn sorted_members(world: &WorldState) -> Vec<SymbolicObject> {
    let mut members: Vec<SymbolicObject> = world
        .artifacts
        .all()
        .map(|obj| obj.as_ref().clone())
        .collect();
    members.sort_by(|a, b| a.tick.cmp(&b.tick).then_with(|| a.id.cmp(&b.id)));
    members
}
