//! Conway's Game of Life functors.
//!
//! A generation is a `Constellation` object whose `objects` field holds one
//! `ConwayCell` per grid position. Cells are ids of the form
//! `cell-<x>-<y>-t<generation>` with status `alive` or `dead`.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use worldline_core::{EngineError, Functor, FunctorOutput, Result, StepContext, SymbolicObject};

pub const CONSTELLATION: &str = "Constellation";
pub const CONWAY_CELL: &str = "ConwayCell";

const MAX_GRID_CELLS: u64 = 1 << 20;

/// Starting patterns, as (x, y) offsets of live cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPattern {
    Glider,
    Blinker,
    Beacon,
    Toad,
}

impl SeedPattern {
    /// Unknown names fall back to a glider.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "blinker" => Self::Blinker,
            "beacon" => Self::Beacon,
            "toad" => Self::Toad,
            _ => Self::Glider,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Glider => "glider",
            Self::Blinker => "blinker",
            Self::Beacon => "beacon",
            Self::Toad => "toad",
        }
    }

    pub fn live_cells(&self) -> &'static [(i64, i64)] {
        match self {
            Self::Glider => &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
            Self::Blinker => &[(1, 0), (1, 1), (1, 2)],
            Self::Beacon => &[(0, 0), (1, 0), (0, 1), (2, 2), (3, 2), (3, 3)],
            Self::Toad => &[(1, 1), (2, 1), (3, 1), (0, 2), (1, 2), (2, 2)],
        }
    }
}

fn default_dimension() -> u64 {
    9
}

fn default_seed() -> String {
    "glider".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitInput {
    #[serde(default = "default_dimension")]
    width: u64,
    #[serde(default = "default_dimension")]
    height: u64,
    #[serde(default = "default_seed")]
    seed_pattern: String,
}

fn constellation_id(generation: u64) -> String {
    format!("constellation-conway-t{generation}")
}

fn cell(x: i64, y: i64, generation: u64, alive: bool, root: &str) -> SymbolicObject {
    SymbolicObject::with_id(format!("cell-{x}-{y}-t{generation}"), CONWAY_CELL)
        .with_tick(generation)
        .with_status(if alive { "alive" } else { "dead" })
        .with_root(root)
        .with_field("position", json!([x, y]))
}

fn constellation(generation: u64, root: &str, cells: Vec<SymbolicObject>) -> Result<SymbolicObject> {
    let mut object = SymbolicObject::with_id(constellation_id(generation), CONSTELLATION)
        .with_status("candidate")
        .with_root(root)
        .with_field("generatedFrom", json!({ "timestamp": Utc::now() }))
        .with_field("objects", serde_json::to_value(&cells)?);
    object.source = Some("symbolos".into());
    object.revision_number = Some(generation.max(1) as u32);
    Ok(object)
}

/// Seeds generation 0 on a `width` x `height` grid.
pub struct InitializeConwayCells;

#[async_trait::async_trait]
impl Functor for InitializeConwayCells {
    fn id(&self) -> &str {
        "functor-init-conway-cells"
    }

    fn method(&self) -> &str {
        "seed-conway"
    }

    fn name(&self) -> &str {
        "InitializeConwayCells"
    }

    async fn apply(&self, input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
        let input: InitInput = serde_json::from_value(input.clone())
            .map_err(|e| EngineError::Functor(format!("invalid conway seed input: {e}")))?;
        let cell_count = input
            .width
            .checked_mul(input.height)
            .filter(|n| (1..=MAX_GRID_CELLS).contains(n))
            .ok_or_else(|| {
                EngineError::Functor(format!(
                    "grid {}x{} is out of range",
                    input.width, input.height
                ))
            })?;

        let seed = SeedPattern::parse(&input.seed_pattern);
        let root = constellation_id(0);
        let mut cells = Vec::with_capacity(cell_count as usize);
        for y in 0..input.height as i64 {
            for x in 0..input.width as i64 {
                let alive = seed.live_cells().contains(&(x, y));
                cells.push(cell(x, y, 0, alive, &root));
            }
        }

        let generation = constellation(0, &root, cells)?;
        Ok(Some(FunctorOutput::object(generation.clone())?.with_primary(generation)))
    }

    fn describe_provenance(&self, input: &Value, _output: &FunctorOutput) -> Map<String, Value> {
        let mut meta = Map::new();
        for key in ["seedPattern", "width", "height"] {
            if let Some(v) = input.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        meta
    }
}

#[derive(Debug, Deserialize)]
struct CellView {
    id: String,
    position: (i64, i64),
    #[serde(default)]
    status: String,
}

/// Applies the B3/S23 rule over the prior generation's bounding box.
///
/// Input: `{ "step": n, "constellation": {...} }` or
/// `{ "step": n, "constellationId": "..." }` resolved from the world.
pub struct StepConwayCells;

impl StepConwayCells {
    fn prior(input: &Value, ctx: &StepContext<'_>) -> Result<Value> {
        if let Some(inline) = input.get("constellation").filter(|v| v.is_object()) {
            return Ok(inline.clone());
        }
        let id = input
            .get("constellationId")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Functor("step input has no constellation".into()))?;
        let stored = ctx
            .artifact(id)
            .ok_or_else(|| EngineError::Functor(format!("constellation {id} not in world")))?;
        stored.to_value()
    }

    /// Next generation of a constellation value.
    pub fn advance(prior: &Value, generation: u64) -> Result<SymbolicObject> {
        let prior_root = prior
            .get("rootId")
            .or_else(|| prior.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("constellation-conway-t0")
            .to_string();
        let cells: Vec<CellView> = match prior.get("objects") {
            Some(objects) => serde_json::from_value(objects.clone())
                .map_err(|e| EngineError::Functor(format!("malformed conway cells: {e}")))?,
            None => Vec::new(),
        };

        let grid: HashMap<(i64, i64), &CellView> =
            cells.iter().map(|c| (c.position, c)).collect();
        let is_alive = |pos: (i64, i64)| grid.get(&pos).is_some_and(|c| c.status == "alive");

        let mut next = Vec::with_capacity(cells.len());
        if let Some(((min_x, max_x), (min_y, max_y))) = bounds(&cells) {
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let neighbors = NEIGHBORS
                        .iter()
                        .filter(|(dx, dy)| is_alive((x + dx, y + dy)))
                        .count();
                    let was_alive = is_alive((x, y));
                    let lives = matches!((was_alive, neighbors), (true, 2) | (_, 3));

                    let prior_id = grid.get(&(x, y)).map(|c| c.id.as_str()).unwrap_or("");
                    next.push(
                        cell(x, y, generation, lives, &prior_root)
                            .with_field("generatedFrom", json!({ "priorId": prior_id })),
                    );
                }
            }
        }

        constellation(generation, &prior_root, next)
    }
}

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

fn bounds(cells: &[CellView]) -> Option<((i64, i64), (i64, i64))> {
    let xs = cells.iter().map(|c| c.position.0);
    let ys = cells.iter().map(|c| c.position.1);
    Some((
        (xs.clone().min()?, xs.max()?),
        (ys.clone().min()?, ys.max()?),
    ))
}

#[async_trait::async_trait]
impl Functor for StepConwayCells {
    fn id(&self) -> &str {
        "functor-step-conway-cells"
    }

    fn method(&self) -> &str {
        "step-conway"
    }

    fn name(&self) -> &str {
        "StepConway"
    }

    async fn apply(&self, input: &Value, ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
        let generation = input
            .get("step")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::Functor("step input has no generation number".into()))?;
        let prior = Self::prior(input, ctx)?;
        let next = Self::advance(&prior, generation)?;
        Ok(Some(FunctorOutput::object(next.clone())?.with_primary(next)))
    }

    fn describe_provenance(&self, input: &Value, _output: &FunctorOutput) -> Map<String, Value> {
        let mut meta = Map::new();
        if let Some(step) = input.get("step") {
            meta.insert("generation".into(), step.clone());
        }
        let from = input
            .get("constellationId")
            .or_else(|| input.get("constellation").and_then(|c| c.get("id")));
        if let Some(from) = from {
            meta.insert("from".into(), from.clone());
        }
        meta
    }
}

/// Live cell positions of a constellation value, sorted.
pub fn live_positions(constellation: &Value) -> Vec<(i64, i64)> {
    let cells: Vec<CellView> = constellation
        .get("objects")
        .and_then(|o| serde_json::from_value(o.clone()).ok())
        .unwrap_or_default();
    let mut live: Vec<(i64, i64)> = cells
        .into_iter()
        .filter(|c| c.status == "alive")
        .map(|c| c.position)
        .collect();
    live.sort_unstable();
    live
}
