//! `conway-game-of-life` pipeline.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use worldline_core::{
    resolver, EngineError, Functor, FunctorStep, PipelineArgs, PipelineDefinition, Result,
    StepContext, SymbolicObject,
};

use crate::functors::{InitializeConwayCells, LinkSymbols, StepConwayCells};

pub const CONWAY_PIPELINE_ID: &str = "conway-game-of-life";

/// Seed a grid, then alternate one generation step and one link step.
///
/// Generation `i` is exposed as `Conway_t<i>` and its link from the prior
/// generation as `ConwayLink_t<i>`. Only generation steps advance the tick.
pub struct ConwayPipeline;

fn generation_key(generation: u64) -> String {
    format!("Conway_t{generation}")
}

/// The constellation a previous step stored under `name`.
fn stored_constellation(ctx: &StepContext<'_>, name: &str) -> Result<Arc<SymbolicObject>> {
    ctx.output(name)
        .and_then(|out| out.objects().into_iter().next())
        .ok_or_else(|| EngineError::InputResolution(format!("no output stored as {name}")))
}

impl PipelineDefinition for ConwayPipeline {
    fn id(&self) -> &str {
        CONWAY_PIPELINE_ID
    }

    fn label(&self) -> &str {
        "Conway's Game of Life"
    }

    fn description(&self) -> &str {
        "Run Conway's Game of Life over a fixed number of generations."
    }

    fn default_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("steps".into(), json!(20));
        params.insert("seedPattern".into(), json!("glider"));
        params.insert("width".into(), json!(9));
        params.insert("height".into(), json!(9));
        params
    }

    fn required_params(&self) -> &[&str] {
        &["steps"]
    }

    fn steps(&self, args: &PipelineArgs) -> Result<Vec<FunctorStep>> {
        let generations = args.param_u64("steps").ok_or_else(|| {
            EngineError::Pipeline("'steps' must be a non-negative integer".into())
        })?;

        let init: Arc<dyn Functor> = Arc::new(InitializeConwayCells);
        let step: Arc<dyn Functor> = Arc::new(StepConwayCells);
        let link: Arc<dyn Functor> = Arc::new(LinkSymbols);

        let mut steps = Vec::with_capacity(1 + 2 * generations as usize);
        steps.push(
            FunctorStep::new("initialize-conway", init, "initialize-conway-cells")
                .with_resolver(resolver(|_, ctx| {
                    Ok(json!({
                        "width": ctx.param_u64("width").unwrap_or(9),
                        "height": ctx.param_u64("height").unwrap_or(9),
                        "seedPattern": ctx.param_str("seedPattern").unwrap_or("glider"),
                    }))
                }))
                .store_output_as(generation_key(0))
                .with_tick_advance(false),
        );

        for i in 0..generations {
            let generation = i + 1;
            let prior = generation_key(i);
            let current = generation_key(generation);

            let prior_for_step = prior.clone();
            steps.push(
                FunctorStep::new(format!("step-conway-{generation}"), step.clone(), "step-conway-cells")
                    .with_resolver(resolver(move |_, ctx| {
                        let from = stored_constellation(ctx, &prior_for_step)?;
                        Ok(json!({ "step": generation, "constellationId": from.id }))
                    }))
                    .store_output_as(current.clone()),
            );

            let current_for_link = current;
            steps.push(
                FunctorStep::new(format!("link-conway-{generation}"), link.clone(), "link-conway-frames")
                    .with_resolver(resolver(move |_, ctx| {
                        let from = stored_constellation(ctx, &prior)?;
                        let to = stored_constellation(ctx, &current_for_link)?;
                        Ok(json!({
                            "from": { "id": from.id, "type": from.kind },
                            "to": { "id": to.id, "type": to.kind },
                            "relationship": "next",
                            "label": "Next Generation",
                        }))
                    }))
                    .store_output_as(format!("ConwayLink_t{generation}"))
                    .with_tick_advance(false),
            );
        }

        Ok(steps)
    }
}
