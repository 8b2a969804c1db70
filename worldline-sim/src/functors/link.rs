//! Relationship links between symbolic objects.

use serde::Deserialize;
use serde_json::{Map, Value};
use worldline_core::{EngineError, Functor, FunctorOutput, Result, StepContext, SymbolicObject};

pub const SYMBOLIC_LINK: &str = "SymbolicLink";

#[derive(Debug, Deserialize)]
struct Endpoint {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct LinkInput {
    from: Endpoint,
    to: Endpoint,
    relationship: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Produces a `SymbolicLink` `link-<from>-<to>-<relationship>`.
pub struct LinkSymbols;

#[async_trait::async_trait]
impl Functor for LinkSymbols {
    fn id(&self) -> &str {
        "functor-link-symbols"
    }

    fn method(&self) -> &str {
        "automated"
    }

    fn name(&self) -> &str {
        "LinkSymbols"
    }

    async fn apply(&self, input: &Value, _ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>> {
        let input: LinkInput = serde_json::from_value(input.clone())
            .map_err(|e| EngineError::Functor(format!("invalid link input: {e}")))?;

        let id = format!("link-{}-{}-{}", input.from.id, input.to.id, input.relationship);
        let label = input
            .label
            .unwrap_or_else(|| format!("{} → {}", input.from.kind, input.to.kind));
        let description = input
            .description
            .unwrap_or_else(|| format!("Linked by relationship: {}", input.relationship));

        let link = SymbolicObject::with_id(id, SYMBOLIC_LINK)
            .with_root("link-root")
            .with_label(label)
            .with_description(description)
            .with_field("fromId", input.from.id)
            .with_field("toId", input.to.id)
            .with_field("relationship", input.relationship);

        Ok(Some(FunctorOutput::object(link)?))
    }

    fn describe_provenance(&self, input: &Value, _output: &FunctorOutput) -> Map<String, Value> {
        let mut meta = Map::new();
        if let Some(from) = input.pointer("/from/id") {
            meta.insert("fromId".into(), from.clone());
        }
        if let Some(to) = input.pointer("/to/id") {
            meta.insert("toId".into(), to.clone());
        }
        if let Some(rel) = input.get("relationship") {
            meta.insert("relationship".into(), rel.clone());
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use worldline_core::WorldState;

    #[tokio::test]
    async fn test_link_shape() {
        let world = WorldState::new("test");
        let ctx = StepContext::new(&world);
        let input = json!({
            "from": {"id": "a", "type": "Constellation"},
            "to": {"id": "b", "type": "Constellation"},
            "relationship": "next"
        });

        let out = LinkSymbols.apply(&input, &ctx).await.unwrap().unwrap();
        let link = &out.value;
        assert_eq!(link["id"], "link-a-b-next");
        assert_eq!(link["type"], "SymbolicLink");
        assert_eq!(link["fromId"], "a");
        assert_eq!(link["toId"], "b");
        assert_eq!(link["label"], "Constellation → Constellation");
        assert_eq!(link["description"], "Linked by relationship: next");

        let meta = LinkSymbols.describe_provenance(&input, &out);
        assert_eq!(meta["relationship"], "next");
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_error() {
        let world = WorldState::new("test");
        let ctx = StepContext::new(&world);
        let input = json!({"from": {"id": "a"}, "relationship": "next"});
        assert!(LinkSymbols.apply(&input, &ctx).await.is_err());
    }
}
