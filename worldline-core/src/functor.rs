//! Functor contract and pipeline steps.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::StepContext;
use crate::executor::StepOutput;
use crate::object::SymbolicObject;
use crate::types::Result;

/// What a functor produced for one input item.
#[derive(Debug, Clone, Default)]
pub struct FunctorOutput {
    /// Any JSON shape; symbolic objects inside are flattened out by the executor
    pub value: Value,
    /// Designated main output; its `rootId` drives action attribution
    pub primary: Option<SymbolicObject>,
}

impl FunctorOutput {
    pub fn object(object: SymbolicObject) -> Result<Self> {
        Ok(Self {
            value: serde_json::to_value(&object)?,
            primary: None,
        })
    }

    pub fn objects(objects: Vec<SymbolicObject>) -> Result<Self> {
        Ok(Self {
            value: serde_json::to_value(&objects)?,
            primary: None,
        })
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            primary: None,
        }
    }

    pub fn with_primary(mut self, primary: SymbolicObject) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Nothing at all was produced.
    pub fn is_empty(&self) -> bool {
        self.value.is_null() && self.primary.is_none()
    }
}

/// A pluggable transformation applied by a pipeline step.
#[async_trait::async_trait]
pub trait Functor: Send + Sync {
    /// Instrument id recorded on every action this functor causes.
    fn id(&self) -> &str;

    /// Method name recorded on transformations.
    fn method(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    /// Apply to one input item. `Ok(None)` means no output for this item.
    async fn apply(&self, input: &Value, ctx: &StepContext<'_>) -> Result<Option<FunctorOutput>>;

    /// Extra provenance metadata stored on the transformation.
    fn describe_provenance(&self, _input: &Value, _output: &FunctorOutput) -> Map<String, Value> {
        Map::new()
    }
}

/// Maps the previous step's output and the context into a step's input.
#[async_trait::async_trait]
pub trait InputResolver: Send + Sync {
    async fn resolve(&self, previous: &StepOutput, ctx: &StepContext<'_>) -> Result<Value>;
}

/// Resolver backed by a synchronous closure.
pub struct FnResolver<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F> InputResolver for FnResolver<F>
where
    F: Fn(&StepOutput, &StepContext<'_>) -> Result<Value> + Send + Sync,
{
    async fn resolve(&self, previous: &StepOutput, ctx: &StepContext<'_>) -> Result<Value> {
        (self.f)(previous, ctx)
    }
}

/// Build an [`InputResolver`] from a closure.
pub fn resolver<F>(f: F) -> FnResolver<F>
where
    F: Fn(&StepOutput, &StepContext<'_>) -> Result<Value> + Send + Sync,
{
    FnResolver { f }
}

/// Declarative pipeline unit.
#[derive(Clone)]
pub struct FunctorStep {
    pub id: String,
    pub functor: Arc<dyn Functor>,
    /// Human-readable intent, recorded as provenance
    pub purpose: String,
    pub resolve_input: Option<Arc<dyn InputResolver>>,
    /// Context name under which this step's output is exposed
    pub store_output_as: Option<String>,
    /// Whether running this step advances the world tick
    pub tick_advance: bool,
    pub label: Option<String>,
}

impl FunctorStep {
    pub fn new(id: impl Into<String>, functor: Arc<dyn Functor>, purpose: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            functor,
            purpose: purpose.into(),
            resolve_input: None,
            store_output_as: None,
            tick_advance: true,
            label: None,
        }
    }

    pub fn with_resolver(mut self, resolver: impl InputResolver + 'static) -> Self {
        self.resolve_input = Some(Arc::new(resolver));
        self
    }

    pub fn store_output_as(mut self, name: impl Into<String>) -> Self {
        self.store_output_as = Some(name.into());
        self
    }

    pub fn with_tick_advance(mut self, advance: bool) -> Self {
        self.tick_advance = advance;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for FunctorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctorStep")
            .field("id", &self.id)
            .field("functor", &self.functor.id())
            .field("purpose", &self.purpose)
            .field("resolve_input", &self.resolve_input.is_some())
            .field("store_output_as", &self.store_output_as)
            .field("tick_advance", &self.tick_advance)
            .finish()
    }
}
