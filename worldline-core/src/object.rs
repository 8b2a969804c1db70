//! Symbolic object model.
//!
//! Every record the engine stores is a [`SymbolicObject`]: a fixed header
//! (`id`, `type`, timestamps, status, lineage) plus an open set of payload
//! fields. Typed records ([`crate::records`]) convert to and from the
//! universal shape through the [`Record`] trait.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{EngineError, Result};

fn default_status() -> String {
    "active".to_string()
}

// Header fields are read leniently: a null or ill-typed value counts as
// absent, so any value with a string `id` and `type` becomes an object.

fn lenient_opt<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Numbers, or strings holding one.
fn lenient_count<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + FromStr,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().parse().ok(),
        other => serde_json::from_value(other).ok(),
    })
}

fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => s,
        _ => default_status(),
    })
}

fn lenient_map<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// RFC 3339, a bare `YYYY-MM-DD` date, or epoch milliseconds; otherwise now.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value).unwrap_or_else(Utc::now))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
                Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
            }),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

/// The universal record shape shared by everything in a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolicObject {
    /// Unique identifier within a world
    pub id: String,
    /// Type discriminator
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable label
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Free-form status ("active", "archived", "completed", ...)
    #[serde(default = "default_status", deserialize_with = "lenient_status")]
    pub status: String,
    /// Lineage root; absent means the object is its own root
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    /// Object this one was revised from
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub revision_number: Option<u32>,
    /// First object of a revision chain
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Simulation tick at which the object was produced
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    #[serde(default, deserialize_with = "lenient_map", skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Type-specific payload
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SymbolicObject {
    /// Create an object of the given type with a generated `<kebab-type>-<uuid>` id.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        let id = generate_id(&kind);
        Self::with_id(id, kind)
    }

    /// Create an object with an explicit id. The object is its own lineage root.
    pub fn with_id(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            root_id: Some(id.clone()),
            id,
            kind: kind.into(),
            label: None,
            description: None,
            created_at: now,
            updated_at: now,
            status: default_status(),
            parent_id: None,
            revision_number: None,
            origin_id: None,
            source: None,
            tick: None,
            metadata: Map::new(),
            fields: Map::new(),
        }
    }

    /// Lineage root, falling back to the object's own id.
    pub fn root_id(&self) -> &str {
        self.root_id.as_deref().unwrap_or(&self.id)
    }

    /// Both `id` and `type` are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.kind.is_empty()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_root(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }

    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Set a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Derive a new revision of this object.
    ///
    /// Stored objects are never mutated in place; an update is a new object
    /// with a fresh id pointing back at its parent and at the chain origin.
    pub fn revise(&self) -> Self {
        let mut next = self.clone();
        next.id = generate_id(&self.kind);
        next.parent_id = Some(self.id.clone());
        next.origin_id = Some(self.origin_id.clone().unwrap_or_else(|| self.id.clone()));
        next.revision_number = Some(self.revision_number.unwrap_or(0) + 1);
        next.updated_at = Utc::now();
        next.tick = None;
        next
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Generate an id of the form `<kebab-type>-<uuid>`.
pub fn generate_id(kind: &str) -> String {
    format!("{}-{}", kebab_case(kind), uuid::Uuid::new_v4())
}

/// `PipelineRun` -> `pipeline-run`, `SymbolicAction` -> `symbolic-action`.
pub fn kebab_case(kind: &str) -> String {
    let mut out = String::with_capacity(kind.len() + 4);
    let mut prev_lower = false;
    for ch in kind.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == '_' || ch == ' ' {
            out.push('-');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// A typed record stored in a world as a [`SymbolicObject`].
pub trait Record: Serialize + DeserializeOwned {
    /// Value of the `type` discriminator.
    const KIND: &'static str;

    /// Convert into the universal object shape.
    fn to_object(&self) -> Result<SymbolicObject> {
        let mut value = serde_json::to_value(self)?;
        let Value::Object(map) = &mut value else {
            return Err(EngineError::InvalidObject(format!(
                "{} does not serialize to an object",
                Self::KIND
            )));
        };
        map.insert("type".to_string(), Value::String(Self::KIND.to_string()));
        let mut object: SymbolicObject = serde_json::from_value(value)?;
        if object.root_id.is_none() {
            object.root_id = Some(object.id.clone());
        }
        Ok(object)
    }

    /// Read back from the universal shape, checking the discriminator.
    fn from_object(object: &SymbolicObject) -> Result<Self> {
        if object.kind != Self::KIND {
            return Err(EngineError::InvalidObject(format!(
                "expected type {}, found {}",
                Self::KIND,
                object.kind
            )));
        }
        Ok(serde_json::from_value(object.to_value()?)?)
    }
}
