//! The [`Component`] trait and its persisted form, [`ComponentDescriptor`].
//!
//! A pipeline host stores components as plain mappings:
//!
//! ```json
//! {"type": "GptGenerator", "init_parameters": {"model_name": "gpt-4", ...}}
//! ```
//!
//! and talks to them through JSON values, so that nodes of different kinds
//! can be wired together without the host knowing their Rust types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::callbacks::CallbackRegistry;
use crate::error::{ComponentError, Result};

/// Serializable description of a component: its type tag plus the
/// parameters needed to rebuild it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Component type tag (e.g. "GptGenerator").
    #[serde(rename = "type")]
    pub type_name: String,

    /// Constructor parameters. Secrets are never stored here.
    #[serde(default)]
    pub init_parameters: Map<String, Value>,
}

impl ComponentDescriptor {
    /// Create a descriptor from a type tag and parameters.
    pub fn new(type_name: impl Into<String>, init_parameters: Map<String, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            init_parameters,
        }
    }

    /// Fail unless this descriptor is tagged `expected`.
    pub fn expect_type(&self, expected: &str) -> Result<()> {
        if self.type_name == expected {
            Ok(())
        } else {
            Err(ComponentError::Deserialization(format!(
                "descriptor type '{}' does not match '{expected}'",
                self.type_name
            )))
        }
    }

    /// Render as a JSON value.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(self.type_name.clone()));
        map.insert(
            "init_parameters".into(),
            Value::Object(self.init_parameters.clone()),
        );
        Value::Object(map)
    }
}

/// A pipeline node.
///
/// Typed entry points (like `GptGenerator::run`) stay on the concrete type;
/// this trait carries what a host needs generically: persistence and a
/// JSON-in/JSON-out invocation.
#[async_trait]
pub trait Component: Send + Sync {
    /// Type tag written to [`ComponentDescriptor::type_name`].
    const TYPE_NAME: &'static str;

    /// Serialize the component's configuration.
    fn to_dict(&self) -> ComponentDescriptor;

    /// Rebuild a component from its descriptor. Callback references are
    /// resolved through `callbacks`.
    fn from_dict(descriptor: ComponentDescriptor, callbacks: &CallbackRegistry) -> Result<Self>
    where
        Self: Sized;

    /// Run the component on JSON inputs and return JSON outputs.
    async fn invoke(&self, inputs: &Map<String, Value>) -> Result<Value>;
}
