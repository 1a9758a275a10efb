//! Build components from `{"target": ..., "params": {...}}` configs.
//!
//! Model configs name the component to build by a dotted target path. Rust has
//! no runtime import, so targets are looked up in a registry of constructors
//! that the caller fills in up front.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder config for a stage that reuses the first-stage model
pub const FIRST_STAGE_MARKER: &str = "__is_first_stage__";

/// Placeholder config for an unconditional model
pub const UNCONDITIONAL_MARKER: &str = "__is_unconditional__";

/// A component config as found in model yaml/json files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstantiateConfig {
    /// Bare string such as [`FIRST_STAGE_MARKER`]
    Marker(String),
    /// Target path plus constructor parameters
    Target {
        target: String,
        #[serde(default = "empty_params")]
        params: Value,
    },
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl InstantiateConfig {
    pub fn target(target: impl Into<String>, params: Value) -> Self {
        InstantiateConfig::Target {
            target: target.into(),
            params,
        }
    }

    /// Parse a raw JSON value, reporting a missing `target` key explicitly
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::String(s) => Ok(InstantiateConfig::Marker(s)),
            Value::Object(ref map) if !map.contains_key("target") => {
                Err(crate::ImaginairyError::ConfigError(
                    "Expected key `target` to instantiate.".to_string(),
                ))
            }
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(crate::ImaginairyError::ConfigError(format!(
                "Expected an object or marker string, got {}",
                other
            ))),
        }
    }
}

type Constructor<T> = Box<dyn Fn(&Value) -> crate::Result<T> + Send + Sync>;

/// Maps target paths to constructors producing `T`
pub struct ComponentRegistry<T> {
    constructors: HashMap<String, Constructor<T>>,
}

impl<T> Default for ComponentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ComponentRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("targets", &self.targets())
            .finish()
    }
}

impl<T> ComponentRegistry<T> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor taking the raw `params` value
    pub fn register<F>(&mut self, target: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Value) -> crate::Result<T> + Send + Sync + 'static,
    {
        self.constructors.insert(target.into(), Box::new(constructor));
        self
    }

    /// Register a constructor whose `params` deserialize into `P`
    pub fn register_with<P, F>(&mut self, target: impl Into<String>, constructor: F) -> &mut Self
    where
        P: DeserializeOwned,
        F: Fn(P) -> crate::Result<T> + Send + Sync + 'static,
    {
        self.register(target, move |params: &Value| {
            let params: P = serde_json::from_value(params.clone())?;
            constructor(params)
        })
    }

    pub fn contains(&self, target: &str) -> bool {
        self.constructors.contains_key(target)
    }

    /// Registered target paths, sorted
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        targets.sort_unstable();
        targets
    }

    /// Build the component described by `config`.
    ///
    /// The first-stage and unconditional markers produce `None`.
    pub fn instantiate(&self, config: &InstantiateConfig) -> crate::Result<Option<T>> {
        match config {
            InstantiateConfig::Marker(marker)
                if marker == FIRST_STAGE_MARKER || marker == UNCONDITIONAL_MARKER =>
            {
                Ok(None)
            }
            InstantiateConfig::Marker(_) => Err(crate::ImaginairyError::ConfigError(
                "Expected key `target` to instantiate.".to_string(),
            )),
            InstantiateConfig::Target { target, params } => {
                let constructor = self
                    .constructors
                    .get(target)
                    .ok_or_else(|| crate::ImaginairyError::UnknownTarget(target.clone()))?;
                tracing::debug!("Instantiating {}", target);
                constructor(params).map(Some)
            }
        }
    }
}

/// Build the component described by `config` using `registry`
pub fn instantiate_from_config<T>(
    registry: &ComponentRegistry<T>,
    config: &InstantiateConfig,
) -> crate::Result<Option<T>> {
    registry.instantiate(config)
}
