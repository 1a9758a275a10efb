//! Configuration: runtime settings and config-driven component construction.

mod instantiate;
mod runtime;

pub use instantiate::{
    ComponentRegistry, FIRST_STAGE_MARKER, InstantiateConfig, UNCONDITIONAL_MARKER,
    instantiate_from_config,
};
pub use runtime::RuntimeConfig;
