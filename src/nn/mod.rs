//! Neural network building blocks.
//!
//! Normalization layers here accept weights stored in a different dtype than
//! their input and inputs with arbitrary strides, which is what mixed precision
//! pipelines hand them.

mod norm;

pub use norm::{DEFAULT_EPS, GroupNorm, LayerNorm, group_norm, layer_norm};
