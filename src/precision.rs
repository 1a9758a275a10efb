//! Scoped mixed precision.
//!
//! candle has no global autocast switch, so the scope hands out the dtype that
//! computations inside it should run in and casts tensors on request. Mixed
//! precision only applies on CUDA and CPU; Metal runs at full precision.

use std::str::FromStr;

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::DeviceKind;

/// Requested precision mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Mixed precision where the platform supports it
    #[default]
    Autocast,
    /// Always full (f32) precision
    Full,
}

impl FromStr for Precision {
    type Err = crate::ImaginairyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "autocast" => Ok(Precision::Autocast),
            "full" => Ok(Precision::Full),
            other => Err(crate::ImaginairyError::ConfigError(format!(
                "Unknown precision '{}' (expected 'autocast' or 'full')",
                other
            ))),
        }
    }
}

/// Active precision scope returned by [`platform_appropriate_autocast`].
///
/// Dropping the scope ends it.
#[derive(Debug)]
pub struct AutocastScope {
    kind: DeviceKind,
    dtype: Option<DType>,
}

impl AutocastScope {
    /// Whether mixed precision is active in this scope
    pub fn is_enabled(&self) -> bool {
        self.dtype.is_some()
    }

    /// Dtype that computations in this scope should use
    pub fn dtype(&self) -> DType {
        self.dtype.unwrap_or(DType::F32)
    }

    /// Cast a floating point tensor to the scope dtype.
    ///
    /// Integer tensors are returned unchanged.
    pub fn cast(&self, tensor: &Tensor) -> crate::Result<Tensor> {
        match self.dtype {
            Some(dtype) if tensor.dtype().is_float() && tensor.dtype() != dtype => {
                Ok(tensor.to_dtype(dtype)?)
            }
            _ => Ok(tensor.clone()),
        }
    }

    /// Cast a tensor produced inside the scope back to f32
    pub fn cast_back(&self, tensor: &Tensor) -> crate::Result<Tensor> {
        if tensor.dtype().is_float() && tensor.dtype() != DType::F32 {
            Ok(tensor.to_dtype(DType::F32)?)
        } else {
            Ok(tensor.clone())
        }
    }
}

impl Drop for AutocastScope {
    fn drop(&mut self) {
        tracing::trace!("Leaving precision scope on {} ({:?})", self.kind, self.dtype());
    }
}

/// Allow calculations to run in mixed precision, which can be faster.
///
/// Only `Precision::Autocast` on a CUDA or CPU device enables it; CUDA computes
/// in f16 and CPU in bf16. Any other combination yields a no-op scope.
pub fn platform_appropriate_autocast(precision: Precision, device: &Device) -> AutocastScope {
    let kind = DeviceKind::of(device);
    let dtype = match (precision, kind) {
        (Precision::Autocast, DeviceKind::Cuda) => Some(DType::F16),
        (Precision::Autocast, DeviceKind::Cpu) => Some(DType::BF16),
        _ => None,
    };

    tracing::trace!("Entering precision scope on {} ({:?})", kind, dtype);
    AutocastScope { kind, dtype }
}
