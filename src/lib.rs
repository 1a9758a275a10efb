//! # imaginairy-utils
//!
//! Helper routines for a candle-based image generation pipeline.
//!
//! ## What's here
//!
//! - **Devices**: pick CUDA > Metal > CPU once per process and describe it
//! - **Precision**: scoped mixed precision that only kicks in on CUDA and CPU
//! - **Normalization**: group/layer norm that tolerate mixed-dtype weights and
//!   strided inputs
//! - **Images**: image <-> tensor conversion, fitting to multiples of 64,
//!   mask blurring and thresholding
//! - **Weights cache**: resolve a weights URL to a local file, downloading on miss
//!
//! ## Example
//!
//! ```ignore
//! use imaginairy_utils::{get_cached_url_path, get_device, img_path_to_tensor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = get_device()?;
//!     let weights = get_cached_url_path("https://example.com/sd-v1-4.safetensors").await?;
//!     let init_image = img_path_to_tensor("input.jpg", &device)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod imaging;
pub mod nn;
pub mod precision;
pub mod utils;

// Re-exports for convenience
pub use config::{ComponentRegistry, InstantiateConfig, RuntimeConfig, instantiate_from_config};
pub use imaging::{
    expand_mask, fit_image_within, image_to_tensor, img_path_to_tensor, mask_to_tensor,
    tensor_to_image,
};
pub use nn::{GroupNorm, LayerNorm, group_norm, layer_norm};
pub use precision::{AutocastScope, Precision, platform_appropriate_autocast};
pub use utils::{
    Device, DeviceKind, DType, get_cache_dir, get_cached_url_path, get_device, get_device_name,
};

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum ImaginairyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Shape error: {0}")]
    ShapeError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Weights error: {0}")]
    WeightsError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Unknown component target: {0}")]
    UnknownTarget(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    CandleError(#[from] candle_core::Error),

    #[error("Image codec error: {0}")]
    CodecError(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImaginairyError>;
