//! Image utilities for the generation pipeline.
//!
//! - `convert`: image <-> tensor conversion and fitting images to model sizes
//! - `mask`: growing/shrinking inpainting masks
//! - `log`: optional dump of intermediate images for debugging

mod convert;
mod log;
mod mask;

pub use convert::{
    DEFAULT_MAX_SIZE, SIZE_MULTIPLE, fit_image_within, image_to_tensor, img_path_to_tensor,
    mask_to_tensor, tensor_to_image,
};
pub use log::{image_log_dir, log_img, set_image_log_dir};
pub use mask::expand_mask;
