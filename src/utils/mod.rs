//! Utility modules for devices, the weights cache, and weight files.

mod device;
mod download;
mod weights;

pub use device::{
    Device, DeviceKind, DType, get_device, get_device_name, parse_device, parse_dtype,
};
pub use download::{get_cache_dir, get_cached_url_path, get_cached_url_path_in, resolve_cache_dir};
pub use weights::{count_params, load_safetensors, log_params};
