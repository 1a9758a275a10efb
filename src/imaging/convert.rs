//! Conversions between images and model tensors.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};

/// Default bound for [`fit_image_within`]
pub const DEFAULT_MAX_SIZE: u32 = 512;

/// Image sides fed to the model must be multiples of this
pub const SIZE_MULTIPLE: u32 = 64;

/// Load an image from disk as a `[1, 3, H, W]` tensor in `[-1, 1]`
pub fn img_path_to_tensor(path: impl AsRef<Path>, device: &Device) -> crate::Result<Tensor> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;

    tracing::info!(
        "Loaded input image of size {}x{} from {:?}",
        image.width(),
        image.height(),
        path
    );

    image_to_tensor(&image, device)
}

/// Downscale `image` to fit within the bounds, keeping its aspect ratio.
///
/// Both sides are then rounded down to a multiple of 64 and the image is
/// resized with nearest-neighbour sampling. Returns the resized image along
/// with its width and height.
pub fn fit_image_within(
    image: &DynamicImage,
    max_height: u32,
    max_width: u32,
) -> crate::Result<(RgbImage, u32, u32)> {
    let image = image.to_rgb8();
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(crate::ImaginairyError::ImageError(
            "Cannot fit an empty image".to_string(),
        ));
    }

    let resize_ratio = f64::min(
        max_width as f64 / w as f64,
        max_height as f64 / h as f64,
    );
    let w = (w as f64 * resize_ratio) as u32;
    let h = (h as f64 * resize_ratio) as u32;
    let (w, h) = (w - w % SIZE_MULTIPLE, h - h % SIZE_MULTIPLE);

    if w == 0 || h == 0 {
        return Err(crate::ImaginairyError::ImageError(format!(
            "Image would shrink to {}x{}; bounds {}x{} are too small",
            w, h, max_width, max_height
        )));
    }

    let resized = imageops::resize(&image, w, h, FilterType::Nearest);
    Ok((resized, w, h))
}

/// Convert an image to a `[1, 3, H, W]` f32 tensor scaled to `[-1, 1]`
pub fn image_to_tensor(image: &DynamicImage, device: &Device) -> crate::Result<Tensor> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();

    // HWC bytes -> CHW floats
    let tensor = Tensor::from_vec(rgb.into_raw(), (h as usize, w as usize, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2.0 / 255.0, -1.0)?
        .unsqueeze(0)?;

    Ok(tensor)
}

/// Convert a mask to a `[1, 1, H, W]` f32 tensor in `[0, 1]`
pub fn mask_to_tensor(mask: &GrayImage, device: &Device) -> crate::Result<Tensor> {
    let (w, h) = mask.dimensions();
    let tensor = Tensor::from_vec(mask.as_raw().clone(), (1, 1, h as usize, w as usize), device)?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;
    Ok(tensor)
}

/// Convert a `[1, 3, H, W]` or `[3, H, W]` tensor in `[-1, 1]` back to an image.
///
/// Values outside the range are clamped.
pub fn tensor_to_image(tensor: &Tensor) -> crate::Result<RgbImage> {
    let tensor = match tensor.dims() {
        [1, 3, _, _] => tensor.squeeze(0)?,
        [3, _, _] => tensor.clone(),
        dims => {
            return Err(crate::ImaginairyError::ShapeError(format!(
                "Expected [1, 3, H, W] or [3, H, W], got {:?}",
                dims
            )))
        }
    };
    let (_, h, w) = tensor.dims3()?;

    let bytes: Vec<u8> = tensor
        .to_dtype(DType::F32)?
        .affine(127.5, 127.5)?
        .clamp(0f32, 255f32)?
        .round()?
        .to_dtype(DType::U8)?
        .permute((1, 2, 0))?
        .flatten_all()?
        .to_vec1()?;

    RgbImage::from_raw(w as u32, h as u32, bytes).ok_or_else(|| {
        crate::ImaginairyError::ImageError("Tensor data does not match image size".to_string())
    })
}
