//! Inpainting mask helpers.

use image::imageops;
use image::{DynamicImage, GrayImage, Luma};

use super::log_img;

/// Grow (`size > 0`) or shrink (`size < 0`) a mask by blurring and re-thresholding.
///
/// The mask is blurred with a Gaussian of sigma `|size|`. A low threshold
/// afterwards keeps anything the blur touched, which grows the masked area; a
/// high one keeps only pixels deep inside it. The result is strictly binary,
/// 0 or 255.
pub fn expand_mask(mask: &DynamicImage, size: f32) -> GrayImage {
    let threshold = if size < 0.0 { 0.95 } else { 0.05 };

    let gray = to_luma(mask);
    let blurred = if size != 0.0 {
        imageops::blur(&gray, size.abs())
    } else {
        gray
    };
    log_img(&DynamicImage::ImageLuma8(blurred.clone()), "init mask blurred");

    let mut out = blurred;
    for pixel in out.pixels_mut() {
        let value = pixel.0[0] as f32 / 255.0;
        pixel.0[0] = if value < threshold { 0 } else { 255 };
    }
    out
}

/// ITU-R 601-2 luma in 16.16 fixed point, the weights PIL's `convert("L")` uses.
///
/// `image`'s own `to_luma8` uses Rec. 709 weights, which shifts colored masks
/// across the thresholds.
fn to_luma(mask: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = mask {
        return gray.clone();
    }
    let rgb = mask.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// 32x32 black canvas with a white square at [12, 20)
    fn square_mask() -> DynamicImage {
        let mut mask = GrayImage::new(32, 32);
        for y in 12..20 {
            for x in 12..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        DynamicImage::ImageLuma8(mask)
    }

    fn white_count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn test_output_is_binary() {
        for size in [-3.0, 0.0, 3.0] {
            let out = expand_mask(&square_mask(), size);
            assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        }
    }

    #[test]
    fn test_positive_size_grows_mask() {
        let out = expand_mask(&square_mask(), 2.0);
        assert!(white_count(&out) > 64);
        // original area stays covered
        assert_eq!(out.get_pixel(12, 12).0[0], 255);
        assert_eq!(out.get_pixel(11, 15).0[0], 255);
        // far corner stays clear
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_negative_size_shrinks_mask() {
        let out = expand_mask(&square_mask(), -2.0);
        assert!(white_count(&out) < 64);
        assert_eq!(out.get_pixel(12, 12).0[0], 0);
    }

    #[test]
    fn test_zero_size_only_thresholds() {
        let mut mask = GrayImage::new(4, 1);
        mask.put_pixel(0, 0, Luma([5]));
        mask.put_pixel(1, 0, Luma([13]));
        mask.put_pixel(2, 0, Luma([200]));
        let out = expand_mask(&DynamicImage::ImageLuma8(mask), 0.0);

        // 5/255 < 0.05 <= 13/255
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 255, 255, 0]);
    }

    #[test]
    fn test_color_masks_are_converted() {
        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let out = expand_mask(&DynamicImage::ImageRgb8(white), 1.0);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(white_count(&out), 16);
    }

    #[test]
    fn test_color_masks_use_rec601_luma() {
        let green = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 255, 0])));
        assert_eq!(to_luma(&green).get_pixel(0, 0).0[0], 150);

        // Rec. 601 gives 12 (below 0.05), Rec. 709 would give 14 (above it)
        let dim_green = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 20, 0])));
        assert_eq!(to_luma(&dim_green).get_pixel(0, 0).0[0], 12);
        assert_eq!(white_count(&expand_mask(&dim_green, 0.0)), 0);
    }

    #[test]
    fn test_shrink_threshold_boundary() {
        // a uniform mask blurs to itself; 0.95 sits between 242/255 and 243/255
        let below = GrayImage::from_pixel(8, 8, Luma([242]));
        let out = expand_mask(&DynamicImage::ImageLuma8(below), -1.0);
        assert_eq!(white_count(&out), 0);

        let at = GrayImage::from_pixel(8, 8, Luma([243]));
        let out = expand_mask(&DynamicImage::ImageLuma8(at), -1.0);
        assert_eq!(white_count(&out), 64);
    }
}
