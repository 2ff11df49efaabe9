use image::imageops::FilterType;
use image::DynamicImage;

use crate::Config;

/// Resizes images with linear interpolation and masks with nearest-neighbour,
/// so a resized mask only ever holds labels present in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resizer {
    /// (height, width)
    pub image_size: (u32, u32),
    /// (height, width)
    pub mask_size: (u32, u32),
}

impl Resizer {
    pub fn new(image_size: (u32, u32), mask_size: Option<(u32, u32)>) -> Self {
        Self {
            image_size,
            mask_size: mask_size.unwrap_or(image_size),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            image_size: config.image_size(),
            mask_size: config.mask_size(),
        }
    }

    pub fn resize_image(&self, image: &DynamicImage) -> DynamicImage {
        resize_to(image, self.image_size, FilterType::Triangle)
    }

    pub fn resize_mask(&self, mask: &DynamicImage) -> DynamicImage {
        resize_to(mask, self.mask_size, FilterType::Nearest)
    }

    pub fn resize_pair(&self, image: &DynamicImage, mask: &DynamicImage) -> (DynamicImage, DynamicImage) {
        (self.resize_image(image), self.resize_mask(mask))
    }
}

fn resize_to(image: &DynamicImage, (height, width): (u32, u32), filter: FilterType) -> DynamicImage {
    if image.height() == height && image.width() == width {
        return image.clone();
    }
    image.resize_exact(width, height, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::collections::BTreeSet;

    fn checker_mask(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| Luma([((x + y) % 2) as u8])))
    }

    #[test]
    fn test_resize_to_target_size() {
        let resizer = Resizer::new((64, 32), Some((16, 8)));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([10, 20, 30])));
        let (img, mask) = resizer.resize_pair(&image, &checker_mask(10, 20));
        assert_eq!((img.height(), img.width()), (64, 32));
        assert_eq!((mask.height(), mask.width()), (16, 8));
    }

    #[test]
    fn test_mask_size_falls_back_to_image_size() {
        let resizer = Resizer::new((24, 48), None);
        let mask = resizer.resize_mask(&checker_mask(5, 5));
        assert_eq!((mask.height(), mask.width()), (24, 48));
    }

    #[test]
    fn test_resize_at_target_size_is_noop() {
        let resizer = Resizer::new((6, 9), None);
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(9, 6, |x, y| {
            Rgb([(x * 25) as u8, (y * 40) as u8, ((x * y) % 256) as u8])
        }));
        let mask = checker_mask(9, 6);
        let (img_out, mask_out) = resizer.resize_pair(&image, &mask);
        assert_eq!(img_out.as_bytes(), image.as_bytes());
        assert_eq!(mask_out.as_bytes(), mask.as_bytes());
    }

    #[test]
    fn test_mask_resize_keeps_label_set() {
        let mask = checker_mask(7, 5);
        let up = Resizer::new((23, 31), None).resize_mask(&mask);
        let down = Resizer::new((5, 7), None).resize_mask(&up);
        for resized in [&up, &down] {
            let values: BTreeSet<u8> = resized.to_luma8().pixels().map(|p| p[0]).collect();
            assert!(values.is_subset(&BTreeSet::from([0, 1])), "{:?}", values);
        }
    }
}
