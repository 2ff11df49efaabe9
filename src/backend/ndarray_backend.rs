use image::DynamicImage;
use ndarray::{Array2, Array3, Array4, Axis};

use crate::backend::{to_binary_mask, to_chw, BackendFormatter};
use crate::error::DataResult;

/// Formats samples as owned `ndarray` arrays, for CPU-side consumers that do
/// not link a tensor library.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdarrayFormatter;

impl NdarrayFormatter {
    /// Stacks `[C, H, W]` arrays into `[N, C, H, W]`.
    pub fn collate_images(&self, images: &[Array3<f32>]) -> DataResult<Array4<f32>> {
        let views: Vec<_> = images.iter().map(|a| a.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }

    /// Stacks `[H, W]` masks into `[N, H, W]`.
    pub fn collate_masks(&self, masks: &[Array2<f32>]) -> DataResult<Array3<f32>> {
        let views: Vec<_> = masks.iter().map(|a| a.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

impl BackendFormatter for NdarrayFormatter {
    type Image = Array3<f32>;
    type Mask = Array2<f32>;

    fn name(&self) -> &'static str {
        "ndarray"
    }

    fn format_image(&self, image: &DynamicImage) -> DataResult<Array3<f32>> {
        let chw = to_chw(image);
        Ok(Array3::from_shape_vec((chw.channels, chw.height, chw.width), chw.data)?)
    }

    fn format_mask(&self, mask: &DynamicImage) -> DataResult<Array2<f32>> {
        let binary = to_binary_mask(mask);
        Ok(Array2::from_shape_vec((binary.height, binary.width), binary.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_mask_is_binarized() {
        let levels = [0u8, 5, 255];
        let mask = GrayImage::from_fn(9, 7, |x, y| Luma([levels[((x + y) % 3) as usize]]));
        let formatted = NdarrayFormatter
            .format_mask(&DynamicImage::ImageLuma8(mask))
            .unwrap();
        assert_eq!(formatted.dim(), (7, 9));
        assert!(formatted.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(formatted[[0, 0]], 0.0);
        assert_eq!(formatted[[0, 1]], 1.0);
        assert_eq!(formatted[[0, 2]], 1.0);
    }

    #[test]
    fn test_color_mask_is_collapsed() {
        let mask = RgbImage::from_fn(4, 4, |x, _| if x == 0 { Rgb([0, 0, 0]) } else { Rgb([0, 200, 0]) });
        let formatted = NdarrayFormatter
            .format_mask(&DynamicImage::ImageRgb8(mask))
            .unwrap();
        assert_eq!(formatted.dim(), (4, 4));
        assert_eq!(formatted.column(0).sum(), 0.0);
        assert_eq!(formatted.column(1).sum(), 4.0);
    }

    #[test]
    fn test_image_layout_and_collate() {
        let image = RgbImage::from_fn(4, 2, |x, y| Rgb([x as u8, y as u8, 9]));
        let formatted = NdarrayFormatter
            .format_image(&DynamicImage::ImageRgb8(image))
            .unwrap();
        assert_eq!(formatted.dim(), (3, 2, 4));
        assert_eq!(formatted[[0, 1, 3]], 3.0);
        assert_eq!(formatted[[1, 1, 3]], 1.0);
        assert_eq!(formatted[[2, 0, 0]], 9.0);

        let batch = NdarrayFormatter
            .collate_images(&[formatted.clone(), formatted])
            .unwrap();
        assert_eq!(batch.dim(), (2, 3, 2, 4));
    }
}
