use image::DynamicImage;
use tch::{Device, Kind, Tensor};

use crate::backend::{to_binary_mask, to_chw, BackendFormatter};
use crate::error::DataResult;

/// Formats samples as `tch` tensors: images `[C, H, W]`, masks `[H, W]`,
/// both `Kind::Float`.
#[derive(Debug, Clone, Copy)]
pub struct TchFormatter {
    device: Device,
}

impl Default for TchFormatter {
    fn default() -> Self {
        #[cfg(feature = "cpu")]
        let device = Device::Cpu;
        #[cfg(not(feature = "cpu"))]
        let device = Device::cuda_if_available();
        Self { device }
    }
}

impl TchFormatter {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Stacks `[C, H, W]` images into one `[N, C, H, W]` tensor.
    pub fn collate_images(&self, images: &[Tensor]) -> DataResult<Tensor> {
        Ok(Tensor::f_stack(images, 0)?)
    }

    /// Stacks `[H, W]` masks into one `[N, H, W]` tensor of class indices.
    pub fn collate_masks(&self, masks: &[Tensor]) -> DataResult<Tensor> {
        Ok(Tensor::f_stack(masks, 0)?.f_to_kind(Kind::Int64)?)
    }
}

impl BackendFormatter for TchFormatter {
    type Image = Tensor;
    type Mask = Tensor;

    fn name(&self) -> &'static str {
        "tch"
    }

    fn format_image(&self, image: &DynamicImage) -> DataResult<Tensor> {
        let chw = to_chw(image);
        let tensor = Tensor::from_slice(&chw.data).f_view([
            chw.channels as i64,
            chw.height as i64,
            chw.width as i64,
        ])?;
        Ok(tensor.to_device(self.device))
    }

    fn format_mask(&self, mask: &DynamicImage) -> DataResult<Tensor> {
        let binary = to_binary_mask(mask);
        let tensor = Tensor::from_slice(&binary.data)
            .f_view([binary.height as i64, binary.width as i64])?;
        Ok(tensor.to_device(self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_format_pair_shapes() -> anyhow::Result<()> {
        let formatter = TchFormatter::new(Device::Cpu);
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 4, Luma([7])));
        let mask = DynamicImage::ImageRgb8(RgbImage::from_fn(5, 4, |x, _| {
            if x > 2 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        }));

        let (image, mask) = formatter.format(&image, Some(&mask))?;
        let mask = mask.expect("mask requested");

        assert_eq!(image.size(), vec![3, 4, 5]);
        assert_eq!(mask.size(), vec![4, 5]);
        assert_eq!(f64::try_from(image.max())?, 7.0);
        assert_eq!(f64::try_from(mask.max())?, 1.0);
        assert_eq!(f64::try_from(mask.sum(Kind::Float))?, 8.0);
        Ok(())
    }

    #[test]
    fn test_format_without_mask() -> anyhow::Result<()> {
        let formatter = TchFormatter::new(Device::Cpu);
        let image = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        let (image, mask) = formatter.format(&image, None)?;
        assert!(mask.is_none());
        assert_eq!(image.size(), vec![3, 3, 3]);
        Ok(())
    }

    #[test]
    fn test_collate() -> anyhow::Result<()> {
        let formatter = TchFormatter::new(Device::Cpu);
        let image = DynamicImage::ImageRgb8(RgbImage::new(6, 2));
        let mask = DynamicImage::ImageLuma8(GrayImage::new(6, 2));
        let images = vec![formatter.format_image(&image)?, formatter.format_image(&image)?];
        let masks = vec![formatter.format_mask(&mask)?, formatter.format_mask(&mask)?];
        assert_eq!(formatter.collate_images(&images)?.size(), vec![2, 3, 2, 6]);
        let masks = formatter.collate_masks(&masks)?;
        assert_eq!(masks.size(), vec![2, 2, 6]);
        assert_eq!(masks.kind(), Kind::Int64);
        Ok(())
    }
}
