//! Conversion from decoded images to the tensor layout a training backend
//! expects.
//!
//! Every formatter honours the same contract: images come out channel-first
//! with at least three channels (single channel input is replicated), masks
//! come out as a single `height x width` plane valued in `{0, 1}`.

use image::{DynamicImage, ImageBuffer, Pixel};

use crate::error::DataResult;

pub mod ndarray_backend;
pub mod tch_backend;

pub use ndarray_backend::NdarrayFormatter;
pub use tch_backend::TchFormatter;

pub trait BackendFormatter: Send + Sync {
    type Image;
    type Mask;

    fn name(&self) -> &'static str;

    fn format_image(&self, image: &DynamicImage) -> DataResult<Self::Image>;

    fn format_mask(&self, mask: &DynamicImage) -> DataResult<Self::Mask>;

    fn format(
        &self,
        image: &DynamicImage,
        mask: Option<&DynamicImage>,
    ) -> DataResult<(Self::Image, Option<Self::Mask>)> {
        let image = self.format_image(image)?;
        let mask = mask.map(|m| self.format_mask(m)).transpose()?;
        Ok((image, mask))
    }
}

/// Planar pixel data, `data[c * height * width + y * width + x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChwImage {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

/// Single plane of `0.0` / `1.0` values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

/// Channel-first copy of `image`, keeping raw pixel values. Grayscale input
/// (with or without alpha) is expanded to RGB; RGBA keeps its alpha plane.
pub fn to_chw(image: &DynamicImage) -> ChwImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => planar(&image.to_rgb8()),
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => planar(&image.to_rgb16()),
        DynamicImage::ImageRgb8(buf) => planar(buf),
        DynamicImage::ImageRgba8(buf) => planar(buf),
        DynamicImage::ImageRgb16(buf) => planar(buf),
        DynamicImage::ImageRgba16(buf) => planar(buf),
        DynamicImage::ImageRgb32F(buf) => planar(buf),
        DynamicImage::ImageRgba32F(buf) => planar(buf),
        _ => planar(&image.to_rgb8()),
    }
}

fn planar<P>(buf: &ImageBuffer<P, Vec<P::Subpixel>>) -> ChwImage
where
    P: Pixel,
    P::Subpixel: Into<f32>,
{
    let channels = P::CHANNEL_COUNT as usize;
    let (width, height) = (buf.width() as usize, buf.height() as usize);
    let plane = width * height;
    let raw = buf.as_raw();
    let mut data = vec![0.0f32; channels * plane];
    for i in 0..plane {
        for c in 0..channels {
            data[c * plane + i] = raw[i * channels + c].into();
        }
    }
    ChwImage {
        channels,
        height,
        width,
        data,
    }
}

/// Per-pixel foreground flags. Multi-channel masks are reduced to luminance
/// first; 16-bit and float masks are tested on their native values.
pub fn foreground(mask: &DynamicImage) -> Vec<bool> {
    match mask {
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => mask.to_luma16().iter().map(|&v| v > 0).collect(),
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            mask.to_luma32f().iter().map(|&v| v > 0.0).collect()
        }
        _ => mask.to_luma8().iter().map(|&v| v > 0).collect(),
    }
}

/// True when any pixel of `mask` carries a label.
pub fn has_foreground(mask: &DynamicImage) -> bool {
    foreground(mask).into_iter().any(|f| f)
}

/// Every pixel > 0 becomes 1, everything else 0.
pub fn to_binary_mask(mask: &DynamicImage) -> BinaryMask {
    BinaryMask {
        height: mask.height() as usize,
        width: mask.width() as usize,
        data: foreground(mask)
            .into_iter()
            .map(|f| if f { 1.0 } else { 0.0 })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_gray_is_expanded_to_three_planes() {
        let gray = GrayImage::from_fn(3, 2, |x, y| Luma([(10 * x + y) as u8]));
        let chw = to_chw(&DynamicImage::ImageLuma8(gray));
        assert_eq!((chw.channels, chw.height, chw.width), (3, 2, 3));
        let plane = 6;
        for c in 0..3 {
            assert_eq!(&chw.data[c * plane..(c + 1) * plane], &[0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
        }
    }

    #[test]
    fn test_rgb_channels_move_first() {
        let rgb = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8, 100 + x as u8, 200 + x as u8]));
        let chw = to_chw(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(chw.data, vec![0.0, 1.0, 100.0, 101.0, 200.0, 201.0]);
    }

    #[test]
    fn test_rgba_keeps_alpha_plane() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4]));
        let chw = to_chw(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(chw.channels, 4);
        assert_eq!(&chw.data[12..], &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_binary_mask_values() {
        let values = [0u8, 5, 255, 0];
        let mask = GrayImage::from_fn(2, 2, |x, y| Luma([values[(y * 2 + x) as usize]]));
        let binary = to_binary_mask(&DynamicImage::ImageLuma8(mask));
        assert_eq!(binary.data, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sixteen_bit_mask_uses_native_values() {
        let mask: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(2, 1, |x, _| Luma([x as u16]));
        let mask = DynamicImage::ImageLuma16(mask);
        assert_eq!(to_binary_mask(&mask).data, vec![0.0, 1.0]);
        assert!(has_foreground(&mask));
    }

    #[test]
    fn test_has_foreground() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(!has_foreground(&empty));
        let mut one = GrayImage::new(4, 4);
        one.put_pixel(3, 3, Luma([1]));
        assert!(has_foreground(&DynamicImage::ImageLuma8(one)));
    }
}
