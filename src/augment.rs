//! Random perturbations applied to training and validation pairs.
//!
//! Geometric steps always move image and mask together; photometric steps
//! touch the image only.

use std::cmp::max;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use rand::Rng;
use serde::Deserialize;

/// Augmentation hooks, in the order [`augment_pair`] calls them. Every hook
/// defaults to the identity so an implementation only overrides what it
/// needs.
pub trait Augmentor: Send + Sync {
    fn random_flip(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        (image, mask)
    }

    fn random_rotation(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        (image, mask)
    }

    fn random_shift(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        (image, mask)
    }

    fn random_zoom(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        (image, mask)
    }

    fn shape_augmentation(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        (image, mask)
    }

    fn random_noise(&self, image: DynamicImage) -> DynamicImage {
        image
    }

    fn random_brightness(&self, image: DynamicImage) -> DynamicImage {
        image
    }

    fn img_augmentation(&self, image: DynamicImage) -> DynamicImage {
        image
    }
}

/// Runs every hook of `augmentor` in the fixed pipeline order.
pub fn augment_pair(
    augmentor: &dyn Augmentor,
    image: DynamicImage,
    mask: DynamicImage,
) -> (DynamicImage, DynamicImage) {
    let (image, mask) = augmentor.random_flip(image, mask);
    let (image, mask) = augmentor.random_rotation(image, mask);
    let (image, mask) = augmentor.random_shift(image, mask);
    let (image, mask) = augmentor.random_zoom(image, mask);
    let (image, mask) = augmentor.shape_augmentation(image, mask);
    let image = augmentor.random_noise(image);
    let image = augmentor.random_brightness(image);
    let image = augmentor.img_augmentation(image);
    (image, mask)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Probability of a horizontal flip.
    pub flip_prob: f32,
    /// Probability of a rotation by 90, 180 or 270 degrees.
    pub rotation_prob: f32,
    /// Probability of a translation.
    pub shift_prob: f32,
    /// Max translation as a fraction of width/height.
    pub max_shift: f32,
    /// Probability of a zoom in/out around the center.
    pub zoom_prob: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    /// Probability of a vertical flip.
    pub shape_prob: f32,
    /// Probability of adding uniform noise per subpixel.
    pub noise_prob: f32,
    /// Max absolute noise, in pixel units.
    pub noise_strength: f32,
    pub brightness_prob: f32,
    /// Max absolute brightness offset, in pixel units.
    pub brightness_max: i32,
    /// Probability of a gaussian blur.
    pub blur_prob: f32,
    pub blur_sigma: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_prob: 0.5,
            rotation_prob: 0.25,
            shift_prob: 0.25,
            max_shift: 0.1,
            zoom_prob: 0.25,
            zoom_min: 0.8,
            zoom_max: 1.2,
            shape_prob: 0.0,
            noise_prob: 0.1,
            noise_strength: 8.0,
            brightness_prob: 0.25,
            brightness_max: 20,
            blur_prob: 0.0,
            blur_sigma: 1.0,
        }
    }
}

impl AugmentConfig {
    /// All probabilities zero.
    pub fn disabled() -> Self {
        Self {
            flip_prob: 0.0,
            rotation_prob: 0.0,
            shift_prob: 0.0,
            zoom_prob: 0.0,
            shape_prob: 0.0,
            noise_prob: 0.0,
            brightness_prob: 0.0,
            blur_prob: 0.0,
            ..Self::default()
        }
    }
}

/// [`Augmentor`] drawing from the thread-local RNG, so concurrent callers
/// never share generator state.
#[derive(Debug, Clone, Default)]
pub struct RandomAugmentor {
    pub config: AugmentConfig,
}

impl RandomAugmentor {
    pub fn new(config: AugmentConfig) -> Self {
        Self { config }
    }
}

fn hit(prob: f32) -> bool {
    prob > 0.0 && rand::thread_rng().gen::<f32>() < prob
}

impl Augmentor for RandomAugmentor {
    fn random_flip(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        if hit(self.config.flip_prob) {
            (image.fliph(), mask.fliph())
        } else {
            (image, mask)
        }
    }

    fn random_rotation(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        if !hit(self.config.rotation_prob) {
            return (image, mask);
        }
        match rand::thread_rng().gen_range(1..=3) {
            1 => (image.rotate90(), mask.rotate90()),
            2 => (image.rotate180(), mask.rotate180()),
            _ => (image.rotate270(), mask.rotate270()),
        }
    }

    fn random_shift(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        let limit = self.config.max_shift.clamp(0.0, 1.0);
        if limit <= 0.0 || !hit(self.config.shift_prob) {
            return (image, mask);
        }
        let mut rng = rand::thread_rng();
        let dx = (rng.gen_range(-limit..=limit) * image.width() as f32).round() as i64;
        let dy = (rng.gen_range(-limit..=limit) * image.height() as f32).round() as i64;
        (translate(&image, dx, dy), translate(&mask, dx, dy))
    }

    fn random_zoom(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        let (min_scale, max_scale) = (self.config.zoom_min, self.config.zoom_max);
        if min_scale <= 0.0 || max_scale < min_scale || !hit(self.config.zoom_prob) {
            return (image, mask);
        }
        let scale = if max_scale > min_scale {
            rand::thread_rng().gen_range(min_scale..max_scale)
        } else {
            min_scale
        };
        (
            zoom(&image, scale, FilterType::Triangle),
            zoom(&mask, scale, FilterType::Nearest),
        )
    }

    fn shape_augmentation(&self, image: DynamicImage, mask: DynamicImage) -> (DynamicImage, DynamicImage) {
        if hit(self.config.shape_prob) {
            (image.flipv(), mask.flipv())
        } else {
            (image, mask)
        }
    }

    fn random_noise(&self, image: DynamicImage) -> DynamicImage {
        let strength = self.config.noise_strength;
        if strength <= 0.0 || !hit(self.config.noise_prob) {
            return image;
        }
        add_noise(image, strength, &mut rand::thread_rng())
    }

    fn random_brightness(&self, image: DynamicImage) -> DynamicImage {
        let limit = self.config.brightness_max.unsigned_abs().min(255) as i32;
        if !hit(self.config.brightness_prob) {
            return image;
        }
        image.brighten(rand::thread_rng().gen_range(-limit..=limit))
    }

    fn img_augmentation(&self, image: DynamicImage) -> DynamicImage {
        if self.config.blur_sigma > 0.0 && hit(self.config.blur_prob) {
            image.blur(self.config.blur_sigma)
        } else {
            image
        }
    }
}

/// Moves content by (dx, dy); uncovered pixels are zero.
fn translate(image: &DynamicImage, dx: i64, dy: i64) -> DynamicImage {
    let mut canvas = DynamicImage::new(image.width(), image.height(), image.color());
    imageops::replace(&mut canvas, image, dx, dy);
    canvas
}

/// Scales around the center, cropping or zero-padding back to the input size.
fn zoom(image: &DynamicImage, scale: f32, filter: FilterType) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    let new_w = max(1, (w as f32 * scale).round() as u32);
    let new_h = max(1, (h as f32 * scale).round() as u32);
    let resized = image.resize_exact(new_w, new_h, filter);
    let x0 = (w as i64 - new_w as i64) / 2;
    let y0 = (h as i64 - new_h as i64) / 2;
    let mut canvas = DynamicImage::new(w, h, image.color());
    imageops::replace(&mut canvas, &resized, x0, y0);
    canvas
}

/// Adds uniform noise in `[-strength, strength]` to every subpixel, keeping
/// the color type. `strength` is in 8-bit units and scaled to the subpixel
/// range of 16-bit and float images.
fn add_noise<R: Rng>(mut image: DynamicImage, strength: f32, rng: &mut R) -> DynamicImage {
    let mut noise = || rng.gen_range(-strength..=strength);
    let shift_u8 = |v: u8, n: f32| (v as f32 + n).clamp(0.0, 255.0) as u8;
    let shift_u16 = |v: u16, n: f32| (v as f32 + n * 257.0).clamp(0.0, 65535.0) as u16;
    let shift_f32 = |v: f32, n: f32| (v + n / 255.0).clamp(0.0, 1.0);
    match &mut image {
        DynamicImage::ImageLuma8(buf) => buf.iter_mut().for_each(|v| *v = shift_u8(*v, noise())),
        DynamicImage::ImageLumaA8(buf) => buf.iter_mut().for_each(|v| *v = shift_u8(*v, noise())),
        DynamicImage::ImageRgb8(buf) => buf.iter_mut().for_each(|v| *v = shift_u8(*v, noise())),
        DynamicImage::ImageRgba8(buf) => buf.iter_mut().for_each(|v| *v = shift_u8(*v, noise())),
        DynamicImage::ImageLuma16(buf) => buf.iter_mut().for_each(|v| *v = shift_u16(*v, noise())),
        DynamicImage::ImageLumaA16(buf) => buf.iter_mut().for_each(|v| *v = shift_u16(*v, noise())),
        DynamicImage::ImageRgb16(buf) => buf.iter_mut().for_each(|v| *v = shift_u16(*v, noise())),
        DynamicImage::ImageRgba16(buf) => buf.iter_mut().for_each(|v| *v = shift_u16(*v, noise())),
        DynamicImage::ImageRgb32F(buf) => buf.iter_mut().for_each(|v| *v = shift_f32(*v, noise())),
        DynamicImage::ImageRgba32F(buf) => buf.iter_mut().for_each(|v| *v = shift_f32(*v, noise())),
        _ => {}
    }
    image
}
