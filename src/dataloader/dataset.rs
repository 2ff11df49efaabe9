use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info};

use crate::augment::{augment_pair, Augmentor};
use crate::backend::{has_foreground, BackendFormatter};
use crate::dataloader::iter::visit_order;
use crate::dataloader::{list_files, BatchIter, ColorMode, Mode, Sample, SampleIter, MASK_MARKER};
use crate::error::{DataError, DataResult};
use crate::filters::{FilterChain, FilterRegistry};
use crate::resize::Resizer;
use crate::Config;

/// Image/mask pairs read from `<root>/<mode>` and `<root>/<mode>_masks`.
///
/// Position `i` of the image list and of the mask list refer to the same
/// sample. Apart from the [`advance`](Self::advance) cursor the dataset is
/// immutable after construction, so [`get`](Self::get) may be called from
/// several threads at once.
pub struct SegDataset<F: BackendFormatter> {
    mode: Mode,
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
    image_color: ColorMode,
    mask_color: ColorMode,
    filters: FilterChain,
    resizer: Resizer,
    augmentor: Option<Box<dyn Augmentor>>,
    formatter: F,
    cursor: usize,
}

impl<F: BackendFormatter> SegDataset<F> {
    /// Builds a dataset with the built-in filter registry.
    pub fn new(config: &Config, mode: Mode, formatter: F) -> DataResult<Self> {
        Self::with_registry(config, mode, formatter, &FilterRegistry::with_builtins())
    }

    pub fn with_registry(
        config: &Config,
        mode: Mode,
        formatter: F,
        registry: &FilterRegistry,
    ) -> DataResult<Self> {
        config.validate()?;
        let filters = FilterChain::build(&config.filters, registry)?;
        let root = config.root();

        let mut images = list_files(&mode.image_dir(&root), Some(MASK_MARKER))?;
        let mut masks = Vec::new();
        let mut pruned = 0;

        if mode.has_masks() {
            masks = list_files(&mode.mask_dir(&root), None)?;
            if images.len() != masks.len() {
                return Err(DataError::config(format!(
                    "{} has {} images but {} has {} masks",
                    mode.image_dir(&root).display(),
                    images.len(),
                    mode.mask_dir(&root).display(),
                    masks.len()
                )));
            }
            if config.ignore_unlabeled {
                let before = images.len();
                (images, masks) = prune_unlabeled(images, masks)?;
                pruned = before - images.len();
            }
        }

        info!(
            mode = %mode,
            root = %root.display(),
            samples = images.len(),
            pruned,
            filters = filters.len(),
            backend = formatter.name(),
            "dataset ready"
        );

        Ok(Self {
            mode,
            images,
            masks,
            image_color: config.image_color_mode()?,
            mask_color: config.mask_color_mode()?,
            filters,
            resizer: Resizer::from_config(config),
            augmentor: None,
            formatter,
            cursor: 0,
        })
    }

    /// Applies `augmentor` to every train/val sample. Test samples are never
    /// augmented.
    pub fn with_augmentor<A: Augmentor + 'static>(mut self, augmentor: A) -> Self {
        self.augmentor = Some(Box::new(augmentor));
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    pub fn image_paths(&self) -> &[PathBuf] {
        &self.images
    }

    /// Empty in test mode.
    pub fn mask_paths(&self) -> &[PathBuf] {
        &self.masks
    }

    /// Loads sample `index`: decode, filter, augment (train/val), resize,
    /// format.
    pub fn get(&self, index: usize) -> DataResult<Sample<F::Image, F::Mask>> {
        let out_of_range = || DataError::Index {
            index,
            len: self.len(),
        };
        let image_path = self.images.get(index).ok_or_else(out_of_range)?;

        let image = self.image_color.decode(image_path)?;
        let image = self.filters.apply(image)?;

        if !self.mode.has_masks() {
            let image = self.resizer.resize_image(&image);
            return Ok(Sample {
                image: self.formatter.format_image(&image)?,
                mask: None,
                path: image_path.clone(),
            });
        }

        let mask_path = self.masks.get(index).ok_or_else(out_of_range)?;
        let mask = self.mask_color.decode(mask_path)?;

        let (image, mask) = match &self.augmentor {
            Some(augmentor) => augment_pair(augmentor.as_ref(), image, mask),
            None => (image, mask),
        };
        let (image, mask) = self.resizer.resize_pair(&image, &mask);
        let (image, mask) = self.formatter.format(&image, Some(&mask))?;

        Ok(Sample {
            image,
            mask,
            path: image_path.clone(),
        })
    }

    /// Every sample once, in index order or in one random permutation drawn
    /// from the thread RNG.
    pub fn sequence(&self, shuffle: bool) -> SampleIter<'_, F> {
        if shuffle {
            self.sequence_with_rng(&mut rand::thread_rng())
        } else {
            SampleIter::new(self, visit_order::<rand::rngs::ThreadRng>(self.len(), None))
        }
    }

    /// Every sample once, in a permutation drawn from `rng`.
    pub fn sequence_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> SampleIter<'_, F> {
        SampleIter::new(self, visit_order(self.len(), Some(rng)))
    }

    /// Full batches of `batch_size`; the trailing `len % batch_size` samples
    /// of the pass are dropped.
    pub fn batched_sequence(&self, batch_size: usize, shuffle: bool) -> DataResult<BatchIter<'_, F>> {
        check_batch_size(batch_size)?;
        if shuffle {
            self.batched_sequence_with_rng(batch_size, &mut rand::thread_rng())
        } else {
            let order = visit_order::<rand::rngs::ThreadRng>(self.len(), None);
            Ok(BatchIter::new(self, order, batch_size))
        }
    }

    pub fn batched_sequence_with_rng<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> DataResult<BatchIter<'_, F>> {
        check_batch_size(batch_size)?;
        Ok(BatchIter::new(self, visit_order(self.len(), Some(rng)), batch_size))
    }

    /// Returns the sample under the cursor and moves the cursor on, wrapping
    /// to 0 after the last sample. The cursor moves even when loading fails.
    ///
    /// Single consumer only.
    pub fn advance(&mut self) -> DataResult<Sample<F::Image, F::Mask>> {
        if self.is_empty() {
            return Err(DataError::Index { index: 0, len: 0 });
        }
        let index = self.cursor;
        self.cursor = (index + 1) % self.len();
        self.get(index)
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

fn check_batch_size(batch_size: usize) -> DataResult<()> {
    if batch_size == 0 {
        return Err(DataError::config("batch_size must be positive"));
    }
    Ok(())
}

/// Drops every pair whose mask has no foreground pixel, keeping the
/// relative order of the rest.
fn prune_unlabeled(
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
) -> DataResult<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut kept_images = Vec::with_capacity(images.len());
    let mut kept_masks = Vec::with_capacity(masks.len());

    for (image, mask) in images.into_iter().zip(masks) {
        if is_labeled(&mask)? {
            kept_images.push(image);
            kept_masks.push(mask);
        } else {
            debug!(image = %image.display(), mask = %mask.display(), "pruned unlabeled pair");
        }
    }

    Ok((kept_images, kept_masks))
}

fn is_labeled(mask: &Path) -> DataResult<bool> {
    let decoded = ColorMode::Unchanged.decode(mask)?;
    Ok(has_foreground(&decoded))
}
