use rand::seq::SliceRandom;
use rand::Rng;

use crate::backend::BackendFormatter;
use crate::dataloader::{Batch, Sample, SegDataset};
use crate::error::DataResult;

/// Index order for one pass: `0..len`, or a single permutation of it drawn
/// from `rng`.
pub(crate) fn visit_order<R: Rng + ?Sized>(len: usize, rng: Option<&mut R>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }
    order
}

/// One lazy pass over a dataset. Each `next` loads exactly one sample.
pub struct SampleIter<'a, F: BackendFormatter> {
    dataset: &'a SegDataset<F>,
    order: Vec<usize>,
    position: usize,
}

impl<'a, F: BackendFormatter> SampleIter<'a, F> {
    pub(crate) fn new(dataset: &'a SegDataset<F>, order: Vec<usize>) -> Self {
        Self {
            dataset,
            order,
            position: 0,
        }
    }
}

impl<'a, F: BackendFormatter> Iterator for SampleIter<'a, F> {
    type Item = DataResult<Sample<F::Image, F::Mask>>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = *self.order.get(self.position)?;
        self.position += 1;
        Some(self.dataset.get(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.order.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl<'a, F: BackendFormatter> ExactSizeIterator for SampleIter<'a, F> {}

/// One lazy pass of full batches. A trailing remainder shorter than
/// `batch_size` is never yielded.
pub struct BatchIter<'a, F: BackendFormatter> {
    dataset: &'a SegDataset<F>,
    order: Vec<usize>,
    position: usize,
    batch_size: usize,
}

impl<'a, F: BackendFormatter> BatchIter<'a, F> {
    pub(crate) fn new(dataset: &'a SegDataset<F>, order: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            order,
            position: 0,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<'a, F: BackendFormatter> Iterator for BatchIter<'a, F> {
    type Item = DataResult<Batch<F::Image, F::Mask>>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.position;
        let end = start + self.batch_size;
        if end > self.order.len() {
            return None;
        }
        self.position = end;

        let mut batch = Batch::with_capacity(self.batch_size);
        for &index in &self.order[start..end] {
            match self.dataset.get(index) {
                Ok(sample) => batch.push(sample),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(batch))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position) / self.batch_size;
        (remaining, Some(remaining))
    }
}

impl<'a, F: BackendFormatter> ExactSizeIterator for BatchIter<'a, F> {}
