use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::DynamicImage;

use crate::error::{DataError, DataResult};

pub mod dataset;
pub mod iter;

pub use dataset::SegDataset;
pub use iter::{BatchIter, SampleIter};

/// Files whose name contains this are never listed as images.
pub const MASK_MARKER: &str = "mask";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Val,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::Test => "test",
        }
    }

    pub fn has_masks(&self) -> bool {
        !matches!(self, Mode::Test)
    }

    /// `<root>/<mode>`
    pub fn image_dir(&self, root: &Path) -> PathBuf {
        root.join(self.as_str())
    }

    /// `<root>/<mode>_masks`
    pub fn mask_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("{}_masks", self.as_str()))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "val" => Ok(Mode::Val),
            "test" => Ok(Mode::Test),
            other => Err(DataError::config(format!(
                "unknown mode `{}` (expected train, val or test)",
                other
            ))),
        }
    }
}

/// How a file is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Single channel, 8 bit.
    Gray,
    /// Three channel RGB, 8 bit.
    Color,
    /// Whatever the file holds.
    Unchanged,
}

impl ColorMode {
    pub fn from_flags(gray: bool, color: bool, gray_key: &str, color_key: &str) -> DataResult<Self> {
        match (gray, color) {
            (true, true) => Err(DataError::config(format!(
                "`{}` and `{}` are mutually exclusive",
                gray_key, color_key
            ))),
            (true, false) => Ok(ColorMode::Gray),
            (false, true) => Ok(ColorMode::Color),
            (false, false) => Ok(ColorMode::Unchanged),
        }
    }

    pub fn decode(&self, path: &Path) -> DataResult<DynamicImage> {
        let image = image::open(path).map_err(|source| DataError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match self {
            ColorMode::Gray => DynamicImage::ImageLuma8(image.to_luma8()),
            ColorMode::Color => DynamicImage::ImageRgb8(image.to_rgb8()),
            ColorMode::Unchanged => image,
        })
    }
}

/// One formatted sample. `mask` is `None` in test mode.
#[derive(Debug)]
pub struct Sample<I, M> {
    pub image: I,
    pub mask: Option<M>,
    pub path: PathBuf,
}

/// A full batch of formatted samples, index-aligned. `masks` is empty in
/// test mode.
#[derive(Debug)]
pub struct Batch<I, M> {
    pub images: Vec<I>,
    pub masks: Vec<M>,
    pub paths: Vec<PathBuf>,
}

impl<I, M> Batch<I, M> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            images: Vec::with_capacity(capacity),
            masks: Vec::with_capacity(capacity),
            paths: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample<I, M>) {
        self.images.push(sample.image);
        if let Some(mask) = sample.mask {
            self.masks.push(mask);
        }
        self.paths.push(sample.path);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
}

/// Regular files of `dir`, sorted by path. Names containing `exclude` are
/// skipped.
pub fn list_files(dir: &Path, exclude: Option<&str>) -> DataResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DataError::config(format!(
            "missing directory: {}",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DataError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let excluded = exclude
            .map(|marker| entry.file_name().to_string_lossy().contains(marker))
            .unwrap_or(false);
        if !excluded {
            files.push(path);
        }
    }
    sort_paths(&mut files);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_dirs() {
        let root = Path::new("/data");
        assert_eq!(Mode::Val.image_dir(root), PathBuf::from("/data/val"));
        assert_eq!(Mode::Val.mask_dir(root), PathBuf::from("/data/val_masks"));
        assert!(!Mode::Test.has_masks());
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert!("eval".parse::<Mode>().is_err());
    }

    #[test]
    fn test_sort_paths_lexicographic() {
        let mut paths = vec![
            PathBuf::from("/d/b.png"),
            PathBuf::from("/d/a10.png"),
            PathBuf::from("/d/a2.png"),
        ];
        sort_paths(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/d/a10.png"),
                PathBuf::from("/d/a2.png"),
                PathBuf::from("/d/b.png"),
            ]
        );
    }

    #[test]
    fn test_color_mode_flags() {
        assert_eq!(ColorMode::from_flags(false, false, "g", "c").unwrap(), ColorMode::Unchanged);
        assert_eq!(ColorMode::from_flags(true, false, "g", "c").unwrap(), ColorMode::Gray);
        assert_eq!(ColorMode::from_flags(false, true, "g", "c").unwrap(), ColorMode::Color);
        assert!(ColorMode::from_flags(true, true, "g", "c").is_err());
    }

    #[test]
    fn test_list_files_missing_dir() {
        let err = list_files(Path::new("/definitely/not/here"), None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_batch_push_without_mask() {
        let mut batch: Batch<u8, u8> = Batch::with_capacity(2);
        batch.push(Sample { image: 1, mask: None, path: PathBuf::from("a.png") });
        batch.push(Sample { image: 2, mask: None, path: PathBuf::from("b.png") });
        assert_eq!(batch.len(), 2);
        assert!(batch.masks.is_empty());
        assert_eq!(batch.paths[1], PathBuf::from("b.png"));
    }
}
