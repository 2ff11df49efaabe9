use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

pub mod augment;
pub mod backend;
pub mod dataloader;
pub mod error;
pub mod filters;
pub mod resize;

pub use augment::{AugmentConfig, Augmentor, RandomAugmentor};
pub use backend::{BackendFormatter, NdarrayFormatter, TchFormatter};
pub use dataloader::{Batch, BatchIter, ColorMode, Mode, Sample, SampleIter, SegDataset};
pub use error::{DataError, DataResult};
pub use filters::{FilterChain, FilterEntry, FilterParams, FilterRegistry};
pub use resize::Resizer;

/// Dataset configuration. Only the keys the loader reads are modelled; any
/// other keys of an experiment file are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub datapath: String,
    #[serde(default)]
    pub gray_img: bool,
    #[serde(default)]
    pub color_img: bool,
    #[serde(default)]
    pub gray_mask: bool,
    #[serde(default)]
    pub color_mask: bool,
    pub height: u32,
    pub width: u32,
    #[serde(default)]
    pub mask_height: Option<u32>,
    #[serde(default)]
    pub mask_width: Option<u32>,
    #[serde(default)]
    pub ignore_unlabeled: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filters: Vec<FilterEntry>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1
}

/// `"filters": null` means no filters.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FilterEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FilterEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datapath: "data/".to_string(),
            gray_img: false,
            color_img: false,
            gray_mask: false,
            color_mask: false,
            height: 256,
            width: 256,
            mask_height: None,
            mask_width: None,
            ignore_unlabeled: false,
            filters: Vec::new(),
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> DataResult<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| DataError::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> DataResult<()> {
        self.image_color_mode()?;
        self.mask_color_mode()?;
        if self.height == 0 || self.width == 0 {
            return Err(DataError::config("height and width must be positive"));
        }
        if self.mask_height == Some(0) || self.mask_width == Some(0) {
            return Err(DataError::config("mask_height and mask_width must be positive"));
        }
        if self.batch_size == 0 {
            return Err(DataError::config("batch_size must be positive"));
        }
        if self.datapath.starts_with('~') && home_relative(&self.datapath).is_none() {
            return Err(DataError::config(format!(
                "datapath `{}`: only `~` and `~/...` are expanded",
                self.datapath
            )));
        }
        Ok(())
    }

    /// Root directory with a leading `~` or `~/` expanded against `$HOME`.
    /// `~user` forms are left alone here and rejected by [`validate`](Self::validate).
    pub fn root(&self) -> PathBuf {
        match (home_relative(&self.datapath), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => PathBuf::from(&self.datapath),
        }
    }

    pub fn image_color_mode(&self) -> DataResult<ColorMode> {
        ColorMode::from_flags(self.gray_img, self.color_img, "gray_img", "color_img")
    }

    pub fn mask_color_mode(&self) -> DataResult<ColorMode> {
        ColorMode::from_flags(self.gray_mask, self.color_mask, "gray_mask", "color_mask")
    }

    /// (height, width) for images.
    pub fn image_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// (height, width) for masks, falling back to the image size.
    pub fn mask_size(&self) -> (u32, u32) {
        (
            self.mask_height.unwrap_or(self.height),
            self.mask_width.unwrap_or(self.width),
        )
    }
}

/// The part after `~` or `~/`, if `path` is relative to the current user's home.
fn home_relative(path: &str) -> Option<&str> {
    match path.strip_prefix('~')? {
        "" => Some(""),
        rest => rest.strip_prefix('/').map(|r| r.trim_start_matches('/')),
    }
}
