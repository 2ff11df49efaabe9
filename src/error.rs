use std::path::PathBuf;
use thiserror::Error;

pub type DataResult<T> = Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    /// Missing directory, mismatched pairs, unknown filter, bad config value.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("index {index} out of range for dataset of length {len}")]
    Index { index: usize, len: usize },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("filter `{name}` failed: {message}")]
    Filter { name: String, message: String },
    #[error("backend error: {0}")]
    Backend(String),
}

impl DataError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        DataError::Configuration(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, DataError::Configuration(_))
    }
}

impl From<tch::TchError> for DataError {
    fn from(err: tch::TchError) -> Self {
        DataError::Backend(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DataError {
    fn from(err: ndarray::ShapeError) -> Self {
        DataError::Backend(err.to_string())
    }
}
