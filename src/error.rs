use derive_more::Display;
use std::path::PathBuf;

/// The IDX file kind.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IdxKind {
    /// Images, magic 2051.
    #[display(fmt = "images")]
    Images,
    /// Labels, magic 2049.
    #[display(fmt = "labels")]
    Labels,
}

impl IdxKind {
    /// The magic number in the header.
    pub fn magic(&self) -> i32 {
        match self {
            Self::Images => 2_051,
            Self::Labels => 2_049,
        }
    }
}

/// Errors from loading or batching a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// A file is missing and downloading is disabled.
    #[error("{path:?} not found, enable download or provide the file")]
    Missing {
        /// The expected path.
        path: PathBuf,
    },
    /// The header magic number does not match the file kind.
    #[error("{path:?}: expected {kind} magic {expected}, found {found}")]
    Magic {
        /// The file.
        path: PathBuf,
        /// The file kind.
        kind: IdxKind,
        /// The expected magic.
        expected: i32,
        /// The magic read.
        found: i32,
    },
    /// The image dimensions are not 28 x 28.
    #[error("{path:?}: expected 28 x 28 images, found {rows} x {cols}")]
    Dims {
        /// The file.
        path: PathBuf,
        /// The rows.
        rows: i32,
        /// The columns.
        cols: i32,
    },
    /// The payload length does not match the header, or images and labels disagree.
    #[error("{what}: expected {expected} items, found {found}")]
    Count {
        /// What was counted.
        what: String,
        /// The expected count.
        expected: usize,
        /// The count found.
        found: usize,
    },
    /// The batch size was 0.
    #[error("batch_size must be at least 1")]
    BatchSize,
}

/// Errors from building a network.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// The layer would reduce a spatial dimension to 0.
    #[error("{layer} cannot consume input of shape {input:?}")]
    Incompatible {
        /// The layer name.
        layer: String,
        /// The input shape, excluding the batch dimension.
        input: Vec<usize>,
    },
    /// A spatial layer follows a dense layer.
    #[error("{layer} expects 3 dimensional input, found {input:?}")]
    Flattened {
        /// The layer name.
        layer: String,
        /// The input shape, excluding the batch dimension.
        input: Vec<usize>,
    },
    /// A hyper-parameter was 0.
    #[error("{layer}: {param} must be at least 1")]
    Zero {
        /// The layer name.
        layer: String,
        /// The parameter.
        param: &'static str,
    },
    /// The network has no layers.
    #[error("network has no layers")]
    Empty,
}
