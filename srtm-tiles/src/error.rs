//! Error types for the srtm-tiles library.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::locator::TileKey;

/// Errors that can occur when resolving, fetching or decoding SRTM tiles.
#[derive(Error, Debug)]
pub enum SrtmError {
    /// IO error when reading or writing local files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured cache path exists but is not a directory.
    #[error("Cache path has to be a directory: {path}")]
    InvalidCacheDir { path: PathBuf },

    /// A line in an area list is not a `[N|S]dd[E|W]ddd` code.
    #[error("Malformed area record {record:?} in {partition} (line {line})")]
    InvalidAreaRecord {
        partition: String,
        line: usize,
        record: String,
    },

    /// Two partitions claim the same 1°×1° bucket.
    #[error("Area {key} is listed in both {existing} and {partition}")]
    DuplicateArea {
        key: TileKey,
        existing: String,
        partition: String,
    },

    /// One of the bundled area lists could not be found.
    #[error("Area list for {partition} not found in {dir}")]
    MissingAreaResource { partition: String, dir: PathBuf },

    /// Any other invalid setup of the provider.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The dataset has no tile covering the coordinate.
    #[error("No SRTM area covers lat={lat}, lon={lon}")]
    AreaNotFound { lat: f64, lon: f64 },

    /// Coordinates are outside the valid range or outside the tile queried.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon}")]
    OutOfBounds { lat: f64, lon: f64 },

    /// The archive could not be retrieved from the remote location.
    #[error("Failed to retrieve {url}: {reason}")]
    RetrievalFailed { url: String, reason: String },

    /// The local archive is unreadable or has no elevation entry.
    #[error("Failed to decode {path}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    /// The decoded payload does not hold exactly one full grid.
    #[error("Invalid tile size: {size} bytes (expected {expected})")]
    InvalidTileSize { size: usize, expected: usize },

    /// Failure reported to a caller that waited on another caller's tile load.
    #[error(transparent)]
    Shared(Arc<SrtmError>),
}

impl SrtmError {
    /// Returns `true` for errors raised while setting the provider up.
    pub fn is_configuration(&self) -> bool {
        match self {
            SrtmError::InvalidCacheDir { .. }
            | SrtmError::InvalidAreaRecord { .. }
            | SrtmError::DuplicateArea { .. }
            | SrtmError::MissingAreaResource { .. }
            | SrtmError::Configuration(_) => true,
            SrtmError::Shared(inner) => inner.is_configuration(),
            _ => false,
        }
    }

    /// Returns `true` when the coordinate lies outside the dataset's coverage.
    pub fn is_area_not_found(&self) -> bool {
        match self {
            SrtmError::AreaNotFound { .. } => true,
            SrtmError::Shared(inner) => inner.is_area_not_found(),
            _ => false,
        }
    }

    /// Returns `true` when the archive could not be retrieved.
    pub fn is_retrieval(&self) -> bool {
        match self {
            SrtmError::RetrievalFailed { .. } => true,
            SrtmError::Shared(inner) => inner.is_retrieval(),
            _ => false,
        }
    }

    /// Returns `true` for coordinates outside the globe or the tile queried.
    pub fn is_out_of_bounds(&self) -> bool {
        match self {
            SrtmError::OutOfBounds { .. } => true,
            SrtmError::Shared(inner) => inner.is_out_of_bounds(),
            _ => false,
        }
    }

    /// Returns `true` for archive decoding failures.
    pub fn is_decode(&self) -> bool {
        match self {
            SrtmError::DecodeFailed { .. } | SrtmError::InvalidTileSize { .. } => true,
            SrtmError::Shared(inner) => inner.is_decode(),
            _ => false,
        }
    }

    /// Recover a concrete error from one handed out by the tile cache.
    ///
    /// The cache keeps its own reference to a failed load, so loader errors
    /// are rebuilt field by field. Anything a loader never raises stays
    /// wrapped in [`SrtmError::Shared`].
    pub(crate) fn from_shared(err: Arc<SrtmError>) -> Self {
        let err = match Arc::try_unwrap(err) {
            Ok(err) => return err,
            Err(err) => err,
        };
        match &*err {
            SrtmError::Io(e) => SrtmError::Io(std::io::Error::new(e.kind(), e.to_string())),
            SrtmError::AreaNotFound { lat, lon } => SrtmError::AreaNotFound {
                lat: *lat,
                lon: *lon,
            },
            SrtmError::OutOfBounds { lat, lon } => SrtmError::OutOfBounds {
                lat: *lat,
                lon: *lon,
            },
            SrtmError::RetrievalFailed { url, reason } => SrtmError::RetrievalFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            SrtmError::DecodeFailed { path, reason } => SrtmError::DecodeFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            SrtmError::InvalidTileSize { size, expected } => SrtmError::InvalidTileSize {
                size: *size,
                expected: *expected,
            },
            SrtmError::Shared(inner) => SrtmError::from_shared(Arc::clone(inner)),
            _ => SrtmError::Shared(Arc::clone(&err)),
        }
    }
}

/// Result type alias using [`SrtmError`].
pub type Result<T> = std::result::Result<T, SrtmError>;
