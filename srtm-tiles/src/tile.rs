//! Decoded SRTM tiles and point lookups.
//!
//! A [`HeightTile`] owns the full sample grid of one 1°×1° tile. It is built
//! once from a completely decoded buffer and never changes afterwards, which
//! makes it safe to share between threads behind an `Arc`.

use crate::error::{Result, SrtmError};

/// Number of samples per row/column for SRTM1
const SRTM1_SAMPLES: usize = 3601;

/// Number of samples per row/column for SRTM3
const SRTM3_SAMPLES: usize = 1201;

/// Value marking a void (no data) sample.
pub const VOID_VALUE: i16 = i16::MIN;

/// Lowest elevation accepted as a real sample, in meters.
pub const MIN_ELEVATION: i16 = -1000;

/// Highest elevation accepted as a real sample, in meters.
pub const MAX_ELEVATION: i16 = 10000;

/// Resolution of the tiles served by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SrtmResolution {
    /// SRTM1: 1 arc-second (~30m) resolution
    Srtm1,
    /// SRTM3: 3 arc-second (~90m) resolution
    #[default]
    Srtm3,
}

impl SrtmResolution {
    /// Returns the number of samples per row/column for this resolution.
    pub fn samples(&self) -> usize {
        match self {
            SrtmResolution::Srtm1 => SRTM1_SAMPLES,
            SrtmResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    /// Returns the approximate resolution in meters.
    pub fn meters(&self) -> f64 {
        match self {
            SrtmResolution::Srtm1 => 30.0,
            SrtmResolution::Srtm3 => 90.0,
        }
    }

    /// Size in bytes of one raw, uncompressed tile.
    pub fn tile_bytes(&self) -> usize {
        self.samples() * self.samples() * 2
    }

    /// Resolution whose tiles are exactly `size` bytes long.
    pub fn from_tile_bytes(size: usize) -> Option<Self> {
        [SrtmResolution::Srtm1, SrtmResolution::Srtm3]
            .into_iter()
            .find(|r| r.tile_bytes() == size)
    }
}

/// Map a raw sample onto the stored domain.
///
/// Values outside `[MIN_ELEVATION, MAX_ELEVATION]` are the dataset's way of
/// flagging voids and collapse to [`VOID_VALUE`].
#[inline]
pub fn sanitize_sample(raw: i16) -> i16 {
    if (MIN_ELEVATION..=MAX_ELEVATION).contains(&raw) {
        raw
    } else {
        VOID_VALUE
    }
}

/// One fully decoded elevation tile.
///
/// Samples are stored row-major with row 0 on the north edge and column 0 on
/// the west edge, as in the `.hgt` format.
///
/// # Example
///
/// ```
/// use srtm_tiles::{HeightTile, SrtmResolution};
///
/// let width = SrtmResolution::Srtm3.samples();
/// let mut samples = vec![0i16; width * width];
/// samples[600 * width + 600] = 1223;
///
/// let tile = HeightTile::new(52, 4, width, samples)?;
/// assert_eq!(tile.get_elevation(52.5, 4.5)?, Some(1223));
/// # Ok::<(), srtm_tiles::SrtmError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HeightTile {
    /// Southwest corner latitude (integer)
    origin_lat: i32,
    /// Southwest corner longitude (integer)
    origin_lon: i32,
    /// Number of samples per row/column
    width: usize,
    /// `width * width` samples, void stored as [`VOID_VALUE`]
    samples: Vec<i16>,
}

impl HeightTile {
    /// Wrap a decoded sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::InvalidTileSize`] if `samples` does not hold
    /// exactly `width * width` entries.
    pub fn new(origin_lat: i32, origin_lon: i32, width: usize, samples: Vec<i16>) -> Result<Self> {
        let expected = width * width;
        if width < 2 || samples.len() != expected {
            return Err(SrtmError::InvalidTileSize {
                size: samples.len() * 2,
                expected: expected * 2,
            });
        }

        Ok(Self {
            origin_lat,
            origin_lon,
            width,
            samples,
        })
    }

    /// Get the elevation at the specified coordinates.
    ///
    /// Uses the nearest grid node; no interpolation.
    ///
    /// # Returns
    ///
    /// The elevation in meters, or `None` if the sample is void.
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::OutOfBounds`] if the coordinates fall outside
    /// this tile. Positions are never clamped onto the grid.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> Result<Option<i16>> {
        let (row, col) = self.grid_position(lat, lon)?;
        Ok(self.sample(row, col))
    }

    /// Row and column of the grid node nearest to `(lat, lon)`.
    pub fn grid_position(&self, lat: f64, lon: f64) -> Result<(usize, usize)> {
        let span = (self.width - 1) as f64;

        // Row 0 is the north edge: the file stores data from north to south
        let row = ((self.origin_lat + 1) as f64 - lat) * span;
        let col = (lon - self.origin_lon as f64) * span;

        let row = row.round();
        let col = col.round();
        let limit = 0.0..self.width as f64;
        if !limit.contains(&row) || !limit.contains(&col) {
            return Err(SrtmError::OutOfBounds { lat, lon });
        }

        Ok((row as usize, col as usize))
    }

    /// Sample at a grid node, `None` when void.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is not below [`Self::width`].
    pub fn sample(&self, row: usize, col: usize) -> Option<i16> {
        assert!(
            row < self.width && col < self.width,
            "sample ({}, {}) outside {}x{} grid",
            row,
            col,
            self.width,
            self.width
        );
        let value = self.samples[row * self.width + col];
        (value != VOID_VALUE).then_some(value)
    }

    /// Raw sample buffer, void encoded as [`VOID_VALUE`].
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of void samples.
    pub fn void_count(&self) -> usize {
        self.samples.iter().filter(|&&v| v == VOID_VALUE).count()
    }

    /// Lowest and highest non-void elevation, `None` for an all-void tile.
    pub fn elevation_range(&self) -> Option<(i16, i16)> {
        self.samples
            .iter()
            .copied()
            .filter(|&v| v != VOID_VALUE)
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Returns the number of samples per row/column.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the base latitude (southwest corner).
    pub fn origin_lat(&self) -> i32 {
        self.origin_lat
    }

    /// Returns the base longitude (southwest corner).
    pub fn origin_lon(&self) -> i32 {
        self.origin_lon
    }
}
