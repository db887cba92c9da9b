//! Tile addressing.
//!
//! Pure functions mapping a coordinate to the 1°×1° tile that contains it:
//! the integer [`TileKey`] used as cache and area-index key, the tile's
//! lower-left origin, and the canonical `Partition/N52E004` name shared by the
//! remote archive URL and the local cache file.
//!
//! # Tile Names
//!
//! Tiles follow the SRTM naming convention `{N|S}{lat}{E|W}{lon}`:
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N52, S12)
//! - Longitude: 3 digits with E/W prefix (e.g., E004, W077)
//!
//! The name designates the **southwest corner** of the tile.

use std::fmt;

use crate::area::AreaIndex;
use crate::error::{Result, SrtmError};

/// Tolerance below an integer under which a negative value is considered to
/// sit on that integer.
const FLOOR_EPSILON: f64 = 1e-5;

/// Integer key of a 1°×1° cell: `(floor(lat) + 90) * 1000 + floor(lon) + 180`.
///
/// Two coordinates share a key exactly when they fall into the same tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey(i32);

impl TileKey {
    /// Key of the tile containing `(lat, lon)`.
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self::from_origin(floor_coord(lat), floor_coord(lon))
    }

    /// Key of the tile whose southwest corner is `(lat, lon)`.
    pub fn from_origin(lat: i32, lon: i32) -> Self {
        TileKey((lat + 90) * 1000 + lon + 180)
    }

    /// Southwest corner `(lat, lon)` of the keyed tile.
    pub fn origin(&self) -> (i32, i32) {
        (self.0.div_euclid(1000) - 90, self.0.rem_euclid(1000) - 180)
    }

    /// Raw integer value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Floor a coordinate to its tile boundary.
///
/// Positive values are truncated. Negative values are floored, except that a
/// value less than `1e-5` below an integer is taken as that integer, so
/// representation noise such as `-52.000001` stays in tile `-52`.
///
/// # Examples
///
/// ```
/// use srtm_tiles::locator::floor_coord;
///
/// assert_eq!(floor_coord(52.9), 52);
/// assert_eq!(floor_coord(52.0 - 1e-6), 51);
/// assert_eq!(floor_coord(-52.3), -53);
/// assert_eq!(floor_coord(-52.000001), -52);
/// ```
pub fn floor_coord(v: f64) -> i32 {
    let truncated = v as i32;
    if v >= 0.0 || truncated as f64 - v < FLOOR_EPSILON {
        truncated
    } else {
        truncated - 1
    }
}

/// Key of the tile containing `(lat, lon)`.
pub fn tile_key(lat: f64, lon: f64) -> TileKey {
    TileKey::from_coords(lat, lon)
}

/// Southwest corner of the tile containing `(lat, lon)`.
pub fn tile_origin(lat: f64, lon: f64) -> (i32, i32) {
    (floor_coord(lat), floor_coord(lon))
}

/// Format a tile origin as an SRTM tile name.
///
/// # Examples
///
/// ```
/// use srtm_tiles::locator::tile_name;
///
/// assert_eq!(tile_name(52, 4), "N52E004");
/// assert_eq!(tile_name(-13, -78), "S13W078");
/// assert_eq!(tile_name(0, -1), "N00W001");
/// ```
pub fn tile_name(origin_lat: i32, origin_lon: i32) -> String {
    let lat_prefix = if origin_lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if origin_lon >= 0 { 'E' } else { 'W' };

    format!(
        "{}{:02}{}{:03}",
        lat_prefix,
        origin_lat.abs(),
        lon_prefix,
        origin_lon.abs()
    )
}

/// Name of the tile containing `(lat, lon)`, e.g. `"N52E004"`.
pub fn lat_lon_to_tile_name(lat: f64, lon: f64) -> String {
    let (lat, lon) = tile_origin(lat, lon);
    tile_name(lat, lon)
}

/// Canonical `"{partition}/{tile name}"` of the tile containing `(lat, lon)`.
///
/// This string is both the remote archive path (before the `.hgt.zip`
/// suffix) and, via its basename, the local cache file stem.
///
/// # Errors
///
/// Returns [`SrtmError::AreaNotFound`] when no partition lists the tile.
pub fn canonical_name(areas: &AreaIndex, lat: f64, lon: f64) -> Result<String> {
    let partition = areas.lookup_partition(lat, lon)?;
    Ok(format!("{}/{}", partition, lat_lon_to_tile_name(lat, lon)))
}

/// Parse a tile name to extract the southwest corner.
///
/// Accepts a leading path and `.hgt` / `.hgt.zip` suffixes, case-insensitive.
///
/// # Examples
///
/// ```
/// use srtm_tiles::locator::parse_tile_name;
///
/// assert_eq!(parse_tile_name("N52E004"), Some((52, 4)));
/// assert_eq!(parse_tile_name("S12W077.hgt.zip"), Some((-12, -77)));
/// assert_eq!(parse_tile_name("/cache/Eurasia/N00E000.hgt"), Some((0, 0)));
/// assert_eq!(parse_tile_name("invalid"), None);
/// ```
pub fn parse_tile_name(name: &str) -> Option<(i32, i32)> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let lower = name.to_ascii_lowercase();
    let stem_len = if lower.ends_with(".hgt.zip") {
        name.len() - ".hgt.zip".len()
    } else if lower.ends_with(".hgt") {
        name.len() - ".hgt".len()
    } else {
        name.len()
    };
    let name = &name[..stem_len];

    // Must be exactly 7 ASCII characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }
    let bytes = name.as_bytes();

    let lat_sign = match bytes[0].to_ascii_uppercase() {
        b'N' => 1,
        b'S' => -1,
        _ => return None,
    };
    let lon_sign = match bytes[3].to_ascii_uppercase() {
        b'E' => 1,
        b'W' => -1,
        _ => return None,
    };
    let lat = parse_digits(&name[1..3])?;
    let lon = parse_digits(&name[4..7])?;

    Some((lat * lat_sign, lon * lon_sign))
}

fn parse_digits(s: &str) -> Option<i32> {
    if s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Validate that coordinates are finite and on the globe.
pub fn is_valid_coord(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
