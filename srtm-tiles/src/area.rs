//! Area index: which dataset partition holds a given tile.
//!
//! The SRTM3 archive is split into continental directories (`Eurasia/`,
//! `North_America/`, ...), so the remote path of a tile cannot be derived
//! from its coordinates alone. The index maps every covered 1°×1° cell to
//! its partition. It is built once from six lists of tile codes and never
//! changes afterwards.
//!
//! Loaders are pure functions over text or raw resource bytes, so callers
//! can supply synthetic lists:
//!
//! ```
//! use srtm_tiles::AreaIndex;
//!
//! let areas = AreaIndex::from_lists([("Eurasia", "N52E004\nN52E005\n")])?;
//! assert_eq!(areas.lookup_partition(52.88, 4.63)?, "Eurasia");
//! assert!(areas.lookup_partition(10.0, -150.0).is_err());
//! # Ok::<(), srtm_tiles::SrtmError>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Result, SrtmError};
use crate::locator::{parse_tile_name, TileKey};

/// The six partitions of the SRTM3 archive.
pub const PARTITIONS: [&str; 6] = [
    "Africa",
    "Australia",
    "Eurasia",
    "Islands",
    "North_America",
    "South_America",
];

/// Length of a tile code such as `N52E004`.
const CODE_LEN: usize = 7;

/// Magic bytes opening a zip local file header.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Immutable mapping from [`TileKey`] to partition name.
#[derive(Debug, Clone, Default)]
pub struct AreaIndex {
    buckets: HashMap<TileKey, usize>,
    partitions: Vec<String>,
}

impl AreaIndex {
    /// Build the index from plain-text tile lists, one per partition.
    ///
    /// Every non-blank line must start with a 7-character code
    /// `[N|S]dd[E|W]ddd`; anything after the code (such as `.hgt.zip`) is
    /// ignored.
    ///
    /// # Errors
    ///
    /// - [`SrtmError::InvalidAreaRecord`] for a line without a valid code
    /// - [`SrtmError::DuplicateArea`] when a tile is listed twice
    pub fn from_lists<I, N, T>(lists: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: AsRef<str>,
    {
        let mut index = AreaIndex::default();
        for (partition, text) in lists {
            index.add_list(partition.into(), text.as_ref())?;
        }
        Ok(index)
    }

    /// Build the index from raw resource bytes, one resource per partition.
    ///
    /// A resource is either a zip archive whose first entry holds the list
    /// (the form the lists are distributed in) or UTF-8 text.
    pub fn from_resources<I, N, B>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: AsRef<[u8]>,
    {
        let mut index = AreaIndex::default();
        for (partition, bytes) in resources {
            let partition = partition.into();
            let text = resource_text(&partition, bytes.as_ref())?;
            index.add_list(partition, &text)?;
        }
        Ok(index)
    }

    /// Load the six partition lists from a directory.
    ///
    /// For each name in [`PARTITIONS`] the file `{name}_names.txt.zip` is
    /// read, falling back to `{name}_names.txt`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut resources = Vec::with_capacity(PARTITIONS.len());

        for partition in PARTITIONS {
            let zipped = dir.join(format!("{}_names.txt.zip", partition));
            let plain = dir.join(format!("{}_names.txt", partition));
            let bytes = if zipped.is_file() {
                fs::read(&zipped)?
            } else if plain.is_file() {
                fs::read(&plain)?
            } else {
                return Err(SrtmError::MissingAreaResource {
                    partition: partition.to_string(),
                    dir: dir.to_path_buf(),
                });
            };
            resources.push((partition, bytes));
        }

        let index = Self::from_resources(resources)?;
        tracing::debug!(dir = %dir.display(), areas = index.len(), "Loaded area index");
        Ok(index)
    }

    fn add_list(&mut self, partition: String, text: &str) -> Result<()> {
        let slot = match self.partitions.iter().position(|p| *p == partition) {
            Some(slot) => slot,
            None => {
                self.partitions.push(partition.clone());
                self.partitions.len() - 1
            }
        };

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (lat, lon) = line
                .get(..CODE_LEN)
                .and_then(parse_tile_name)
                .ok_or_else(|| SrtmError::InvalidAreaRecord {
                    partition: partition.clone(),
                    line: i + 1,
                    record: line.to_string(),
                })?;

            let key = TileKey::from_origin(lat, lon);
            if let Some(&existing) = self.buckets.get(&key) {
                return Err(SrtmError::DuplicateArea {
                    key,
                    existing: self.partitions[existing].clone(),
                    partition,
                });
            }
            self.buckets.insert(key, slot);
        }

        Ok(())
    }

    /// Partition holding the tile that contains `(lat, lon)`.
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::AreaNotFound`] when the dataset does not cover
    /// that cell, e.g. open ocean.
    pub fn lookup_partition(&self, lat: f64, lon: f64) -> Result<&str> {
        self.partition_for(TileKey::from_coords(lat, lon))
            .ok_or(SrtmError::AreaNotFound { lat, lon })
    }

    /// Partition holding the keyed tile, if any.
    pub fn partition_for(&self, key: TileKey) -> Option<&str> {
        self.buckets
            .get(&key)
            .map(|&slot| self.partitions[slot].as_str())
    }

    /// Number of covered tiles.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no tile is covered.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Partition names in load order.
    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(String::as_str)
    }
}

/// Decode one area resource into its text.
fn resource_text(partition: &str, bytes: &[u8]) -> Result<String> {
    let invalid = |reason: String| SrtmError::Configuration(format!(
        "Cannot load area names for {}: {}",
        partition, reason
    ));

    if !bytes.starts_with(ZIP_MAGIC) {
        return String::from_utf8(bytes.to_vec()).map_err(|e| invalid(e.to_string()));
    }

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    if archive.is_empty() {
        return Err(invalid("archive is empty".to_string()));
    }
    let mut entry = archive.by_index(0).map_err(|e| invalid(e.to_string()))?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| invalid(e.to_string()))?;
    Ok(text)
}
