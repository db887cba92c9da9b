//! # srtm-tiles - SRTM Elevation Provider
//!
//! Point elevation queries over the SRTM3 dataset, served as continent
//! partitioned `.hgt.zip` archives from a remote mirror.
//!
//! ## Features
//!
//! - **On demand**: tiles are downloaded and decoded on first use
//! - **Cached**: decoded tiles live in a bounded LRU cache; archives stay on disk
//! - **Concurrent**: the provider is `Send + Sync` and loads each tile once
//!   even under concurrent misses
//! - **Offline**: archives already in the cache directory are read without
//!   touching the network
//!
//! ## Quick Start
//!
//! ```no_run
//! use srtm_tiles::ElevationProvider;
//!
//! // The six area lists are read from /data/srtm-areas
//! let provider = ElevationProvider::builder("/data/srtm")
//!     .area_dir("/data/srtm-areas")
//!     .build()?;
//!
//! let elevation = provider.elevation_at(52.882391, 4.63623)?;
//! println!("Elevation: {}m", elevation);
//! # Ok::<(), srtm_tiles::SrtmError>(())
//! ```
//!
//! ## SRTM Data Format
//!
//! Each archive holds one `.hgt` file: a square grid of 16-bit big-endian
//! signed samples in meters, row-major from the north-west corner.
//!
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//!
//! Samples outside `[-1000, 10000]` mark missing data. The grid API reports
//! them as `None`, [`ElevationProvider::elevation_at`] as `NaN`.
//!
//! ## Area Lists
//!
//! The remote splits tiles into six partitions (`Africa`, `Australia`,
//! `Eurasia`, `Islands`, `North_America`, `South_America`). Which partition
//! holds a tile is read from `{Partition}_names.txt.zip` lists, see
//! [`AreaIndex`].
//!
//! The lists are not shipped with this crate. Each one is the file listing of
//! its partition directory on the mirror, one tile code per line (for example
//! the entries of `<base_url>/Eurasia/`), either plain or zipped. Put them in
//! the directory passed to [`ElevationProviderBuilder::area_dir`] (the cache
//! directory by default), or build the index yourself with
//! [`AreaIndex::from_lists`] and hand it over with
//! [`ElevationProviderBuilder::area_index`]. Without them
//! [`ElevationProviderBuilder::build`] fails with
//! [`SrtmError::MissingAreaResource`].

pub mod area;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod provider;
pub mod tile;

// Re-export main types at crate root for convenience
pub use area::{AreaIndex, PARTITIONS};
pub use error::{Result, SrtmError};
#[cfg(feature = "download")]
pub use fetch::HttpFetcher;
pub use fetch::{DownloadConfig, Fetch, OfflineFetcher, TileFetcher, DEFAULT_BASE_URL};
pub use locator::{canonical_name, tile_name, TileKey};
pub use provider::{CacheStats, ElevationProvider, ElevationProviderBuilder};
pub use tile::{HeightTile, SrtmResolution, VOID_VALUE};
