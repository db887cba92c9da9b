//! Elevation queries with an in-memory tile cache.
//!
//! [`ElevationProvider`] is the entry point of the crate: it owns the area
//! index, the [`TileFetcher`] and a bounded LRU cache of decoded tiles. A
//! query either hits a tile that is already decoded or builds it once and
//! publishes the finished grid into the cache.
//!
//! ```no_run
//! use srtm_tiles::ElevationProvider;
//!
//! let provider = ElevationProvider::builder("/data/srtm")
//!     .area_dir("/data/srtm/areas")
//!     .cache_size(100)
//!     .build()?;
//!
//! let elevation = provider.elevation_at(52.882391, 4.63623)?;
//! if elevation.is_nan() {
//!     println!("No data");
//! } else {
//!     println!("Elevation: {}m", elevation);
//! }
//! # Ok::<(), srtm_tiles::SrtmError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use crate::area::AreaIndex;
use crate::error::{Result, SrtmError};
use crate::fetch::{prepare_cache_dir, DownloadConfig, Fetch, OfflineFetcher, TileFetcher};
use crate::fetch::{ARCHIVE_SUFFIX, DEFAULT_BASE_URL};
use crate::locator::{is_valid_coord, parse_tile_name, TileKey};
use crate::tile::{HeightTile, SrtmResolution};

/// Default number of tiles kept in memory.
pub const DEFAULT_CACHE_SIZE: u64 = 100;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses (tiles fetched or decoded).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// SRTM elevation provider with automatic tile retrieval and caching.
///
/// The provider is `Send + Sync`; share it behind an `Arc` to query from
/// several threads. Concurrent misses on the same tile are coalesced so the
/// archive is fetched and decoded once, while different tiles load in
/// parallel.
pub struct ElevationProvider {
    /// Resolves, downloads and decodes archives.
    fetcher: TileFetcher,
    /// Decoded tiles, keyed by 1°×1° bucket.
    tiles: Cache<TileKey, Arc<HeightTile>>,
    /// Number of cache hits.
    hit_count: AtomicU64,
    /// Number of cache misses.
    miss_count: AtomicU64,
}

impl fmt::Debug for ElevationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationProvider")
            .field("fetcher", &self.fetcher)
            .field("cache_capacity", &self.cache_capacity())
            .finish_non_exhaustive()
    }
}

impl ElevationProvider {
    /// Create a builder storing archives in `cache_dir`.
    pub fn builder<P: AsRef<Path>>(cache_dir: P) -> ElevationProviderBuilder {
        ElevationProviderBuilder::new(cache_dir)
    }

    /// Elevation in meters at `(lat, lon)`, `NaN` where the dataset has no
    /// data.
    ///
    /// Uses the nearest grid node; no interpolation. The first query in a
    /// 1°×1° cell may download and decode the tile, later queries in the
    /// same cell are served from memory.
    ///
    /// # Errors
    ///
    /// - [`SrtmError::OutOfBounds`] for coordinates outside the globe
    /// - [`SrtmError::AreaNotFound`] if no tile covers the coordinate
    /// - [`SrtmError::RetrievalFailed`] if the archive cannot be downloaded
    /// - [`SrtmError::DecodeFailed`] / [`SrtmError::InvalidTileSize`] for a
    ///   corrupt archive
    pub fn elevation_at(&self, lat: f64, lon: f64) -> Result<f64> {
        Ok(self.get_elevation(lat, lon)?.map_or(f64::NAN, f64::from))
    }

    /// Elevation in meters at `(lat, lon)`, `None` for a void sample.
    ///
    /// Same lookup as [`Self::elevation_at`] with voids kept distinct.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> Result<Option<i16>> {
        let tile = self.tile(lat, lon)?;
        tile.get_elevation(lat, lon)
    }

    /// Elevations for a batch of coordinates, in input order.
    ///
    /// Coordinates are grouped by tile so that each unique tile is looked up
    /// once, regardless of how many coordinates fall within it. Void samples
    /// are `NaN`.
    ///
    /// # Errors
    ///
    /// Fails on the first coordinate that [`Self::elevation_at`] would
    /// reject.
    pub fn elevations_at(&self, coords: &[(f64, f64)]) -> Result<Vec<f64>> {
        let mut results = vec![f64::NAN; coords.len()];

        // Group coordinate indices by tile key
        let mut groups: BTreeMap<TileKey, Vec<usize>> = BTreeMap::new();
        for (i, &(lat, lon)) in coords.iter().enumerate() {
            if !is_valid_coord(lat, lon) {
                return Err(SrtmError::OutOfBounds { lat, lon });
            }
            groups.entry(TileKey::from_coords(lat, lon)).or_default().push(i);
        }

        // One cache lookup per tile, not per coordinate
        for (key, indices) in &groups {
            let (lat, lon) = coords[indices[0]];
            let tile = self.load_tile(*key, lat, lon)?;

            for &i in indices {
                let (lat, lon) = coords[i];
                if let Some(v) = tile.get_elevation(lat, lon)? {
                    results[i] = f64::from(v);
                }
            }
        }

        Ok(results)
    }

    /// Decoded tile containing `(lat, lon)`, loading it if needed.
    pub fn tile(&self, lat: f64, lon: f64) -> Result<Arc<HeightTile>> {
        if !is_valid_coord(lat, lon) {
            return Err(SrtmError::OutOfBounds { lat, lon });
        }
        self.load_tile(TileKey::from_coords(lat, lon), lat, lon)
    }

    /// Load a tile from the cache, or fetch and decode it on a miss.
    fn load_tile(&self, key: TileKey, lat: f64, lon: f64) -> Result<Arc<HeightTile>> {
        if let Some(tile) = self.tiles.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%key, "Tile cache hit");
            return Ok(tile);
        }

        // Resolve coverage first, AreaNotFound never goes through the cache
        let url = self.fetcher.archive_url(lat, lon)?;

        // Only a fully decoded tile is ever inserted
        let mut loaded = false;
        let result = self
            .tiles
            .try_get_with(key, || -> Result<Arc<HeightTile>> {
                loaded = true;
                tracing::debug!(%key, "Tile cache miss");
                let samples = self.fetcher.materialize_url(url)?;
                let (origin_lat, origin_lon) = key.origin();
                let tile = HeightTile::new(
                    origin_lat,
                    origin_lon,
                    self.fetcher.resolution().samples(),
                    samples,
                )?;
                tracing::debug!(
                    %key,
                    voids = tile.void_count(),
                    "Tile decoded"
                );
                Ok(Arc::new(tile))
            })
            .map_err(SrtmError::from_shared);

        // Callers served by another caller's load did no work of their own
        if loaded {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        } else if result.is_ok() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Get cache statistics.
    ///
    /// Returns information about cache usage including hit rate.
    pub fn cache_stats(&self) -> CacheStats {
        self.tiles.run_pending_tasks();
        CacheStats {
            entry_count: self.tiles.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Maximum number of cached tiles, `0` when unbounded.
    pub fn cache_capacity(&self) -> u64 {
        self.tiles.policy().max_capacity().unwrap_or(0)
    }

    /// Remove one tile from the memory cache.
    ///
    /// The archive stays on disk, so the next query decodes it again without
    /// downloading.
    pub fn invalidate(&self, key: TileKey) {
        self.tiles.invalidate(&key);
    }

    /// Clear all tiles from the cache.
    pub fn clear_cache(&self) {
        self.tiles.invalidate_all();
    }

    /// Directory holding downloaded archives.
    pub fn cache_dir(&self) -> &Path {
        self.fetcher.cache_dir()
    }

    /// Area index used to resolve partitions.
    pub fn areas(&self) -> &AreaIndex {
        self.fetcher.areas()
    }

    /// Fetcher used on cache misses.
    pub fn fetcher(&self) -> &TileFetcher {
        &self.fetcher
    }

    /// Scan the cache directory for downloaded archives.
    ///
    /// Returns a sorted list of tile names (e.g. `["N52E004"]`); files that
    /// do not carry a tile name are ignored.
    pub fn cached_archives(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(self.cache_dir()) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let stem = name.strip_suffix(ARCHIVE_SUFFIX)?;
                parse_tile_name(stem).map(|_| stem.to_string())
            })
            .collect();
        names.sort();
        names
    }
}

/// Builder for creating [`ElevationProvider`] with custom configuration.
///
/// ```no_run
/// use srtm_tiles::{ElevationProviderBuilder, DownloadConfig};
///
/// let provider = ElevationProviderBuilder::new("/data/srtm")
///     .cache_size(50)
///     .download_config(DownloadConfig::default().with_max_retries(5))
///     .build()?;
/// # Ok::<(), srtm_tiles::SrtmError>(())
/// ```
pub struct ElevationProviderBuilder {
    cache_dir: PathBuf,
    area_index: Option<AreaIndex>,
    area_dir: Option<PathBuf>,
    base_url: String,
    cache_size: Option<u64>,
    resolution: SrtmResolution,
    fetcher: Option<Arc<dyn Fetch>>,
    offline: bool,
    download_config: DownloadConfig,
}

impl ElevationProviderBuilder {
    /// Create a new builder with the specified cache directory.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            area_index: None,
            area_dir: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_size: Some(DEFAULT_CACHE_SIZE),
            resolution: SrtmResolution::default(),
            fetcher: None,
            offline: false,
            download_config: DownloadConfig::default(),
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SRTM_CACHE_DIR` | Directory holding downloaded archives | Required |
    /// | `SRTM_AREA_DIR` | Directory with the six area lists | `SRTM_CACHE_DIR` |
    /// | `SRTM_BASE_URL` | Base URL of the remote archive | ArduPilot SRTM3 |
    /// | `SRTM_CACHE_SIZE` | Maximum tiles in memory, `0` for unbounded | 100 |
    ///
    /// # Errors
    ///
    /// Returns an error if `SRTM_CACHE_DIR` is not set.
    pub fn from_env() -> Result<Self> {
        let cache_dir = std::env::var("SRTM_CACHE_DIR").map_err(|_| {
            SrtmError::Configuration("SRTM_CACHE_DIR environment variable not set".to_string())
        })?;

        let mut builder = Self::new(cache_dir);

        if let Ok(dir) = std::env::var("SRTM_AREA_DIR") {
            builder = builder.area_dir(dir);
        }
        if let Ok(url) = std::env::var("SRTM_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(size) = std::env::var("SRTM_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            builder = builder.cache_size(size);
        }

        Ok(builder)
    }

    /// Use an already loaded area index instead of reading one from disk.
    pub fn area_index(mut self, areas: AreaIndex) -> Self {
        self.area_index = Some(areas);
        self
    }

    /// Directory holding the `{Partition}_names.txt[.zip]` area lists.
    ///
    /// Defaults to the cache directory.
    pub fn area_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.area_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the base URL of the remote archive.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the maximum number of tiles to keep in memory.
    ///
    /// Default is 100 tiles (~290MB for SRTM3). `0` means unbounded.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = (size > 0).then_some(size);
        self
    }

    /// Keep every decoded tile in memory for the provider's lifetime.
    pub fn unbounded(mut self) -> Self {
        self.cache_size = None;
        self
    }

    /// Resolution of the archives served by the remote.
    pub fn resolution(mut self, resolution: SrtmResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Use a custom transport for retrieving archives.
    pub fn fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Disable downloads; only archives already in the cache directory are
    /// read.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Configure the HTTP transport.
    pub fn download_config(mut self, config: DownloadConfig) -> Self {
        self.download_config = config;
        self
    }

    /// Build the [`ElevationProvider`].
    ///
    /// # Errors
    ///
    /// - [`SrtmError::InvalidCacheDir`] if the cache path is not a directory
    /// - any area loading error from [`AreaIndex::from_dir`]
    /// - [`SrtmError::Configuration`] if the HTTP client cannot be created
    pub fn build(self) -> Result<ElevationProvider> {
        let cache_dir = prepare_cache_dir(&self.cache_dir)?;

        let areas = match self.area_index {
            Some(areas) => areas,
            None => AreaIndex::from_dir(self.area_dir.as_deref().unwrap_or(&cache_dir))?,
        };

        let fetcher: Arc<dyn Fetch> = match self.fetcher {
            Some(fetcher) => fetcher,
            None if self.offline => Arc::new(OfflineFetcher),
            None => default_fetcher(self.download_config)?,
        };

        let mut tiles = Cache::builder().eviction_policy(EvictionPolicy::lru());
        if let Some(size) = self.cache_size {
            tiles = tiles.max_capacity(size);
        }

        tracing::debug!(
            cache_dir = %cache_dir.display(),
            areas = areas.len(),
            cache_size = ?self.cache_size,
            "Elevation provider ready"
        );

        Ok(ElevationProvider {
            fetcher: TileFetcher::new(
                Arc::new(areas),
                self.base_url,
                cache_dir,
                self.resolution,
                fetcher,
            ),
            tiles: tiles.build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }
}

#[cfg(feature = "download")]
fn default_fetcher(config: DownloadConfig) -> Result<Arc<dyn Fetch>> {
    Ok(Arc::new(crate::fetch::HttpFetcher::new(config)?))
}

#[cfg(not(feature = "download"))]
fn default_fetcher(_config: DownloadConfig) -> Result<Arc<dyn Fetch>> {
    Ok(Arc::new(OfflineFetcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const WIDTH: usize = 1201;
    const CENTER: usize = 600 * WIDTH + 600;
    // Node at (52.75, 4.25) in N52E004
    const VOID_NODE: usize = 300 * WIDTH + 300;

    /// Fetcher copying fixture archives from a source directory.
    #[derive(Clone)]
    struct CopyFetcher {
        source: PathBuf,
        calls: Arc<AtomicUsize>,
    }

    impl CopyFetcher {
        fn new(source: &Path) -> Self {
            Self {
                source: source.to_path_buf(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for CopyFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Slow enough for concurrent callers to pile up on one key
            std::thread::sleep(std::time::Duration::from_millis(20));
            let name = url.rsplit('/').next().unwrap_or(url);
            let source = self.source.join(name);
            if !source.exists() {
                return Err(SrtmError::RetrievalFailed {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".to_string(),
                });
            }
            fs::copy(source, dest)?;
            Ok(())
        }
    }

    /// Write an SRTM3 archive whose samples are 0 except the given ones.
    fn write_archive(dir: &Path, name: &str, samples: &[(usize, i16)]) {
        let mut data = vec![0u8; WIDTH * WIDTH * 2];
        for &(index, value) in samples {
            data[index * 2..index * 2 + 2].copy_from_slice(&value.to_be_bytes());
        }
        let file = fs::File::create(dir.join(format!("{}.hgt.zip", name))).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file(format!("{}.hgt", name), options).unwrap();
        zip.write_all(&data).unwrap();
        zip.finish().unwrap();
    }

    fn test_areas() -> AreaIndex {
        AreaIndex::from_lists([
            ("Eurasia", "N52E004\nN53E004\n"),
            ("North_America", "N35W119\n"),
        ])
        .unwrap()
    }

    struct Fixture {
        _source: TempDir,
        cache: TempDir,
        fetcher: CopyFetcher,
    }

    fn fixture() -> Fixture {
        let source = TempDir::new().unwrap();
        write_archive(source.path(), "N52E004", &[(CENTER, 1223), (VOID_NODE, 20000)]);
        write_archive(source.path(), "N53E004", &[(CENTER, 7)]);
        write_archive(source.path(), "N35W119", &[(CENTER, -12)]);
        let fetcher = CopyFetcher::new(source.path());
        Fixture {
            _source: source,
            cache: TempDir::new().unwrap(),
            fetcher,
        }
    }

    fn provider(fixture: &Fixture) -> ElevationProvider {
        ElevationProvider::builder(fixture.cache.path())
            .area_index(test_areas())
            .fetcher(fixture.fetcher.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_elevation_at_exact_value() {
        let fixture = fixture();
        let provider = provider(&fixture);

        assert_eq!(provider.elevation_at(52.5, 4.5).unwrap(), 1223.0);
        assert_eq!(provider.elevation_at(35.5, -118.5).unwrap(), -12.0);
        // Zero-filled remainder of the tile is real data
        assert_eq!(provider.elevation_at(52.2, 4.2).unwrap(), 0.0);
    }

    #[test]
    fn test_void_sample_is_nan() {
        let fixture = fixture();
        let provider = provider(&fixture);

        // Raw 20000 is outside the valid range
        assert!(provider.elevation_at(52.75, 4.25).unwrap().is_nan());
        assert_eq!(provider.get_elevation(52.75, 4.25).unwrap(), None);

        // 53.0 belongs to the tile to the north, where the node is real data
        assert_eq!(provider.elevation_at(53.0, 4.0).unwrap(), 0.0);
    }

    #[test]
    fn test_second_query_does_not_refetch() {
        let fixture = fixture();
        let provider = provider(&fixture);

        provider.elevation_at(52.1, 4.2).unwrap();
        provider.elevation_at(52.9, 4.9).unwrap();

        assert_eq!(fixture.fetcher.calls(), 1);
        let stats = provider.cache_stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_area_not_found() {
        let fixture = fixture();
        let provider = provider(&fixture);

        let err = provider.elevation_at(0.5, -150.5).unwrap_err();
        assert!(matches!(err, SrtmError::AreaNotFound { .. }));
        assert!(matches!(
            provider.get_elevation(0.5, -150.5),
            Err(SrtmError::AreaNotFound { .. })
        ));
        assert_eq!(fixture.fetcher.calls(), 0);
        // Uncovered tiles never count as cache misses
        assert_eq!(provider.cache_stats().miss_count, 0);
    }

    #[test]
    fn test_invalid_coordinates() {
        let fixture = fixture();
        let provider = provider(&fixture);

        assert!(matches!(
            provider.elevation_at(95.0, 0.0),
            Err(SrtmError::OutOfBounds { .. })
        ));
        assert!(provider.elevation_at(0.0, -200.0).is_err());
        assert!(provider.elevation_at(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_retrieval_failure_is_not_cached() {
        let source = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let fetcher = CopyFetcher::new(source.path());
        let provider = ElevationProvider::builder(cache.path())
            .area_index(test_areas())
            .fetcher(fetcher.clone())
            .build()
            .unwrap();

        match provider.elevation_at(52.5, 4.5) {
            Err(SrtmError::RetrievalFailed { url, .. }) => {
                assert!(url.ends_with("Eurasia/N52E004.hgt.zip"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // Archive shows up at the source, the next query succeeds
        write_archive(source.path(), "N52E004", &[(CENTER, 1223)]);
        assert_eq!(provider.elevation_at(52.5, 4.5).unwrap(), 1223.0);
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_elevations_at_grouped_by_tile() {
        let fixture = fixture();
        let provider = provider(&fixture);

        let coords = vec![
            (52.5, 4.5),
            (53.5, 4.5),
            (52.2, 4.2),
            (52.75, 4.25),
            (53.5, 4.5),
        ];
        let results = provider.elevations_at(&coords).unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results[0], 1223.0);
        assert_eq!(results[1], 7.0);
        assert_eq!(results[2], 0.0);
        assert!(results[3].is_nan());
        assert_eq!(results[4], 7.0);

        // One load per tile
        assert_eq!(fixture.fetcher.calls(), 2);
        assert_eq!(provider.cache_stats().miss_count, 2);
    }

    #[test]
    fn test_elevations_at_fails_on_first_error() {
        let fixture = fixture();
        let provider = provider(&fixture);

        let result = provider.elevations_at(&[(52.5, 4.5), (0.5, -150.5)]);
        assert!(matches!(result, Err(SrtmError::AreaNotFound { .. })));

        let result = provider.elevations_at(&[(52.5, 4.5), (100.0, 0.0)]);
        assert!(matches!(result, Err(SrtmError::OutOfBounds { .. })));

        assert!(provider.elevations_at(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_tile_accessor() {
        let fixture = fixture();
        let provider = provider(&fixture);

        let tile = provider.tile(35.5, -118.5).unwrap();
        assert_eq!(tile.origin_lat(), 35);
        assert_eq!(tile.origin_lon(), -119);
        assert_eq!(tile.width(), WIDTH);
        assert_eq!(tile.sample(600, 600), Some(-12));
    }

    #[test]
    fn test_clear_cache_decodes_again_without_download() {
        let fixture = fixture();
        let provider = provider(&fixture);

        provider.elevation_at(52.5, 4.5).unwrap();
        provider.clear_cache();
        provider.elevation_at(52.5, 4.5).unwrap();

        assert_eq!(provider.cache_stats().miss_count, 2);
        assert_eq!(fixture.fetcher.calls(), 1);
    }

    #[test]
    fn test_invalidate() {
        let fixture = fixture();
        let provider = provider(&fixture);

        provider.elevation_at(52.5, 4.5).unwrap();
        provider.elevation_at(53.5, 4.5).unwrap();
        provider.invalidate(TileKey::from_origin(52, 4));

        assert_eq!(provider.cache_stats().entry_count, 1);
        provider.elevation_at(53.6, 4.6).unwrap();
        assert_eq!(provider.cache_stats().hit_count, 1);
    }

    #[test]
    fn test_cache_capacity() {
        let fixture = fixture();
        assert_eq!(provider(&fixture).cache_capacity(), DEFAULT_CACHE_SIZE);

        let unbounded = ElevationProvider::builder(fixture.cache.path())
            .area_index(test_areas())
            .unbounded()
            .offline()
            .build()
            .unwrap();
        assert_eq!(unbounded.cache_capacity(), 0);

        let zero = ElevationProvider::builder(fixture.cache.path())
            .area_index(test_areas())
            .cache_size(0)
            .offline()
            .build()
            .unwrap();
        assert_eq!(zero.cache_capacity(), 0);
    }

    #[test]
    fn test_bounded_cache_evicts() {
        let fixture = fixture();
        let provider = ElevationProvider::builder(fixture.cache.path())
            .area_index(test_areas())
            .fetcher(fixture.fetcher.clone())
            .cache_size(1)
            .build()
            .unwrap();

        provider.elevation_at(52.5, 4.5).unwrap();
        provider.elevation_at(53.5, 4.5).unwrap();
        assert_eq!(provider.cache_stats().entry_count, 1);
    }

    #[test]
    fn test_concurrent_misses_fetch_once() {
        let fixture = fixture();
        let provider = Arc::new(provider(&fixture));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    let offset = i as f64 * 0.01;
                    provider.elevation_at(52.5 + offset, 4.5).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(!handle.join().unwrap().is_nan());
        }
        assert_eq!(fixture.fetcher.calls(), 1);

        // Waiters on the single load count as hits
        let stats = provider.cache_stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count + stats.miss_count, 8);
    }

    #[test]
    fn test_offline_reads_cached_archives() {
        let fixture = fixture();
        write_archive(fixture.cache.path(), "N52E004", &[(CENTER, 99)]);

        let provider = ElevationProvider::builder(fixture.cache.path())
            .area_index(test_areas())
            .offline()
            .build()
            .unwrap();

        assert_eq!(provider.elevation_at(52.5, 4.5).unwrap(), 99.0);
        assert!(provider.elevation_at(53.5, 4.5).unwrap_err().is_retrieval());
    }

    #[test]
    fn test_cached_archives() {
        let fixture = fixture();
        let provider = provider(&fixture);
        fs::write(fixture.cache.path().join("readme.txt"), "not a tile").unwrap();
        fs::write(fixture.cache.path().join("N52E004.hgt.zip.part"), "partial").unwrap();

        provider.elevation_at(53.5, 4.5).unwrap();
        provider.elevation_at(52.5, 4.5).unwrap();

        assert_eq!(provider.cached_archives(), vec!["N52E004", "N53E004"]);
    }

    #[test]
    fn test_build_rejects_file_as_cache_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        let err = ElevationProvider::builder(&file)
            .area_index(test_areas())
            .build()
            .unwrap_err();
        assert!(matches!(err, SrtmError::InvalidCacheDir { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_requires_area_lists() {
        let dir = TempDir::new().unwrap();
        let err = ElevationProvider::builder(dir.path())
            .offline()
            .build()
            .unwrap_err();
        assert!(matches!(err, SrtmError::MissingAreaResource { .. }));
    }

    #[test]
    fn test_build_creates_cache_dir() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("srtm").join("cache");

        let provider = ElevationProvider::builder(&cache_dir)
            .area_index(test_areas())
            .offline()
            .build()
            .unwrap();

        assert!(cache_dir.is_dir());
        assert_eq!(provider.cache_dir(), cache_dir);
        assert_eq!(provider.areas().len(), 3);
    }

    #[test]
    fn test_cache_stats() {
        let stats = CacheStats {
            entry_count: 5,
            hit_count: 80,
            miss_count: 20,
        };

        assert_eq!(stats.hit_rate(), 0.8);

        let empty_stats = CacheStats::default();
        assert_eq!(empty_stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_from_env() {
        let vars = [
            "SRTM_CACHE_DIR",
            "SRTM_AREA_DIR",
            "SRTM_BASE_URL",
            "SRTM_CACHE_SIZE",
        ];
        let original: Vec<_> = vars.iter().map(|v| std::env::var(v).ok()).collect();

        std::env::remove_var("SRTM_CACHE_DIR");
        let err = ElevationProviderBuilder::from_env().err().unwrap();
        assert!(err.is_configuration());

        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("SRTM_CACHE_DIR", temp_dir.path());
        std::env::remove_var("SRTM_AREA_DIR");
        std::env::remove_var("SRTM_BASE_URL");
        std::env::remove_var("SRTM_CACHE_SIZE");

        let builder = ElevationProviderBuilder::from_env().unwrap();
        assert_eq!(builder.cache_dir, temp_dir.path());
        assert_eq!(builder.area_dir, None);
        assert_eq!(builder.base_url, DEFAULT_BASE_URL);
        assert_eq!(builder.cache_size, Some(DEFAULT_CACHE_SIZE));

        std::env::set_var("SRTM_AREA_DIR", "/data/areas");
        std::env::set_var("SRTM_BASE_URL", "https://example.com/SRTM3");
        std::env::set_var("SRTM_CACHE_SIZE", "0");

        let builder = ElevationProviderBuilder::from_env().unwrap();
        assert_eq!(builder.area_dir, Some(PathBuf::from("/data/areas")));
        assert_eq!(builder.base_url, "https://example.com/SRTM3");
        assert_eq!(builder.cache_size, None);

        // Restore original values
        for (var, value) in vars.iter().zip(original) {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }
}
