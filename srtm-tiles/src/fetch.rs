//! Retrieval of tile archives.
//!
//! [`TileFetcher`] turns a coordinate into a decoded sample buffer: it
//! resolves the canonical tile name, makes sure the `.hgt.zip` archive is in
//! the local cache directory (downloading it through a [`Fetch`]
//! implementation on first need) and decodes it.
//!
//! # Data Source
//!
//! The default source is the ArduPilot terrain server, which mirrors the
//! SRTM3 archive with its continental directory layout:
//!
//! `https://terrain.ardupilot.org/SRTM3/{partition}/{tile}.hgt.zip`
//!
//! A local archive is never re-downloaded, even if it is corrupt; a corrupt
//! archive surfaces as a decode error and has to be removed by hand.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::area::AreaIndex;
use crate::decode::read_archive;
use crate::error::{Result, SrtmError};
use crate::locator::canonical_name;
use crate::tile::SrtmResolution;

/// Default base URL of the remote archive.
pub const DEFAULT_BASE_URL: &str = "https://terrain.ardupilot.org/SRTM3";

/// Suffix appended to the canonical tile name to form the archive URL.
pub const ARCHIVE_SUFFIX: &str = ".hgt.zip";

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Transport used to retrieve a remote file.
///
/// Implementations write the full content of `url` to `dest`, or fail
/// without leaving a file at `dest`.
pub trait Fetch: Send + Sync {
    /// Retrieve `url` into `dest`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        (**self).fetch(url, dest)
    }
}

/// Fetcher that refuses every download.
///
/// Used when only archives already in the cache directory may be read.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl Fetch for OfflineFetcher {
    fn fetch(&self, url: &str, _dest: &Path) -> Result<()> {
        Err(SrtmError::RetrievalFailed {
            url: url.to_string(),
            reason: "downloads are disabled and the archive is not cached".to_string(),
        })
    }
}

/// Configuration for downloading tile archives over HTTP.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retry attempts on failure.
    pub max_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 3,
        }
    }
}

impl DownloadConfig {
    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Blocking HTTP fetcher with retries.
#[cfg(feature = "download")]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    config: DownloadConfig,
}

#[cfg(feature = "download")]
impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("srtm-tiles/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SrtmError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Perform a single download attempt.
    fn do_download(&self, url: &str, dest: &Path) -> Result<()> {
        let retrieval_failed = |reason: String| SrtmError::RetrievalFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| retrieval_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(retrieval_failed(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .map_err(|e| retrieval_failed(e.to_string()))?;

        // Write next to the destination and move into place once complete
        let partial = partial_path(dest);
        fs::write(&partial, &bytes)?;
        if let Err(e) = fs::rename(&partial, dest) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(feature = "download")]
impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Brief delay before retry
                std::thread::sleep(std::time::Duration::from_millis(500 * attempt as u64));
            }

            match self.do_download(url, dest) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SrtmError::RetrievalFailed {
            url: url.to_string(),
            reason: "Unknown error".to_string(),
        }))
    }
}

#[cfg(feature = "download")]
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Make sure `path` is a usable cache directory, creating it if needed.
///
/// # Errors
///
/// Returns [`SrtmError::InvalidCacheDir`] if `path` exists but is not a
/// directory.
pub fn prepare_cache_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        if !path.is_dir() {
            return Err(SrtmError::InvalidCacheDir {
                path: path.to_path_buf(),
            });
        }
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(path.to_path_buf())
}

/// Resolves, retrieves and decodes tile archives.
pub struct TileFetcher {
    areas: Arc<AreaIndex>,
    base_url: String,
    cache_dir: PathBuf,
    resolution: SrtmResolution,
    fetcher: Arc<dyn Fetch>,
}

impl fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileFetcher")
            .field("areas", &self.areas.len())
            .field("base_url", &self.base_url)
            .field("cache_dir", &self.cache_dir)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    /// Create a fetcher storing archives in `cache_dir`.
    ///
    /// The directory is not checked here; see [`prepare_cache_dir`].
    pub fn new(
        areas: Arc<AreaIndex>,
        base_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        resolution: SrtmResolution,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            areas,
            base_url,
            cache_dir: cache_dir.into(),
            resolution,
            fetcher,
        }
    }

    /// Remote location of the archive holding `(lat, lon)`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use srtm_tiles::{AreaIndex, OfflineFetcher, SrtmResolution, TileFetcher};
    ///
    /// let areas = Arc::new(AreaIndex::from_lists([("Eurasia", "N52E004")])?);
    /// let fetcher = TileFetcher::new(
    ///     areas,
    ///     "https://example.com/SRTM3/",
    ///     "/tmp/srtm",
    ///     SrtmResolution::Srtm3,
    ///     Arc::new(OfflineFetcher),
    /// );
    /// assert_eq!(
    ///     fetcher.archive_url(52.88, 4.63)?,
    ///     "https://example.com/SRTM3/Eurasia/N52E004.hgt.zip"
    /// );
    /// # Ok::<(), srtm_tiles::SrtmError>(())
    /// ```
    pub fn archive_url(&self, lat: f64, lon: f64) -> Result<String> {
        let name = canonical_name(&self.areas, lat, lon)?;
        Ok(format!("{}/{}{}", self.base_url, name, ARCHIVE_SUFFIX))
    }

    /// Local cache path for an archive URL: its basename under the cache
    /// directory.
    pub fn archive_path(&self, url: &str) -> PathBuf {
        let basename = url.rsplit('/').next().unwrap_or(url);
        self.cache_dir.join(basename)
    }

    /// Produce the decoded samples of the tile containing `(lat, lon)`.
    ///
    /// Downloads the archive if it is not in the cache directory yet, then
    /// decodes it. Decoding only starts once the archive is fully on disk.
    ///
    /// # Errors
    ///
    /// - [`SrtmError::AreaNotFound`] if the dataset does not cover the tile
    /// - [`SrtmError::RetrievalFailed`] if the download fails
    /// - [`SrtmError::DecodeFailed`] / [`SrtmError::InvalidTileSize`] if the
    ///   archive cannot be decoded
    pub fn materialize(&self, lat: f64, lon: f64) -> Result<Vec<i16>> {
        let url = self.archive_url(lat, lon)?;
        self.materialize_url(url)
    }

    /// Produce the decoded samples of an archive URL already resolved by
    /// [`TileFetcher::archive_url`].
    pub fn materialize_url(&self, url: String) -> Result<Vec<i16>> {
        let path = self.archive_path(&url);

        if !path.exists() {
            tracing::info!(url = %url, path = %path.display(), "Downloading tile archive");
            self.fetcher.fetch(&url, &path).map_err(|e| match e {
                SrtmError::RetrievalFailed { .. } => e,
                other => SrtmError::RetrievalFailed {
                    url: url.clone(),
                    reason: other.to_string(),
                },
            })?;
            if !path.is_file() {
                return Err(SrtmError::RetrievalFailed {
                    url,
                    reason: format!("fetch reported success but {} is missing", path.display()),
                });
            }
        }

        read_archive(&path, self.resolution.samples())
    }

    /// Area index used to resolve partitions.
    pub fn areas(&self) -> &AreaIndex {
        &self.areas
    }

    /// Base URL of the remote archive, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Directory holding downloaded archives.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolution of the tiles decoded by this fetcher.
    pub fn resolution(&self) -> SrtmResolution {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const WIDTH: usize = 1201;

    /// Fetcher serving archives from an in-memory map and counting calls.
    #[derive(Default)]
    struct MapFetcher {
        files: Mutex<Vec<(String, Vec<u8>)>>,
        calls: AtomicUsize,
    }

    impl MapFetcher {
        fn serve(&self, url: &str, bytes: Vec<u8>) {
            self.files.lock().unwrap().push((url.to_string(), bytes));
        }
    }

    impl Fetch for MapFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let files = self.files.lock().unwrap();
            let (_, bytes) = files
                .iter()
                .find(|(u, _)| u == url)
                .ok_or_else(|| SrtmError::RetrievalFailed {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".to_string(),
                })?;
            fs::write(dest, bytes)?;
            Ok(())
        }
    }

    fn hgt_zip(entry: &str, samples: &[(usize, i16)]) -> Vec<u8> {
        let mut data = vec![0u8; WIDTH * WIDTH * 2];
        for &(index, value) in samples {
            data[index * 2..index * 2 + 2].copy_from_slice(&value.to_be_bytes());
        }
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(entry, options).unwrap();
            zip.write_all(&data).unwrap();
            zip.finish().unwrap();
        }
        buffer
    }

    fn tile_fetcher(cache_dir: &Path, fetcher: Arc<dyn Fetch>) -> TileFetcher {
        let areas = AreaIndex::from_lists([("Eurasia", "N52E004\n"), ("Africa", "S34E018\n")])
            .unwrap();
        TileFetcher::new(
            Arc::new(areas),
            "https://example.com/SRTM3/",
            cache_dir,
            SrtmResolution::Srtm3,
            fetcher,
        )
    }

    #[test]
    fn test_archive_url_and_path() {
        let dir = TempDir::new().unwrap();
        let fetcher = tile_fetcher(dir.path(), Arc::new(OfflineFetcher));

        let url = fetcher.archive_url(52.88, 4.63).unwrap();
        assert_eq!(url, "https://example.com/SRTM3/Eurasia/N52E004.hgt.zip");
        assert_eq!(fetcher.archive_path(&url), dir.path().join("N52E004.hgt.zip"));

        let url = fetcher.archive_url(-33.9, 18.4).unwrap();
        assert_eq!(url, "https://example.com/SRTM3/Africa/S34E018.hgt.zip");
    }

    #[test]
    fn test_archive_url_uncovered() {
        let dir = TempDir::new().unwrap();
        let fetcher = tile_fetcher(dir.path(), Arc::new(OfflineFetcher));
        assert!(fetcher.archive_url(0.5, -150.5).unwrap_err().is_area_not_found());
    }

    #[test]
    fn test_materialize_downloads_once() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MapFetcher::default());
        source.serve(
            "https://example.com/SRTM3/Eurasia/N52E004.hgt.zip",
            hgt_zip("N52E004.hgt", &[(600 * WIDTH + 600, 1223)]),
        );
        let fetcher = tile_fetcher(dir.path(), source.clone());

        let samples = fetcher.materialize(52.5, 4.5).unwrap();
        assert_eq!(samples.len(), WIDTH * WIDTH);
        assert_eq!(samples[600 * WIDTH + 600], 1223);
        assert!(dir.path().join("N52E004.hgt.zip").is_file());

        // The cached archive is reused
        fetcher.materialize(52.1, 4.9).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_materialize_uses_existing_file_without_fetching() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("N52E004.hgt.zip"),
            hgt_zip("N52E004.hgt", &[(0, 42)]),
        )
        .unwrap();

        let fetcher = tile_fetcher(dir.path(), Arc::new(OfflineFetcher));
        let samples = fetcher.materialize(52.5, 4.5).unwrap();
        assert_eq!(samples[0], 42);
    }

    #[test]
    fn test_materialize_corrupt_cached_file_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("N52E004.hgt.zip"), b"garbage").unwrap();
        let source = Arc::new(MapFetcher::default());
        let fetcher = tile_fetcher(dir.path(), source.clone());

        let err = fetcher.materialize(52.5, 4.5).unwrap_err();
        assert!(err.is_decode());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_materialize_retrieval_failure() {
        let dir = TempDir::new().unwrap();
        let fetcher = tile_fetcher(dir.path(), Arc::new(MapFetcher::default()));

        match fetcher.materialize(52.5, 4.5) {
            Err(SrtmError::RetrievalFailed { url, .. }) => {
                assert!(url.ends_with("Eurasia/N52E004.hgt.zip"));
            }
            other => panic!("Expected RetrievalFailed, got {:?}", other),
        }
        assert!(!dir.path().join("N52E004.hgt.zip").exists());
    }

    #[test]
    fn test_offline_fetcher() {
        let dir = TempDir::new().unwrap();
        let fetcher = tile_fetcher(dir.path(), Arc::new(OfflineFetcher));
        assert!(matches!(
            fetcher.materialize(52.5, 4.5),
            Err(SrtmError::RetrievalFailed { .. })
        ));
    }

    #[test]
    fn test_prepare_cache_dir() {
        let dir = TempDir::new().unwrap();

        let nested = dir.path().join("a").join("b");
        assert_eq!(prepare_cache_dir(&nested).unwrap(), nested);
        assert!(nested.is_dir());

        // Existing directory is accepted as is
        assert!(prepare_cache_dir(dir.path()).is_ok());

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            prepare_cache_dir(&file),
            Err(SrtmError::InvalidCacheDir { .. })
        ));
    }

    #[test]
    fn test_download_config_builder() {
        let config = DownloadConfig::default()
            .with_timeout(60)
            .with_max_retries(5);

        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_retries, 5);
        assert_eq!(DownloadConfig::default().timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[cfg(feature = "download")]
    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/cache/N52E004.hgt.zip")),
            PathBuf::from("/cache/N52E004.hgt.zip.part")
        );
    }
}
