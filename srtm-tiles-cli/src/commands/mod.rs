pub mod batch;
pub mod info;
pub mod list;
pub mod query;

use anyhow::{Context, Result};
use clap::Args;
use srtm_tiles::{ElevationProvider, ElevationProviderBuilder};
use std::path::PathBuf;

/// Options shared by every command for locating and fetching tiles.
#[derive(Args, Debug)]
pub struct ProviderArgs {
    /// Directory holding downloaded .hgt.zip archives
    #[arg(short = 'd', long, env = "SRTM_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory with the {Partition}_names.txt.zip area lists (defaults to the cache directory)
    #[arg(short, long, env = "SRTM_AREA_DIR", global = true)]
    pub area_dir: Option<PathBuf>,

    /// Base URL of the remote archive
    #[arg(short, long, env = "SRTM_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Maximum tiles in memory (0 for unbounded)
    #[arg(
        short,
        long,
        env = "SRTM_CACHE_SIZE",
        default_value = "100",
        global = true
    )]
    pub cache_size: u64,

    /// Never download; only read archives already in the cache directory
    #[arg(long, global = true)]
    pub offline: bool,
}

impl ProviderArgs {
    /// Cache directory from the command line or environment.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        self.cache_dir.clone().context(
            "SRTM_CACHE_DIR environment variable not set. Use --cache-dir or set SRTM_CACHE_DIR",
        )
    }

    /// Build the elevation provider.
    pub fn build(&self) -> Result<ElevationProvider> {
        let mut builder =
            ElevationProviderBuilder::new(self.cache_dir()?).cache_size(self.cache_size);

        if let Some(dir) = &self.area_dir {
            builder = builder.area_dir(dir);
        }
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url.clone());
        }
        if self.offline {
            builder = builder.offline();
        }

        builder.build().context("Failed to create elevation provider")
    }
}

/// Human readable coverage of the tile with southwest corner `(lat, lon)`.
pub fn format_coverage(lat: i32, lon: i32) -> String {
    let lat_prefix = |v: i32| if v >= 0 { "N" } else { "S" };
    let lon_prefix = |v: i32| if v >= 0 { "E" } else { "W" };
    format!(
        "{}{:02} to {}{:02}, {}{:03} to {}{:03}",
        lat_prefix(lat),
        lat.abs(),
        lat_prefix(lat + 1),
        (lat + 1).abs(),
        lon_prefix(lon),
        lon.abs(),
        lon_prefix(lon + 1),
        (lon + 1).abs()
    )
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
