use anyhow::{bail, Context, Result};
use srtm_tiles::decode::{inspect_archive, read_archive};
use srtm_tiles::fetch::ARCHIVE_SUFFIX;
use srtm_tiles::locator::{lat_lon_to_tile_name, parse_tile_name};
use srtm_tiles::{HeightTile, SrtmResolution};
use std::path::PathBuf;

use super::{format_coverage, format_size, ProviderArgs};

pub fn run(
    args: &ProviderArgs,
    tile: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<()> {
    let tile_path = match (tile, lat, lon) {
        (_, Some(lat), Some(lon)) => {
            let name = lat_lon_to_tile_name(lat, lon);
            args.cache_dir()?.join(format!("{}{}", name, ARCHIVE_SUFFIX))
        }
        // Full path provided
        (Some(tile), _, _) if tile.to_ascii_lowercase().ends_with(ARCHIVE_SUFFIX) => {
            PathBuf::from(tile)
        }
        // Just tile name (e.g., "N52E004")
        (Some(tile), _, _) => args.cache_dir()?.join(format!("{}{}", tile, ARCHIVE_SUFFIX)),
        _ => bail!("Specify a tile name, an archive path, or --lat and --lon"),
    };

    if !tile_path.exists() {
        bail!("Tile archive not found: {}", tile_path.display());
    }

    let file_name = tile_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (origin_lat, origin_lon) = parse_tile_name(&file_name)
        .with_context(|| format!("Not a tile archive name: {}", file_name))?;

    let entry = inspect_archive(&tile_path).context("Failed to read tile archive")?;
    let resolution = entry.resolution().with_context(|| {
        format!(
            "{} holds {} bytes, not a full SRTM1 or SRTM3 grid",
            entry.name, entry.size
        )
    })?;

    let samples =
        read_archive(&tile_path, resolution.samples()).context("Failed to decode tile")?;
    let tile = HeightTile::new(origin_lat, origin_lon, resolution.samples(), samples)?;

    let file_size = std::fs::metadata(&tile_path)?.len();

    let resolution_str = match resolution {
        SrtmResolution::Srtm1 => "SRTM1 (~30m)",
        SrtmResolution::Srtm3 => "SRTM3 (~90m)",
    };

    // Display information
    println!("Tile: {}", file_name);
    println!("Path: {}", tile_path.display());
    println!("Entry: {} ({})", entry.name, format_size(entry.size));
    println!();
    println!(
        "Resolution: {} ({}x{} samples)",
        resolution_str,
        tile.width(),
        tile.width()
    );
    println!("Coverage: {}", format_coverage(origin_lat, origin_lon));
    println!("File size: {}", format_size(file_size));
    println!();

    if let Some((min_elev, max_elev)) = tile.elevation_range() {
        println!("Min elevation: {}m", min_elev);
        println!("Max elevation: {}m", max_elev);
    }

    let void_count = tile.void_count();
    if void_count > 0 {
        let total_samples = tile.width() * tile.width();
        let void_pct = (void_count as f64 / total_samples as f64) * 100.0;
        println!("Void samples: {} ({:.1}%)", void_count, void_pct);
    }

    Ok(())
}
