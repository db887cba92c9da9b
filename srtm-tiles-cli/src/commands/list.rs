use anyhow::Result;
use srtm_tiles::decode::inspect_archive;
use srtm_tiles::fetch::ARCHIVE_SUFFIX;
use srtm_tiles::locator::parse_tile_name;
use srtm_tiles::{SrtmResolution, TileKey};
use std::fs;

use super::{format_coverage, format_size, ProviderArgs};

pub fn run(args: &ProviderArgs) -> Result<()> {
    let provider = args.build()?;
    let dir = provider.cache_dir();

    let tiles = provider.cached_archives();
    if tiles.is_empty() {
        println!("No .hgt.zip archives found in: {}", dir.display());
        return Ok(());
    }

    let mut srtm1_count = 0;
    let mut srtm3_count = 0;
    let mut unknown_count = 0;
    let mut total_size: u64 = 0;

    println!(
        "{:<10} {:<14} {:>6} {:>28}",
        "TILE", "PARTITION", "TYPE", "COVERAGE"
    );
    println!("{}", "-".repeat(61));

    for name in &tiles {
        let path = dir.join(format!("{}{}", name, ARCHIVE_SUFFIX));
        total_size += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let resolution = match inspect_archive(&path).ok().and_then(|e| e.resolution()) {
            Some(SrtmResolution::Srtm1) => {
                srtm1_count += 1;
                "SRTM1"
            }
            Some(SrtmResolution::Srtm3) => {
                srtm3_count += 1;
                "SRTM3"
            }
            None => {
                unknown_count += 1;
                "???"
            }
        };

        let (coverage, partition) = match parse_tile_name(name) {
            Some((lat, lon)) => (
                format_coverage(lat, lon),
                provider
                    .areas()
                    .partition_for(TileKey::from_origin(lat, lon))
                    .unwrap_or("-"),
            ),
            None => ("Unknown".to_string(), "-"),
        };

        println!(
            "{:<10} {:<14} {:>6} {:>28}",
            name, partition, resolution, coverage
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    if srtm1_count > 0 {
        println!("  SRTM1 (30m): {}", srtm1_count);
    }
    if srtm3_count > 0 {
        println!("  SRTM3 (90m): {}", srtm3_count);
    }
    if unknown_count > 0 {
        println!("  Unreadable: {}", unknown_count);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Cache directory: {}", dir.display());

    Ok(())
}
