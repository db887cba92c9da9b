use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use srtm_tiles::ElevationProvider;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::ProviderArgs;

pub fn run(
    args: &ProviderArgs,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    let provider = args.build()?;

    let output_path = output.unwrap_or_else(|| default_output_path(&input));
    let summary = process_csv(&provider, &input, &output_path, &lat_col, &lon_col)?;

    println!("Output written to: {}", output_path.display());
    if summary.failed > 0 {
        println!(
            "{} of {} rows failed, their elevation is left empty",
            summary.failed, summary.total
        );
    }
    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}

#[derive(Debug, Default, PartialEq)]
struct BatchSummary {
    total: u64,
    failed: u64,
}

/// Cell written to the `elevation` column for one row.
///
/// `void` marks a sample without data, an empty cell a row that could not
/// be resolved.
fn elevation_cell(provider: &ElevationProvider, lat: &str, lon: &str) -> Result<String> {
    let lat: f64 = lat.trim().parse().context("Invalid latitude")?;
    let lon: f64 = lon.trim().parse().context("Invalid longitude")?;

    let elevation = provider.elevation_at(lat, lon)?;
    Ok(if elevation.is_nan() {
        "void".to_string()
    } else {
        elevation.to_string()
    })
}

fn process_csv(
    provider: &ElevationProvider,
    input: &Path,
    output_path: &Path,
    lat_col: &str,
    lon_col: &str,
) -> Result<BatchSummary> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    // Collect records for progress bar
    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let output_file = File::create(output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    let mut summary = BatchSummary::default();
    for (i, record) in records.iter().enumerate() {
        summary.total += 1;

        let lat = record.get(lat_idx).unwrap_or("");
        let lon = record.get(lon_idx).unwrap_or("");
        let elevation = match elevation_cell(provider, lat, lon) {
            Ok(cell) => cell,
            Err(e) => {
                // Header is line 1
                tracing::warn!(line = i + 2, lat, lon, error = %format!("{:#}", e), "Row failed");
                summary.failed += 1;
                String::new()
            }
        };

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&elevation);
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_with_message("done");
    writer.flush()?;

    Ok(summary)
}
