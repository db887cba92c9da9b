use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ProviderArgs;

/// SRTM elevation data CLI tool
#[derive(Parser)]
#[command(name = "srtm-tiles")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    provider: ProviderArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV file of coordinates
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Display information about a cached tile archive
    Info {
        /// Path to a .hgt.zip archive, or tile name (e.g., N52E004)
        #[arg(required_unless_present_all = ["lat", "lon"])]
        tile: Option<String>,

        /// Specify tile by latitude instead of name
        #[arg(long, conflicts_with = "tile", requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Specify tile by longitude instead of name
        #[arg(long, conflicts_with = "tile", requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// List tile archives in the cache directory
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(&cli.provider, lat, lon, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&cli.provider, input, output, lat_col, lon_col),
        Commands::Info { tile, lat, lon } => commands::info::run(&cli.provider, tile, lat, lon),
        Commands::List => commands::list::run(&cli.provider),
    }
}
