use anyhow::{Context, Result};
use serde::Serialize;

use super::ProviderArgs;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
}

pub fn run(args: &ProviderArgs, lat: f64, lon: f64, json: bool) -> Result<()> {
    let provider = args.build()?;

    let elevation = provider
        .elevation_at(lat, lon)
        .with_context(|| format!("Failed to get elevation at {}, {}", lat, lon))?;

    // NaN marks a void sample
    let elevation = (!elevation.is_nan()).then_some(elevation);

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            Some(elev) => println!("{}", elev),
            None => println!("void"),
        }
    }

    Ok(())
}
