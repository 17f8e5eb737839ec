use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde_json::Value;

use perimetra::overpass::DEFAULT_OVERPASS_URL;
use perimetra::{
    BoundaryError, BoundingBox, BuilderConfig, HighwayGraphBuilder, NamePattern, OverpassClient,
    PbfHighwaySource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Trace the closed boundary formed by named OSM highways", long_about = None)]
struct Cli {
    /// Bounding box as min_lon,min_lat,max_lon,max_lat
    #[arg(long, value_name = "BBOX", allow_hyphen_values = true)]
    bbox: BoundingBox,

    /// Highway name pattern; repeat once per street around the region
    #[arg(long = "highway", value_name = "PATTERN", required = true)]
    highways: Vec<String>,

    /// Read highways from a local PBF extract instead of Overpass
    #[arg(long, value_name = "FILE", conflicts_with = "overpass_url")]
    pbf: Option<PathBuf>,

    #[arg(long, value_name = "URL", default_value = DEFAULT_OVERPASS_URL)]
    overpass_url: String,

    /// JSON file with builder settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to write the boundary GeoJSON
    #[arg(long, value_name = "FILE", default_value = "boundary.geojson")]
    output: PathBuf,

    /// Also write a per-highway diagnostic overlay
    #[arg(long, value_name = "FILE")]
    diagnostics: Option<PathBuf>,
}

fn write_geojson(path: &Path, value: &Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    info!("Tracing boundary in {} from {:?}", cli.bbox, cli.highways);

    let mut config = match &cli.config {
        Some(path) => BuilderConfig::from_file(path)?,
        None => BuilderConfig::default(),
    };
    if cli.diagnostics.is_some() {
        config.diagnostics = true;
    }

    let patterns = cli
        .highways
        .iter()
        .map(|p| NamePattern::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    let highways = match &cli.pbf {
        Some(path) => PbfHighwaySource::new(path)?.load(&cli.bbox, &patterns)?,
        None => {
            OverpassClient::new(&cli.overpass_url)?
                .fetch_highways(&cli.bbox, &patterns)
                .await?
        }
    };

    let builder = HighwayGraphBuilder::new(highways, config)?;
    match builder.build() {
        Ok(result) => {
            write_geojson(&cli.output, &result.boundary.to_geojson(true, &result.highways))?;
            if let (Some(path), Some(overlay)) = (&cli.diagnostics, &result.diagnostics) {
                write_geojson(path, overlay)?;
            }
            info!(
                "Boundary: {} points over {}",
                result.boundary.len(),
                result.highways.join(" -> ")
            );
        }
        Err(error @ BoundaryError::InvalidInput { .. }) => return Err(error.into()),
        Err(error) => {
            warn!("{}", error);
            if let Some(partial) = error.partial() {
                match &partial.boundary {
                    Some(boundary) => {
                        write_geojson(&cli.output, &boundary.to_geojson(false, &partial.highways))?
                    }
                    None => warn!("No partial boundary to write"),
                }
                if let (Some(path), Some(overlay)) = (&cli.diagnostics, &partial.diagnostics) {
                    write_geojson(path, overlay)?;
                }
            }
        }
    }

    Ok(())
}
