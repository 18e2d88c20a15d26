extern crate log;
pub mod archive;
pub mod config;
pub mod error;
pub mod geofile;
pub mod ingest;
pub mod store;
pub mod trace;
use crate::archive::extractor::RouteDocument;
use crate::config::load_config;
use crate::ingest::Ingestor;
use crate::store::blob::FileBlobStore;
use crate::store::file::FileStore;
use crate::store::{HighwayId, SegmentId, SegmentRange, TraceStore};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::PathBuf;

/// Ingest highway route files and slice them into concession segments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a KML or KMZ file as the master trace of a highway.
    Ingest {
        highway_id: HighwayId,
        route_filepath: PathBuf,
        /// MIME type reported by the uploader, if any.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Create or replace a segment of a highway.
    DefineSegment {
        highway_id: HighwayId,
        segment_id: SegmentId,
        km_inicial: f64,
        km_final: f64,
        /// Start of the segment in the km scale of the KML markers.
        #[arg(long, requires = "km_final_kml")]
        km_inicial_kml: Option<f64>,
        #[arg(long, requires = "km_inicial_kml")]
        km_final_kml: Option<f64>,
    },
    /// Recompute the traces of all segments of a highway.
    Reslice { highway_id: HighwayId },
    /// Print the coordinate of a km on a highway.
    Locate { highway_id: HighwayId, km: f64 },
}

#[derive(Serialize)]
struct Location {
    highway_id: HighwayId,
    km: f64,
    lon: f64,
    lat: f64,
}

fn print_yaml<T: Serialize>(value: &T) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    let config = load_config(&args.config_filepath)?;
    let store = FileStore::open(&config.data_dir)?;
    let blobs = config
        .blob_dir
        .as_ref()
        .map(FileBlobStore::open)
        .transpose()?;
    let mut ingestor = Ingestor::new(&store, config.pipeline.clone());
    if let Some(blobs) = &blobs {
        ingestor = ingestor.with_blob_store(blobs);
    }

    match args.command {
        Command::Ingest {
            highway_id,
            route_filepath,
            content_type,
        } => {
            log::info!("Reading route file {:?}", &route_filepath);
            let bytes = std::fs::read(&route_filepath)?;
            let mut document =
                RouteDocument::new(route_filepath.to_string_lossy().into_owned(), bytes);
            if let Some(content_type) = content_type {
                document = document.with_content_type(content_type);
            }
            let outcome = ingestor.ingest_upload(highway_id, &document)?;
            print_yaml(&outcome)?;
        }
        Command::DefineSegment {
            highway_id,
            segment_id,
            km_inicial,
            km_final,
            km_inicial_kml,
            km_final_kml,
        } => {
            let mut segment = SegmentRange::new(segment_id, km_inicial, km_final);
            if let (Some(start), Some(end)) = (km_inicial_kml, km_final_kml) {
                segment = segment.with_kml_range(start, end);
            }
            store.upsert_segment(highway_id, segment.clone())?;
            log::info!("Highway {}: segment {} saved", highway_id, segment_id);
            print_yaml(&segment)?;
        }
        Command::Reslice { highway_id } => {
            let bar = ProgressBar::new(0);
            let report = ingestor.reslice_highway(highway_id, &bar)?;
            print_yaml(&report)?;
        }
        Command::Locate { highway_id, km } => {
            let coord = ingestor.locate_km(highway_id, km)?;
            print_yaml(&Location {
                highway_id,
                km,
                lon: coord.x,
                lat: coord.y,
            })?;
        }
    }
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
