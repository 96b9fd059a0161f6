// Usage: target/release/building_uprns [--uprns PATH] [--buildings PATH] [--output PATH]
//
// Keeps only the UPRNs that fall inside a building footprint of one of the
// wanted feature codes. Footprints are indexed a chunk at a time and the
// UPRN file is re-read in batches against each chunk, so memory holds one
// chunk of buildings, one batch of points and the points kept so far.

use std::path::PathBuf;

use clap::Parser;
use ruralurban::filter_in_chunks;
use ruralurban::load::{building_chunks, write_rows, BatchReader};

/// Filter the UPRN point file down to points inside building footprints.
#[derive(Debug, Parser)]
#[clap(bin_name = "building_uprns")]
#[clap(author, version, about)]
struct Cli {
    /// CSV of UPRN, X_COORDINATE, Y_COORDINATE.
    #[clap(short, long, default_value = "data/osopenuprn.csv")]
    #[clap(env = "UPRN_CSV")]
    uprns: PathBuf,

    /// GeoJSON building footprints with a `feature_code` property.
    #[clap(short, long, default_value = "data/buildings.geojson")]
    #[clap(env = "BUILDINGS_GEOJSON")]
    buildings: PathBuf,

    /// Building feature codes to keep.
    #[clap(
        short,
        long,
        value_delimiter = ',',
        default_value = "15014,15024,15026,15027,15028"
    )]
    feature_codes: Vec<u32>,

    /// Buildings indexed per pass over the UPRNs.
    #[clap(long, default_value_t = 500_000)]
    chunk_size: usize,

    #[clap(long, default_value_t = 500_000)]
    batch_size: usize,

    #[clap(short, long, default_value = "data/filtered_uprns.csv")]
    #[clap(env = "FILTERED_UPRNS")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut chunks = building_chunks(&cli.buildings, &cli.feature_codes, cli.chunk_size)?;
    let (kept, report) = filter_in_chunks(
        chunks.by_ref(),
        || BatchReader::from_path(&cli.uprns),
        cli.batch_size,
    )?;
    chunks.log();
    report.log("building filter");

    write_rows(&cli.output, &kept)?;
    Ok(())
}
