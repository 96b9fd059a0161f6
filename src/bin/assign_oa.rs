// Usage: target/release/assign_oa [--uprns PATH] [--oa-boundaries PATH] [--output PATH]

use std::path::PathBuf;

use clap::Parser;
use ruralurban::load::{load_units, write_rows, BatchReader};
use ruralurban::{assign_batched, AddressPoint, PolygonIndex};

/// Tag each filtered UPRN with the code of the output area containing it.
#[derive(Debug, Parser)]
#[clap(bin_name = "assign_oa")]
#[clap(author, version, about)]
struct Cli {
    /// Filtered UPRNs, as written by `building_uprns`.
    #[clap(short, long, default_value = "data/filtered_uprns.csv")]
    #[clap(env = "FILTERED_UPRNS")]
    uprns: PathBuf,

    #[clap(short = 'b', long, default_value = "data/oa11_boundaries.geojson")]
    #[clap(env = "OA_BOUNDARIES")]
    oa_boundaries: PathBuf,

    #[clap(short, long, default_value = "OA11CD")]
    code_property: String,

    #[clap(long, default_value_t = 500_000)]
    batch_size: usize,

    #[clap(short, long, default_value = "data/uprn_oa.csv")]
    #[clap(env = "UPRN_OA")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let index = PolygonIndex::new(load_units(&cli.oa_boundaries, &cli.code_property)?);

    let mut reader: BatchReader<_, AddressPoint> = BatchReader::from_path(&cli.uprns)?;
    let mut assignment = assign_batched(&index, || reader.next_batch(cli.batch_size));
    assignment.report.malformed = reader.malformed;
    assignment.report.log("output area assignment");

    write_rows(&cli.output, &assignment.points)?;
    Ok(())
}
