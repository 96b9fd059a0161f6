// Usage: target/release/neighbours [--oa-boundaries PATH] [--output PATH]

use std::path::PathBuf;

use clap::Parser;
use ruralurban::build_neighbours;
use ruralurban::load::load_units;

/// Build the output area adjacency map and cache it as JSON.
#[derive(Debug, Parser)]
#[clap(bin_name = "neighbours")]
#[clap(author, version, about)]
struct Cli {
    /// GeoJSON output area boundaries.
    #[clap(short = 'b', long, default_value = "data/oa11_boundaries.geojson")]
    #[clap(env = "OA_BOUNDARIES")]
    oa_boundaries: PathBuf,

    /// Property holding each output area's code.
    #[clap(short, long, default_value = "OA11CD")]
    code_property: String,

    #[clap(short, long, default_value = "data/oa_neighbours.json")]
    #[clap(env = "OA_NEIGHBOURS")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let units = load_units(&cli.oa_boundaries, &cli.code_property)?;
    let neighbours = build_neighbours(&units);
    let links: usize = neighbours.iter().map(|(_, set)| set.len().saturating_sub(1)).sum();
    log::info!(
        "{} units, {} neighbour links",
        neighbours.len(),
        links / 2
    );
    neighbours.save(&cli.output)?;
    Ok(())
}
