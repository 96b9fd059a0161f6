// Usage: target/release/heat_pumps [--installations PATH] [--onspd PATH] [--ruc PATH] [--dwellings PATH] [--out-dir DIR]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use ruralurban::classification::load_oa_lookup;
use ruralurban::heatpump::{dwelling_denominators, load_installations, HeatPumps};
use ruralurban::load::{load_postcode_directory, load_value_table};
use ruralurban::{Plot, Report};

/// Air source heat pump installation rates by rural-urban class and year.
#[derive(Debug, Parser)]
#[clap(bin_name = "heat_pumps")]
#[clap(author, version, about)]
struct Cli {
    /// Installation records with postcode, technology and commission date.
    #[clap(short, long, default_value = "data/mcs_installations.csv")]
    #[clap(env = "MCS_INSTALLATIONS")]
    installations: PathBuf,

    #[clap(long, default_value = "data/ONSPD_NOV_2022_UK.zip")]
    #[clap(env = "ONSPD_ZIP")]
    onspd: PathBuf,

    #[clap(short, long, default_value = "data/RUC11_OA11_EW.csv")]
    #[clap(env = "OA_RUC")]
    ruc: PathBuf,

    /// Census 2011 dwelling counts per output area.
    #[clap(short, long, default_value = "data/dwellings_oa11.csv")]
    #[clap(env = "OA_DWELLINGS")]
    dwellings: PathBuf,

    #[clap(long, default_value = "2011")]
    dwellings_column: String,

    #[clap(long, default_value_t = 7)]
    dwellings_skip_rows: usize,

    #[clap(short, long, default_value = "out/heat_pumps")]
    out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    fs::create_dir_all(&cli.out_dir)?;

    let (installs, malformed) = load_installations(&cli.installations)?;
    if malformed > 0 {
        log::warn!("{malformed} installation rows skipped");
    }
    let directory = load_postcode_directory(&cli.onspd)?;
    let areas = load_oa_lookup(&cli.ruc, 2)?;
    let dwellings = load_value_table(
        &cli.dwellings,
        "2011 output area",
        &[cli.dwellings_column.as_str()],
        cli.dwellings_skip_rows,
    )?;
    let dwellings = dwelling_denominators(&areas, &dwellings, &cli.dwellings_column);

    let heat_pumps = HeatPumps::new(&installs, &directory, dwellings);
    heat_pumps.log_tables();
    heat_pumps.write_csvs(&cli.out_dir)?;
    heat_pumps.plot(&cli.out_dir)?;
    Ok(())
}
