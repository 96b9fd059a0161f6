// Usage: target/release/off_gas [--onspd PATH] [--households PATH] [--register PATH] [--out-dir DIR]

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use ruralurban::load::{load_postcode_column, load_postcode_directory};
use ruralurban::offgas::{load_household_counts, off_gas_households};
use ruralurban::Report;

/// Share of households off the gas grid, by rural-urban class.
#[derive(Debug, Parser)]
#[clap(bin_name = "off_gas")]
#[clap(author, version, about)]
struct Cli {
    /// Zipped ONS postcode directory.
    #[clap(long, default_value = "data/ONSPD_NOV_2022_UK.zip")]
    #[clap(env = "ONSPD_ZIP")]
    onspd: PathBuf,

    /// Household counts per postcode.
    #[clap(long, default_value = "data/postcode_households.csv")]
    #[clap(env = "POSTCODE_HOUSEHOLDS")]
    households: PathBuf,

    /// Postcodes not served by the gas grid.
    #[clap(long, default_value = "data/off_gas_postcodes.csv")]
    #[clap(env = "OFF_GAS_REGISTER")]
    register: PathBuf,

    #[clap(long, default_value = "Post Code")]
    register_column: String,

    #[clap(short, long, default_value = "out/off_gas")]
    out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    fs::create_dir_all(&cli.out_dir)?;

    let directory = load_postcode_directory(&cli.onspd)?;
    let counts = load_household_counts(&cli.households)?;
    let register: HashSet<String> = load_postcode_column(&cli.register, &cli.register_column)?
        .into_iter()
        .collect();
    log::info!("{} postcodes on the off-gas register", register.len());

    let off_gas = off_gas_households(&directory, &counts, &register);
    match off_gas.overall_prop() {
        Some(prop) => log::info!("{prop:.1}% of households are off the gas grid"),
        None => log::warn!("no households matched the postcode directory"),
    }
    off_gas.log_tables();
    off_gas.write_csvs(&cli.out_dir)?;
    Ok(())
}
