// Usage: target/release/context [--oa-ruc PATH] [--msoa-ruc PATH] [--best-fit PATH] ... [--output PATH]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use ruralurban::classification::{load_msoa_lookup, load_oa_lookup};
use ruralurban::context::{load_gardens, Context, ACCOMMODATION};
use ruralurban::load::{load_code_lookup, load_value_table};
use ruralurban::{Plot, Report};

/// Households, accommodation type and gardens by rural-urban class,
/// written as one workbook.
#[derive(Debug, Parser)]
#[clap(bin_name = "context")]
#[clap(author, version, about)]
struct Cli {
    #[clap(long, default_value = "data/RUC11_OA11_EW.csv")]
    #[clap(env = "OA_RUC")]
    oa_ruc: PathBuf,

    #[clap(long, default_value = "data/RUC11_MSOA11_EW.csv")]
    #[clap(env = "MSOA_RUC")]
    msoa_ruc: PathBuf,

    /// 2011 to 2021 output area best-fit lookup.
    #[clap(long, default_value = "data/OA11_OA21_EW_LU.csv")]
    #[clap(env = "OA_BEST_FIT")]
    best_fit: PathBuf,

    /// Census 2021 household counts per output area.
    #[clap(long, default_value = "data/households_oa21.csv")]
    #[clap(env = "OA_HOUSEHOLDS")]
    households: PathBuf,

    /// Census 2021 accommodation type per output area.
    #[clap(long, default_value = "data/accommodation_oa21.csv")]
    #[clap(env = "OA_ACCOMMODATION")]
    accommodation: PathBuf,

    /// Private outdoor space per MSOA.
    #[clap(long, default_value = "data/gardens_msoa.csv")]
    #[clap(env = "MSOA_GARDENS")]
    gardens: PathBuf,

    #[clap(short, long, default_value = "out/context/ruc_context.xlsx")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let out_dir = cli.output.parent().map(PathBuf::from).unwrap_or_default();
    if !out_dir.as_os_str().is_empty() {
        fs::create_dir_all(&out_dir)?;
    }

    let oa_classes = load_oa_lookup(&cli.oa_ruc, 2)?;
    let msoa_classes = load_msoa_lookup(&cli.msoa_ruc, 2)?;
    let best_fit = load_code_lookup(&cli.best_fit, "OA11CD", "OA21CD")?;
    let households = load_value_table(&cli.households, "2021 output area", &["2021"], 6)?;
    let accommodation =
        load_value_table(&cli.accommodation, "2021 output area", &ACCOMMODATION, 6)?;
    let gardens = load_gardens(&cli.gardens, 1)?;

    let context = Context::new(
        &oa_classes,
        &best_fit,
        &households,
        "2021",
        &accommodation,
        &msoa_classes,
        &gardens,
    );
    context.log_tables();
    context.write_workbook(&cli.output)?;
    context.plot(&out_dir)?;
    Ok(())
}
