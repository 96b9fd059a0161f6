// Usage: target/release/spacing [--points PATH] [--neighbours PATH] [--ruc PATH] [--out-dir DIR]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use indicatif::ProgressBar;
use ruralurban::classification::load_oa_lookup;
use ruralurban::load::load_assigned_points;
use ruralurban::ruc_spacing::SpacingByClass;
use ruralurban::spacing::estimate_with_progress;
use ruralurban::{Neighbours, Plot, Report, Spacing};

/// Mean nearest-neighbour UPRN spacing per output area, summarised by
/// rural-urban class.
#[derive(Debug, Parser)]
#[clap(bin_name = "spacing")]
#[clap(author, version, about)]
struct Cli {
    /// UPRNs tagged with their output area, as written by `assign_oa`.
    #[clap(short, long, default_value = "data/uprn_oa.csv")]
    #[clap(env = "UPRN_OA")]
    points: PathBuf,

    /// Adjacency map, as written by `neighbours`.
    #[clap(short, long, default_value = "data/oa_neighbours.json")]
    #[clap(env = "OA_NEIGHBOURS")]
    neighbours: PathBuf,

    /// 2011 rural-urban classification of output areas.
    #[clap(short, long, default_value = "data/RUC11_OA11_EW.csv")]
    #[clap(env = "OA_RUC")]
    ruc: PathBuf,

    /// Header rows above the column names in the classification file.
    #[clap(long, default_value_t = 2)]
    ruc_skip_rows: usize,

    #[clap(short, long, default_value = "out/spacing")]
    out_dir: PathBuf,

    /// Reuse `oa_spacing.json` from an earlier run instead of recomputing.
    #[clap(long)]
    reuse: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    fs::create_dir_all(&cli.out_dir)?;

    let cache = cli.out_dir.join("oa_spacing.json");
    let spacing = if cli.reuse && cache.exists() {
        let spacing = Spacing::load(&cache)?;
        log::info!("reusing spacing of {} units from {}", spacing.0.len(), cache.display());
        spacing
    } else {
        let points = load_assigned_points(&cli.points)?;
        let neighbours = Neighbours::load(&cli.neighbours)?;

        let bar = ProgressBar::new(neighbours.len() as u64);
        let (spacing, report) = estimate_with_progress(&points, &neighbours, &bar);
        report.log();

        spacing.save(&cache)?;
        spacing.write_csv(&cli.out_dir.join("oa_spacing.csv"))?;
        spacing
    };

    let areas = load_oa_lookup(&cli.ruc, cli.ruc_skip_rows)?;
    let by_class = SpacingByClass::new(&spacing, &areas);
    by_class.log_tables();
    by_class.write_csvs(&cli.out_dir)?;
    by_class.plot(&cli.out_dir)?;
    Ok(())
}
