//! Rural-urban context: households, accommodation type and gardens by
//! rural-urban class.
//!
//! Household and accommodation counts are 2021 OA figures reached from the
//! 2011 OAs through the best-fit lookup. Garden figures are per 2011 MSOA.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::classification::{AreaClass, MsoaRuc11, Ruc11};
use crate::error::Result;
use crate::kde::Grid;
use crate::load::{csv_reader_skipping, ValueTable};
use crate::plotting::plot_densities;
use crate::summary::{
    grouped_values, with_country_totals, Aggregation, ColumnSpec, GroupKey, Observation,
    SummaryTable,
};
use crate::traits::{Plot, Report};

pub const HOUSEHOLDS: &str = "Households";
/// Household share of the country (or total) block, in percent.
pub const HOUSEHOLD_SHARE: &str = "hh_prop";
pub const OA11_COUNT: &str = "OA11_Count";

pub const ACCOMMODATION: [&str; 7] = [
    "Detached",
    "Semi-detached",
    "Terraced",
    "In a purpose-built block of flats or tenement",
    "Part of a converted or shared house, including bedsits",
    "Part of another converted building, for example, former school, church or warehouse",
    "In a commercial building, for example, in an office building, hotel or over a shop",
];

/// Column names of the MSOA gardens sheet, in sheet order. The published
/// header has typos, so columns are read by position.
pub const GARDEN_COLUMNS: [&str; 26] = [
    "Country code",
    "Country name",
    "Region code",
    "Region name",
    "LAD code",
    "LAD name",
    "MSOA code",
    "MSOA name",
    "House: Address count",
    "House: Address with private outdoor space count",
    "House: Private outdoor space total area (m2)",
    "House: Percentage of addresses with private outdoor space",
    "House: Average size of private outdoor space (m2)",
    "House: Median size of private outdoor space (m2)",
    "Flat: Address count",
    "Flat: Address with private outdoor space count",
    "Flat: Private outdoor space total area (m2)",
    "Flat: Private outdoor space count",
    "Flat: Percentage of addresses with private outdoor space",
    "Flat: Average size of private outdoor space (m2)",
    "Flat: Average number of flats sharing a garden",
    "Total: Address count",
    "Total: Address with private outdoor space count",
    "Total: Private outdoor space total area (m2)",
    "Total: Percentage of addresses with private outdoor space",
    "Total: Average size of private outdoor space (m2)",
];

const MSOA_CODE: usize = 6;
const FIRST_GARDEN_VALUE: usize = 8;

pub const TOTAL_SHARE: &str = "Total: Percentage of addresses with private outdoor space";
pub const TOTAL_SIZE: &str = "Total: Average size of private outdoor space (m2)";
const TOTAL_GARDENS: [&str; 2] = [TOTAL_SHARE, TOTAL_SIZE];
pub const HOUSE_SHARE: &str = "House: Percentage of addresses with private outdoor space";
pub const HOUSE_SIZE: &str = "House: Average size of private outdoor space (m2)";
const HOUSE_GARDENS: [&str; 3] = [
    HOUSE_SHARE,
    HOUSE_SIZE,
    "House: Median size of private outdoor space (m2)",
];
const FLAT_GARDENS: [&str; 3] = [
    "Flat: Percentage of addresses with private outdoor space",
    "Flat: Average size of private outdoor space (m2)",
    "Flat: Average number of flats sharing a garden",
];

/// Garden values per MSOA code; cells that are not numbers are missing.
pub type GardenTable = HashMap<String, HashMap<String, f64>>;

pub fn load_gardens(path: &Path, skip_rows: usize) -> Result<GardenTable> {
    let mut rdr = csv_reader_skipping(path, skip_rows)?;
    let mut table = GardenTable::new();
    for record in rdr.records() {
        let record = record?;
        let Some(code) = record.get(MSOA_CODE).map(str::trim) else {
            continue;
        };
        if code.is_empty() {
            continue;
        }
        let values = GARDEN_COLUMNS
            .iter()
            .enumerate()
            .skip(FIRST_GARDEN_VALUE)
            .filter_map(|(i, name)| {
                let v = record.get(i)?.trim().replace(',', "").parse::<f64>().ok()?;
                Some((name.to_string(), v))
            })
            .collect();
        table.insert(code.to_string(), values);
    }
    log::info!("read gardens of {} MSOAs from {}", table.len(), path.display());
    Ok(table)
}

/// How the left joins went.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContextReport {
    pub oa11: usize,
    /// OA11s with no 2021 OA in the best-fit lookup.
    pub oa11_without_oa21: usize,
    /// OA11/OA21 rows with no household count.
    pub rows_without_households: usize,
    pub msoa11: usize,
    pub msoa11_without_gardens: usize,
}

/// The OA and MSOA observations the context tables are built from.
#[derive(Debug, Clone)]
pub struct Context {
    pub oa: Vec<Observation>,
    pub msoa: Vec<Observation>,
    pub report: ContextReport,
}

fn copy_values(
    mut obs: Observation,
    columns: &[&str],
    values: Option<&BTreeMap<String, f64>>,
) -> Observation {
    for column in columns {
        obs.set(column, values.and_then(|v| v.get(*column).copied()));
    }
    obs
}

impl Context {
    /// Join the OA classes to 2021 OA households and accommodation, and the
    /// MSOA classes to the garden figures. Every join is a left join; a
    /// 2011 OA split across several 2021 OAs contributes one row per 2021
    /// OA.
    pub fn new(
        oa_classes: &[AreaClass<Ruc11>],
        best_fit: &HashMap<String, Vec<String>>,
        households: &ValueTable,
        households_column: &str,
        accommodation: &ValueTable,
        msoa_classes: &[AreaClass<MsoaRuc11>],
        gardens: &GardenTable,
    ) -> Self {
        let mut report = ContextReport {
            oa11: oa_classes.len(),
            msoa11: msoa_classes.len(),
            ..ContextReport::default()
        };

        let mut oa = Vec::with_capacity(oa_classes.len());
        for area in oa_classes {
            let oa21s: Vec<Option<&String>> = match best_fit.get(&area.area) {
                Some(codes) if !codes.is_empty() => codes.iter().map(Some).collect(),
                _ => {
                    report.oa11_without_oa21 += 1;
                    vec![None]
                }
            };
            for oa21 in oa21s {
                let hh = oa21.and_then(|code| households.get(code));
                if hh.is_none() {
                    report.rows_without_households += 1;
                }
                let obs = Observation::new(area.country, &area.class).with_value(
                    HOUSEHOLDS,
                    hh.and_then(|v| v.get(households_column).copied()),
                );
                let accom = oa21.and_then(|code| accommodation.get(code));
                oa.push(copy_values(obs, &ACCOMMODATION, accom));
            }
        }

        let msoa = msoa_classes
            .iter()
            .map(|area| {
                let mut obs = Observation::new(area.country, &area.class);
                match gardens.get(&area.area) {
                    Some(values) => {
                        for (column, v) in values {
                            obs.set(column, Some(*v));
                        }
                    }
                    None => report.msoa11_without_gardens += 1,
                }
                obs
            })
            .collect();

        log::info!(
            "{} OA rows from {} OA11s ({} without an OA21, {} without households); {} MSOAs ({} without gardens)",
            oa.len(),
            report.oa11,
            report.oa11_without_oa21,
            report.rows_without_households,
            report.msoa11,
            report.msoa11_without_gardens
        );
        Context { oa, msoa, report }
    }

    pub fn household_summary(&self, keys: &[GroupKey]) -> SummaryTable {
        let specs = [
            ColumnSpec::new(HOUSEHOLDS, Aggregation::Count).named(OA11_COUNT),
            ColumnSpec::new(HOUSEHOLDS, Aggregation::Sum),
        ];
        with_country_totals(&self.oa, keys, &specs).with_proportion(HOUSEHOLDS, HOUSEHOLD_SHARE)
    }

    pub fn accommodation_summary(&self, keys: &[GroupKey]) -> SummaryTable {
        with_country_totals(&self.oa, keys, &ColumnSpec::sums(&ACCOMMODATION))
            .with_proportions(&ACCOMMODATION)
    }

    pub fn garden_summary(&self, keys: &[GroupKey], columns: &[&str]) -> SummaryTable {
        with_country_totals(&self.msoa, keys, &ColumnSpec::means(columns))
    }
}

const BROAD: [GroupKey; 2] = [GroupKey::Country, GroupKey::TwoFold];
const FULL_OA: [GroupKey; 3] = [GroupKey::Country, GroupKey::TwoFold, GroupKey::TenFold];
const FULL_MSOA: [GroupKey; 4] = [
    GroupKey::Country,
    GroupKey::TwoFold,
    GroupKey::Code,
    GroupKey::TenFold,
];

impl Report for Context {
    fn tables(&self) -> Vec<(String, SummaryTable)> {
        vec![
            ("Broad Summary OA21 Household".to_string(), self.household_summary(&BROAD)),
            ("Full Summary OA21 Household".to_string(), self.household_summary(&FULL_OA)),
            ("Broad Summary OA21 Accom. Type".to_string(), self.accommodation_summary(&BROAD)),
            ("Full Summary OA21 Accom. Type".to_string(), self.accommodation_summary(&FULL_OA)),
            (
                "Broad Summary MSOA11 Gardens".to_string(),
                self.garden_summary(&BROAD, &TOTAL_GARDENS),
            ),
            (
                "Full Summary MSOA11 Gardens".to_string(),
                self.garden_summary(&FULL_MSOA, &TOTAL_GARDENS),
            ),
            (
                "Broad Houses MSOA11 Gardens".to_string(),
                self.garden_summary(&BROAD, &HOUSE_GARDENS),
            ),
            (
                "Full Houses MSOA11 Gardens".to_string(),
                self.garden_summary(&FULL_MSOA, &HOUSE_GARDENS),
            ),
            ("Broad Flats MSOA11 Gardens".to_string(), self.garden_summary(&BROAD, &FLAT_GARDENS)),
            (
                "Full Flats MSOA11 Gardens".to_string(),
                self.garden_summary(&FULL_MSOA, &FLAT_GARDENS),
            ),
        ]
    }
}

pub const SHARE_GRID: Grid = Grid::new(0.0, 1.0, 1001);
pub const SIZE_GRID: Grid = Grid::new(0.0, 2_500.0, 1001);

const SHARE_DESC: &str = "Proportion of addresses with private outdoor space";
const SIZE_DESC: &str = "Average size of private outdoor space (m2)";

/// A density chart of one MSOA garden measure split by class.
struct GardenChart {
    file: &'static str,
    key: GroupKey,
    column: &'static str,
}

impl GardenChart {
    const fn new(file: &'static str, key: GroupKey, column: &'static str) -> Self {
        GardenChart { file, key, column }
    }

    fn axis(&self) -> (&'static str, Grid) {
        if self.column == TOTAL_SHARE || self.column == HOUSE_SHARE {
            (SHARE_DESC, SHARE_GRID)
        } else {
            (SIZE_DESC, SIZE_GRID)
        }
    }
}

const GARDEN_CHARTS: [GardenChart; 7] = [
    GardenChart::new("gardens_share_broad.png", GroupKey::TwoFold, TOTAL_SHARE),
    GardenChart::new("gardens_share_full.png", GroupKey::TenFold, TOTAL_SHARE),
    GardenChart::new("gardens_share_condensed.png", GroupKey::Condensed, TOTAL_SHARE),
    GardenChart::new("gardens_size_broad.png", GroupKey::TwoFold, TOTAL_SIZE),
    GardenChart::new("gardens_size_full.png", GroupKey::TenFold, TOTAL_SIZE),
    GardenChart::new("houses_share_broad.png", GroupKey::TwoFold, HOUSE_SHARE),
    GardenChart::new("houses_size_broad.png", GroupKey::TwoFold, HOUSE_SIZE),
];

impl Plot for Context {
    fn plot(&self, out_dir: &Path) -> Result<()> {
        for chart in &GARDEN_CHARTS {
            let (x_desc, grid) = chart.axis();
            let groups = grouped_values(&self.msoa, chart.key, chart.column, None);
            plot_densities(&out_dir.join(chart.file), x_desc, chart.key, &groups, grid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classification::Country;
    use std::io::Write;

    fn oa(code: &str, class: Ruc11) -> AreaClass<Ruc11> {
        AreaClass {
            area: code.to_string(),
            country: Country::from_area_code(code).unwrap(),
            class,
        }
    }

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn context() -> Context {
        let oa_classes = vec![
            oa("E00000001", Ruc11::A1),
            oa("E00000002", Ruc11::E1),
            oa("W00000003", Ruc11::C1),
            oa("W00000004", Ruc11::F1),
        ];
        let best_fit: HashMap<String, Vec<String>> = [
            ("E00000001", vec!["E00100001"]),
            ("E00000002", vec!["E00100002", "E00100003"]),
            ("W00000003", vec!["W00100003"]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect();
        let households: ValueTable = [
            ("E00100001", 300.0),
            ("E00100002", 50.0),
            ("E00100003", 50.0),
            ("W00100003", 100.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), values(&[("2021", v)])))
        .collect();
        let accommodation: ValueTable = [
            ("E00100001", values(&[("Detached", 10.0), ("Terraced", 290.0)])),
            ("E00100002", values(&[("Detached", 40.0), ("Terraced", 10.0)])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let msoa_classes = vec![
            AreaClass {
                area: "E02000001".to_string(),
                country: Country::England,
                class: MsoaRuc11::A1,
            },
            AreaClass {
                area: "E02000002".to_string(),
                country: Country::England,
                class: MsoaRuc11::E1,
            },
        ];
        let gardens: GardenTable = [(
            "E02000001".to_string(),
            HashMap::from([(TOTAL_SHARE.to_string(), 0.8)]),
        )]
        .into_iter()
        .collect();

        Context::new(
            &oa_classes,
            &best_fit,
            &households,
            "2021",
            &accommodation,
            &msoa_classes,
            &gardens,
        )
    }

    #[test]
    fn test_left_joins() {
        let ctx = context();
        assert_eq!(ctx.oa.len(), 5);
        assert_eq!(
            ctx.report,
            ContextReport {
                oa11: 4,
                oa11_without_oa21: 1,
                rows_without_households: 1,
                msoa11: 2,
                msoa11_without_gardens: 1,
            }
        );
    }

    #[test]
    fn test_household_summary() {
        let table = context().household_summary(&BROAD);
        assert_eq!(table.get(&["England", "Rural"], OA11_COUNT), Some(2.0));
        assert_eq!(table.get(&["England", "Rural"], HOUSEHOLDS), Some(100.0));
        assert_eq!(table.get(&["England", "Rural"], HOUSEHOLD_SHARE), Some(25.0));
        // the unmatched Welsh OA counts but adds no households
        assert_eq!(table.get(&["Wales", "Rural"], OA11_COUNT), Some(1.0));
        assert_eq!(table.get(&["Wales", "Rural"], HOUSEHOLDS), Some(0.0));
        assert_eq!(table.get(&["Total", "Urban"], HOUSEHOLD_SHARE), Some(80.0));
        assert_eq!(table.columns, [OA11_COUNT, HOUSEHOLDS, "hh_prop"]);
    }

    #[test]
    fn test_accommodation_proportions() {
        let table = context().accommodation_summary(&BROAD);
        assert_eq!(table.get(&["England", "Rural"], "Detached_prop"), Some(80.0));
        assert_eq!(table.get(&["England", "Urban"], "Terraced_prop"), Some(96.7));
    }

    #[test]
    fn test_garden_means_and_sheets() {
        let ctx = context();
        let table = ctx.garden_summary(&FULL_MSOA, &TOTAL_GARDENS);
        assert_eq!(
            table.get(&["England", "Urban", "A1", "Urban major conurbation"], TOTAL_SHARE),
            Some(0.8)
        );
        assert_eq!(
            table.get(&["England", "Rural", "E1", "Rural village and dispersed"], TOTAL_SHARE),
            None
        );
        let names: Vec<_> = ctx.tables().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[9], "Full Flats MSOA11 Gardens");
    }

    #[test]
    fn test_house_charts_use_two_fold_classes() {
        let houses: Vec<_> = GARDEN_CHARTS
            .iter()
            .filter(|chart| chart.column.starts_with("House:"))
            .map(|chart| (chart.file, chart.key, chart.axis()))
            .collect();
        assert_eq!(
            houses,
            [
                ("houses_share_broad.png", GroupKey::TwoFold, (SHARE_DESC, SHARE_GRID)),
                ("houses_size_broad.png", GroupKey::TwoFold, (SIZE_DESC, SIZE_GRID)),
            ]
        );
        let mut files: Vec<_> = GARDEN_CHARTS.iter().map(|chart| chart.file).collect();
        files.sort_unstable();
        files.dedup();
        assert_eq!(files.len(), GARDEN_CHARTS.len());
    }

    #[test]
    fn test_gardens_read_by_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut row: Vec<String> = vec![
            "E92000001", "England", "E12000001", "North East", "E06000001", "Hartlepool",
            "E02002483", "Hartlepool 001",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        row.extend((8..26).map(|i| format!("{i}")));
        row[24] = "0.93".to_string();
        row[25] = "[c]".to_string();
        write!(
            file,
            "Access to gardens\nheader with typos\n\"{}\"\nfootnote\n",
            row.join("\",\"")
        )
        .unwrap();

        let gardens = load_gardens(file.path(), 1).unwrap();
        assert_eq!(gardens.len(), 1);
        let msoa = &gardens["E02002483"];
        assert_eq!(msoa[TOTAL_SHARE], 0.93);
        assert!(!msoa.contains_key(TOTAL_SIZE));
        assert_eq!(msoa["House: Address count"], 8.0);
    }
}
