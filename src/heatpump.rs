//! Air source heat pump installation rates by rural-urban class.
//!
//! MCS installation records are matched to the postcode directory for an
//! output-area class and compared with the dwellings in each class:
//! installations per 10 000 dwellings per commission year, and over a
//! trailing 365-day window.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Deserialize;

use crate::classification::{AreaClass, Country, Ruc11};
use crate::error::{Error, Result};
use crate::load::{PostcodeDirectory, ValueTable};
use crate::model::normalise_postcode;
use crate::plotting::{group_colour, line_chart, Series};
use crate::summary::{
    summarise, Aggregation, ColumnSpec, GroupKey, Label, Observation, SummaryTable,
};
use crate::traits::{Plot, Report};

pub const AIR_SOURCE: &str = "Air Source Heat Pump";
pub const INSTALLS: &str = "installs";
pub const DWELLINGS: &str = "dwellings";
pub const INSTALL_RATE: &str = "install_rate";
/// Rates are per this many dwellings.
pub const PER_DWELLINGS: f64 = 10_000.0;

#[derive(Debug, Deserialize)]
struct InstallRow {
    postcode: String,
    tech_type: String,
    commission_date: String,
    commission_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub postcode: String,
    pub tech_type: String,
    pub commission_date: NaiveDate,
    pub commission_year: i32,
}

/// Dates come as "2023-01-31", optionally followed by a time.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| Error::ParseDate(raw.to_string()))
}

impl TryFrom<InstallRow> for Installation {
    type Error = Error;

    fn try_from(row: InstallRow) -> Result<Self> {
        let commission_date = parse_date(&row.commission_date)?;
        Ok(Installation {
            postcode: normalise_postcode(&row.postcode),
            tech_type: row.tech_type.trim().to_string(),
            commission_year: row.commission_year.unwrap_or(commission_date.year()),
            commission_date,
        })
    }
}

/// Read the MCS export; rows that do not parse are skipped and counted.
pub fn load_installations(path: &Path) -> Result<(Vec<Installation>, usize)> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut installs = Vec::new();
    let mut malformed = 0;
    for row in rdr.deserialize::<InstallRow>() {
        match row.map_err(Error::from).and_then(Installation::try_from) {
            Ok(install) => installs.push(install),
            Err(e) => {
                log::debug!("skipping installation row: {e}");
                malformed += 1;
            }
        }
    }
    log::info!(
        "read {} installations from {} ({} malformed rows skipped)",
        installs.len(),
        path.display(),
        malformed
    );
    Ok((installs, malformed))
}

/// Dwellings per RUC11 code and per two-fold setting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dwellings {
    pub by_code: HashMap<String, f64>,
    pub by_setting: HashMap<String, f64>,
    pub table: SummaryTable,
}

fn to_lookup(table: &SummaryTable, column: &str) -> HashMap<String, f64> {
    let Some(idx) = table.column(column) else {
        return HashMap::new();
    };
    table
        .rows
        .iter()
        .filter_map(|row| Some((row.labels.first()?.text.clone(), row.values[idx]?)))
        .collect()
}

/// Left join the OA classes to the census dwelling counts and total them
/// by class. OAs without a count add nothing.
pub fn dwelling_denominators(
    areas: &[AreaClass<Ruc11>],
    dwellings: &ValueTable,
    column: &str,
) -> Dwellings {
    let records: Vec<_> = areas
        .iter()
        .map(|area| {
            let count = dwellings.get(&area.area).and_then(|v| v.get(column).copied());
            Observation::new(area.country, &area.class).with_value(DWELLINGS, count)
        })
        .collect();

    let specs = [ColumnSpec::new(DWELLINGS, Aggregation::Sum)];
    let table = summarise(&records, &[GroupKey::Code, GroupKey::TenFold], &specs);
    let by_setting = summarise(&records, &[GroupKey::TwoFold], &specs);
    if let Some(missing) = table.missing.get(DWELLINGS) {
        log::warn!("{missing} output areas have no dwelling count");
    }
    Dwellings {
        by_code: to_lookup(&table, DWELLINGS),
        by_setting: to_lookup(&by_setting, DWELLINGS),
        table,
    }
}

/// Installations kept for the rates, and how many were dropped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterCounts {
    pub read: usize,
    pub other_technology: usize,
    /// No directory match or no valid RUC11 code.
    pub unclassified: usize,
    pub kept: usize,
}

/// One air source heat pump with its class.
#[derive(Debug, Clone)]
pub struct ClassifiedInstall {
    pub date: NaiveDate,
    pub observation: Observation,
}

pub fn classify_installations(
    installs: &[Installation],
    directory: &PostcodeDirectory,
) -> (Vec<ClassifiedInstall>, FilterCounts) {
    let mut counts = FilterCounts {
        read: installs.len(),
        ..FilterCounts::default()
    };
    let mut kept = Vec::new();
    for install in installs {
        if install.tech_type != AIR_SOURCE {
            counts.other_technology += 1;
            continue;
        }
        let classified = directory.get(&install.postcode).and_then(|entry| {
            let country = Country::from_area_code(&entry.oa11)?;
            Some((country, Ruc11::parse(&entry.ru11ind)?))
        });
        let Some((country, class)) = classified else {
            counts.unclassified += 1;
            continue;
        };
        kept.push(ClassifiedInstall {
            date: install.commission_date,
            observation: Observation::new(country, &class).with_year(install.commission_year),
        });
    }
    counts.kept = kept.len();
    log::info!(
        "{} of {} installations kept ({} other technologies, {} without a class)",
        counts.kept,
        counts.read,
        counts.other_technology,
        counts.unclassified
    );
    (kept, counts)
}

/// Trailing 365-day installation rate at each installation date.
///
/// The window at date t covers (t - 365 days, t], and installations on the
/// same day each close their own window, so the count steps up by one per
/// record.
pub fn rolling_rate(dates: &[NaiveDate], dwellings: f64) -> Vec<(NaiveDate, f64)> {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    let window = Duration::days(365);
    let mut left = 0;
    sorted
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            while sorted[left] <= date - window {
                left += 1;
            }
            let count = (i - left + 1) as f64;
            (date, count * PER_DWELLINGS / dwellings)
        })
        .collect()
}

/// Calendar date as a fractional year, for plotting on a numeric axis.
pub fn fractional_year(date: NaiveDate) -> f64 {
    let days_in_year = if NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    date.year() as f64 + date.ordinal0() as f64 / days_in_year
}

#[derive(Debug, Clone)]
pub struct HeatPumps {
    pub installs: Vec<ClassifiedInstall>,
    pub counts: FilterCounts,
    pub dwellings: Dwellings,
    pub broad_rates: SummaryTable,
    pub full_rates: SummaryTable,
}

impl HeatPumps {
    pub fn new(
        installs: &[Installation],
        directory: &PostcodeDirectory,
        dwellings: Dwellings,
    ) -> Self {
        let (installs, counts) = classify_installations(installs, directory);
        let records: Vec<Observation> = installs.iter().map(|i| i.observation.clone()).collect();
        let count = [ColumnSpec::new(INSTALLS, Aggregation::Count)];

        let broad_rates = summarise(&records, &[GroupKey::Year, GroupKey::TwoFold], &count)
            .with_lookup(GroupKey::TwoFold, &dwellings.by_setting, DWELLINGS)
            .with_ratio(INSTALLS, DWELLINGS, INSTALL_RATE, PER_DWELLINGS);
        let full_rates = summarise(
            &records,
            &[GroupKey::Year, GroupKey::Code, GroupKey::Name],
            &count,
        )
        .with_lookup(GroupKey::Code, &dwellings.by_code, DWELLINGS)
        .with_ratio(INSTALLS, DWELLINGS, INSTALL_RATE, PER_DWELLINGS);

        HeatPumps {
            installs,
            counts,
            dwellings,
            broad_rates,
            full_rates,
        }
    }

    /// Rolling rate per group of `key`, against that group's dwellings.
    pub fn rolling_rates(&self, key: GroupKey) -> Vec<(Label, Vec<(NaiveDate, f64)>)> {
        let (denominators, denominator_key) = match key {
            GroupKey::TwoFold => (&self.dwellings.by_setting, GroupKey::TwoFold),
            _ => (&self.dwellings.by_code, GroupKey::Code),
        };
        let mut dates: HashMap<Label, (String, Vec<NaiveDate>)> = HashMap::new();
        for install in &self.installs {
            let label = key.label(&install.observation);
            let lookup = denominator_key.label(&install.observation).text;
            dates
                .entry(label)
                .or_insert_with(|| (lookup, Vec::new()))
                .1
                .push(install.date);
        }

        let mut out: Vec<_> = dates
            .into_iter()
            .filter_map(|(label, (lookup, dates))| {
                let Some(&dwellings) = denominators.get(&lookup) else {
                    log::warn!("no dwellings for {}", label.text);
                    return None;
                };
                Some((label, rolling_rate(&dates, dwellings)))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn yearly_series(&self, table: &SummaryTable, key: GroupKey) -> Vec<Series> {
        let (Some(k), Some(y), Some(v)) = (
            table.keys.iter().position(|h| h == key.header()),
            table.keys.iter().position(|h| h == GroupKey::Year.header()),
            table.column(INSTALL_RATE),
        ) else {
            return vec![];
        };
        let mut lines: Vec<(Label, Vec<(f64, f64)>)> = Vec::new();
        for row in &table.rows {
            let Some(rate) = row.values[v] else { continue };
            let label = &row.labels[k];
            let point = (f64::from(row.labels[y].rank), rate);
            match lines.iter_mut().find(|(l, _)| l == label) {
                Some((_, points)) => points.push(point),
                None => lines.push((label.clone(), vec![point])),
            }
        }
        lines.sort_by(|a, b| a.0.cmp(&b.0));
        lines
            .into_iter()
            .map(|(label, points)| Series::new(&label.text, colour(key, &label), points))
            .collect()
    }

    fn rolling_series(&self, key: GroupKey) -> Vec<Series> {
        self.rolling_rates(key)
            .into_iter()
            .map(|(label, rates)| {
                let points = rates
                    .iter()
                    .map(|(date, rate)| (fractional_year(*date), *rate))
                    .collect();
                Series::new(&label.text, colour(key, &label), points)
            })
            .collect()
    }
}

fn colour(key: GroupKey, label: &Label) -> plotters::style::RGBColor {
    match key {
        GroupKey::Name => group_colour(GroupKey::Code, label),
        _ => group_colour(key, label),
    }
}

impl Report for HeatPumps {
    fn tables(&self) -> Vec<(String, SummaryTable)> {
        vec![
            ("Dwellings by RUC11".to_string(), self.dwellings.table.clone()),
            ("Broad Install Rates".to_string(), self.broad_rates.clone()),
            (
                "Broad Install Rates by Year".to_string(),
                self.broad_rates
                    .pivot(GroupKey::TwoFold, GroupKey::Year, INSTALL_RATE),
            ),
            ("Full Install Rates".to_string(), self.full_rates.clone()),
            (
                "Full Install Rates by Year".to_string(),
                self.full_rates.pivot(GroupKey::Name, GroupKey::Year, INSTALL_RATE),
            ),
        ]
    }
}

impl Plot for HeatPumps {
    fn plot(&self, out_dir: &Path) -> Result<()> {
        let y_desc = "Heat Pump Installation Rate (per 10,000 households)";
        line_chart(
            &out_dir.join("ashp_rate_broad.png"),
            "Year",
            y_desc,
            &self.yearly_series(&self.broad_rates, GroupKey::TwoFold),
        )?;
        line_chart(
            &out_dir.join("ashp_rate_full.png"),
            "Year",
            y_desc,
            &self.yearly_series(&self.full_rates, GroupKey::Name),
        )?;
        line_chart(
            &out_dir.join("ashp_rolling_rate_broad.png"),
            "Year",
            y_desc,
            &self.rolling_series(GroupKey::TwoFold),
        )?;
        line_chart(
            &out_dir.join("ashp_rolling_rate_full.png"),
            "Year",
            y_desc,
            &self.rolling_series(GroupKey::Name),
        )
    }
}
