//! Grouped summaries of classified areas.
//!
//! Every table in the analyses is one call to [`summarise`] with a list of
//! [`GroupKey`]s and [`ColumnSpec`]s, followed by derived columns
//! ([`SummaryTable::with_proportions`], [`SummaryTable::with_ratio`]).
//! Rows come out in the published order of the classes, not alphabetically.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::classification::{Classified, Country, Setting};
use crate::error::{Error, Result};

/// A group label that sorts by `rank` before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub rank: i32,
    pub text: String,
}

impl Label {
    pub fn new(rank: i32, text: impl Into<String>) -> Self {
        Label {
            rank,
            text: text.into(),
        }
    }
}

pub const TOTAL: &str = "Total";

fn country_label(country: Country) -> Label {
    match country {
        Country::England => Label::new(0, "England"),
        Country::Wales => Label::new(1, "Wales"),
    }
}

fn total_label() -> Label {
    Label::new(2, TOTAL)
}

/// One classified area (or record) and its numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub country: Country,
    pub code: &'static str,
    pub name: &'static str,
    pub ten_fold: &'static str,
    pub condensed: &'static str,
    pub setting: Setting,
    pub rank: u8,
    pub year: Option<i32>,
    values: HashMap<String, f64>,
}

impl Observation {
    pub fn new(country: Country, class: &impl Classified) -> Self {
        Observation {
            country,
            code: class.code(),
            name: class.name(),
            ten_fold: class.ten_fold(),
            condensed: class.condensed(),
            setting: class.setting(),
            rank: class.rank(),
            year: None,
            values: HashMap::new(),
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_value(mut self, column: &str, value: Option<f64>) -> Self {
        self.set(column, value);
        self
    }

    /// `None` leaves the cell missing.
    pub fn set(&mut self, column: &str, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.values.insert(column.to_string(), v);
            }
            _ => {
                self.values.remove(column);
            }
        }
    }

    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Country,
    TwoFold,
    Code,
    Name,
    TenFold,
    /// Urban classes merged, rural classes kept apart.
    Condensed,
    Year,
}

impl GroupKey {
    pub fn header(&self) -> &'static str {
        match self {
            GroupKey::Country => "Country",
            GroupKey::TwoFold => "Rural Urban Classification 2011 (2 fold)",
            GroupKey::Code => "Rural Urban Classification 2011 code",
            GroupKey::Name => "ruc_name",
            GroupKey::TenFold => "Rural Urban Classification 2011 (10 fold)",
            GroupKey::Condensed => "ruc_condense",
            GroupKey::Year => "commission_year",
        }
    }

    pub fn label(&self, obs: &Observation) -> Label {
        let class_rank = i32::from(obs.rank);
        match self {
            GroupKey::Country => country_label(obs.country),
            GroupKey::TwoFold => Label::new(obs.setting as i32, obs.setting.to_string()),
            GroupKey::Code => Label::new(class_rank, obs.code),
            GroupKey::Name => Label::new(class_rank, obs.name),
            GroupKey::TenFold => Label::new(class_rank, obs.ten_fold),
            GroupKey::Condensed => match obs.setting {
                Setting::Urban => Label::new(0, obs.condensed),
                Setting::Rural => Label::new(class_rank, obs.condensed),
            },
            GroupKey::Year => match obs.year {
                Some(year) => Label::new(year, year.to_string()),
                None => Label::new(i32::MAX, ""),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Median,
    /// Rows in the group, whatever their values.
    Count,
}

impl Aggregation {
    /// `present` holds the non-missing values of a group of `rows` rows.
    /// Sums of nothing are 0, means and medians of nothing are missing.
    fn apply(&self, mut present: Vec<f64>, rows: usize) -> Option<f64> {
        match self {
            Aggregation::Sum => Some(present.iter().fold(0.0, |a, b| a + b)),
            Aggregation::Mean if present.is_empty() => None,
            Aggregation::Mean => Some(present.iter().sum::<f64>() / present.len() as f64),
            Aggregation::Median => median(&mut present),
            Aggregation::Count => Some(rows as f64),
        }
    }
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Aggregate `column` into the output column `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column: String,
    pub aggregation: Aggregation,
    pub output: String,
}

impl ColumnSpec {
    pub fn new(column: &str, aggregation: Aggregation) -> Self {
        ColumnSpec {
            column: column.to_string(),
            aggregation,
            output: column.to_string(),
        }
    }

    pub fn named(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn sums(columns: &[&str]) -> Vec<Self> {
        columns
            .iter()
            .map(|c| ColumnSpec::new(c, Aggregation::Sum))
            .collect()
    }

    pub fn means(columns: &[&str]) -> Vec<Self> {
        columns
            .iter()
            .map(|c| ColumnSpec::new(c, Aggregation::Mean))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub labels: Vec<Label>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryTable {
    pub keys: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
    /// Missing cells per aggregated input column.
    pub missing: BTreeMap<String, usize>,
}

pub fn summarise(records: &[Observation], keys: &[GroupKey], specs: &[ColumnSpec]) -> SummaryTable {
    let mut groups: BTreeMap<Vec<Label>, Vec<&Observation>> = BTreeMap::new();
    for obs in records {
        let labels = keys.iter().map(|k| k.label(obs)).collect();
        groups.entry(labels).or_default().push(obs);
    }

    let mut missing = BTreeMap::new();
    for spec in specs.iter().filter(|s| s.aggregation != Aggregation::Count) {
        let n = records
            .iter()
            .filter(|obs| obs.value(&spec.column).is_none())
            .count();
        if n > 0 {
            log::debug!("{n} missing values of {:?} ignored", spec.column);
            missing.insert(spec.column.clone(), n);
        }
    }

    let rows = groups
        .into_iter()
        .map(|(labels, members)| SummaryRow {
            labels,
            values: specs
                .iter()
                .map(|spec| {
                    let present = members
                        .iter()
                        .filter_map(|obs| obs.value(&spec.column))
                        .collect();
                    spec.aggregation.apply(present, members.len())
                })
                .collect(),
        })
        .collect();

    SummaryTable {
        keys: keys.iter().map(|k| k.header().to_string()).collect(),
        columns: specs.iter().map(|s| s.output.clone()).collect(),
        rows,
        missing,
    }
}

/// [`summarise`], followed by the same grouping over both countries with
/// the country labelled "Total".
pub fn with_country_totals(
    records: &[Observation],
    keys: &[GroupKey],
    specs: &[ColumnSpec],
) -> SummaryTable {
    let mut table = summarise(records, keys, specs);
    let Some(pos) = keys.iter().position(|k| *k == GroupKey::Country) else {
        return table;
    };

    let rest: Vec<GroupKey> = keys
        .iter()
        .filter(|k| **k != GroupKey::Country)
        .copied()
        .collect();
    for mut row in summarise(records, &rest, specs).rows {
        row.labels.insert(pos, total_label());
        table.rows.push(row);
    }
    table
}

/// Values of `column` split by the label of `key`, e.g. the spacing of
/// every urban and every rural OA. Missing cells become `fill` when given
/// and are left out otherwise.
pub fn grouped_values(
    records: &[Observation],
    key: GroupKey,
    column: &str,
    fill: Option<f64>,
) -> BTreeMap<Label, Vec<f64>> {
    let mut out: BTreeMap<Label, Vec<f64>> = BTreeMap::new();
    for obs in records {
        if let Some(v) = obs.value(column).or(fill) {
            out.entry(key.label(obs)).or_default().push(v);
        }
    }
    out
}

/// One decimal place, halves to even.
fn round1(v: f64) -> f64 {
    (v * 10.0).round_ties_even() / 10.0
}

impl SummaryTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn key_index(&self, key: GroupKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key.header())
    }

    /// The value in the row whose labels read `labels`.
    pub fn get(&self, labels: &[&str], column: &str) -> Option<f64> {
        let idx = self.column(column)?;
        self.rows
            .iter()
            .find(|row| row.labels.iter().map(|l| l.text.as_str()).eq(labels.iter().copied()))
            .and_then(|row| row.values[idx])
    }

    fn push_column(&mut self, name: String, values: Vec<Option<f64>>) {
        self.columns.push(name);
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.values.push(v);
        }
    }

    /// Add `<column>_prop` for each of `columns`.
    pub fn with_proportions(self, columns: &[&str]) -> Self {
        columns.iter().fold(self, |table, column| {
            table.with_proportion(column, &format!("{column}_prop"))
        })
    }

    /// Add `output`: each value of `column` as a percentage of the column's
    /// total within the same country (or the same "Total" block), rounded
    /// to one decimal place.
    pub fn with_proportion(mut self, column: &str, output: &str) -> Self {
        let Some(idx) = self.column(column) else {
            log::warn!("no column {column:?} to take proportions of");
            return self;
        };
        let country = self.key_index(GroupKey::Country);
        let block = |row: &SummaryRow| -> String {
            country
                .map(|i| row.labels[i].text.clone())
                .unwrap_or_default()
        };

        let mut totals: HashMap<String, f64> = HashMap::new();
        for row in &self.rows {
            *totals.entry(block(row)).or_default() += row.values[idx].unwrap_or(0.0);
        }
        let props = self
            .rows
            .iter()
            .map(|row| {
                let total = totals[&block(row)];
                let v = row.values[idx]?;
                (total != 0.0).then(|| round1(v / total * 100.0))
            })
            .collect();
        self.push_column(output.to_string(), props);
        self
    }

    /// Add `output = numerator * scale / denominator` row by row.
    pub fn with_ratio(
        mut self,
        numerator: &str,
        denominator: &str,
        output: &str,
        scale: f64,
    ) -> Self {
        let (Some(n), Some(d)) = (self.column(numerator), self.column(denominator)) else {
            log::warn!("cannot divide {numerator:?} by {denominator:?}: missing column");
            return self;
        };
        let ratios = self
            .rows
            .iter()
            .map(|row| match (row.values[n], row.values[d]) {
                (Some(a), Some(b)) if b != 0.0 => Some(a * scale / b),
                _ => None,
            })
            .collect();
        self.push_column(output.to_string(), ratios);
        self
    }

    /// Add `output` by looking up each row's `key` label in `lookup`, a
    /// left join against a table keyed by that label.
    pub fn with_lookup(
        mut self,
        key: GroupKey,
        lookup: &HashMap<String, f64>,
        output: &str,
    ) -> Self {
        let Some(k) = self.key_index(key) else {
            log::warn!("no key {:?} to join {output:?} on", key.header());
            return self;
        };
        let values: Vec<_> = self
            .rows
            .iter()
            .map(|row| lookup.get(&row.labels[k].text).copied())
            .collect();
        let unmatched = values.iter().filter(|v| v.is_none()).count();
        if unmatched > 0 {
            log::warn!("{unmatched} rows have no {output:?} to join");
        }
        self.push_column(output.to_string(), values);
        self
    }

    /// Spread `value` out wide: one row per `row_key` label, one column per
    /// `column_key` label.
    pub fn pivot(&self, row_key: GroupKey, column_key: GroupKey, value: &str) -> SummaryTable {
        let (Some(r), Some(c), Some(v)) = (
            self.key_index(row_key),
            self.key_index(column_key),
            self.column(value),
        ) else {
            return SummaryTable::default();
        };

        let mut headers = BTreeSet::new();
        let mut cells: BTreeMap<Label, HashMap<Label, Option<f64>>> = BTreeMap::new();
        for row in &self.rows {
            headers.insert(row.labels[c].clone());
            cells
                .entry(row.labels[r].clone())
                .or_default()
                .insert(row.labels[c].clone(), row.values[v]);
        }

        SummaryTable {
            keys: vec![row_key.header().to_string()],
            columns: headers.iter().map(|h| h.text.clone()).collect(),
            rows: cells
                .into_iter()
                .map(|(label, by_column)| SummaryRow {
                    labels: vec![label],
                    values: headers
                        .iter()
                        .map(|h| by_column.get(h).copied().flatten())
                        .collect(),
                })
                .collect(),
            missing: BTreeMap::new(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.keys.iter().chain(&self.columns))?;
        for row in &self.rows {
            let labels = row.labels.iter().map(|l| l.text.clone());
            let values = row.values.iter().map(|v| format_value(*v));
            wtr.write_record(labels.chain(values))?;
        }
        wtr.flush().map_err(|e| Error::io("summary table", e))?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().map_err(|e| Error::io(path, e))?;
        log::info!("wrote {} summary rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn log(&self, title: &str) {
        log::info!("{title}");
        for row in &self.rows {
            let labels: Vec<_> = row.labels.iter().map(|l| l.text.as_str()).collect();
            let values: Vec<_> = self
                .columns
                .iter()
                .zip(&row.values)
                .map(|(c, v)| format!("{c}={}", format_value(*v)))
                .collect();
            log::info!("  {}: {}", labels.join(" / "), values.join(", "));
        }
    }
}

/// Whole numbers without a trailing ".0", missing as an empty cell.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}
