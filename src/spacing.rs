//! Mean nearest-neighbour distance between addresses, per areal unit.
//!
//! For each unit, the points of the unit and of its neighbours go into a
//! throwaway R* tree, so a point near the unit's edge can find its nearest
//! neighbour across the boundary. Only the unit's own points are queried
//! and averaged.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::adjacency::Neighbours;
use crate::error::{Error, Result};
use crate::model::AssignedPoint;

/// Why a unit has no spacing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullCause {
    /// No points were assigned to the unit itself.
    NoPointsInUnit,
    /// The unit and its neighbours hold fewer than two points between them.
    TooFewPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSpacing {
    Mean(f64),
    Null(NullCause),
}

impl UnitSpacing {
    pub fn value(&self) -> Option<f64> {
        match self {
            UnitSpacing::Mean(v) => Some(*v),
            UnitSpacing::Null(_) => None,
        }
    }
}

/// Mean distance from each of `own` to its nearest other point among
/// `own` and `neighbourhood`.
///
/// A point never pairs with itself, but two distinct points at the same
/// coordinate pair with each other at distance 0. Self-exclusion goes by
/// position, so which of several coincident points the tree returns first
/// does not matter.
pub fn unit_spacing(own: &[[f64; 2]], neighbourhood: &[&[[f64; 2]]]) -> UnitSpacing {
    if own.is_empty() {
        return UnitSpacing::Null(NullCause::NoPointsInUnit);
    }

    // own points first, so entry i < own.len() is own[i]
    let entries: Vec<GeomWithData<[f64; 2], usize>> = own
        .iter()
        .chain(neighbourhood.iter().flat_map(|points| points.iter()))
        .enumerate()
        .map(|(i, p)| GeomWithData::new(*p, i))
        .collect();
    if entries.len() < 2 {
        return UnitSpacing::Null(NullCause::TooFewPoints);
    }

    let tree = RTree::bulk_load(entries);
    let (sum, n) = own
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            tree.nearest_neighbor_iter_with_distance_2(p)
                .find(|(entry, _)| entry.data != i)
                .map(|(_, distance_2)| distance_2.sqrt())
        })
        .fold((0.0, 0_usize), |(sum, n), d| (sum + d, n + 1));

    UnitSpacing::Mean(sum / n as f64)
}

/// Counts explaining where the estimator's inputs went.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateReport {
    pub units: usize,
    pub computed: usize,
    pub nulls: BTreeMap<NullCause, usize>,
    /// Points tagged with a code the neighbour map does not know.
    pub missing_key_points: usize,
    /// Codes listed as a neighbour that are not a key of the map.
    pub unknown_neighbour_codes: usize,
    /// Neighbour links to a unit with no points.
    pub empty_neighbours: usize,
}

impl EstimateReport {
    pub fn log(&self) {
        log::info!(
            "{} units evaluated, {} with a mean nearest-neighbour distance",
            self.units,
            self.computed
        );
        for (cause, n) in &self.nulls {
            log::info!("{n} units are null: {cause:?}");
        }
        if self.missing_key_points > 0 {
            log::warn!(
                "{} points belong to units missing from the neighbour map and were not used",
                self.missing_key_points
            );
        }
        log::debug!("{} neighbour links lead to units without points", self.empty_neighbours);
        if self.unknown_neighbour_codes > 0 {
            log::warn!(
                "{} neighbour codes are not keys of the neighbour map",
                self.unknown_neighbour_codes
            );
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spacing(pub BTreeMap<String, UnitSpacing>);

#[derive(Serialize)]
struct SpacingRow<'a> {
    #[serde(rename = "OA11CD")]
    code: &'a str,
    mean_nearest_neighbour: Option<f64>,
    null_cause: Option<NullCause>,
}

impl Spacing {
    pub fn get(&self, code: &str) -> Option<UnitSpacing> {
        self.0.get(code).copied()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| Error::io(path, e))?;
        log::info!("saved spacing of {} units to {}", self.0.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for (code, spacing) in &self.0 {
            wtr.serialize(SpacingRow {
                code,
                mean_nearest_neighbour: spacing.value(),
                null_cause: match spacing {
                    UnitSpacing::Null(cause) => Some(*cause),
                    UnitSpacing::Mean(_) => None,
                },
            })?;
        }
        wtr.flush().map_err(|e| Error::io(path, e))?;
        Ok(())
    }
}

fn points_by_unit(points: &[AssignedPoint]) -> HashMap<&str, Vec<[f64; 2]>> {
    let mut by_unit: HashMap<&str, Vec<[f64; 2]>> = HashMap::new();
    for p in points {
        by_unit.entry(p.code.as_str()).or_default().push(p.coords());
    }
    by_unit
}

pub fn estimate(points: &[AssignedPoint], neighbours: &Neighbours) -> (Spacing, EstimateReport) {
    estimate_with_progress(points, neighbours, &ProgressBar::hidden())
}

/// Evaluate every unit of `neighbours`, ticking `bar` once per unit.
pub fn estimate_with_progress(
    points: &[AssignedPoint],
    neighbours: &Neighbours,
    bar: &ProgressBar,
) -> (Spacing, EstimateReport) {
    let by_unit = points_by_unit(points);
    let mut report = EstimateReport {
        units: neighbours.len(),
        missing_key_points: points
            .iter()
            .filter(|p| !neighbours.contains_unit(&p.code))
            .count(),
        ..Default::default()
    };

    bar.set_length(neighbours.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed}] {wide_bar} {pos}/{len} ({eta})")
    {
        bar.set_style(style);
    }

    let units: Vec<_> = neighbours.iter().collect();
    let results: Vec<(String, UnitSpacing, usize, usize)> = units
        .into_par_iter()
        .map(|(code, set)| {
            let own = by_unit.get(code.as_str()).map_or(&[][..], Vec::as_slice);
            let (mut unknown, mut empty) = (0, 0);
            let others: Vec<&[[f64; 2]]> = set
                .iter()
                .filter(|other| *other != code)
                .filter_map(|other| {
                    if !neighbours.contains_unit(other) {
                        unknown += 1;
                    }
                    let points = by_unit.get(other.as_str()).map(Vec::as_slice);
                    if points.is_none() {
                        empty += 1;
                    }
                    points
                })
                .collect();
            let spacing = unit_spacing(own, &others);
            bar.inc(1);
            (code.clone(), spacing, unknown, empty)
        })
        .collect();
    bar.finish();

    let mut spacing = Spacing::default();
    for (code, value, unknown, empty) in results {
        report.unknown_neighbour_codes += unknown;
        report.empty_neighbours += empty;
        match value {
            UnitSpacing::Mean(_) => report.computed += 1,
            UnitSpacing::Null(cause) => *report.nulls.entry(cause).or_default() += 1,
        }
        spacing.0.insert(code, value);
    }
    (spacing, report)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;

    fn assigned(uprn: u64, x: f64, y: f64, code: &str) -> AssignedPoint {
        AssignedPoint {
            uprn,
            x,
            y,
            code: code.to_string(),
        }
    }

    fn neighbours(pairs: &[(&str, &[&str])]) -> Neighbours {
        pairs
            .iter()
            .map(|(code, set)| {
                let set: BTreeSet<String> = set.iter().map(|s| s.to_string()).collect();
                (code.to_string(), set)
            })
            .collect()
    }

    #[test]
    fn test_single_point_is_null() {
        let points = vec![assigned(1, 0.0, 0.0, "a")];
        let (spacing, report) = estimate(&points, &neighbours(&[("a", &["a"])]));
        assert_eq!(
            spacing.get("a"),
            Some(UnitSpacing::Null(NullCause::TooFewPoints))
        );
        assert_eq!(report.nulls[&NullCause::TooFewPoints], 1);
    }

    #[test]
    fn test_coincident_points_are_zero_apart() {
        let points = vec![assigned(1, 3.0, 4.0, "a"), assigned(2, 3.0, 4.0, "a")];
        let (spacing, _) = estimate(&points, &neighbours(&[("a", &["a"])]));
        assert_eq!(spacing.get("a"), Some(UnitSpacing::Mean(0.0)));
    }

    #[test]
    fn test_coincident_point_in_neighbour() {
        let own = [[3.0, 4.0]];
        let other = [[3.0, 4.0], [10.0, 10.0]];
        assert_eq!(unit_spacing(&own, &[&other]), UnitSpacing::Mean(0.0));
    }

    #[test]
    fn test_mean_over_own_points_only() {
        // a: (0,0) and (3,4) are 5 apart; b's point at (0,-1) is closer to (0,0)
        let points = vec![
            assigned(1, 0.0, 0.0, "a"),
            assigned(2, 3.0, 4.0, "a"),
            assigned(3, 0.0, -1.0, "b"),
        ];
        let map = neighbours(&[("a", &["a", "b"]), ("b", &["a", "b"])]);
        let (spacing, report) = estimate(&points, &map);
        assert_eq!(spacing.get("a"), Some(UnitSpacing::Mean((1.0 + 5.0) / 2.0)));
        assert_eq!(spacing.get("b"), Some(UnitSpacing::Mean(1.0)));
        assert_eq!(report.computed, 2);
    }

    #[test]
    fn test_unit_without_points_is_null() {
        let points = vec![assigned(1, 0.0, 0.0, "b"), assigned(2, 1.0, 0.0, "b")];
        let map = neighbours(&[("a", &["a", "b"]), ("b", &["a", "b"])]);
        let (spacing, report) = estimate(&points, &map);
        assert_eq!(
            spacing.get("a"),
            Some(UnitSpacing::Null(NullCause::NoPointsInUnit))
        );
        assert_eq!(report.nulls[&NullCause::NoPointsInUnit], 1);
    }

    #[test]
    fn test_points_outside_the_map_are_counted() {
        let points = vec![
            assigned(1, 0.0, 0.0, "a"),
            assigned(2, 1.0, 0.0, "a"),
            assigned(3, 0.5, 0.0, "zz"),
        ];
        let map = neighbours(&[("a", &["a", "ghost"])]);
        let (spacing, report) = estimate(&points, &map);
        assert_eq!(spacing.get("a"), Some(UnitSpacing::Mean(1.0)));
        assert_eq!(report.missing_key_points, 1);
        assert_eq!(report.unknown_neighbour_codes, 1);
        assert_eq!(report.empty_neighbours, 1);
    }

    #[test]
    fn test_csv_marks_null_cause() {
        let spacing = Spacing(
            [
                ("a".to_string(), UnitSpacing::Mean(2.5)),
                ("b".to_string(), UnitSpacing::Null(NullCause::NoPointsInUnit)),
            ]
            .into_iter()
            .collect(),
        );
        let file = tempfile::NamedTempFile::new().unwrap();
        spacing.write_csv(file.path()).unwrap();
        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            written,
            "OA11CD,mean_nearest_neighbour,null_cause\na,2.5,\nb,,no_points_in_unit\n"
        );
    }

    #[test]
    fn test_json_cache_keeps_null_causes() {
        let spacing = Spacing(
            [
                ("a".to_string(), UnitSpacing::Mean(2.5)),
                ("b".to_string(), UnitSpacing::Null(NullCause::TooFewPoints)),
            ]
            .into_iter()
            .collect(),
        );
        let file = tempfile::NamedTempFile::new().unwrap();
        spacing.save(file.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            r#"{"a":{"mean":2.5},"b":{"null":"too_few_points"}}"#
        );
        assert_eq!(Spacing::load(file.path()).unwrap(), spacing);
    }
}
