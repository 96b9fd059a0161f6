//! Address spacing by rural-urban class.
//!
//! Means are pulled around by a few very sparse rural OAs, so the typical
//! spacing of a class is reported as the mode of its density estimate as
//! well as the median and mean.

use std::collections::BTreeMap;
use std::path::Path;

use crate::classification::{AreaClass, Ruc11};
use crate::error::Result;
use crate::kde::{DensityCurve, Grid};
use crate::plotting::plot_densities;
use crate::spacing::Spacing;
use crate::summary::{
    grouped_values, summarise, Aggregation, ColumnSpec, GroupKey, Label, Observation, SummaryRow,
    SummaryTable,
};
use crate::traits::{Plot, Report};

pub const MEAN_NN: &str = "Mean Nearest Neighbour";
pub const MODE: &str = "Modal Mean Nearest Neighbour";

pub const TWO_FOLD_GRID: Grid = Grid::new(0.0, 80.0, 801);
pub const CLASS_GRID: Grid = Grid::new(0.0, 100.0, 1001);

const X_DESC: &str = "Mean Distance to Nearest Neighbour UPRN (m)";

#[derive(Debug, Clone)]
pub struct SpacingByClass {
    pub records: Vec<Observation>,
    /// Classified OAs with no spacing entry.
    pub unmatched: usize,
}

impl SpacingByClass {
    /// Inner join of the OA classes and the per-OA spacing. A null spacing
    /// stays in as a missing value.
    pub fn new(spacing: &Spacing, areas: &[AreaClass<Ruc11>]) -> Self {
        let mut unmatched = 0;
        let records: Vec<_> = areas
            .iter()
            .filter_map(|area| {
                let Some(value) = spacing.get(&area.area) else {
                    unmatched += 1;
                    return None;
                };
                Some(Observation::new(area.country, &area.class).with_value(MEAN_NN, value.value()))
            })
            .collect();
        log::info!(
            "{} classified OAs have a spacing entry, {} do not",
            records.len(),
            unmatched
        );
        SpacingByClass { records, unmatched }
    }

    pub fn median_by_setting(&self) -> SummaryTable {
        summarise(
            &self.records,
            &[GroupKey::TwoFold],
            &[ColumnSpec::new(MEAN_NN, Aggregation::Median)],
        )
    }

    pub fn mean_by_class(&self) -> SummaryTable {
        summarise(
            &self.records,
            &[GroupKey::TenFold],
            &[ColumnSpec::new(MEAN_NN, Aggregation::Mean)],
        )
    }

    /// Spacing per group with null spacings counted as 0.
    pub fn samples(&self, key: GroupKey) -> BTreeMap<Label, Vec<f64>> {
        grouped_values(&self.records, key, MEAN_NN, Some(0.0))
    }

    pub fn modes(&self, key: GroupKey, grid: Grid) -> SummaryTable {
        let rows = self
            .samples(key)
            .into_iter()
            .filter_map(|(label, values)| {
                let curve = DensityCurve::estimate(&label.text, values, grid)?;
                Some(SummaryRow {
                    labels: vec![label],
                    values: vec![Some(curve.mode)],
                })
            })
            .collect();
        SummaryTable {
            keys: vec![key.header().to_string()],
            columns: vec![MODE.to_string()],
            rows,
            missing: BTreeMap::new(),
        }
    }
}

impl Report for SpacingByClass {
    fn tables(&self) -> Vec<(String, SummaryTable)> {
        vec![
            ("Median Spacing by Setting".to_string(), self.median_by_setting()),
            ("Mean Spacing by Class".to_string(), self.mean_by_class()),
            (
                "Modal Spacing by Setting".to_string(),
                self.modes(GroupKey::TwoFold, TWO_FOLD_GRID),
            ),
            (
                "Modal Spacing by Class".to_string(),
                self.modes(GroupKey::TenFold, CLASS_GRID),
            ),
            (
                "Modal Spacing Condensed".to_string(),
                self.modes(GroupKey::Condensed, CLASS_GRID),
            ),
        ]
    }
}

impl Plot for SpacingByClass {
    fn plot(&self, out_dir: &Path) -> Result<()> {
        let charts = [
            ("spacing_kde_broad.png", GroupKey::TwoFold, TWO_FOLD_GRID),
            ("spacing_kde_full.png", GroupKey::TenFold, CLASS_GRID),
            ("spacing_kde_condensed.png", GroupKey::Condensed, CLASS_GRID),
        ];
        for (file, key, grid) in charts {
            plot_densities(&out_dir.join(file), X_DESC, key, &self.samples(key), grid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classification::Country;
    use crate::spacing::{NullCause, UnitSpacing};

    fn area(code: &str, class: Ruc11) -> AreaClass<Ruc11> {
        AreaClass {
            area: code.to_string(),
            country: Country::England,
            class,
        }
    }

    fn fixture() -> SpacingByClass {
        let spacing = Spacing(
            [
                ("E1", UnitSpacing::Mean(10.0)),
                ("E2", UnitSpacing::Mean(14.0)),
                ("E3", UnitSpacing::Mean(12.0)),
                ("E4", UnitSpacing::Mean(40.0)),
                ("E5", UnitSpacing::Null(NullCause::NoPointsInUnit)),
                ("E6", UnitSpacing::Mean(60.0)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        );
        let areas = vec![
            area("E1", Ruc11::A1),
            area("E2", Ruc11::C1),
            area("E3", Ruc11::C1),
            area("E4", Ruc11::E1),
            area("E5", Ruc11::F1),
            area("E6", Ruc11::F1),
            area("E7", Ruc11::F1),
        ];
        SpacingByClass::new(&spacing, &areas)
    }

    #[test]
    fn test_join_and_aggregates() {
        let by_class = fixture();
        assert_eq!(by_class.records.len(), 6);
        assert_eq!(by_class.unmatched, 1);

        let medians = by_class.median_by_setting();
        assert_eq!(medians.get(&["Urban"], MEAN_NN), Some(12.0));
        // the null OA is left out of the median
        assert_eq!(medians.get(&["Rural"], MEAN_NN), Some(50.0));

        let means = by_class.mean_by_class();
        assert_eq!(
            means.get(&["Rural hamlets and isolated dwellings"], MEAN_NN),
            Some(60.0)
        );
    }

    #[test]
    fn test_nulls_count_as_zero_for_densities() {
        let samples = fixture().samples(GroupKey::TwoFold);
        let rural = &samples[&Label::new(1, "Rural")];
        assert_eq!(rural, &vec![40.0, 0.0, 60.0]);
    }

    #[test]
    fn test_modes_stay_on_the_grid() {
        let modes = fixture().modes(GroupKey::TwoFold, TWO_FOLD_GRID);
        assert_eq!(modes.rows.len(), 2);
        let urban = modes.get(&["Urban"], MODE).unwrap();
        assert!((10.0..=14.0).contains(&urban), "{urban}");
    }
}
