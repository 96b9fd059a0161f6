//! Households off the gas grid, by rural-urban class.
//!
//! Postcode household counts are joined to the postcode directory for
//! their output area class; a household is off-gas when its postcode is
//! on the off-gas register.

use std::collections::HashSet;
use std::path::Path;

use crate::classification::{Country, Ruc11};
use crate::error::Result;
use crate::load::{load_value_table, PostcodeDirectory};
use crate::model::normalise_postcode;
use crate::summary::{summarise, ColumnSpec, GroupKey, Observation, SummaryTable};
use crate::traits::Report;

pub const COUNT: &str = "Count";
pub const OFF_GAS_HH: &str = "off_gas_hh";
pub const OFF_GAS_PROP: &str = "off_gas_prop";

/// Households per postcode, keyed by the normalised postcode.
pub fn load_household_counts(path: &Path) -> Result<Vec<(String, f64)>> {
    let table = load_value_table(path, "Postcode", &[COUNT], 0)?;
    Ok(table
        .into_iter()
        .map(|(postcode, values)| (normalise_postcode(&postcode), values[COUNT]))
        .collect())
}

/// Rows lost on the way into the summaries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JoinReport {
    pub postcodes: usize,
    /// Not in the directory, or not in an English or Welsh OA.
    pub unmatched: usize,
    /// In the directory without a usable RUC11 code.
    pub unclassified: usize,
}

#[derive(Debug, Clone)]
pub struct OffGas {
    pub by_class: SummaryTable,
    pub by_setting: SummaryTable,
    pub report: JoinReport,
    households: f64,
    off_gas_households: f64,
}

impl OffGas {
    /// Percentage of all matched households that are off-gas.
    pub fn overall_prop(&self) -> Option<f64> {
        (self.households > 0.0).then(|| self.off_gas_households / self.households * 100.0)
    }
}

pub fn off_gas_households(
    directory: &PostcodeDirectory,
    counts: &[(String, f64)],
    register: &HashSet<String>,
) -> OffGas {
    let mut report = JoinReport {
        postcodes: counts.len(),
        ..JoinReport::default()
    };
    let mut records = Vec::with_capacity(counts.len());
    for (postcode, count) in counts {
        let Some(entry) = directory.get(postcode) else {
            report.unmatched += 1;
            continue;
        };
        let (Some(country), Some(class)) = (
            Country::from_area_code(&entry.oa11),
            Ruc11::parse(&entry.ru11ind),
        ) else {
            report.unclassified += 1;
            continue;
        };
        let off_gas = if register.contains(postcode) { *count } else { 0.0 };
        records.push(
            Observation::new(country, &class)
                .with_value(COUNT, Some(*count))
                .with_value(OFF_GAS_HH, Some(off_gas)),
        );
    }
    log::info!(
        "{} of {} postcodes joined ({} not in the directory, {} unclassified)",
        records.len(),
        report.postcodes,
        report.unmatched,
        report.unclassified
    );

    let specs = ColumnSpec::sums(&[COUNT, OFF_GAS_HH]);
    let by_class = summarise(&records, &[GroupKey::Code, GroupKey::Name], &specs)
        .with_ratio(OFF_GAS_HH, COUNT, OFF_GAS_PROP, 100.0);
    let by_setting = summarise(&records, &[GroupKey::TwoFold], &specs)
        .with_ratio(OFF_GAS_HH, COUNT, OFF_GAS_PROP, 100.0);

    OffGas {
        by_class,
        by_setting,
        report,
        households: records.iter().filter_map(|r| r.value(COUNT)).sum(),
        off_gas_households: records.iter().filter_map(|r| r.value(OFF_GAS_HH)).sum(),
    }
}

impl Report for OffGas {
    fn tables(&self) -> Vec<(String, SummaryTable)> {
        vec![
            ("Off Gas by RUC11".to_string(), self.by_class.clone()),
            ("Off Gas by Urban Rural".to_string(), self.by_setting.clone()),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::load::PostcodeRecord;

    fn directory() -> PostcodeDirectory {
        [
            ("SW1A1AA", "E00023938", "A1"),
            ("EX11AA", "E00100001", "E1"),
            ("LD11AA", "W00001111", "F2"),
            ("XX11XX", "E00000009", ""),
        ]
        .into_iter()
        .map(|(pc, oa, ruc)| {
            (
                pc.to_string(),
                PostcodeRecord {
                    oa11: oa.to_string(),
                    ru11ind: ruc.to_string(),
                },
            )
        })
        .collect()
    }

    #[test]
    fn test_off_gas_proportions() {
        let counts = vec![
            ("SW1A1AA".to_string(), 90.0),
            ("EX11AA".to_string(), 20.0),
            ("LD11AA".to_string(), 30.0),
            ("NOWHERE".to_string(), 5.0),
            ("XX11XX".to_string(), 5.0),
        ];
        let register: HashSet<_> = ["EX11AA", "LD11AA"].iter().map(|s| s.to_string()).collect();

        let result = off_gas_households(&directory(), &counts, &register);

        assert_eq!(
            result.report,
            JoinReport {
                postcodes: 5,
                unmatched: 1,
                unclassified: 1
            }
        );
        assert_eq!(result.by_setting.get(&["Urban"], OFF_GAS_PROP), Some(0.0));
        assert_eq!(result.by_setting.get(&["Rural"], OFF_GAS_PROP), Some(100.0));
        assert_eq!(
            result.by_class.get(&["E1", "Rural: Village"], COUNT),
            Some(20.0)
        );
        let overall = result.overall_prop().unwrap();
        assert!((overall - 50.0 / 140.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_household_counts_are_normalised() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Postcode,Count\nSW1A 1AA,12\nEX1  1AA,3\n").unwrap();
        let mut counts = load_household_counts(file.path()).unwrap();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            counts,
            [("EX11AA".to_string(), 3.0), ("SW1A1AA".to_string(), 12.0)]
        );
    }
}
