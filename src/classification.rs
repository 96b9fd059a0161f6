//! 2011 rural-urban classification (RUC11) of output areas and MSOAs.
//!
//! The published lookup tables pad several labels and codes with
//! non-breaking spaces and list Urban minor conurbation as `A2` at OA
//! level; [`Ruc11::parse`] absorbs both.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::Result;
use crate::load::{column_index, csv_reader_skipping};

/// Remove non-breaking spaces and surrounding whitespace.
pub fn clean_label(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum Setting {
    Urban,
    Rural,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum Country {
    England,
    Wales,
}

impl Country {
    /// England and Wales 2011 area codes start with E and W.
    pub fn from_area_code(code: &str) -> Option<Self> {
        match code.trim().chars().next()? {
            'E' => Some(Country::England),
            'W' => Some(Country::Wales),
            _ => None,
        }
    }
}

/// Anything carrying the labels the summaries group on.
pub trait Classified {
    fn code(&self) -> &'static str;
    fn ten_fold(&self) -> &'static str;
    fn setting(&self) -> Setting;
    /// Ten-fold class with every urban class collapsed into "Urban".
    fn condensed(&self) -> &'static str {
        match self.setting() {
            Setting::Urban => "Urban",
            Setting::Rural => self.ten_fold(),
        }
    }
    /// Name used in the published summary tables, e.g. "Urban: Major
    /// Conurbation".
    fn name(&self) -> &'static str {
        self.ten_fold()
    }
    /// Position in the published ordering of classes.
    fn rank(&self) -> u8;
}

/// Output-area classes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum Ruc11 {
    A1,
    B1,
    C1,
    C2,
    D1,
    D2,
    E1,
    E2,
    F1,
    F2,
}

impl Ruc11 {
    pub fn parse(raw: &str) -> Option<Self> {
        match clean_label(raw).as_str() {
            "A2" => Some(Ruc11::B1),
            code => Ruc11::from_str(code).ok(),
        }
    }

    pub fn all() -> impl Iterator<Item = Ruc11> {
        Ruc11::iter()
    }
}

impl Classified for Ruc11 {
    fn code(&self) -> &'static str {
        self.into()
    }

    fn ten_fold(&self) -> &'static str {
        match self {
            Ruc11::A1 => "Urban major conurbation",
            Ruc11::B1 => "Urban minor conurbation",
            Ruc11::C1 => "Urban city and town",
            Ruc11::C2 => "Urban city and town in a sparse setting",
            Ruc11::D1 => "Rural town and fringe",
            Ruc11::D2 => "Rural town and fringe in a sparse setting",
            Ruc11::E1 => "Rural village",
            Ruc11::E2 => "Rural village in a sparse setting",
            Ruc11::F1 => "Rural hamlets and isolated dwellings",
            Ruc11::F2 => "Rural hamlets and isolated dwellings in a sparse setting",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Ruc11::A1 => "Urban: Major Conurbation",
            Ruc11::B1 => "Urban: Minor Conurbation",
            Ruc11::C1 => "Urban: City and Town",
            Ruc11::C2 => "Urban: City and Town in a Sparse Setting",
            Ruc11::D1 => "Rural: Town and Fringe",
            Ruc11::D2 => "Rural: Town and Fringe in a Sparse Setting",
            Ruc11::E1 => "Rural: Village",
            Ruc11::E2 => "Rural: Village in a Sparse Setting",
            Ruc11::F1 => "Rural: Hamlets and Isolated Dwellings",
            Ruc11::F2 => "Rural: Hamlets and Isolated Dwellings in a Sparse Setting",
        }
    }

    fn setting(&self) -> Setting {
        match self {
            Ruc11::A1 | Ruc11::B1 | Ruc11::C1 | Ruc11::C2 => Setting::Urban,
            _ => Setting::Rural,
        }
    }

    fn rank(&self) -> u8 {
        *self as u8
    }
}

/// MSOA classes; villages and dispersed settlements are one class here.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum MsoaRuc11 {
    A1,
    B1,
    C1,
    C2,
    D1,
    D2,
    E1,
    E2,
}

impl MsoaRuc11 {
    pub fn parse(raw: &str) -> Option<Self> {
        MsoaRuc11::from_str(&clean_label(raw)).ok()
    }
}

impl Classified for MsoaRuc11 {
    fn code(&self) -> &'static str {
        self.into()
    }

    fn ten_fold(&self) -> &'static str {
        match self {
            MsoaRuc11::A1 => "Urban major conurbation",
            MsoaRuc11::B1 => "Urban minor conurbation",
            MsoaRuc11::C1 => "Urban city and town",
            MsoaRuc11::C2 => "Urban city and town in a sparse setting",
            MsoaRuc11::D1 => "Rural town and fringe",
            MsoaRuc11::D2 => "Rural town and fringe in a sparse setting",
            MsoaRuc11::E1 => "Rural village and dispersed",
            MsoaRuc11::E2 => "Rural village and dispersed in a sparse setting",
        }
    }

    fn setting(&self) -> Setting {
        match self {
            MsoaRuc11::A1 | MsoaRuc11::B1 | MsoaRuc11::C1 | MsoaRuc11::C2 => Setting::Urban,
            _ => Setting::Rural,
        }
    }

    fn rank(&self) -> u8 {
        *self as u8
    }
}

/// One row of a RUC11 lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaClass<C> {
    pub area: String,
    pub country: Country,
    pub class: C,
}

fn load_lookup<C>(
    path: &Path,
    area_column: &str,
    skip_rows: usize,
    parse: impl Fn(&str) -> Option<C>,
) -> Result<Vec<AreaClass<C>>> {
    let mut rdr = csv_reader_skipping(path, skip_rows)?;
    let headers = rdr.headers()?.clone();
    let area_idx = column_index(&headers, area_column, path)?;
    let code_idx = column_index(&headers, "Rural Urban Classification 2011 code", path)?;

    let mut rows = Vec::new();
    let mut skipped = 0_u64;
    for record in rdr.records() {
        let record = record?;
        let area = record.get(area_idx).map(clean_label).unwrap_or_default();
        let class = record.get(code_idx).and_then(&parse);
        match (Country::from_area_code(&area), class) {
            (Some(country), Some(class)) => rows.push(AreaClass {
                area,
                country,
                class,
            }),
            _ => skipped += 1,
        }
    }
    log::info!(
        "read {} classified areas from {} ({} rows without a usable code skipped)",
        rows.len(),
        path.display(),
        skipped
    );
    Ok(rows)
}

/// Read the OA11 sheet of the RUC11 lookup (exported as CSV).
pub fn load_oa_lookup(path: &Path, skip_rows: usize) -> Result<Vec<AreaClass<Ruc11>>> {
    load_lookup(path, "Output Area 2011 Code", skip_rows, Ruc11::parse)
}

/// Read the MSOA11 sheet of the RUC11 lookup (exported as CSV).
pub fn load_msoa_lookup(path: &Path, skip_rows: usize) -> Result<Vec<AreaClass<MsoaRuc11>>> {
    load_lookup(
        path,
        "Middle Super Output Area 2011 Code",
        skip_rows,
        MsoaRuc11::parse,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_padded_codes() {
        assert_eq!(Ruc11::parse("C1\u{a0}\u{a0}"), Some(Ruc11::C1));
        assert_eq!(Ruc11::parse("D1\u{a0}"), Some(Ruc11::D1));
        assert_eq!(Ruc11::parse(" F2 "), Some(Ruc11::F2));
        assert_eq!(Ruc11::parse("A2"), Some(Ruc11::B1));
        assert_eq!(Ruc11::parse("Z9"), None);
        assert_eq!(MsoaRuc11::parse("C2\u{a0}"), Some(MsoaRuc11::C2));
        assert_eq!(MsoaRuc11::parse("F1"), None);
    }

    #[test]
    fn test_clean_label() {
        assert_eq!(
            clean_label("Rural town and fringe\u{a0}in a sparse setting\u{a0}"),
            "Rural town and fringe in a sparse setting"
        );
    }

    #[test]
    fn test_settings_and_condensed() {
        let urban: Vec<_> = Ruc11::all()
            .filter(|c| c.setting() == Setting::Urban)
            .collect();
        assert_eq!(urban, [Ruc11::A1, Ruc11::B1, Ruc11::C1, Ruc11::C2]);
        assert_eq!(Ruc11::C2.condensed(), "Urban");
        assert_eq!(Ruc11::E2.condensed(), "Rural village in a sparse setting");
        assert_eq!(MsoaRuc11::E1.ten_fold(), "Rural village and dispersed");
    }

    #[test]
    fn test_country_from_code() {
        assert_eq!(Country::from_area_code("E00000001"), Some(Country::England));
        assert_eq!(Country::from_area_code("W00000001"), Some(Country::Wales));
        assert_eq!(Country::from_area_code("S00090303"), None);
    }

    #[test]
    fn test_load_oa_lookup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Rural Urban Classification 2011\n\n\
             Output Area 2011 Code,Rural Urban Classification 2011 code,Rural Urban Classification 2011 (10 fold)\n\
             E00000001,A1,Urban major conurbation\u{a0}\n\
             W00000002,A2,Urban minor conurbation\n\
             E00000003,,\n"
        )
        .unwrap();

        let rows = load_oa_lookup(file.path(), 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].class, Ruc11::B1);
        assert_eq!(rows[1].country, Country::Wales);
    }
}
