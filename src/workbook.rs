//! Multi-sheet summary output as an xlsx workbook.

use std::path::Path;

use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::Result;
use crate::summary::SummaryTable;

const MAX_SHEET_NAME: usize = 31;

/// Excel refuses `[]:*?/\` in sheet names and anything over 31 characters.
fn sheet_name(sheet: &str) -> String {
    sheet
        .chars()
        .map(|c| {
            if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .take(MAX_SHEET_NAME)
        .collect()
}

/// Header row of group keys then value columns; missing values stay blank.
fn write_table(worksheet: &mut Worksheet, table: &SummaryTable) -> Result<()> {
    for (col, name) in table.keys.iter().chain(&table.columns).enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (col, label) in row.labels.iter().enumerate() {
            worksheet.write_string(r, col as u16, &label.text)?;
        }
        let offset = row.labels.len();
        for (col, value) in row.values.iter().enumerate() {
            if let Some(v) = value {
                worksheet.write_number(r, (offset + col) as u16, *v)?;
            }
        }
    }
    Ok(())
}

pub fn write_workbook(path: &Path, sheets: &[(String, SummaryTable)]) -> Result<()> {
    let mut workbook = Workbook::new();
    for (sheet, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(sheet))?;
        write_table(worksheet, table)?;
    }
    workbook.save(path)?;
    log::info!("wrote {} sheets to {}", sheets.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classification::{Country, Ruc11};
    use crate::summary::{summarise, Aggregation, ColumnSpec, GroupKey, Observation};
    use std::fs::File;
    use std::io::Read;

    fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> String {
        let mut xml = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_sheet_names() {
        assert_eq!(sheet_name("Odd/Name: [1]"), "Odd_Name_ _1_");
        assert_eq!(
            sheet_name("Broad Summary OA21 Accommodation Type").chars().count(),
            31
        );
    }

    #[test]
    fn test_sheets_read_back() {
        let records = vec![
            Observation::new(Country::England, &Ruc11::A1).with_value("Households", Some(10.0)),
            Observation::new(Country::Wales, &Ruc11::E2).with_value("Households", Some(4.0)),
            Observation::new(Country::Wales, &Ruc11::E2),
        ];
        let table = summarise(
            &records,
            &[GroupKey::TwoFold],
            &[
                ColumnSpec::new("Households", Aggregation::Sum),
                ColumnSpec::new("Households", Aggregation::Median).named("median"),
                ColumnSpec::new("Dwellings", Aggregation::Mean),
            ],
        );
        let file = tempfile::NamedTempFile::new().unwrap();
        write_workbook(
            file.path(),
            &[
                ("Broad Summary OA21 Household".to_string(), table.clone()),
                ("Odd/Name".to_string(), table),
            ],
        )
        .unwrap();

        // an xlsx file is a zip of XML parts
        let mut archive = zip::ZipArchive::new(File::open(file.path()).unwrap()).unwrap();
        let workbook = read_entry(&mut archive, "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Broad Summary OA21 Household""#));
        assert!(workbook.contains(r#"name="Odd_Name""#));

        let strings = read_entry(&mut archive, "xl/sharedStrings.xml");
        assert!(strings.contains("Rural Urban Classification 2011 (2 fold)"));
        assert!(strings.contains("Urban"));

        let sheet = read_entry(&mut archive, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"<c r="B2"><v>10</v></c>"#));
        assert!(sheet.contains(r#"<c r="C3"><v>4</v></c>"#));
        // no dwellings at all, so the mean cells stay blank
        assert!(sheet.contains(r#"<c r="D1" t="s">"#));
        assert!(!sheet.contains(r#"r="D2""#));
    }
}
