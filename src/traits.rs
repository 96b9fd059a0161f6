use std::path::Path;

use crate::error::Result;
use crate::summary::SummaryTable;
use crate::workbook::write_workbook;

/// An analysis whose results are a set of named tables.
pub trait Report {
    /// Sheet name and table, in the order they should be written.
    fn tables(&self) -> Vec<(String, SummaryTable)>;

    /// Log every table, e.g. for a quick look from the terminal.
    fn log_tables(&self) {
        for (name, table) in self.tables() {
            table.log(&name);
        }
    }

    /// One CSV per table in `dir`, named after the sheet.
    fn write_csvs(&self, dir: &Path) -> Result<()> {
        for (name, table) in self.tables() {
            let file = name.replace(['/', ' ', '.'], "_").to_lowercase();
            table.write_csv(&dir.join(format!("{file}.csv")))?;
        }
        Ok(())
    }

    fn write_workbook(&self, path: &Path) -> Result<()> {
        write_workbook(path, &self.tables())
    }
}

/// An analysis that draws its results.
pub trait Plot {
    /// Save every chart of the analysis as a PNG under `out_dir`.
    fn plot(&self, out_dir: &Path) -> Result<()>;
}
