//! Readers for the input datasets.
//!
//! Everything here is read once per run from static files. Readers that
//! skip rows count what they skip and log it, so a join or filter further
//! down never loses records silently.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use geojson::{Feature, FeatureReader};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::{normalise_postcode, AddressPoint, ArealUnit, AssignedPoint};

pub fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::io(path, e))
}

/// Find a column by name, ignoring surrounding whitespace in the header.
pub fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::MissingColumn {
            path: path.display().to_string(),
            column: name.to_string(),
        })
}

/// Streams typed rows out of a CSV file in fixed-size batches.
///
/// Rows that fail to deserialize are skipped and counted in `malformed`.
pub struct BatchReader<R: Read, T> {
    records: csv::DeserializeRecordsIntoIter<R, T>,
    pub malformed: u64,
}

impl<T: DeserializeOwned> BatchReader<File, T> {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(open(path)?))
    }
}

impl<R: Read, T: DeserializeOwned> BatchReader<R, T> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        BatchReader {
            records: rdr.into_deserialize(),
            malformed: 0,
        }
    }

    /// Returns `None` once the input is exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Option<Vec<T>> {
        let mut batch = Vec::with_capacity(batch_size.min(1 << 16));
        for row in self.records.by_ref() {
            match row {
                Ok(row) => batch.push(row),
                Err(e) => {
                    if self.malformed == 0 {
                        log::warn!("skipping malformed row: {e}");
                    }
                    self.malformed += 1;
                    continue;
                }
            }
            if batch.len() == batch_size {
                break;
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

pub fn load_points(path: &Path) -> Result<Vec<AddressPoint>> {
    load_rows(path)
}

pub fn load_assigned_points(path: &Path) -> Result<Vec<AssignedPoint>> {
    load_rows(path)
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader: BatchReader<File, T> = BatchReader::from_path(path)?;
    let rows = reader.next_batch(usize::MAX).unwrap_or_default();
    log::info!(
        "read {} rows from {} ({} malformed rows skipped)",
        rows.len(),
        path.display(),
        reader.malformed
    );
    Ok(rows)
}

pub fn write_rows<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    log::info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Stream the features of a GeoJSON feature collection without holding the
/// whole document.
fn read_features(path: &Path) -> Result<impl Iterator<Item = geojson::Result<Feature>>> {
    Ok(FeatureReader::from_reader(BufReader::new(open(path)?)).features())
}

/// Move the (multi)polygon out of a feature.
fn take_geometry(feature: &mut Feature, index: usize) -> Result<geo::MultiPolygon<f64>> {
    let geometry = feature
        .geometry
        .take()
        .ok_or(Error::InvalidGeometry { index })?;
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(geo::MultiPolygon(vec![p])),
        _ => Err(Error::InvalidGeometry { index }),
    }
}

fn property_string(feature: &Feature, property: &str) -> Option<String> {
    match feature.property(property)? {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Load areal units from a GeoJSON feature collection, taking each unit's
/// code from `code_property`.
pub fn load_units(path: &Path, code_property: &str) -> Result<Vec<ArealUnit>> {
    let mut units = Vec::new();
    for (index, feature) in read_features(path)?.enumerate() {
        let mut feature = feature?;
        let code = property_string(&feature, code_property).ok_or_else(|| {
            Error::MissingProperty {
                index,
                property: code_property.to_string(),
            }
        })?;
        units.push(ArealUnit::new(code, take_geometry(&mut feature, index)?));
    }
    log::info!("loaded {} areal units from {}", units.len(), path.display());
    Ok(units)
}

/// Building footprints read off a feature stream in chunks of at most
/// `chunk_size` kept buildings.
///
/// Only footprints whose `feature_code` is wanted are kept. Buildings carry
/// no code of their own; each is identified by its position in the
/// collection, so the codes stay unique across chunks.
pub struct FootprintChunks<I> {
    features: std::iter::Enumerate<I>,
    feature_codes: Vec<u32>,
    chunk_size: usize,
    pub read: u64,
    pub kept: u64,
}

impl<I: Iterator<Item = geojson::Result<Feature>>> FootprintChunks<I> {
    pub fn new(features: I, feature_codes: &[u32], chunk_size: usize) -> Self {
        FootprintChunks {
            features: features.enumerate(),
            feature_codes: feature_codes.to_vec(),
            chunk_size: chunk_size.max(1),
            read: 0,
            kept: 0,
        }
    }

    fn footprint(
        &mut self,
        index: usize,
        feature: geojson::Result<Feature>,
    ) -> Result<Option<ArealUnit>> {
        let mut feature = feature?;
        self.read += 1;
        let code = feature
            .property("feature_code")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::MissingProperty {
                index,
                property: "feature_code".to_string(),
            })?;
        if !self.feature_codes.iter().any(|c| u64::from(*c) == code) {
            return Ok(None);
        }
        self.kept += 1;
        let geometry = take_geometry(&mut feature, index)?;
        Ok(Some(ArealUnit::new(index.to_string(), geometry)))
    }

    pub fn log(&self) {
        log::info!("kept {} of {} building footprints", self.kept, self.read);
    }
}

impl<I: Iterator<Item = geojson::Result<Feature>>> Iterator for FootprintChunks<I> {
    type Item = Result<Vec<ArealUnit>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = Vec::new();
        while chunk.len() < self.chunk_size {
            let Some((index, feature)) = self.features.next() else {
                break;
            };
            match self.footprint(index, feature) {
                Ok(Some(building)) => chunk.push(building),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

/// Stream the wanted building footprints in `path` in chunks.
pub fn building_chunks(
    path: &Path,
    feature_codes: &[u32],
    chunk_size: usize,
) -> Result<FootprintChunks<impl Iterator<Item = geojson::Result<Feature>>>> {
    Ok(FootprintChunks::new(read_features(path)?, feature_codes, chunk_size))
}

/// A CSV reader positioned after `skip_rows` lines of preamble.
pub fn csv_reader_skipping(path: &Path, skip_rows: usize) -> Result<csv::Reader<BufReader<File>>> {
    let mut reader = BufReader::new(open(path)?);
    let mut discard = String::new();
    for _ in 0..skip_rows {
        discard.clear();
        reader
            .read_line(&mut discard)
            .map_err(|e| Error::io(path, e))?;
    }
    Ok(csv::ReaderBuilder::new().flexible(true).from_reader(reader))
}

/// Numeric columns keyed by an area code, e.g. households per OA.
pub type ValueTable = HashMap<String, BTreeMap<String, f64>>;

/// Read `columns` out of a CSV keyed by `key_column`.
///
/// `skip_rows` lines of preamble are dropped before the header (the Nomis
/// downloads carry a title block). Rows whose key is empty or whose values
/// do not parse, such as the footnotes at the bottom of those downloads,
/// are skipped and counted.
pub fn load_value_table(
    path: &Path,
    key_column: &str,
    columns: &[&str],
    skip_rows: usize,
) -> Result<ValueTable> {
    let mut rdr = csv_reader_skipping(path, skip_rows)?;
    let headers = rdr.headers()?.clone();
    let key_idx = column_index(&headers, key_column, path)?;
    let value_idx = columns
        .iter()
        .map(|c| Ok((c.to_string(), column_index(&headers, c, path)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut table = ValueTable::new();
    let mut skipped = 0_u64;
    for record in rdr.records() {
        let record = record?;
        let key = record.get(key_idx).map(str::trim).unwrap_or_default();
        let values: Option<BTreeMap<_, _>> = value_idx
            .iter()
            .map(|(name, idx)| {
                let v = record.get(*idx)?.trim().replace(',', "");
                Some((name.clone(), v.parse::<f64>().ok()?))
            })
            .collect();
        match values {
            Some(values) if !key.is_empty() => {
                table.insert(key.to_string(), values);
            }
            _ => skipped += 1,
        }
    }
    log::info!(
        "read {} keyed rows from {} ({} rows skipped)",
        table.len(),
        path.display(),
        skipped
    );
    Ok(table)
}

/// Read one column of codes (e.g. the off-gas register's postcodes),
/// normalised with [`normalise_postcode`].
pub fn load_postcode_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let idx = column_index(rdr.headers()?, column, path)?;
    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(v) = record.get(idx).map(normalise_postcode) {
            if !v.is_empty() {
                out.push(v);
            }
        }
    }
    log::info!("read {} postcodes from {}", out.len(), path.display());
    Ok(out)
}

/// Two-column code lookup, e.g. OA11CD -> OA21CD.
///
/// A best-fit lookup can list one `from` code against several `to` codes
/// (an OA split in two), so every target is kept.
pub fn load_code_lookup(path: &Path, from: &str, to: &str) -> Result<HashMap<String, Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    let from_idx = column_index(&headers, from, path)?;
    let to_idx = column_index(&headers, to, path)?;
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    let mut pairs = 0_u64;
    for record in rdr.records() {
        let record = record?;
        if let (Some(k), Some(v)) = (record.get(from_idx), record.get(to_idx)) {
            out.entry(k.trim().to_string())
                .or_default()
                .push(v.trim().to_string());
            pairs += 1;
        }
    }
    log::info!("read {pairs} {from} -> {to} pairs covering {} {from} codes", out.len());
    Ok(out)
}

/// The fields of the ONS postcode directory this crate joins on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostcodeRecord {
    pub oa11: String,
    pub ru11ind: String,
}

pub type PostcodeDirectory = HashMap<String, PostcodeRecord>;

/// Stream the ONSPD CSV out of its zip archive without extracting it.
///
/// Only postcodes in English or Welsh 2011 output areas are kept.
pub fn load_postcode_directory(archive_path: &Path) -> Result<PostcodeDirectory> {
    log::info!("reading postcode directory from {}", archive_path.display());
    let mut archive = zip::ZipArchive::new(open(archive_path)?)?;

    let name = archive
        .file_names()
        .find(|n| n.starts_with("Data/") && n.to_ascii_lowercase().ends_with(".csv"))
        .map(str::to_string)
        .ok_or_else(|| Error::MissingArchiveEntry("Data/".to_string()))?;
    let entry = archive.by_name(&name)?;
    read_postcode_directory(entry, archive_path)
}

pub fn read_postcode_directory<R: Read>(reader: R, path: &Path) -> Result<PostcodeDirectory> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let pcd = column_index(&headers, "pcd", path)?;
    let oa11 = column_index(&headers, "oa11", path)?;
    let ru11ind = column_index(&headers, "ru11ind", path)?;

    let mut directory = PostcodeDirectory::new();
    let mut total = 0_u64;
    for record in rdr.records() {
        let record = record?;
        total += 1;
        let oa = record.get(oa11).unwrap_or_default().trim();
        if !(oa.starts_with('E') || oa.starts_with('W')) {
            continue;
        }
        directory.insert(
            normalise_postcode(record.get(pcd).unwrap_or_default()),
            PostcodeRecord {
                oa11: oa.to_string(),
                ru11ind: record.get(ru11ind).unwrap_or_default().trim().to_string(),
            },
        );
    }
    log::info!(
        "kept {} of {} postcodes in English or Welsh output areas",
        directory.len(),
        total
    );
    Ok(directory)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_batches_skip_malformed_rows() {
        let csv = "UPRN,X_COORDINATE,Y_COORDINATE\n1,0.0,0.0\n2,oops,1.0\n3,2.0,2.0\n4,3.0,3.0\n";
        let mut reader: BatchReader<_, AddressPoint> = BatchReader::new(csv.as_bytes());

        let first = reader.next_batch(2).unwrap();
        assert_eq!(first.iter().map(|p| p.uprn).collect::<Vec<_>>(), [1, 3]);
        let second = reader.next_batch(2).unwrap();
        assert_eq!(second.iter().map(|p| p.uprn).collect::<Vec<_>>(), [4]);
        assert!(reader.next_batch(2).is_none());
        assert_eq!(reader.malformed, 1);
    }

    #[test]
    fn test_value_table_skips_preamble_and_footer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Title line\nDataset: households\n\"2021 output area\",\"2021\"\n\"E00000001\",\"120\"\n\"E00000002\",\"1,040\"\n\n\"Footnote\",\"\"\n"
        )
        .unwrap();

        let table = load_value_table(file.path(), "2021 output area", &["2021"], 2).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["E00000002"]["2021"], 1040.0);
    }

    #[test]
    fn test_code_lookup_keeps_splits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "OA11CD,OA21CD,LAD22CD\nE00000001,E00000001,E06000001\nE00000002,E00200001,E06000001\nE00000002,E00200002,E06000001\n"
        )
        .unwrap();

        let lookup = load_code_lookup(file.path(), "OA11CD", "OA21CD").unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup["E00000002"], ["E00200001", "E00200002"]);
    }

    #[test]
    fn test_postcode_directory_keeps_england_and_wales() {
        let csv = "pcd,oa11,ru11ind\nAB1 0AA,S00090303,3\nCF10 1AA,W00009154,C1\nSW1A 1AA,E00023938,A1\n";
        let directory = read_postcode_directory(csv.as_bytes(), Path::new("onspd.csv")).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory["SW1A1AA"].ru11ind, "A1");
        assert!(!directory.contains_key("AB10AA"));
    }

    #[test]
    fn test_units_from_geojson() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature","properties":{{"OA11CD":"E00000001"}},
                  "geometry":{{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}}}
            ]}}"#
        )
        .unwrap();

        let units = load_units(file.path(), "OA11CD").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].code, "E00000001");
        assert_eq!(units[0].geometry.0.len(), 1);

        assert!(matches!(
            load_units(file.path(), "MSOA11CD"),
            Err(Error::MissingProperty { index: 0, .. })
        ));
    }

    fn footprint(feature_code: u32, x0: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"feature_code":{feature_code}}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},0],[{x1},0],[{x1},1],[{x0},1],[{x0},0]]]}}}}"#,
            x1 = x0 + 1.0
        )
    }

    #[test]
    fn test_building_chunks_skip_unwanted_codes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let features = [
            footprint(15014, 0.0),
            footprint(10021, 1.0),
            footprint(15024, 2.0),
            footprint(15014, 3.0),
            footprint(10021, 4.0),
            footprint(15028, 5.0),
        ]
        .join(",");
        write!(file, r#"{{"type":"FeatureCollection","features":[{features}]}}"#).unwrap();

        let mut chunks = building_chunks(file.path(), &[15014, 15024, 15028], 2).unwrap();
        let codes: Vec<Vec<String>> = chunks
            .by_ref()
            .map(|chunk| chunk.unwrap().into_iter().map(|b| b.code).collect())
            .collect();
        assert_eq!(codes, [vec!["0", "2"], vec!["3", "5"]]);
        assert_eq!((chunks.read, chunks.kept), (6, 4));
    }

    #[test]
    fn test_building_without_feature_code() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type":"FeatureCollection","features":[{},{{"type":"Feature","properties":{{}},"geometry":null}}]}}"#,
            footprint(15014, 0.0)
        )
        .unwrap();

        let results: Vec<_> = building_chunks(file.path(), &[15014], 1).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::MissingProperty { index: 1, .. })
        ));
    }
}
