use thiserror::Error;

/// Errors raised while loading, joining or writing the analysis datasets.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("plotting error: {0}")]
    Plot(String),

    /// A CSV header is missing a column the loader needs.
    #[error("{path} has no column named {column:?}")]
    MissingColumn { path: String, column: String },

    /// A GeoJSON feature lacks the property that identifies it.
    #[error("feature {index} has no usable {property:?} property")]
    MissingProperty { index: usize, property: String },

    #[error("feature {index} is not a polygon or multipolygon")]
    InvalidGeometry { index: usize },

    #[error("no CSV entry under {0:?} in the postcode archive")]
    MissingArchiveEntry(String),

    #[error("cannot parse date {0:?}")]
    ParseDate(String),
}

impl Error {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
